//! Question classification.
//!
//! The model picks one label from a closed set. Whatever it answers, the
//! classifier returns a usable [`Classification`]; failures never reach the
//! caller.

use crate::llm::{classification_messages, clean_label, LlmClient};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Analytic shape of a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    SimpleCount,
    SimpleAggregate,
    Ranking,
    Comparison,
    DetailedAnalysis,
    OffTopic,
    ExportRequest,
    SqlRequest,
    /// The model answered with something outside the label set.
    Unknown,
}

impl Classification {
    /// Labels offered to the model, in prompt order, with their descriptions.
    pub const PROMPT_CATEGORIES: [(Classification, &'static str); 8] = [
        (
            Self::SimpleCount,
            "Simple counting questions (how many apps, total installs)",
        ),
        (
            Self::SimpleAggregate,
            "Basic aggregations (total revenue, average installs)",
        ),
        (Self::Ranking, "Questions asking for top/best/worst items"),
        (
            Self::Comparison,
            "Comparing different periods, platforms, or countries",
        ),
        (Self::DetailedAnalysis, "Complex multi-dimensional analysis"),
        (Self::OffTopic, "Questions not related to app analytics"),
        (Self::ExportRequest, "User asking to export data as CSV"),
        (Self::SqlRequest, "User asking to see the SQL query"),
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SimpleCount => "SIMPLE_COUNT",
            Self::SimpleAggregate => "SIMPLE_AGGREGATE",
            Self::Ranking => "RANKING",
            Self::Comparison => "COMPARISON",
            Self::DetailedAnalysis => "DETAILED_ANALYSIS",
            Self::OffTopic => "OFF_TOPIC",
            Self::ExportRequest => "EXPORT_REQUEST",
            Self::SqlRequest => "SQL_REQUEST",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Maps a trimmed model reply to a label. Matching is exact and
    /// case-sensitive; anything else is `Unknown`.
    pub fn from_label(label: &str) -> Self {
        match label {
            "SIMPLE_COUNT" => Self::SimpleCount,
            "SIMPLE_AGGREGATE" => Self::SimpleAggregate,
            "RANKING" => Self::Ranking,
            "COMPARISON" => Self::Comparison,
            "DETAILED_ANALYSIS" => Self::DetailedAnalysis,
            "OFF_TOPIC" => Self::OffTopic,
            "EXPORT_REQUEST" => Self::ExportRequest,
            "SQL_REQUEST" => Self::SqlRequest,
            _ => Self::Unknown,
        }
    }

    /// The classification downstream stages act on. `Unknown` behaves as
    /// `DetailedAnalysis`.
    pub fn effective(self) -> Self {
        match self {
            Self::Unknown => Self::DetailedAnalysis,
            other => other,
        }
    }

    pub fn is_off_topic(&self) -> bool {
        matches!(self, Self::OffTopic)
    }
}

impl fmt::Display for Classification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Classification {
    type Err = String;

    /// Strict parse for CLI and config input; rejects unknown labels.
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match Self::from_label(s) {
            Self::Unknown if s != "UNKNOWN" => Err(format!("Unknown classification: {s}")),
            parsed => Ok(parsed),
        }
    }
}

/// Asks the model to classify questions.
#[derive(Clone)]
pub struct Classifier {
    client: Arc<dyn LlmClient>,
    timeout: Duration,
}

impl Classifier {
    pub fn new(client: Arc<dyn LlmClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Classifies `question`.
    ///
    /// Model errors and timeouts yield `DetailedAnalysis`; an unrecognized
    /// label yields `Unknown`.
    pub async fn classify(&self, question: &str) -> Classification {
        let messages = classification_messages(question);

        let reply = match tokio::time::timeout(self.timeout, self.client.complete(&messages)).await
        {
            Ok(Ok(reply)) => reply,
            Ok(Err(e)) => {
                warn!("Failed to classify query: {e}");
                return Classification::DetailedAnalysis;
            }
            Err(_) => {
                warn!(
                    "Classification timed out after {}s",
                    self.timeout.as_secs()
                );
                return Classification::DetailedAnalysis;
            }
        };

        let classification = Classification::from_label(clean_label(&reply));
        if classification == Classification::Unknown {
            warn!(reply = %reply.trim(), "Unrecognized classification label");
        }
        debug!(classification = %classification, "Classified question");
        classification
    }
}
