//! Mock LLM clients for testing.
//!
//! Provide deterministic replies based on the question inside the prompt,
//! and count calls so tests can assert when the model was (not) consulted.

use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::llm::prompt::{extract_question, CATEGORIES_HEADING};
use crate::llm::types::{last_user_content, Message};
use crate::llm::LlmClient;

/// Mock LLM client that returns canned replies based on question patterns.
///
/// Classification prompts and generation prompts are answered from separate
/// tables. Custom mappings win over the built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct MockLlmClient {
    classifications: Vec<(String, String)>,
    sql_responses: Vec<(String, String)>,
    delay: Option<Duration>,
    classification_calls: Arc<AtomicUsize>,
    generation_calls: Arc<AtomicUsize>,
}

impl MockLlmClient {
    /// Creates a new mock client with default responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// When the question contains `pattern`, classify it as `label`.
    pub fn with_classification(
        mut self,
        pattern: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        self.classifications
            .push((pattern.into().to_lowercase(), label.into()));
        self
    }

    /// When the question contains `pattern`, answer generation with `response`.
    pub fn with_sql(mut self, pattern: impl Into<String>, response: impl Into<String>) -> Self {
        self.sql_responses
            .push((pattern.into().to_lowercase(), response.into()));
        self
    }

    /// Sleeps before every reply.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn classification_calls(&self) -> usize {
        self.classification_calls.load(Ordering::SeqCst)
    }

    pub fn generation_calls(&self) -> usize {
        self.generation_calls.load(Ordering::SeqCst)
    }

    /// Total calls of either kind.
    pub fn call_count(&self) -> usize {
        self.classification_calls() + self.generation_calls()
    }

    fn classify_reply(&self, question: &str) -> String {
        if let Some((_, label)) = self
            .classifications
            .iter()
            .find(|(pattern, _)| question.contains(pattern.as_str()))
        {
            return label.clone();
        }

        if question.contains("weather") || question.contains("joke") || question.contains("recipe")
        {
            return "OFF_TOPIC".to_string();
        }
        if question.contains("how many") {
            return "SIMPLE_COUNT".to_string();
        }
        if question.contains("total") || question.contains("average") {
            return "SIMPLE_AGGREGATE".to_string();
        }
        if question.contains("top") || question.contains("best") || question.contains("worst") {
            return "RANKING".to_string();
        }
        if question.contains("compare") || question.contains(" vs ") {
            return "COMPARISON".to_string();
        }
        "DETAILED_ANALYSIS".to_string()
    }

    fn sql_reply(&self, question: &str) -> String {
        if let Some((_, response)) = self
            .sql_responses
            .iter()
            .find(|(pattern, _)| question.contains(pattern.as_str()))
        {
            return response.clone();
        }

        if question.contains("how many apps") {
            return "```sql\nSELECT COUNT(DISTINCT app_name) AS number_of_apps FROM app_metrics;\n```"
                .to_string();
        }

        if question.contains("total revenue") {
            return "```sql\nSELECT SUM(in_app_revenue + ads_revenue) AS total_revenue FROM app_metrics;\n```"
                .to_string();
        }

        if question.contains("total installs") {
            return "```sql\nSELECT SUM(installs) AS total_installs FROM app_metrics;\n```"
                .to_string();
        }

        if question.contains("popular") || (question.contains("top") && question.contains("install"))
        {
            return "```sql\nSELECT app_name, SUM(installs) AS total_installs\nFROM app_metrics\nGROUP BY app_name\nORDER BY total_installs DESC;\n```"
                .to_string();
        }

        if question.contains("revenue") && question.contains("country") {
            return "```sql\nSELECT country, SUM(in_app_revenue + ads_revenue) AS total_revenue\nFROM app_metrics\nGROUP BY country\nORDER BY total_revenue DESC;\n```"
                .to_string();
        }

        if question.contains("platform") || (question.contains("ios") && question.contains("android"))
        {
            return "```sql\nSELECT platform, SUM(installs) AS total_installs, SUM(in_app_revenue + ads_revenue) AS total_revenue\nFROM app_metrics\nGROUP BY platform\nORDER BY total_revenue DESC;\n```"
                .to_string();
        }

        "I don't understand that question. Could you please rephrase it?".to_string()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn complete(&self, messages: &[Message]) -> Result<String> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let prompt = last_user_content(messages);
        let question = extract_question(prompt).unwrap_or(prompt).to_lowercase();

        if prompt.contains(CATEGORIES_HEADING) {
            self.classification_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.classify_reply(&question))
        } else {
            self.generation_calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.sql_reply(&question))
        }
    }
}

/// A client whose every call fails, for error-path tests.
#[derive(Debug, Clone)]
pub struct FailingLlmClient {
    message: String,
    calls: Arc<AtomicUsize>,
}

impl FailingLlmClient {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LlmClient for FailingLlmClient {
    async fn complete(&self, _messages: &[Message]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::llm(self.message.clone()))
    }
}
