//! Question pipeline.
//!
//! A question runs through cache lookup, classification, SQL generation,
//! validation, execution and cache write, in that order. The first failing
//! stage ends the request; nothing is retried here.

use serde::Serialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::cache::ResultCache;
use crate::classify::{Classification, Classifier};
use crate::config::Config;
use crate::db::{self, MetricsStore, ResultSet};
use crate::error::{AppError, Result};
use crate::fingerprint::Fingerprint;
use crate::format::{format_response, FormattedResponse};
use crate::llm::{self, generation_messages, strip_sql_fences, LlmClient};
use crate::safety::SqlValidator;

/// Short explanation returned for off-topic questions.
pub const OFF_TOPIC_MESSAGE: &str = "I'm focused on helping with app analytics. Please ask questions about app performance, installs, revenue, or user acquisition costs.";

/// Example questions offered alongside an off-topic rejection.
pub const SUGGESTED_QUESTIONS: [&str; 4] = [
    "How many apps do we have?",
    "Which platform performs better?",
    "Show me revenue by country",
    "What are our top apps by installs?",
];

/// Rows and metadata for an answered question.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryAnswer {
    pub sql: String,
    pub rows: ResultSet,
    pub row_count: usize,
    pub classification: Classification,
    pub from_cache: bool,
}

impl QueryAnswer {
    /// Shapes this answer for display.
    pub fn format(&self, question: &str) -> FormattedResponse {
        format_response(
            &self.rows,
            self.classification,
            question,
            self.from_cache,
            &self.sql,
        )
    }
}

/// Guidance returned instead of an answer for off-topic questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OffTopicReply {
    pub message: String,
    pub suggestions: Vec<String>,
}

impl Default for OffTopicReply {
    fn default() -> Self {
        Self {
            message: OFF_TOPIC_MESSAGE.to_string(),
            suggestions: SUGGESTED_QUESTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Successful result of [`QueryOrchestrator::process`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum QueryOutcome {
    Answered(QueryAnswer),
    OffTopic(OffTopicReply),
}

/// Coordinates the collaborators for each question.
pub struct QueryOrchestrator {
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn MetricsStore>,
    cache: Option<ResultCache>,
    classifier: Classifier,
    validator: SqlValidator,
    llm_timeout: Duration,
}

impl QueryOrchestrator {
    /// Creates an orchestrator over explicit collaborators.
    ///
    /// `llm_timeout` bounds each model call. Store calls are bounded by the
    /// store's own query timeout.
    pub fn new(
        llm: Arc<dyn LlmClient>,
        store: Arc<dyn MetricsStore>,
        cache: Option<ResultCache>,
        llm_timeout: Duration,
    ) -> Self {
        let classifier = Classifier::new(Arc::clone(&llm), llm_timeout);
        Self {
            llm,
            store,
            cache,
            classifier,
            validator: SqlValidator::new(),
            llm_timeout,
        }
    }

    /// Builds every collaborator from configuration.
    ///
    /// A cache that fails to open is logged and skipped; answers are still
    /// produced, just never cached.
    pub async fn from_config(config: &Config) -> Result<Self> {
        let llm = llm::create_client(&config.llm)?;
        let store = db::connect(&config.database).await?;

        let cache = if config.cache.enabled {
            match ResultCache::from_config(&config.cache).await {
                Ok(cache) => Some(cache),
                Err(e) => {
                    warn!("Result cache unavailable, continuing without it: {e}");
                    None
                }
            }
        } else {
            None
        };

        Ok(Self::new(llm, store, cache, config.llm.timeout()))
    }

    pub fn cache(&self) -> Option<&ResultCache> {
        self.cache.as_ref()
    }

    /// Answers `question`.
    ///
    /// With `use_cache`, a cached answer is returned before any model call.
    /// Off-topic questions yield guidance rather than an error.
    pub async fn process(&self, question: &str, use_cache: bool) -> Result<QueryOutcome> {
        let start = Instant::now();
        let fingerprint = Fingerprint::of(question);
        debug!(fingerprint = %fingerprint.short(), use_cache, "Processing question");

        if use_cache {
            if let Some(answer) = self.lookup_cache(&fingerprint).await {
                info!(
                    fingerprint = %fingerprint.short(),
                    row_count = answer.row_count,
                    duration_ms = start.elapsed().as_millis() as u64,
                    "Answered from cache"
                );
                return Ok(QueryOutcome::Answered(answer));
            }
        }

        let classification = self.classifier.classify(question).await;
        if classification.is_off_topic() {
            info!("Question classified as off-topic");
            return Ok(QueryOutcome::OffTopic(OffTopicReply::default()));
        }

        let sql = self.generate_sql(question).await?;

        self.validator.validate(&sql).into_result()?;

        let rows = self.execute(&sql).await?;
        let row_count = rows.row_count();

        self.store_in_cache(&fingerprint, question, &sql, &rows).await;

        info!(
            classification = %classification,
            row_count,
            duration_ms = start.elapsed().as_millis() as u64,
            "Question answered"
        );

        Ok(QueryOutcome::Answered(QueryAnswer {
            sql,
            rows,
            row_count,
            classification,
            from_cache: false,
        }))
    }

    /// Releases the store and cache connections.
    pub async fn close(&self) -> Result<()> {
        if let Some(cache) = &self.cache {
            cache.close().await;
        }
        self.store.close().await
    }

    async fn lookup_cache(&self, fingerprint: &Fingerprint) -> Option<QueryAnswer> {
        let cache = self.cache.as_ref()?;
        match cache.get(fingerprint).await {
            Ok(Some(entry)) => Some(QueryAnswer {
                sql: entry.sql,
                rows: entry.rows,
                row_count: entry.row_count,
                classification: Classification::DetailedAnalysis,
                from_cache: true,
            }),
            Ok(None) => None,
            Err(e) => {
                warn!("Cache lookup failed, treating as miss: {e}");
                None
            }
        }
    }

    async fn generate_sql(&self, question: &str) -> Result<String> {
        let messages = generation_messages(question);
        let start = Instant::now();

        let response = match tokio::time::timeout(self.llm_timeout, self.llm.complete(&messages))
            .await
        {
            Ok(Ok(response)) => response,
            Ok(Err(AppError::Llm(msg))) => return Err(AppError::generation(msg)),
            Ok(Err(e)) => return Err(AppError::generation(e.to_string())),
            Err(_) => {
                return Err(AppError::generation(format!(
                    "model did not respond within {}s",
                    self.llm_timeout.as_secs()
                )))
            }
        };

        let sql = strip_sql_fences(&response);
        if sql.is_empty() {
            return Err(AppError::generation("model returned an empty response"));
        }

        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            sql = %sql,
            "Generated SQL"
        );
        Ok(sql)
    }

    async fn execute(&self, sql: &str) -> Result<ResultSet> {
        let start = Instant::now();
        let rows = self.store.execute(sql).await.map_err(execution_error)?;
        debug!(
            row_count = rows.row_count(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Query executed"
        );
        Ok(rows)
    }

    async fn store_in_cache(
        &self,
        fingerprint: &Fingerprint,
        question: &str,
        sql: &str,
        rows: &ResultSet,
    ) {
        let Some(cache) = &self.cache else {
            return;
        };
        if let Err(e) = cache
            .put(fingerprint, question, sql, rows, rows.row_count())
            .await
        {
            warn!("Failed to cache result: {e}");
        }
    }
}

/// Store failures surface as a short execution summary.
fn execution_error(error: AppError) -> AppError {
    match error {
        AppError::Query(detail) | AppError::Connection(detail) => AppError::execution(detail),
        other => AppError::execution(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::CachePolicy;
    use crate::db::{FailingMetricsStore, MockMetricsStore, Value};
    use crate::llm::{FailingLlmClient, MockLlmClient};

    fn count_rows() -> ResultSet {
        ResultSet::from_rows(["number_of_apps"], vec![vec![Value::Int(5)]])
    }

    async fn cache() -> ResultCache {
        ResultCache::in_memory(CachePolicy::default()).await.unwrap()
    }

    fn answered(outcome: QueryOutcome) -> QueryAnswer {
        match outcome {
            QueryOutcome::Answered(answer) => answer,
            other => panic!("expected an answer, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_answers_and_caches() {
        let llm = MockLlmClient::new();
        let store = Arc::new(MockMetricsStore::new().with_default_result(count_rows()));
        let orchestrator = QueryOrchestrator::new(
            Arc::new(llm.clone()),
            store.clone(),
            Some(cache().await),
            Duration::from_secs(5),
        );

        let first = answered(
            orchestrator
                .process("How many apps do we have?", true)
                .await
                .unwrap(),
        );
        assert!(!first.from_cache);
        assert_eq!(first.classification, Classification::SimpleCount);
        assert_eq!(first.row_count, 1);
        assert!(!first.sql.contains("```"));

        let second = answered(
            orchestrator
                .process("  how many apps do we have?  ", true)
                .await
                .unwrap(),
        );
        assert!(second.from_cache);
        assert_eq!(second.classification, Classification::DetailedAnalysis);
        assert_eq!(second.sql, first.sql);
        assert_eq!(second.rows, first.rows);

        assert_eq!(llm.call_count(), 2);
        assert_eq!(store.call_count(), 1);
    }

    #[tokio::test]
    async fn test_bypassing_cache_reexecutes() {
        let llm = MockLlmClient::new();
        let store = Arc::new(MockMetricsStore::new().with_default_result(count_rows()));
        let orchestrator = QueryOrchestrator::new(
            Arc::new(llm.clone()),
            store.clone(),
            Some(cache().await),
            Duration::from_secs(5),
        );

        orchestrator.process("How many apps?", true).await.unwrap();
        let again = answered(orchestrator.process("How many apps?", false).await.unwrap());

        assert!(!again.from_cache);
        assert_eq!(store.call_count(), 2);
        assert_eq!(llm.generation_calls(), 2);
    }

    #[tokio::test]
    async fn test_off_topic_never_generates() {
        let llm = MockLlmClient::new();
        let store = Arc::new(MockMetricsStore::new());
        let orchestrator =
            QueryOrchestrator::new(Arc::new(llm.clone()), store.clone(), None, Duration::from_secs(5));

        let outcome = orchestrator
            .process("What's the weather like?", true)
            .await
            .unwrap();

        assert_eq!(outcome, QueryOutcome::OffTopic(OffTopicReply::default()));
        assert_eq!(llm.generation_calls(), 0);
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_rejected_sql_is_validation_error() {
        let llm = MockLlmClient::new().with_sql("apps", "```sql\nDROP TABLE app_metrics;\n```");
        let store = Arc::new(MockMetricsStore::new());
        let orchestrator =
            QueryOrchestrator::new(Arc::new(llm), store.clone(), None, Duration::from_secs(5));

        let err = orchestrator.process("Delete the apps", true).await.unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
        assert!(err.to_string().contains("DROP"));
        assert_eq!(store.call_count(), 0);
    }

    #[tokio::test]
    async fn test_llm_failure_is_generation_error() {
        let orchestrator = QueryOrchestrator::new(
            Arc::new(FailingLlmClient::new("Rate limited. Please wait and try again.")),
            Arc::new(MockMetricsStore::new()),
            None,
            Duration::from_secs(5),
        );

        let err = orchestrator.process("How many apps?", true).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Could not generate SQL for your question: Rate limited. Please wait and try again."
        );
    }

    #[tokio::test]
    async fn test_empty_generation_is_generation_error() {
        let llm = MockLlmClient::new().with_sql("apps", "```sql\n```");
        let orchestrator = QueryOrchestrator::new(
            Arc::new(llm),
            Arc::new(MockMetricsStore::new()),
            None,
            Duration::from_secs(5),
        );

        let err = orchestrator.process("How many apps?", true).await.unwrap_err();
        assert!(matches!(err, AppError::Generation(_)));
    }

    #[tokio::test]
    async fn test_store_failure_is_summarised() {
        let orchestrator = QueryOrchestrator::new(
            Arc::new(MockLlmClient::new()),
            Arc::new(FailingMetricsStore::new(
                "relation \"app_metrics\" does not exist\nDETAIL: internal",
            )),
            Some(cache().await),
            Duration::from_secs(5),
        );

        let err = orchestrator.process("How many apps?", true).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to execute query: relation \"app_metrics\" does not exist"
        );
        let stats = orchestrator.cache().unwrap().stats().await.unwrap();
        assert_eq!(stats.entries, 0);
    }

    #[tokio::test]
    async fn test_generation_timeout() {
        let llm = MockLlmClient::new()
            .with_classification("apps", "SIMPLE_COUNT")
            .with_delay(Duration::from_millis(200));
        let orchestrator = QueryOrchestrator::new(
            Arc::new(llm),
            Arc::new(MockMetricsStore::new()),
            None,
            Duration::from_millis(20),
        );

        let err = orchestrator.process("How many apps?", true).await.unwrap_err();
        assert!(matches!(err, AppError::Generation(_)));
    }

    #[test]
    fn test_answer_formats() {
        let answer = QueryAnswer {
            sql: "SELECT COUNT(DISTINCT app_name) AS number_of_apps FROM app_metrics;".to_string(),
            rows: count_rows(),
            row_count: 1,
            classification: Classification::SimpleCount,
            from_cache: true,
        };
        let response = answer.format("How many apps do we have?");
        assert!(response.text.starts_with("We have **5 apps**"));
        assert!(response.text.ends_with("*📎 Retrieved from cache*"));
        assert_eq!(response.echoed_sql, answer.sql);
    }
}
