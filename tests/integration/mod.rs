//! Integration tests for appquery.

pub mod cache_test;
pub mod pipeline_test;
pub mod validator_test;

use appquery::cache::{CachePolicy, ResultCache};
use appquery::db::SqliteStore;
use appquery::llm::MockLlmClient;
use appquery::QueryOrchestrator;
use std::sync::Arc;
use std::time::Duration;

/// Builds an orchestrator over the fixture store, the given mock client and
/// a fresh in-memory cache.
pub async fn fixture_orchestrator(llm: MockLlmClient) -> QueryOrchestrator {
    let store = SqliteStore::in_memory().await.unwrap();
    let cache = ResultCache::in_memory(CachePolicy::default()).await.unwrap();
    QueryOrchestrator::new(
        Arc::new(llm),
        Arc::new(store),
        Some(cache),
        Duration::from_secs(5),
    )
}
