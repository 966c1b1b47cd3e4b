//! Result cache tests across orchestrator instances and on disk.

use appquery::cache::{CachePolicy, ResultCache};
use appquery::config::CacheConfig;
use appquery::db::SqliteStore;
use appquery::fingerprint::Fingerprint;
use appquery::llm::{FailingLlmClient, MockLlmClient};
use appquery::{QueryOrchestrator, QueryOutcome};
use std::sync::Arc;
use std::time::Duration;
use tempfile::tempdir;

async fn orchestrator_with(
    llm: Arc<dyn appquery::llm::LlmClient>,
    cache: ResultCache,
) -> QueryOrchestrator {
    let store = SqliteStore::in_memory().await.unwrap();
    QueryOrchestrator::new(llm, Arc::new(store), Some(cache), Duration::from_secs(5))
}

#[tokio::test]
async fn test_cached_answer_survives_restart() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("state").join("cache.db");
    let question = "How many apps do we have?";

    {
        let cache = ResultCache::open(&path, CachePolicy::default()).await.unwrap();
        let orchestrator = orchestrator_with(Arc::new(MockLlmClient::new()), cache).await;
        let outcome = orchestrator.process(question, true).await.unwrap();
        assert!(matches!(outcome, QueryOutcome::Answered(ref a) if !a.from_cache));
        orchestrator.close().await.unwrap();
    }

    // A model that always fails proves the answer never needed it.
    let llm = FailingLlmClient::new("should not be called");
    let cache = ResultCache::open(&path, CachePolicy::default()).await.unwrap();
    let orchestrator = orchestrator_with(Arc::new(llm.clone()), cache).await;

    let outcome = orchestrator
        .process("how many apps do we have?", true)
        .await
        .unwrap();
    match outcome {
        QueryOutcome::Answered(answer) => {
            assert!(answer.from_cache);
            assert_eq!(answer.row_count, 1);
        }
        other => panic!("expected a cached answer, got {other:?}"),
    }
    assert_eq!(llm.call_count(), 0);
}

#[tokio::test]
async fn test_access_count_tracks_hits() {
    let cache = ResultCache::in_memory(CachePolicy::default()).await.unwrap();
    let orchestrator = orchestrator_with(Arc::new(MockLlmClient::new()), cache.clone()).await;
    let question = "What's our total revenue?";

    for _ in 0..3 {
        orchestrator.process(question, true).await.unwrap();
    }

    let fingerprint = Fingerprint::of(question);
    let entry = cache.get(&fingerprint).await.unwrap().unwrap();
    // One write, two hits, and this lookup.
    assert_eq!(entry.access_count, 4);
    assert_eq!(entry.question, question);
}

#[tokio::test]
async fn test_entry_cap_from_config() {
    let dir = tempdir().unwrap();
    let config = CacheConfig {
        path: Some(dir.path().join("cache.db")),
        max_entries: Some(2),
        ..Default::default()
    };
    let cache = ResultCache::from_config(&config).await.unwrap();
    let orchestrator = orchestrator_with(Arc::new(MockLlmClient::new()), cache.clone()).await;

    for question in [
        "How many apps do we have?",
        "What's our total revenue?",
        "Show me revenue by country",
    ] {
        orchestrator.process(question, true).await.unwrap();
    }

    let stats = cache.stats().await.unwrap();
    assert_eq!(stats.entries, 2);
    assert!(cache
        .get(&Fingerprint::of("Show me revenue by country"))
        .await
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_clear_forces_fresh_answers() {
    let llm = MockLlmClient::new();
    let cache = ResultCache::in_memory(CachePolicy::default()).await.unwrap();
    let orchestrator = orchestrator_with(Arc::new(llm.clone()), cache.clone()).await;

    orchestrator
        .process("How many apps do we have?", true)
        .await
        .unwrap();
    assert_eq!(cache.clear().await.unwrap(), 1);

    let outcome = orchestrator
        .process("How many apps do we have?", true)
        .await
        .unwrap();
    assert!(matches!(outcome, QueryOutcome::Answered(ref a) if !a.from_cache));
    assert_eq!(llm.generation_calls(), 2);
}

#[tokio::test]
async fn test_disabled_cache_never_hits() {
    let llm = MockLlmClient::new();
    let store = SqliteStore::in_memory().await.unwrap();
    let orchestrator = QueryOrchestrator::new(
        Arc::new(llm.clone()),
        Arc::new(store),
        None,
        Duration::from_secs(5),
    );

    for _ in 0..2 {
        let outcome = orchestrator
            .process("How many apps do we have?", true)
            .await
            .unwrap();
        assert!(matches!(outcome, QueryOutcome::Answered(ref a) if !a.from_cache));
    }
    assert_eq!(llm.generation_calls(), 2);
}
