//! End-to-end question pipeline tests.

use super::fixture_orchestrator;
use appquery::classify::Classification;
use appquery::db::Value;
use appquery::format::ResponseKind;
use appquery::llm::MockLlmClient;
use appquery::orchestrator::{OffTopicReply, SUGGESTED_QUESTIONS};
use appquery::{AppError, QueryAnswer, QueryOutcome};
use futures::future::join_all;
use pretty_assertions::assert_eq;
use std::sync::Arc;

fn answered(outcome: QueryOutcome) -> QueryAnswer {
    match outcome {
        QueryOutcome::Answered(answer) => answer,
        other => panic!("expected an answer, got {other:?}"),
    }
}

#[tokio::test]
async fn test_app_count_question() {
    let orchestrator = fixture_orchestrator(MockLlmClient::new()).await;
    let question = "How many apps do we have?";

    let answer = answered(orchestrator.process(question, true).await.unwrap());
    assert_eq!(answer.classification, Classification::SimpleCount);
    assert_eq!(answer.row_count, 1);
    assert_eq!(
        answer.rows.record(0).unwrap().get("number_of_apps"),
        Some(&Value::Int(5))
    );

    let response = answer.format(question);
    assert_eq!(response.kind, ResponseKind::Simple);
    assert!(response
        .text
        .starts_with("We have **5 apps** in our portfolio."));
    assert!(response.exportable);
}

#[tokio::test]
async fn test_total_revenue_question() {
    let orchestrator = fixture_orchestrator(MockLlmClient::new()).await;
    let question = "What's our total revenue?";

    let answer = answered(orchestrator.process(question, true).await.unwrap());
    assert_eq!(answer.classification, Classification::SimpleAggregate);

    let response = answer.format(question);
    assert!(response.text.starts_with("Total revenue: **$870.0K**"));
    assert!(response
        .text
        .contains("• Revenue includes both in-app purchases and advertising"));
}

#[tokio::test]
async fn test_revenue_by_country_is_table() {
    let orchestrator = fixture_orchestrator(MockLlmClient::new()).await;
    let question = "Show me revenue by country";

    let answer = answered(orchestrator.process(question, true).await.unwrap());
    assert_eq!(answer.row_count, 3);
    assert_eq!(
        answer.rows.record(0).unwrap().get("country"),
        Some(&Value::from("USA"))
    );

    let response = answer.format(question);
    assert_eq!(response.kind, ResponseKind::Table);
    assert!(response.text.starts_with("💰 **Revenue by Country**"));
    assert!(response.text.contains("| Country | Total Revenue |"));
    assert!(response.text.contains("| USA | $330.0K |"));
}

#[tokio::test]
async fn test_popular_apps_ranked_by_installs() {
    let orchestrator = fixture_orchestrator(MockLlmClient::new()).await;

    let answer = answered(
        orchestrator
            .process("Which apps are the most popular?", true)
            .await
            .unwrap(),
    );
    let names: Vec<String> = answer
        .rows
        .records()
        .filter_map(|r| r.get("app_name").map(Value::to_display_string))
        .collect();
    assert_eq!(
        names,
        vec!["TikTok", "Instagram", "WhatsApp", "Spotify", "Zoom"]
    );
}

#[tokio::test]
async fn test_repeat_question_served_from_cache() {
    let llm = MockLlmClient::new();
    let orchestrator = fixture_orchestrator(llm.clone()).await;

    let first = answered(
        orchestrator
            .process("How many apps do we have?", true)
            .await
            .unwrap(),
    );
    let calls_after_first = llm.call_count();

    let second = answered(
        orchestrator
            .process("HOW MANY   apps do we have?", true)
            .await
            .unwrap(),
    );

    assert!(second.from_cache);
    assert_eq!(second.rows, first.rows);
    assert_eq!(llm.call_count(), calls_after_first);

    let response = second.format("How many apps do we have?");
    assert!(response.text.ends_with("*📎 Retrieved from cache*"));

    let stats = orchestrator.cache().unwrap().stats().await.unwrap();
    assert_eq!(stats.entries, 1);
    assert_eq!(stats.total_accesses, 2);
}

#[tokio::test]
async fn test_off_topic_question() {
    let llm = MockLlmClient::new();
    let orchestrator = fixture_orchestrator(llm.clone()).await;

    let outcome = orchestrator
        .process("Tell me a joke", true)
        .await
        .unwrap();

    match outcome {
        QueryOutcome::OffTopic(reply) => {
            assert_eq!(reply, OffTopicReply::default());
            assert_eq!(reply.suggestions.len(), SUGGESTED_QUESTIONS.len());
        }
        other => panic!("expected off-topic guidance, got {other:?}"),
    }
    assert_eq!(llm.generation_calls(), 0);
    let stats = orchestrator.cache().unwrap().stats().await.unwrap();
    assert_eq!(stats.entries, 0);
}

#[tokio::test]
async fn test_prose_reply_is_rejected() {
    let orchestrator = fixture_orchestrator(MockLlmClient::new()).await;

    let err = orchestrator
        .process("Tell me something interesting", true)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Validation(_)));
    assert!(err.to_string().contains("Only SELECT statements are allowed"));
}

#[tokio::test]
async fn test_stacked_statement_never_reaches_store() {
    let llm = MockLlmClient::new().with_sql(
        "everything",
        "SELECT * FROM app_metrics; DROP TABLE app_metrics;",
    );
    let orchestrator = fixture_orchestrator(llm).await;

    let err = orchestrator
        .process("Show me everything", true)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(err.to_string().contains("DROP"));

    // The table is intact.
    let answer = answered(
        orchestrator
            .process("How many apps do we have?", false)
            .await
            .unwrap(),
    );
    assert_eq!(
        answer.rows.record(0).unwrap().get("number_of_apps"),
        Some(&Value::Int(5))
    );
}

#[tokio::test]
async fn test_bad_column_is_execution_error() {
    let llm = MockLlmClient::new().with_sql(
        "downloads",
        "```sql\nSELECT SUM(downloads) AS total FROM app_metrics;\n```",
    );
    let orchestrator = fixture_orchestrator(llm).await;

    let err = orchestrator
        .process("Sum the downloads", true)
        .await
        .unwrap_err();

    assert!(matches!(err, AppError::Execution(_)));
    assert!(err.to_string().starts_with("Failed to execute query: "));
    assert!(!err.to_string().contains('\n'));
}

#[tokio::test]
async fn test_concurrent_questions() {
    let orchestrator = Arc::new(fixture_orchestrator(MockLlmClient::new()).await);
    let questions = [
        "How many apps do we have?",
        "What's our total revenue?",
        "Show me revenue by country",
        "How many apps do we have?",
        "What are our total installs?",
        "Which platform performs better?",
    ];

    let results = join_all(questions.iter().map(|question| {
        let orchestrator = Arc::clone(&orchestrator);
        async move { orchestrator.process(question, true).await }
    }))
    .await;

    for result in &results {
        assert!(matches!(result, Ok(QueryOutcome::Answered(_))));
    }

    let stats = orchestrator.cache().unwrap().stats().await.unwrap();
    assert_eq!(stats.entries, 5);
}
