//! Validator tests against the fixture store.

use appquery::db::{MetricsStore, SqliteStore};
use appquery::llm::{generation_messages, strip_sql_fences, LlmClient, MockLlmClient};
use appquery::safety::{sanitize, SqlValidator};
use appquery::AppError;

#[tokio::test]
async fn test_mock_generated_sql_passes_and_runs() {
    let validator = SqlValidator::new();
    let store = SqliteStore::in_memory().await.unwrap();
    let llm = MockLlmClient::new();

    for question in [
        "How many apps do we have?",
        "What's our total revenue?",
        "What are our total installs?",
        "Which apps are the most popular?",
        "Show me revenue by country",
        "Which platform performs better?",
    ] {
        let reply = llm.complete(&generation_messages(question)).await.unwrap();
        let sql = strip_sql_fences(&reply);

        let outcome = validator.validate(&sql);
        assert!(outcome.accepted, "{question}: {:?}", outcome.violations);

        let rows = store.execute(&sql).await.unwrap();
        assert!(!rows.is_empty(), "{question} returned no rows");
    }
}

#[tokio::test]
async fn test_sanitized_sql_still_validates() {
    let raw = "SELECT country, SUM(installs) AS total_installs -- per country\n\
               FROM app_metrics /* all dates */\n\
               GROUP BY country";

    // Comments are flagged on the raw text.
    assert!(!SqlValidator::new().validate(raw).accepted);

    let cleaned = sanitize(raw);
    assert_eq!(
        cleaned,
        "SELECT country, SUM(installs) AS total_installs FROM app_metrics GROUP BY country;"
    );
    let outcome = SqlValidator::new().validate(&cleaned);
    assert!(outcome.accepted, "{:?}", outcome.violations);

    let store = SqliteStore::in_memory().await.unwrap();
    assert_eq!(store.execute(&cleaned).await.unwrap().row_count(), 3);
}

#[test]
fn test_rejection_reasons() {
    let validator = SqlValidator::new();

    let err = validator
        .validate("DROP TABLE app_metrics;")
        .into_result()
        .unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
    assert!(err.to_string().contains("DROP"));

    let err = validator
        .validate("UPDATE app_metrics SET installs = 0;")
        .into_result()
        .unwrap_err();
    assert!(err
        .to_string()
        .contains("Only SELECT statements are allowed"));

    let err = validator.validate("SELECT 1;").into_result().unwrap_err();
    assert!(err.to_string().contains("app_metrics"));

    let outcome = validator.validate(
        "SELECT app_name FROM app_metrics WHERE 1=1 UNION SELECT password FROM users",
    );
    assert!(!outcome.accepted);
}

#[test]
fn test_accepted_statement() {
    let outcome = SqlValidator::new().validate(
        "SELECT app_name, SUM(installs) AS total_installs FROM app_metrics GROUP BY app_name;",
    );
    assert!(outcome.accepted);
    assert_eq!(outcome.error(), None);
}
