//! appquery - guarded natural-language analytics over app metrics.

use std::process::ExitCode;

use anyhow::Context;
use appquery::cache::{CachePolicy, ResultCache};
use appquery::cli::{CacheAction, Cli, Command, OutputFormat};
use appquery::config::Config;
use appquery::format::{error_text, off_topic_text};
use appquery::safety::{sanitize, SqlValidator};
use appquery::{logging, AppError, QueryOrchestrator, QueryOutcome};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    logging::init_logging();

    let cli = Cli::parse_args();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            match e.downcast_ref::<AppError>() {
                Some(app_error) => error!("{}: {}", app_error.category(), app_error),
                None => error!("{e:#}"),
            }
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    match &cli.command {
        Command::Validate { sql } => Ok(validate(sql)),
        Command::Sanitize { sql } => {
            println!("{}", sanitize(sql));
            Ok(ExitCode::SUCCESS)
        }
        Command::Ask {
            question,
            no_cache,
            show_sql,
            format,
        } => {
            let config = load_config(&cli)?;
            ask(&config, question, !no_cache, *show_sql, *format).await
        }
        Command::Cache { action } => {
            let config = load_config(&cli)?;
            cache_admin(&config, *action).await?;
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let path = cli.config_path();
    info!("Loading config from: {}", path.display());
    let mut config = Config::load(Some(path.as_path()))
        .with_context(|| format!("could not load {}", path.display()))?;
    cli.apply_overrides(&mut config);
    Ok(config)
}

fn validate(sql: &str) -> ExitCode {
    let outcome = SqlValidator::new().validate(sql);

    for violation in &outcome.violations {
        println!("✗ {violation}");
    }
    for warning in &outcome.warnings {
        println!("! {warning}");
    }

    if outcome.accepted {
        println!("Accepted");
        ExitCode::SUCCESS
    } else {
        println!("Rejected");
        ExitCode::FAILURE
    }
}

async fn ask(
    config: &Config,
    question: &str,
    use_cache: bool,
    show_sql: bool,
    format: OutputFormat,
) -> anyhow::Result<ExitCode> {
    let orchestrator = QueryOrchestrator::from_config(config).await?;
    let reply = respond(&orchestrator, question, use_cache, show_sql, format).await?;

    println!("{}", reply.text);
    Ok(if reply.succeeded {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

/// Rendered output for one question.
#[derive(Debug)]
struct Reply {
    text: String,
    succeeded: bool,
}

/// Answers `question` and releases the orchestrator's connections.
///
/// A failure while closing is logged; it never replaces the answer.
async fn respond(
    orchestrator: &QueryOrchestrator,
    question: &str,
    use_cache: bool,
    show_sql: bool,
    format: OutputFormat,
) -> anyhow::Result<Reply> {
    let result = orchestrator.process(question, use_cache).await;
    if let Err(e) = orchestrator.close().await {
        warn!("Failed to release connections: {e}");
    }
    render(result, question, show_sql, format)
}

fn render(
    result: appquery::Result<QueryOutcome>,
    question: &str,
    show_sql: bool,
    format: OutputFormat,
) -> anyhow::Result<Reply> {
    let (text, succeeded) = match (result, format) {
        (Ok(QueryOutcome::Answered(answer)), OutputFormat::Text) => {
            let response = answer.format(question);
            let mut text = response.text;
            if show_sql {
                text.push_str(&format!("\n\n```sql\n{}\n```", response.echoed_sql));
            }
            (text, true)
        }
        (Ok(QueryOutcome::Answered(answer)), OutputFormat::Json) => {
            let response = answer.format(question);
            (serde_json::to_string_pretty(&response)?, true)
        }
        (Ok(QueryOutcome::OffTopic(reply)), OutputFormat::Text) => {
            (off_topic_text(&reply.message, &reply.suggestions), true)
        }
        (Ok(outcome @ QueryOutcome::OffTopic(_)), OutputFormat::Json) => {
            (serde_json::to_string_pretty(&outcome)?, true)
        }
        (Err(e), OutputFormat::Text) => {
            error!("{}: {}", e.category(), e);
            (error_text(&e.to_string()), false)
        }
        (Err(e), OutputFormat::Json) => {
            error!("{}: {}", e.category(), e);
            let payload = serde_json::json!({
                "outcome": "error",
                "category": e.category(),
                "message": e.to_string(),
            });
            (serde_json::to_string_pretty(&payload)?, false)
        }
    };
    Ok(Reply { text, succeeded })
}

async fn cache_admin(config: &Config, action: CacheAction) -> anyhow::Result<()> {
    let cache = ResultCache::from_config(&config.cache).await?;

    match action {
        CacheAction::Stats => {
            let stats = cache.stats().await?;
            println!("Entries: {}", stats.entries);
            println!("Total hits: {}", stats.total_accesses);
            if !stats.top_questions.is_empty() {
                println!("Most asked:");
                for (question, hits) in &stats.top_questions {
                    println!("  {hits:>5}  {question}");
                }
            }
        }
        CacheAction::Clear => {
            let removed = cache.clear().await?;
            println!("Removed {removed} cached answers");
        }
        CacheAction::Prune => {
            let policy = CachePolicy::from_config(&config.cache);
            if policy.is_unbounded() {
                println!("No cache limits configured; nothing to prune");
            } else {
                let removed = cache.prune_with(&policy).await?;
                println!("Pruned {removed} cached answers");
            }
        }
    }

    cache.close().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use appquery::db::{MockMetricsStore, ResultSet, Value};
    use appquery::llm::MockLlmClient;
    use appquery::orchestrator::{OffTopicReply, OFF_TOPIC_MESSAGE, SUGGESTED_QUESTIONS};
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn test_close_failure_keeps_answer() {
        let store = MockMetricsStore::new()
            .with_default_result(ResultSet::from_rows(
                ["number_of_apps"],
                [vec![Value::Int(5)]],
            ))
            .with_close_error("pool already closed");
        let orchestrator = QueryOrchestrator::new(
            Arc::new(MockLlmClient::new()),
            Arc::new(store),
            None,
            Duration::from_secs(5),
        );

        let reply = respond(
            &orchestrator,
            "How many apps do we have?",
            true,
            false,
            OutputFormat::Text,
        )
        .await
        .unwrap();

        assert!(reply.succeeded);
        assert!(reply.text.starts_with("We have **5 apps** in our portfolio."));
    }

    #[test]
    fn test_off_topic_renders_reply_payload() {
        let reply = render(
            Ok(QueryOutcome::OffTopic(OffTopicReply::default())),
            "Tell me a joke",
            false,
            OutputFormat::Text,
        )
        .unwrap();

        assert!(reply.succeeded);
        assert!(reply.text.contains(OFF_TOPIC_MESSAGE));
        for suggestion in SUGGESTED_QUESTIONS {
            assert!(reply.text.contains(&format!("'{suggestion}'")));
        }
    }

    #[test]
    fn test_error_reply_fails() {
        let reply = render(
            Err(AppError::validation("Empty SQL query")),
            "?",
            false,
            OutputFormat::Json,
        )
        .unwrap();

        assert!(!reply.succeeded);
        let json: serde_json::Value = serde_json::from_str(&reply.text).unwrap();
        assert_eq!(json["outcome"], "error");
        assert_eq!(json["message"], "Empty SQL query");
    }
}
