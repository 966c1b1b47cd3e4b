//! Response shaping.
//!
//! Turns a result set, its classification and the question into the text a
//! user reads. Pure functions only; nothing here touches a collaborator.

mod assumptions;
mod numbers;
mod simple;
mod table;

pub use assumptions::assumptions_for;
pub use numbers::{format_currency, format_number};
pub use table::{markdown_table, MAX_TABLE_ROWS};

use serde::Serialize;

use crate::classify::Classification;
use crate::db::ResultSet;

/// Phrases that ask for a one-line answer regardless of row count.
const SIMPLE_PHRASES: [&str; 5] = ["how many", "total", "average", "what is", "what's"];

const CACHE_MARKER: &str = "\n\n*📎 Retrieved from cache*";

/// How the answer text is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseKind {
    Simple,
    Table,
}

/// Everything a presentation surface needs to show an answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FormattedResponse {
    pub text: String,
    pub kind: ResponseKind,
    /// SQL that produced the rows, for a "show SQL" action.
    pub echoed_sql: String,
    pub row_count: usize,
    pub rows: ResultSet,
    /// True when there is at least one row to export.
    pub exportable: bool,
    /// The assumptions block without surrounding whitespace.
    pub assumptions: Option<String>,
}

/// Chooses between a one-line answer and a table.
///
/// Simple and aggregate classifications are always simple, as are results
/// of at most one row and questions phrased as a single quantity.
pub fn uses_simple_format(
    classification: Classification,
    row_count: usize,
    question: &str,
) -> bool {
    if matches!(
        classification,
        Classification::SimpleCount | Classification::SimpleAggregate
    ) {
        return true;
    }
    if row_count <= 1 {
        return true;
    }
    let question = question.to_lowercase();
    SIMPLE_PHRASES.iter().any(|p| question.contains(p))
}

/// Builds the user-facing response for an executed query.
pub fn format_response(
    rows: &ResultSet,
    classification: Classification,
    question: &str,
    from_cache: bool,
    sql: &str,
) -> FormattedResponse {
    let row_count = rows.row_count();
    let lowered = question.to_lowercase();

    let (mut text, kind) = if uses_simple_format(classification, row_count, question) {
        (simple::render(rows, &lowered), ResponseKind::Simple)
    } else {
        (
            table::render(rows, &lowered, classification),
            ResponseKind::Table,
        )
    };

    let block = assumptions::assumptions_block(&assumptions_for(&lowered));
    text.push_str(&block);

    if from_cache {
        text.push_str(CACHE_MARKER);
    }

    let assumptions = if block.is_empty() {
        None
    } else {
        Some(block.trim().to_string())
    };

    FormattedResponse {
        text,
        kind,
        echoed_sql: sql.to_string(),
        row_count,
        rows: rows.clone(),
        exportable: row_count > 0,
        assumptions,
    }
}

/// Guidance shown when a question falls outside app analytics: the
/// explanation followed by the example questions, one bullet each.
pub fn off_topic_text(message: &str, suggestions: &[String]) -> String {
    let mut text = format!("🤖 {message}");
    if !suggestions.is_empty() {
        text.push_str("\n\nTry asking something like:");
        for suggestion in suggestions {
            text.push_str(&format!("\n• '{suggestion}'"));
        }
    }
    text
}

/// Wraps an error message with suggestions for rephrasing.
pub fn error_text(message: &str) -> String {
    format!(
        "❌ I encountered an issue processing your request: {}\n\n\
         Please try rephrasing your question or ask something like:\n\
         • 'List all apps sorted by popularity'\n\
         • 'What's our total revenue this month?'\n\
         • 'Compare iOS vs Android performance'",
        message
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Value;
    use pretty_assertions::assert_eq;

    fn rows(n: usize) -> ResultSet {
        ResultSet::from_rows(
            ["app_name", "total_installs"],
            (0..n).map(|i| vec![Value::from(format!("app-{}", i)), Value::Int(500)]),
        )
    }

    #[test]
    fn test_simple_count_single_row() {
        let rows = ResultSet::from_rows(["number_of_apps"], vec![vec![Value::Int(5)]]);
        let response = format_response(
            &rows,
            Classification::SimpleCount,
            "How many apps do we have?",
            false,
            "SELECT COUNT(DISTINCT app_name) AS number_of_apps FROM app_metrics;",
        );

        assert_eq!(response.kind, ResponseKind::Simple);
        assert!(response
            .text
            .starts_with("We have **5 apps** in our portfolio."));
        assert_eq!(response.row_count, 1);
        assert!(response.exportable);
        assert!(response.echoed_sql.contains("COUNT(DISTINCT"));
    }

    #[test]
    fn test_detailed_analysis_eight_rows_is_table() {
        let response = format_response(
            &rows(8),
            Classification::DetailedAnalysis,
            "Break down installs by app",
            false,
            "SELECT 1",
        );

        assert_eq!(response.kind, ResponseKind::Table);
        let table_lines: Vec<&str> = response
            .text
            .lines()
            .filter(|l| l.starts_with('|'))
            .collect();
        assert_eq!(table_lines.len(), 10);
        assert_eq!(table_lines[1], "| --- | --- |");
        assert!(!response.text.contains("Showing top"));
    }

    #[test]
    fn test_twenty_five_rows_truncated() {
        let response = format_response(
            &rows(25),
            Classification::Ranking,
            "List apps by installs",
            false,
            "SELECT 1",
        );

        assert_eq!(response.kind, ResponseKind::Table);
        let data_lines = response
            .text
            .lines()
            .filter(|l| l.starts_with("| app-"))
            .count();
        assert_eq!(data_lines, 20);
        assert!(response
            .text
            .contains("*Showing top 20 results out of 25 total.*"));
        assert_eq!(response.row_count, 25);
        assert_eq!(response.rows.row_count(), 25);
    }

    #[test]
    fn test_format_selection() {
        assert!(uses_simple_format(Classification::SimpleAggregate, 10, "list"));
        assert!(uses_simple_format(Classification::Ranking, 1, "list"));
        assert!(uses_simple_format(Classification::Ranking, 10, "What's the split?"));
        assert!(!uses_simple_format(Classification::Ranking, 10, "List apps"));
    }

    #[test]
    fn test_empty_result_not_exportable() {
        let empty = ResultSet::new(vec!["app_name".to_string()], vec![]);
        let response = format_response(
            &empty,
            Classification::DetailedAnalysis,
            "apps on ios in usa by date",
            false,
            "SELECT 1",
        );
        assert_eq!(response.text, "No data found for your query.");
        assert!(!response.exportable);
        assert_eq!(response.assumptions, None);
    }

    #[test]
    fn test_assumptions_and_cache_marker() {
        let response = format_response(
            &rows(1),
            Classification::DetailedAnalysis,
            "Show TikTok",
            true,
            "SELECT 1",
        );

        assert!(response.text.ends_with("*📎 Retrieved from cache*"));
        assert_eq!(
            response.assumptions.as_deref(),
            Some(
                "**Assumptions made:**\n\
                 • Including data from all available time periods\n\
                 • Including both iOS and Android platforms\n\
                 • Including data from all countries"
            )
        );
    }

    #[test]
    fn test_response_serializes_kind_lowercase() {
        let response = format_response(&rows(1), Classification::SimpleCount, "x", false, "");
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["kind"], "simple");
        assert_eq!(json["exportable"], true);
    }

    #[test]
    fn test_guidance_texts() {
        let suggestions = vec![
            "How many apps do we have?".to_string(),
            "Show me revenue by country".to_string(),
        ];
        assert_eq!(
            off_topic_text("I only know app analytics.", &suggestions),
            "🤖 I only know app analytics.\n\n\
             Try asking something like:\n\
             • 'How many apps do we have?'\n\
             • 'Show me revenue by country'"
        );
        assert_eq!(off_topic_text("Nope.", &[]), "🤖 Nope.");
        let text = error_text("Failed to execute query: timeout");
        assert!(text.starts_with(
            "❌ I encountered an issue processing your request: Failed to execute query: timeout"
        ));
        assert!(text.contains("'Compare iOS vs Android performance'"));
    }
}
