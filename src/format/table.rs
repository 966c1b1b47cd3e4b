//! Markdown tables for multi-row results.

use super::numbers::{format_currency, format_number, title_case};
use super::simple::NO_DATA;
use crate::classify::Classification;
use crate::db::{ResultSet, Value};

/// Rows shown before the truncation notice kicks in.
pub const MAX_TABLE_ROWS: usize = 20;

/// Caption, table and truncation notice for `rows`.
///
/// `question` must already be lowercased.
pub(super) fn render(rows: &ResultSet, question: &str, classification: Classification) -> String {
    if rows.is_empty() {
        return NO_DATA.to_string();
    }

    let total = rows.row_count();
    let caption = caption(question, classification, total);
    let mut response = format!("{}\n\n{}", caption, markdown_table(rows, MAX_TABLE_ROWS));

    if total > MAX_TABLE_ROWS {
        response.push_str(&format!(
            "\n\n*Showing top {} results out of {} total.*",
            MAX_TABLE_ROWS, total
        ));
    }
    response
}

/// Header, separator and up to `limit` data rows, one line each.
pub fn markdown_table(rows: &ResultSet, limit: usize) -> String {
    let headers: Vec<String> = rows.columns.iter().map(|c| title_case(c)).collect();

    let mut lines = Vec::with_capacity(limit.min(rows.row_count()) + 2);
    lines.push(format!("| {} |", headers.join(" | ")));
    lines.push(format!("| {} |", vec!["---"; headers.len()].join(" | ")));

    for values in rows.rows.iter().take(limit) {
        let cells: Vec<String> = rows
            .columns
            .iter()
            .zip(values)
            .map(|(column, value)| format_cell(column, value))
            .collect();
        lines.push(format!("| {} |", cells.join(" | ")));
    }

    lines.join("\n")
}

/// Formats one cell by what its column name says it measures.
fn format_cell(column: &str, value: &Value) -> String {
    let Some(number) = value.as_f64() else {
        return value.to_display_string();
    };

    let column = column.to_lowercase();
    if column.contains("revenue") || column.contains("cost") {
        format_currency(number)
    } else if column.contains("install") {
        format_number(number)
    } else {
        format!("{:.2}", number)
    }
}

/// Picks the line shown above the table. Question keywords win over the
/// classification, which wins over row count.
fn caption(question: &str, classification: Classification, total: usize) -> String {
    if question.contains("popularity") {
        return "📊 **App Popularity Ranking** (based on total installs across all platforms and countries)".to_string();
    }
    if question.contains("revenue") && question.contains("country") {
        return "💰 **Revenue by Country** (includes both in-app purchases and advertising revenue)"
            .to_string();
    }
    if question.contains("top") || question.contains("best") {
        return "🏆 **Top Performers** (showing the highest ranked items based on your criteria)"
            .to_string();
    }
    if question.contains("comparison") || question.contains("compare") {
        return "⚖️ **Comparison Analysis** (side-by-side metrics for the requested comparison)"
            .to_string();
    }

    match classification.effective() {
        Classification::Ranking => {
            return "📈 **Ranking Results** (ordered by performance metrics)".to_string();
        }
        Classification::DetailedAnalysis => {
            return "🔍 **Detailed Analysis** (comprehensive breakdown of your requested metrics)"
                .to_string();
        }
        _ => {}
    }

    if total == 1 {
        "📋 **Query Result**".to_string()
    } else {
        format!("📋 **Query Results** ({} items found)", total)
    }
}
