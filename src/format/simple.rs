//! One-line answers for counts, aggregates and single-row results.

use super::numbers::{format_currency, format_number, title_case};
use crate::db::{Record, ResultSet, Value};

/// Columns that may carry an app count, in lookup order.
const COUNT_COLUMNS: [&str; 4] = ["number_of_apps", "total_apps", "count", "app_count"];

pub(super) const NO_DATA: &str = "No data found for your query.";

/// Renders the first row of `rows` as a sentence chosen from the question.
///
/// `question` must already be lowercased.
pub(super) fn render(rows: &ResultSet, question: &str) -> String {
    let Some(record) = rows.record(0) else {
        return NO_DATA.to_string();
    };

    if question.contains("how many apps") {
        return format!("We have **{} apps** in our portfolio.", app_count(&record));
    }
    if question.contains("how many") && question.contains("ios") {
        return format!(
            "We have **{} iOS apps** in our portfolio.",
            app_count(&record)
        );
    }
    if question.contains("how many") && question.contains("android") {
        return format!(
            "We have **{} Android apps** in our portfolio.",
            app_count(&record)
        );
    }
    if question.contains("total revenue") {
        let revenue = numeric(&record, "total_revenue");
        return format!("Total revenue: **{}**", format_currency(revenue));
    }
    if question.contains("total installs") {
        let installs = numeric(&record, "total_installs");
        return format!("Total installs: **{}**", format_number(installs));
    }
    if question.contains("average") {
        if let Some(line) = average_line(&record) {
            return line;
        }
    }

    field_summary(&record)
}

fn app_count(record: &Record<'_>) -> String {
    record
        .first_of(&COUNT_COLUMNS)
        .map(Value::to_display_string)
        .unwrap_or_else(|| "0".to_string())
}

fn numeric(record: &Record<'_>, column: &str) -> f64 {
    record.get(column).and_then(Value::as_f64).unwrap_or(0.0)
}

/// First strictly positive numeric field, formatted by what it measures.
fn average_line(record: &Record<'_>) -> Option<String> {
    let (column, value) = record
        .iter()
        .find_map(|(column, value)| value.as_f64().filter(|v| *v > 0.0).map(|v| (column, v)))?;

    let label = column.replace('_', " ");
    let lowered = column.to_lowercase();
    let rendered = if lowered.contains("revenue") {
        format_currency(value)
    } else if lowered.contains("install") {
        format_number(value)
    } else {
        format!("{:.2}", value)
    };
    Some(format!("Average {}: **{}**", label, rendered))
}

/// `**Label: value | Label: value**` over every column of the row.
fn field_summary(record: &Record<'_>) -> String {
    let parts: Vec<String> = record
        .iter()
        .map(|(column, value)| {
            let lowered = column.to_lowercase();
            let rendered = match value.as_f64() {
                Some(v) if lowered.contains("revenue") => format_currency(v),
                Some(v) if lowered.contains("install") => format_number(v),
                _ => value.to_display_string(),
            };
            format!("{}: {}", title_case(column), rendered)
        })
        .collect();

    format!("**{}**", parts.join(" | "))
}
