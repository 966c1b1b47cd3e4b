//! Comment stripping and whitespace cleanup for SQL text.
//!
//! This is a presentation helper. Sanitized text must still go through
//! [`SqlValidator::validate`](super::SqlValidator::validate) before it is run.

use regex::Regex;
use std::sync::LazyLock;

static LINE_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)--.*$").unwrap_or_else(|e| panic!("{e}")));
static BLOCK_COMMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)/\*.*?\*/").unwrap_or_else(|e| panic!("{e}")));

/// Strips `--` and `/* */` comments, collapses whitespace runs to single
/// spaces, and makes sure the statement ends with `;`.
///
/// Empty input stays empty.
pub fn sanitize(sql: &str) -> String {
    if sql.is_empty() {
        return String::new();
    }

    let without_lines = LINE_COMMENT.replace_all(sql, "");
    let without_blocks = BLOCK_COMMENT.replace_all(&without_lines, "");
    let mut cleaned = without_blocks.split_whitespace().collect::<Vec<_>>().join(" ");

    if !cleaned.ends_with(';') {
        cleaned.push(';');
    }
    cleaned
}
