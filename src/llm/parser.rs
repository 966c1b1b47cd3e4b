//! Response parsing for LLM outputs.
//!
//! Generated SQL often arrives wrapped in markdown fences. The pipeline only
//! strips the fences and trims; everything else is left to the validator.

use regex::Regex;
use std::sync::LazyLock;

static OPENING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)```sql\n?").expect("valid fence regex"));

static CLOSING_FENCE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\n?```").expect("valid fence regex"));

/// Removes ```` ```sql ```` / ```` ``` ```` markers and surrounding whitespace.
pub fn strip_sql_fences(response: &str) -> String {
    let text = response.trim();
    let text = OPENING_FENCE.replace_all(text, "");
    let text = CLOSING_FENCE.replace_all(&text, "");
    text.trim().to_string()
}

/// Normalizes a classification reply to a bare label candidate.
///
/// Only surrounding whitespace is removed; matching stays exact.
pub fn clean_label(response: &str) -> &str {
    response.trim()
}
