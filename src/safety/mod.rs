//! SQL safety gate.
//!
//! Every statement produced by the model passes through [`SqlValidator`]
//! before it reaches the metrics store. All checks run on every call so the
//! caller sees every reason a statement was refused, in check order.

mod parser;
pub mod rules;
mod sanitize;

pub use parser::{analyze, leading_keyword, SqlStructure};
pub use sanitize::sanitize;

use sqlparser::dialect::PostgreSqlDialect;
use tracing::{error, info, warn};

use crate::error::{AppError, Result};
use rules::{
    CANONICAL_TABLE, FORBIDDEN_KEYWORDS, INJECTION_SIGNATURES, MAX_NESTED_SUBQUERIES,
    MAX_QUERY_CHARS, SELECT_WORD,
};

/// Verdict for one SQL statement.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOutcome {
    /// True only when no hard check produced a violation.
    pub accepted: bool,
    /// Hard violations, distinct, in check order.
    pub violations: Vec<String>,
    /// Soft-check findings. Logged, never fatal.
    pub warnings: Vec<String>,
}

impl ValidationOutcome {
    /// Violations joined with "; ", or `None` when accepted.
    pub fn error(&self) -> Option<String> {
        if self.accepted {
            None
        } else {
            Some(self.violations.join("; "))
        }
    }

    /// Converts a rejection into [`AppError::Validation`].
    pub fn into_result(self) -> Result<()> {
        match self.error() {
            None => Ok(()),
            Some(message) => Err(AppError::validation(message)),
        }
    }

    fn violation(&mut self, message: String) {
        if !self.violations.contains(&message) {
            warn!(violation = %message, "SQL validation error");
            self.violations.push(message);
        }
    }

    fn warning(&mut self, message: String) {
        warn!(finding = %message, "SQL validation warning");
        self.warnings.push(message);
    }
}

/// Read-only SQL validator for the `app_metrics` dataset.
#[derive(Debug)]
pub struct SqlValidator {
    dialect: PostgreSqlDialect,
}

impl Default for SqlValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlValidator {
    pub fn new() -> Self {
        Self {
            dialect: PostgreSqlDialect {},
        }
    }

    /// Runs every check against `sql` and collects the outcome.
    pub fn validate(&self, sql: &str) -> ValidationOutcome {
        let mut outcome = ValidationOutcome::default();
        let sql = sql.trim();

        if sql.is_empty() {
            outcome.violation("Empty SQL query".to_string());
            return self.finish(outcome);
        }

        self.check_forbidden_keywords(sql, &mut outcome);
        self.check_injection_patterns(sql, &mut outcome);
        let parsed = analyze(&self.dialect, sql);
        self.check_statement_shape(sql, parsed.as_ref().ok(), &mut outcome);

        let structure = match parsed {
            Ok(structure) => Some(structure),
            Err(e) => {
                outcome.violation(format!("Unable to parse SQL: {e}"));
                None
            }
        };

        self.check_table_references(structure.as_ref(), &mut outcome);
        self.check_column_references(structure.as_ref(), &mut outcome);
        self.check_complexity(sql, structure.as_ref(), &mut outcome);

        self.finish(outcome)
    }

    fn finish(&self, mut outcome: ValidationOutcome) -> ValidationOutcome {
        outcome.accepted = outcome.violations.is_empty();
        match outcome.error() {
            None => info!(warnings = outcome.warnings.len(), "SQL validation passed"),
            Some(message) => error!(error = %message, "SQL validation failed"),
        }
        outcome
    }

    fn check_forbidden_keywords(&self, sql: &str, outcome: &mut ValidationOutcome) {
        for keyword in FORBIDDEN_KEYWORDS.iter() {
            if keyword.pattern.is_match(sql) {
                outcome.violation(format!("Forbidden keyword detected: {}", keyword.token));
            }
        }
    }

    fn check_injection_patterns(&self, sql: &str, outcome: &mut ValidationOutcome) {
        for signature in INJECTION_SIGNATURES.iter() {
            if signature.pattern.is_match(sql) {
                outcome.violation(format!(
                    "Potential SQL injection pattern detected: {}",
                    signature.name
                ));
            }
        }
    }

    fn check_statement_shape(
        &self,
        sql: &str,
        structure: Option<&SqlStructure>,
        outcome: &mut ValidationOutcome,
    ) {
        match leading_keyword(&self.dialect, sql) {
            Some(keyword) if keyword == "SELECT" => {}
            // A common table expression counts as a SELECT when the parsed
            // statement is a plain query.
            Some(keyword) if keyword == "WITH" && structure.is_some_and(|s| s.query_only) => {}
            Some(keyword) => outcome.violation(format!(
                "Only SELECT statements are allowed, found: {keyword}"
            )),
            None => outcome
                .violation("Only SELECT statements are allowed, found: none".to_string()),
        }

        if structure.is_some_and(|s| s.select_into) {
            outcome.violation("SELECT INTO is not allowed".to_string());
        }
    }

    fn check_table_references(
        &self,
        structure: Option<&SqlStructure>,
        outcome: &mut ValidationOutcome,
    ) {
        // Unparseable text is already a violation.
        let Some(structure) = structure else {
            return;
        };

        if structure.statement_count > 1 {
            outcome.violation(format!(
                "Only one statement is allowed, found: {}",
                structure.statement_count
            ));
        }

        if !structure.references_table(CANONICAL_TABLE) {
            outcome.violation(format!(
                "Required table '{CANONICAL_TABLE}' not found in query"
            ));
        }

        let unexpected: Vec<&str> = structure
            .tables
            .iter()
            .filter(|name| !name.split('.').any(rules::is_allowed_table))
            .filter(|name| !structure.aliases.contains(parser::last_segment(name)))
            .map(String::as_str)
            .collect();
        if !unexpected.is_empty() {
            outcome.warning(format!(
                "Potentially unexpected table references: {}",
                unexpected.join(", ")
            ));
        }
    }

    fn check_column_references(
        &self,
        structure: Option<&SqlStructure>,
        outcome: &mut ValidationOutcome,
    ) {
        let Some(structure) = structure else {
            return;
        };

        let unknown: Vec<&str> = structure
            .identifiers
            .iter()
            .map(String::as_str)
            .filter(|name| {
                !rules::is_known_column(name)
                    && !rules::is_non_column_word(name)
                    && !rules::is_known_alias(name)
                    && !structure.aliases.contains(*name)
            })
            .filter(|name| name.len() > 2 && !name.chars().all(|c| c.is_ascii_digit()))
            .collect();

        if !unknown.is_empty() {
            outcome.warning(format!(
                "Potentially invalid column references: {}",
                unknown.join(", ")
            ));
        }
    }

    fn check_complexity(
        &self,
        sql: &str,
        structure: Option<&SqlStructure>,
        outcome: &mut ValidationOutcome,
    ) {
        if sql.chars().count() > MAX_QUERY_CHARS {
            outcome.violation(format!(
                "Query is too long (>{MAX_QUERY_CHARS} characters)"
            ));
        }

        let selects = match structure {
            Some(structure) => structure.select_count,
            None => SELECT_WORD.find_iter(sql).count(),
        };
        let nested = selects.saturating_sub(1);
        if nested > MAX_NESTED_SUBQUERIES {
            outcome.violation(format!("Too many nested subqueries: {nested}"));
        }
    }
}
