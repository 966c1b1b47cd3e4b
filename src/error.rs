//! Error types for appquery.
//!
//! Every pipeline stage returns one of these variants; the orchestrator
//! matches on them instead of unwinding.

use thiserror::Error;

/// Longest storage error summary surfaced to callers.
const EXECUTION_SUMMARY_MAX_CHARS: usize = 200;

/// Main error type for appquery operations.
#[derive(Error, Debug)]
pub enum AppError {
    /// Generated SQL failed one or more hard validator checks.
    ///
    /// Carries the violation messages joined with "; ".
    #[error("{0}")]
    Validation(String),

    /// The model could not produce usable SQL for a question.
    #[error("Could not generate SQL for your question: {0}")]
    Generation(String),

    /// The storage engine rejected or failed a validated query.
    #[error("Failed to execute query: {0}")]
    Execution(String),

    /// Database connection errors (host unreachable, auth failed, etc.)
    #[error("Connection error: {0}")]
    Connection(String),

    /// Raw storage errors from a metrics store, before summarising.
    #[error("Query error: {0}")]
    Query(String),

    /// LLM API errors (rate limits, auth, timeouts, etc.)
    #[error("LLM error: {0}")]
    Llm(String),

    /// Local cache database errors.
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Configuration errors (invalid config file, missing required fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Internal application errors (unexpected states, bugs, etc.)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn generation(msg: impl Into<String>) -> Self {
        Self::Generation(msg.into())
    }

    /// Creates an execution error, keeping only a short summary of `detail`.
    ///
    /// Only the first line survives, capped at a fixed number of characters,
    /// so driver internals never reach the caller.
    pub fn execution(detail: impl AsRef<str>) -> Self {
        Self::Execution(summarize(detail.as_ref()))
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::Connection(msg.into())
    }

    pub fn query(msg: impl Into<String>) -> Self {
        Self::Query(msg.into())
    }

    pub fn llm(msg: impl Into<String>) -> Self {
        Self::Llm(msg.into())
    }

    pub fn persistence(msg: impl Into<String>) -> Self {
        Self::Persistence(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// Returns the error category as a string for display purposes.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Validation Error",
            Self::Generation(_) => "Generation Error",
            Self::Execution(_) => "Execution Error",
            Self::Connection(_) => "Connection Error",
            Self::Query(_) => "Query Error",
            Self::Llm(_) => "LLM Error",
            Self::Persistence(_) => "Persistence Error",
            Self::Config(_) => "Configuration Error",
            Self::Internal(_) => "Internal Error",
        }
    }
}

fn summarize(detail: &str) -> String {
    let first_line = detail.lines().next().unwrap_or("").trim();
    if first_line.chars().count() <= EXECUTION_SUMMARY_MAX_CHARS {
        return first_line.to_string();
    }
    let mut short: String = first_line.chars().take(EXECUTION_SUMMARY_MAX_CHARS).collect();
    short.push_str("...");
    short
}

/// Result type alias using AppError.
pub type Result<T> = std::result::Result<T, AppError>;
