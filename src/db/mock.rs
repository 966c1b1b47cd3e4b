//! Mock metrics stores for testing.
//!
//! Return canned result sets keyed by substrings of the incoming SQL, so
//! pipeline tests run without a database.

use super::{MetricsStore, ResultSet};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// A mock store that returns predefined result sets.
#[derive(Debug, Default)]
pub struct MockMetricsStore {
    results: Vec<(String, ResultSet)>,
    default_result: ResultSet,
    executed: Mutex<Vec<String>>,
    calls: AtomicUsize,
    close_error: Option<String>,
}

impl MockMetricsStore {
    /// Creates a store that answers every query with an empty result.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `result` for SQL containing `pattern` (case-insensitive).
    pub fn with_result(mut self, pattern: impl Into<String>, result: ResultSet) -> Self {
        self.results.push((pattern.into().to_lowercase(), result));
        self
    }

    /// Sets the result for SQL that matches no pattern.
    pub fn with_default_result(mut self, result: ResultSet) -> Self {
        self.default_result = result;
        self
    }

    /// Makes `close` fail with `message`.
    pub fn with_close_error(mut self, message: impl Into<String>) -> Self {
        self.close_error = Some(message.into());
        self
    }

    /// Number of `execute` calls so far.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// SQL statements received, in order.
    pub fn executed(&self) -> Vec<String> {
        self.executed
            .lock()
            .map(|guard| guard.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl MetricsStore for MockMetricsStore {
    async fn execute(&self, sql: &str) -> Result<ResultSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(sql.to_string());
        }

        let lowered = sql.to_lowercase();
        let result = self
            .results
            .iter()
            .find(|(pattern, _)| lowered.contains(pattern.as_str()))
            .map(|(_, result)| result.clone())
            .unwrap_or_else(|| self.default_result.clone());
        Ok(result)
    }

    async fn close(&self) -> Result<()> {
        match &self.close_error {
            Some(message) => Err(AppError::connection(message.clone())),
            None => Ok(()),
        }
    }
}

/// A store whose every query fails with the given message.
#[derive(Debug)]
pub struct FailingMetricsStore {
    message: String,
    calls: AtomicUsize,
}

impl FailingMetricsStore {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MetricsStore for FailingMetricsStore {
    async fn execute(&self, _sql: &str) -> Result<ResultSet> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(AppError::query(self.message.clone()))
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
