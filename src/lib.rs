//! appquery - guarded natural-language analytics over app metrics.
//!
//! This library exposes the pipeline modules for the binary and for
//! integration tests.

pub mod cache;
pub mod classify;
pub mod cli;
pub mod config;
pub mod db;
pub mod error;
pub mod fingerprint;
pub mod format;
pub mod llm;
pub mod logging;
pub mod orchestrator;
pub mod safety;

pub use error::{AppError, Result};
pub use orchestrator::{QueryAnswer, QueryOrchestrator, QueryOutcome};
