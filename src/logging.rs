//! Logging configuration for appquery.
//!
//! Logs go to stderr so stdout carries only answers and JSON. Setting
//! `APPQUERY_LOG_FILE` redirects them to a file under the state directory.

use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Environment variable that switches logging to the log file.
pub const LOG_FILE_ENV: &str = "APPQUERY_LOG_FILE";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initializes logging to stderr.
pub fn init_stderr_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(std::io::stderr)
        .init();
}

/// Initializes logging to the log file, appending across runs.
///
/// Falls back to stderr when the file cannot be opened.
pub fn init_file_logging() {
    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            eprintln!("Warning: Could not create log directory: {e}");
            init_stderr_logging();
            return;
        }
    }

    let log_file = match OpenOptions::new().create(true).append(true).open(&log_path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Warning: Could not open log file: {e}");
            init_stderr_logging();
            return;
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(log_file)
        .with_ansi(false)
        .init();
}

/// Picks the sink from the environment.
pub fn init_logging() {
    if std::env::var_os(LOG_FILE_ENV).is_some() {
        init_file_logging();
    } else {
        init_stderr_logging();
    }
}

/// Returns the path for the log file.
///
/// Uses the XDG state directory on Linux (`~/.local/state/appquery/appquery.log`),
/// or falls back to the config directory on other platforms.
pub fn get_log_path() -> PathBuf {
    if let Some(state_dir) = dirs::state_dir() {
        return state_dir.join("appquery").join("appquery.log");
    }

    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("appquery").join("appquery.log");
    }

    std::env::temp_dir().join("appquery.log")
}
