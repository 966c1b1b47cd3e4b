//! Configuration management for appquery.
//!
//! Handles loading configuration from a TOML file and environment variables
//! for the model client, the metrics database and the result cache.

use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Main configuration structure for appquery.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// LLM provider configuration.
    #[serde(default)]
    pub llm: LlmConfig,

    /// Metrics database configuration.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Result cache configuration.
    #[serde(default)]
    pub cache: CacheConfig,
}

/// LLM provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// LLM provider: "openai" or "mock".
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Model name (e.g., "gpt-4o").
    #[serde(default = "default_model")]
    pub model: String,

    /// Per-call timeout for classification and generation.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Sampling temperature for SQL generation.
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// API key. Normally supplied via `OPENAI_API_KEY`, never written back.
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,
}

fn default_provider() -> String {
    "openai".to_string()
}

fn default_model() -> String {
    "gpt-4o".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_temperature() -> f32 {
    0.1
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            timeout_secs: default_timeout_secs(),
            temperature: default_temperature(),
            api_key: None,
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Metrics database configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL: `postgres://...` or `sqlite:...`.
    #[serde(default)]
    pub url: Option<String>,

    /// Per-query execution timeout.
    #[serde(default = "default_timeout_secs")]
    pub query_timeout_secs: u64,

    /// Pool size.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            query_timeout_secs: default_timeout_secs(),
            max_connections: default_max_connections(),
        }
    }
}

impl DatabaseConfig {
    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    /// Returns the URL with any password masked, for logs and status output.
    pub fn display_url(&self) -> String {
        let Some(raw) = self.url.as_deref() else {
            return "(not configured)".to_string();
        };
        match Url::parse(raw) {
            Ok(mut url) if url.password().is_some() => {
                // Only fails for cannot-be-a-base URLs, which carry no password.
                let _ = url.set_password(Some("****"));
                url.to_string()
            }
            _ => raw.to_string(),
        }
    }
}

/// Result cache configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Whether lookups and writes happen at all.
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,

    /// Cache database file. Defaults to the platform data directory.
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Keep at most this many entries, dropping the least recently accessed.
    #[serde(default)]
    pub max_entries: Option<u64>,

    /// Drop entries not accessed for this many days.
    #[serde(default)]
    pub max_age_days: Option<u64>,
}

fn default_cache_enabled() -> bool {
    true
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            path: None,
            max_entries: None,
            max_age_days: None,
        }
    }
}

impl CacheConfig {
    /// Resolved cache database path.
    ///
    /// - Linux: `~/.local/share/appquery/cache.db`
    /// - macOS: `~/Library/Application Support/appquery/cache.db`
    pub fn resolved_path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("appquery")
                .join("cache.db")
        })
    }
}

impl Config {
    /// Returns the default config file path for the current platform.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("appquery")
            .join("config.toml")
    }

    /// Loads configuration from a TOML file. A missing file yields defaults.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| AppError::config(format!("Failed to read config file: {e}")))?;

        Self::parse_toml(&content, path)
    }

    /// Parses configuration from a TOML string.
    fn parse_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).map_err(|e| {
            AppError::config(format!(
                "Configuration error in {}:\n  {}",
                path.display(),
                e
            ))
        })
    }

    /// Loads the file at `path` (or the default path), then applies the
    /// environment on top.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let default_path = Self::default_path();
        let mut config = Self::load_from_file(path.unwrap_or(default_path.as_path()))?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies environment overrides through `lookup`.
    ///
    /// Takes a lookup function so tests never touch the process environment.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(key) = lookup("OPENAI_API_KEY").filter(|v| !v.is_empty()) {
            self.llm.api_key = Some(key);
        }
        if let Some(model) = lookup("OPENAI_MODEL").filter(|v| !v.is_empty()) {
            self.llm.model = model;
        }
        if let Some(url) = lookup("DATABASE_URL").filter(|v| !v.is_empty()) {
            self.database.url = Some(url);
        }
        if let Some(path) = lookup("APPQUERY_CACHE_PATH").filter(|v| !v.is_empty()) {
            self.cache.path = Some(PathBuf::from(path));
        }
    }
}
