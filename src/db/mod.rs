//! Metrics store abstraction.
//!
//! The pipeline only ever hands a store SQL that passed the validator. Stores
//! return rows in column order and never interpret the statement themselves.

mod fixture;
mod mock;
mod postgres;
mod sqlite;
mod types;

pub use fixture::{fixture_rows, MetricRow};
pub use mock::{FailingMetricsStore, MockMetricsStore};
pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;
pub use types::{Record, ResultSet, Value};

use crate::config::DatabaseConfig;
use crate::error::{AppError, Result};
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

/// Supported storage backends, chosen by URL scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseBackend {
    Postgres,
    Sqlite,
}

impl DatabaseBackend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Sqlite => "sqlite",
        }
    }

    /// Picks the backend for a connection URL.
    pub fn from_url(url: &str) -> Result<Self> {
        let parsed = Url::parse(url)
            .map_err(|e| AppError::config(format!("Invalid database URL: {e}")))?;
        match parsed.scheme() {
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            other => Err(AppError::config(format!(
                "Unsupported database scheme '{other}'. Expected 'postgres' or 'sqlite'"
            ))),
        }
    }
}

/// Opens the metrics store described by `config`.
pub async fn connect(config: &DatabaseConfig) -> Result<Arc<dyn MetricsStore>> {
    let url = config.url.as_deref().ok_or_else(|| {
        AppError::config("No database configured. Set DATABASE_URL or [database].url")
    })?;

    match DatabaseBackend::from_url(url)? {
        DatabaseBackend::Postgres => Ok(Arc::new(PostgresStore::connect(config, url).await?)),
        DatabaseBackend::Sqlite => Ok(Arc::new(SqliteStore::connect(config, url).await?)),
    }
}

/// Executes validated, read-only SQL against the `app_metrics` dataset.
#[async_trait]
pub trait MetricsStore: Send + Sync {
    /// Runs `sql` and returns every row in column order.
    async fn execute(&self, sql: &str) -> Result<ResultSet>;

    /// Releases pooled connections.
    async fn close(&self) -> Result<()>;
}
