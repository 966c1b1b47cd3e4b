//! SQLite metrics store.
//!
//! Local stand-in for the production database. An in-memory store is created
//! with the `app_metrics` schema and seeded with the fixture rows, which makes
//! it the default backend for tests and offline runs.

use super::fixture::{fixture_rows, MetricRow};
use crate::config::DatabaseConfig;
use crate::db::{MetricsStore, ResultSet, Value};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::{Column, Row, TypeInfo, ValueRef};
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Default timeout for local queries.
const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// SQLite-backed metrics store.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    query_timeout: Duration,
}

impl SqliteStore {
    /// Opens the store at a `sqlite:` URL.
    ///
    /// `sqlite::memory:` yields a seeded in-memory store. File URLs get the
    /// schema created if it is missing but are never seeded.
    pub async fn connect(config: &DatabaseConfig, url: &str) -> Result<Self> {
        if url.contains(":memory:") {
            let mut store = Self::in_memory().await?;
            store.query_timeout = config.query_timeout();
            return Ok(store);
        }

        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| AppError::config(format!("Invalid SQLite URL: {e}")))?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect_with(options)
            .await
            .map_err(|e| AppError::connection(format!("Failed to open SQLite database: {e}")))?;

        let store = Self {
            pool,
            query_timeout: config.query_timeout(),
        };
        store.create_schema().await?;
        info!("Opened SQLite metrics store");
        Ok(store)
    }

    /// Creates an in-memory store holding the fixture rows.
    pub async fn in_memory() -> Result<Self> {
        let store = Self::empty_in_memory().await?;
        store.seed_fixture().await?;
        Ok(store)
    }

    /// Creates an in-memory store with the schema but no rows.
    pub async fn empty_in_memory() -> Result<Self> {
        // One connection that never expires; a second connection would see a
        // different in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| AppError::connection(format!("Failed to open in-memory database: {e}")))?;

        let store = Self {
            pool,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        };
        store.create_schema().await?;
        Ok(store)
    }

    /// Creates the `app_metrics` table if it does not exist.
    pub async fn create_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS app_metrics (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                app_name TEXT NOT NULL,
                platform TEXT NOT NULL CHECK (platform IN ('iOS', 'Android')),
                date TEXT NOT NULL,
                country TEXT NOT NULL,
                installs INTEGER NOT NULL DEFAULT 0,
                in_app_revenue REAL NOT NULL DEFAULT 0,
                ads_revenue REAL NOT NULL DEFAULT 0,
                ua_cost REAL NOT NULL DEFAULT 0
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::query(format!("Failed to create app_metrics table: {e}")))?;
        Ok(())
    }

    /// Inserts `rows` in a single transaction.
    pub async fn seed(&self, rows: &[MetricRow]) -> Result<()> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| AppError::query(format!("Failed to start transaction: {e}")))?;

        for row in rows {
            sqlx::query(
                r#"
                INSERT INTO app_metrics
                    (app_name, platform, date, country, installs, in_app_revenue, ads_revenue, ua_cost)
                VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(&row.app_name)
            .bind(&row.platform)
            .bind(&row.date)
            .bind(&row.country)
            .bind(row.installs)
            .bind(row.in_app_revenue)
            .bind(row.ads_revenue)
            .bind(row.ua_cost)
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::query(format!("Failed to insert metric row: {e}")))?;
        }

        tx.commit()
            .await
            .map_err(|e| AppError::query(format!("Failed to commit metric rows: {e}")))?;
        debug!(rows = rows.len(), "Seeded app_metrics");
        Ok(())
    }

    /// Inserts the deterministic fixture rows.
    pub async fn seed_fixture(&self) -> Result<()> {
        self.seed(&fixture_rows()).await
    }
}

#[async_trait]
impl MetricsStore for SqliteStore {
    async fn execute(&self, sql: &str) -> Result<ResultSet> {
        let start = Instant::now();

        let rows = tokio::time::timeout(self.query_timeout, sqlx::query(sql).fetch_all(&self.pool))
            .await
            .map_err(|_| {
                AppError::query(format!(
                    "Query timed out after {} seconds",
                    self.query_timeout.as_secs()
                ))
            })?
            .map_err(|e| AppError::query(e.to_string()))?;

        let columns = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let values = rows.iter().map(convert_row).collect();

        debug!(
            duration_ms = start.elapsed().as_millis() as u64,
            row_count = rows.len(),
            "Query executed"
        );
        Ok(ResultSet::new(columns, values))
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        Ok(())
    }
}

fn convert_row(row: &SqliteRow) -> Vec<Value> {
    (0..row.columns().len())
        .map(|i| convert_value(row, i))
        .collect()
}

/// Decodes one value by its storage class. SQLite types are per value, so
/// aggregates report the class of what they actually returned.
fn convert_value(row: &SqliteRow, index: usize) -> Value {
    let type_name = match row.try_get_raw(index) {
        Ok(raw) if raw.is_null() => return Value::Null,
        Ok(raw) => raw.type_info().name().to_uppercase(),
        Err(_) => return Value::Null,
    };

    match type_name.as_str() {
        "INTEGER" | "INT8" | "BIGINT" => row.try_get::<i64, _>(index).map(Value::Int),
        "REAL" | "NUMERIC" => row.try_get::<f64, _>(index).map(Value::Float),
        "BOOLEAN" => row.try_get::<bool, _>(index).map(Value::Bool),
        "BLOB" => Ok(Value::Text("<binary>".to_string())),
        _ => row.try_get::<String, _>(index).map(Value::Text),
    }
    .unwrap_or(Value::Null)
}
