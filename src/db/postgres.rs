//! PostgreSQL metrics store.
//!
//! Production backend for the `app_metrics` table, built on a sqlx pool.

use crate::config::DatabaseConfig;
use crate::db::{MetricsStore, ResultSet, Value};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use sqlx::postgres::{PgColumn, PgPool, PgPoolOptions, PgRow};
use sqlx::{Column as SqlxColumn, Executor, Row as SqlxRow, Statement as SqlxStatement, TypeInfo};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use url::Url;

/// Maximum number of connection retry attempts.
const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// PostgreSQL-backed metrics store.
#[derive(Debug)]
pub struct PostgresStore {
    pool: PgPool,
    query_timeout: Duration,
}

impl PostgresStore {
    /// Wraps an existing pool.
    pub fn from_pool(pool: PgPool, query_timeout: Duration) -> Self {
        Self {
            pool,
            query_timeout,
        }
    }

    /// Connects to `url`, retrying transient failures with backoff.
    pub async fn connect(config: &DatabaseConfig, url: &str) -> Result<Self> {
        let mut last_error = None;
        let mut delay = Duration::from_millis(RETRY_BASE_DELAY_MS);

        for attempt in 1..=MAX_RETRY_ATTEMPTS {
            debug!("Connection attempt {} of {}", attempt, MAX_RETRY_ATTEMPTS);

            let result = PgPoolOptions::new()
                .max_connections(config.max_connections)
                .acquire_timeout(Duration::from_secs(10))
                .connect(url)
                .await;

            match result {
                Ok(pool) => {
                    debug!("Connected to metrics database");
                    return Ok(Self::from_pool(pool, config.query_timeout()));
                }
                Err(e) => {
                    let transient = is_transient_error(&e);
                    last_error = Some(e);

                    if attempt < MAX_RETRY_ATTEMPTS && transient {
                        warn!(
                            "Connection attempt {} failed (transient error), retrying in {:?}",
                            attempt, delay
                        );
                        tokio::time::sleep(delay).await;
                        delay *= 2;
                    } else {
                        break;
                    }
                }
            }
        }

        match last_error {
            Some(e) => Err(map_connection_error(e, url)),
            None => Err(AppError::internal("No connection attempt was made")),
        }
    }
}

impl PostgresStore {
    /// Runs `sql` inside a READ ONLY transaction that is always rolled back.
    ///
    /// Column names come from the first row, or from the prepared statement
    /// when there are no rows.
    async fn fetch_read_only(
        &self,
        sql: &str,
    ) -> std::result::Result<(Vec<String>, Vec<PgRow>), sqlx::Error> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("SET TRANSACTION READ ONLY")
            .execute(&mut *tx)
            .await?;

        let rows = sqlx::query(sql).fetch_all(&mut *tx).await?;
        let columns = match rows.first() {
            Some(row) => column_names(row.columns()),
            None => column_names((&mut *tx).prepare(sql).await?.columns()),
        };

        tx.rollback().await?;
        Ok((columns, rows))
    }
}

fn column_names(columns: &[PgColumn]) -> Vec<String> {
    columns.iter().map(|c| c.name().to_string()).collect()
}

#[async_trait]
impl MetricsStore for PostgresStore {
    async fn execute(&self, sql: &str) -> Result<ResultSet> {
        let start = Instant::now();

        let (columns, rows) = tokio::time::timeout(self.query_timeout, self.fetch_read_only(sql))
            .await
            .map_err(|_| {
                AppError::query(format!(
                    "Query timed out after {} seconds",
                    self.query_timeout.as_secs()
                ))
            })?
            .map_err(|e| AppError::query(format_query_error(e)))?;

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

fn convert_row(row: &PgRow) -> Vec<Value> {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| convert_value(row, i, col.type_info().name()))
        .collect()
}

/// Decodes one column by its PostgreSQL type name.
fn convert_value(row: &PgRow, index: usize, type_name: &str) -> Value {
    match type_name.to_uppercase().as_str() {
        "BOOL" | "BOOLEAN" => decode::<bool>(row, index).into(),
        "INT2" | "SMALLINT" => decode::<i16>(row, index).map(i64::from).into(),
        "INT4" | "INT" | "INTEGER" => decode::<i32>(row, index).map(i64::from).into(),
        "INT8" | "BIGINT" => decode::<i64>(row, index).into(),
        "FLOAT4" | "REAL" => decode::<f32>(row, index).map(f64::from).into(),
        "FLOAT8" | "DOUBLE PRECISION" => decode::<f64>(row, index).into(),
        // Revenue and cost columns are NUMERIC; aggregates over them too.
        "NUMERIC" | "DECIMAL" => decode::<Decimal>(row, index)
            .and_then(|d| d.to_f64())
            .into(),
        "DATE" => decode::<chrono::NaiveDate>(row, index)
            .map(|d| d.to_string())
            .into(),
        "TIMESTAMP" => decode::<chrono::NaiveDateTime>(row, index)
            .map(|t| t.to_string())
            .into(),
        "TIMESTAMPTZ" => decode::<chrono::DateTime<chrono::Utc>>(row, index)
            .map(|t| t.to_rfc3339())
            .into(),
        _ => decode::<String>(row, index).into(),
    }
}

fn decode<'r, T>(row: &'r PgRow, index: usize) -> Option<T>
where
    T: sqlx::Decode<'r, sqlx::Postgres> + sqlx::Type<sqlx::Postgres>,
{
    match row.try_get::<Option<T>, _>(index) {
        Ok(value) => value,
        Err(e) => {
            debug!(column = index, error = %e, "Could not decode column, reading it as NULL");
            None
        }
    }
}

/// Determines if an error is transient and worth retrying.
fn is_transient_error(error: &sqlx::Error) -> bool {
    let error_str = error.to_string().to_lowercase();

    if error_str.contains("password authentication failed")
        || error_str.contains("authentication failed")
        || error_str.contains("does not exist")
    {
        return false;
    }

    error_str.contains("connection refused")
        || error_str.contains("timed out")
        || error_str.contains("timeout")
        || error_str.contains("temporarily unavailable")
        || error_str.contains("connection reset")
        || error_str.contains("broken pipe")
}

/// Maps sqlx connection errors to messages that never echo the password.
fn map_connection_error(error: sqlx::Error, url: &str) -> AppError {
    let (host, port, database) = match Url::parse(url) {
        Ok(parsed) => (
            parsed.host_str().unwrap_or("localhost").to_string(),
            parsed.port().unwrap_or(5432),
            parsed.path().trim_start_matches('/').to_string(),
        ),
        Err(_) => ("localhost".to_string(), 5432, String::new()),
    };

    let error_str = error.to_string().to_lowercase();

    if error_str.contains("connection refused") || error_str.contains("could not connect") {
        AppError::connection(format!(
            "Cannot connect to {host}:{port}. Check that the server is running."
        ))
    } else if error_str.contains("authentication failed") {
        AppError::connection("Database authentication failed. Check your credentials.")
    } else if error_str.contains("does not exist") && error_str.contains("database") {
        AppError::connection(format!("Database '{database}' does not exist."))
    } else if error_str.contains("timed out") || error_str.contains("timeout") {
        AppError::connection(format!("Connection to {host}:{port} timed out."))
    } else {
        AppError::connection(format!("Failed to connect to {host}:{port}: {error}"))
    }
}

/// Formats a query error. The database message comes first so that its first
/// line is a usable summary.
fn format_query_error(error: sqlx::Error) -> String {
    let Some(db_error) = error.as_database_error() else {
        return error.to_string();
    };

    let mut result = format!("ERROR: {}", db_error.message());
    if let Some(pg_error) = db_error.try_downcast_ref::<sqlx::postgres::PgDatabaseError>() {
        if let Some(detail) = pg_error.detail() {
            result.push_str("\n  DETAIL: ");
            result.push_str(detail);
        }
        if let Some(hint) = pg_error.hint() {
            result.push_str("\n  HINT: ");
            result.push_str(hint);
        }
    }
    result
}
