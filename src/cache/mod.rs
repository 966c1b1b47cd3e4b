//! Fingerprint-keyed result cache.
//!
//! Answers are stored in a local SQLite database, one row per fingerprint.
//! Reads count as accesses: `get` bumps `access_count` and refreshes
//! `last_accessed`. Writes upsert, so a fingerprint never has two rows.

mod migrations;

use crate::config::CacheConfig;
use crate::db::ResultSet;
use crate::error::{AppError, Result};
use crate::fingerprint::Fingerprint;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::FromRow;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info, warn};

const MAX_RETRY_ATTEMPTS: u32 = 3;
const RETRY_DELAY_MS: u64 = 100;

/// Number of questions listed in [`CacheStats::top_questions`].
const TOP_QUESTIONS: i64 = 5;

/// A cached answer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CacheEntry {
    pub fingerprint: Fingerprint,
    pub question: String,
    pub sql: String,
    pub rows: ResultSet,
    pub row_count: usize,
    pub created_at: DateTime<Utc>,
    pub last_accessed: DateTime<Utc>,
    pub access_count: i64,
}

#[derive(Debug, Clone, FromRow)]
struct CacheEntryRow {
    fingerprint: String,
    question: String,
    sql_text: String,
    result_data: String,
    row_count: i64,
    created_at: String,
    last_accessed: String,
    access_count: i64,
}

impl TryFrom<CacheEntryRow> for CacheEntry {
    type Error = AppError;

    fn try_from(row: CacheEntryRow) -> Result<Self> {
        let rows: ResultSet = serde_json::from_str(&row.result_data).map_err(|e| {
            AppError::persistence(format!("Corrupt cached result for {}: {e}", row.fingerprint))
        })?;

        Ok(Self {
            fingerprint: Fingerprint::from_hex(row.fingerprint),
            question: row.question,
            sql: row.sql_text,
            rows,
            row_count: usize::try_from(row.row_count).unwrap_or(0),
            created_at: parse_timestamp(&row.created_at)?,
            last_accessed: parse_timestamp(&row.last_accessed)?,
            access_count: row.access_count,
        })
    }
}

/// Eviction limits. The default keeps entries indefinitely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CachePolicy {
    /// Keep at most this many entries, newest `last_accessed` first.
    pub max_entries: Option<u64>,

    /// Drop entries whose `last_accessed` is older than this.
    pub max_age: Option<chrono::Duration>,
}

impl CachePolicy {
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            max_entries: config.max_entries,
            max_age: config
                .max_age_days
                .and_then(|days| i64::try_from(days).ok())
                .map(chrono::Duration::days),
        }
    }

    /// True when no limit is configured.
    pub fn is_unbounded(&self) -> bool {
        self.max_entries.is_none() && self.max_age.is_none()
    }
}

/// Aggregate figures for `cache stats`.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: i64,
    pub total_accesses: i64,
    /// Most-accessed questions with their access counts.
    pub top_questions: Vec<(String, i64)>,
}

/// SQLite-backed result cache.
#[derive(Debug, Clone)]
pub struct ResultCache {
    pool: SqlitePool,
    policy: CachePolicy,
}

impl ResultCache {
    /// Opens or creates the cache database at `path`.
    ///
    /// A database that fails to open is moved aside to `<path>.bak` and a
    /// fresh one is created; losing cached answers is always recoverable.
    pub async fn open(path: &Path, policy: CachePolicy) -> Result<Self> {
        ensure_parent_dirs(path)?;

        match Self::try_open(path, policy).await {
            Ok(cache) => Ok(cache),
            Err(e) => {
                warn!("Failed to open cache database: {e}. Attempting recovery...");
                Self::attempt_recovery(path, policy).await
            }
        }
    }

    /// Opens the cache described by `config`.
    pub async fn from_config(config: &CacheConfig) -> Result<Self> {
        Self::open(&config.resolved_path(), CachePolicy::from_config(config)).await
    }

    /// Creates a private in-memory cache.
    pub async fn in_memory(policy: CachePolicy) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| AppError::persistence(format!("Failed to open in-memory cache: {e}")))?;

        migrations::run_migrations(&pool).await?;
        Ok(Self { pool, policy })
    }

    async fn try_open(path: &Path, policy: CachePolicy) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRY_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_millis(RETRY_DELAY_MS * 2u64.pow(attempt)))
                    .await;
            }

            match connect(path).await {
                Ok(pool) => {
                    migrations::run_migrations(&pool).await?;
                    info!("Cache database opened at {}", path.display());
                    return Ok(Self { pool, policy });
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(last_error
            .unwrap_or_else(|| AppError::persistence("Failed to open cache after retries")))
    }

    async fn attempt_recovery(path: &Path, policy: CachePolicy) -> Result<Self> {
        let backup_path = path.with_extension("db.bak");

        if path.exists() {
            std::fs::rename(path, &backup_path).map_err(|e| {
                AppError::persistence(format!(
                    "Failed to backup corrupted cache to {}: {e}",
                    backup_path.display()
                ))
            })?;
            warn!("Backed up corrupted cache to {}", backup_path.display());
        }

        Self::try_open(path, policy).await.map_err(|e| {
            AppError::persistence(format!("Failed to recreate cache after backup: {e}"))
        })
    }

    pub fn policy(&self) -> CachePolicy {
        self.policy
    }

    /// Looks up `fingerprint`, counting the lookup as an access.
    pub async fn get(&self, fingerprint: &Fingerprint) -> Result<Option<CacheEntry>> {
        let row: Option<CacheEntryRow> = sqlx::query_as(
            r#"
            UPDATE query_cache
            SET access_count = access_count + 1,
                last_accessed = ?
            WHERE fingerprint = ?
            RETURNING fingerprint, question, sql_text, result_data, row_count,
                      created_at, last_accessed, access_count
            "#,
        )
        .bind(timestamp(Utc::now()))
        .bind(fingerprint.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| AppError::persistence(format!("Failed to read cache entry: {e}")))?;

        match row {
            Some(row) => {
                let entry = CacheEntry::try_from(row)?;
                debug!(
                    fingerprint = %fingerprint.short(),
                    access_count = entry.access_count,
                    "Cache hit"
                );
                Ok(Some(entry))
            }
            None => {
                debug!(fingerprint = %fingerprint.short(), "Cache miss");
                Ok(None)
            }
        }
    }

    /// Stores an answer, replacing any entry for the same fingerprint.
    ///
    /// Replacing keeps `question` and `created_at`, swaps in the new
    /// sql/rows/count, refreshes `last_accessed` and bumps `access_count`.
    pub async fn put(
        &self,
        fingerprint: &Fingerprint,
        question: &str,
        sql: &str,
        rows: &ResultSet,
        row_count: usize,
    ) -> Result<()> {
        let result_data = serde_json::to_string(rows)
            .map_err(|e| AppError::persistence(format!("Failed to encode result rows: {e}")))?;
        let now = timestamp(Utc::now());

        sqlx::query(
            r#"
            INSERT INTO query_cache
                (fingerprint, question, sql_text, result_data, row_count,
                 created_at, last_accessed, access_count)
            VALUES (?, ?, ?, ?, ?, ?, ?, 1)
            ON CONFLICT(fingerprint) DO UPDATE SET
                sql_text = excluded.sql_text,
                result_data = excluded.result_data,
                row_count = excluded.row_count,
                last_accessed = excluded.last_accessed,
                access_count = query_cache.access_count + 1
            "#,
        )
        .bind(fingerprint.as_str())
        .bind(question)
        .bind(sql)
        .bind(result_data)
        .bind(i64::try_from(row_count).unwrap_or(i64::MAX))
        .bind(&now)
        .bind(&now)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::persistence(format!("Failed to write cache entry: {e}")))?;

        debug!(fingerprint = %fingerprint.short(), row_count, "Cached result");

        if !self.policy.is_unbounded() {
            self.prune().await?;
        }
        Ok(())
    }

    /// Applies the configured eviction policy. Returns the number of entries
    /// removed.
    pub async fn prune(&self) -> Result<u64> {
        self.prune_with(&self.policy).await
    }

    /// Applies `policy`. Age runs first, then the entry cap.
    pub async fn prune_with(&self, policy: &CachePolicy) -> Result<u64> {
        let mut removed = 0;

        if let Some(max_age) = policy.max_age {
            let cutoff = timestamp(Utc::now() - max_age);
            removed += sqlx::query("DELETE FROM query_cache WHERE last_accessed < ?")
                .bind(cutoff)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::persistence(format!("Failed to prune old entries: {e}")))?
                .rows_affected();
        }

        if let Some(max_entries) = policy.max_entries {
            removed += sqlx::query(
                r#"
                DELETE FROM query_cache
                WHERE fingerprint NOT IN (
                    SELECT fingerprint FROM query_cache
                    ORDER BY last_accessed DESC
                    LIMIT ?
                )
                "#,
            )
            .bind(i64::try_from(max_entries).unwrap_or(i64::MAX))
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::persistence(format!("Failed to prune excess entries: {e}")))?
            .rows_affected();
        }

        if removed > 0 {
            info!(removed, "Pruned cache entries");
        }
        Ok(removed)
    }

    /// Removes every entry. Returns the number removed.
    pub async fn clear(&self) -> Result<u64> {
        let result = sqlx::query("DELETE FROM query_cache")
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::persistence(format!("Failed to clear cache: {e}")))?;
        Ok(result.rows_affected())
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let (entries, total_accesses): (i64, Option<i64>) =
            sqlx::query_as("SELECT COUNT(*), SUM(access_count) FROM query_cache")
                .fetch_one(&self.pool)
                .await
                .map_err(|e| AppError::persistence(format!("Failed to read cache stats: {e}")))?;

        let top_questions: Vec<(String, i64)> = sqlx::query_as(
            r#"
            SELECT question, access_count FROM query_cache
            ORDER BY access_count DESC, last_accessed DESC
            LIMIT ?
            "#,
        )
        .bind(TOP_QUESTIONS)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::persistence(format!("Failed to read top questions: {e}")))?;

        Ok(CacheStats {
            entries,
            total_accesses: total_accesses.unwrap_or(0),
            top_questions,
        })
    }

    /// Closes the database connection pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

async fn connect(path: &Path) -> Result<SqlitePool> {
    let conn_str = format!("sqlite:{}?mode=rwc", path.display());
    let options = SqliteConnectOptions::from_str(&conn_str)
        .map_err(|e| AppError::persistence(format!("Invalid cache path: {e}")))?
        .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5))
        .create_if_missing(true);

    SqlitePoolOptions::new()
        .max_connections(1)
        .acquire_timeout(Duration::from_secs(10))
        .connect_with(options)
        .await
        .map_err(|e| AppError::persistence(format!("Failed to connect to cache database: {e}")))
}

fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            AppError::persistence(format!(
                "Failed to create cache directory {}: {e}",
                parent.display()
            ))
        })?;
    }
    Ok(())
}

/// Fixed-width UTC timestamps, so text order is time order.
fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| AppError::persistence(format!("Invalid cache timestamp '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Value;
    use tempfile::tempdir;

    fn rows() -> ResultSet {
        ResultSet::from_rows(
            ["app_name", "total_installs"],
            [
                vec![Value::from("TikTok"), Value::Int(1500)],
                vec![Value::from("Zoom"), Value::Int(900)],
                vec![Value::from("Uber"), Value::Null],
            ],
        )
    }

    async fn cache() -> ResultCache {
        ResultCache::in_memory(CachePolicy::default()).await.unwrap()
    }

    async fn backdate(cache: &ResultCache, fingerprint: &Fingerprint, days: i64) {
        sqlx::query("UPDATE query_cache SET last_accessed = ? WHERE fingerprint = ?")
            .bind(timestamp(Utc::now() - chrono::Duration::days(days)))
            .bind(fingerprint.as_str())
            .execute(&cache.pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_round_trip() {
        let cache = cache().await;
        let fp = Fingerprint::of("Top apps by installs");
        let sql = "SELECT app_name, SUM(installs) AS total_installs FROM app_metrics GROUP BY app_name;";

        cache
            .put(&fp, "Top apps by installs", sql, &rows(), 3)
            .await
            .unwrap();

        let first = cache.get(&fp).await.unwrap().unwrap();
        assert_eq!(first.sql, sql);
        assert_eq!(first.rows, rows());
        assert_eq!(first.row_count, 3);
        assert_eq!(first.question, "Top apps by installs");

        let second = cache.get(&fp).await.unwrap().unwrap();
        assert_eq!(second.access_count, first.access_count + 1);
        assert!(second.last_accessed >= first.last_accessed);
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let cache = cache().await;
        assert!(cache
            .get(&Fingerprint::of("never asked"))
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_put_upserts_in_place() {
        let cache = cache().await;
        let fp = Fingerprint::of("how many apps?");

        cache
            .put(&fp, "How many apps?", "SELECT 1 FROM app_metrics;", &rows(), 3)
            .await
            .unwrap();
        let replacement = rows().truncated(1);
        cache
            .put(&fp, "how many apps?", "SELECT 2 FROM app_metrics;", &replacement, 1)
            .await
            .unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entries, 1);

        let entry = cache.get(&fp).await.unwrap().unwrap();
        assert_eq!(entry.sql, "SELECT 2 FROM app_metrics;");
        assert_eq!(entry.rows, replacement);
        assert_eq!(entry.row_count, 1);
        // First question text is kept.
        assert_eq!(entry.question, "How many apps?");
        // insert = 1, upsert = 2, get = 3
        assert_eq!(entry.access_count, 3);
    }

    #[tokio::test]
    async fn test_new_entry_starts_at_one_access() {
        let cache = cache().await;
        let fp = Fingerprint::of("q");
        cache.put(&fp, "q", "SELECT 1 FROM app_metrics;", &rows(), 3).await.unwrap();

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.total_accesses, 1);
        assert_eq!(stats.top_questions, vec![("q".to_string(), 1)]);
    }

    #[tokio::test]
    async fn test_clear() {
        let cache = cache().await;
        for q in ["a", "b", "c"] {
            cache
                .put(&Fingerprint::of(q), q, "SELECT 1 FROM app_metrics;", &rows(), 3)
                .await
                .unwrap();
        }
        assert_eq!(cache.clear().await.unwrap(), 3);
        assert_eq!(cache.stats().await.unwrap(), CacheStats::default());
    }

    #[tokio::test]
    async fn test_prune_by_age() {
        let cache = cache().await;
        let old = Fingerprint::of("old question");
        let fresh = Fingerprint::of("fresh question");
        cache.put(&old, "old question", "SELECT 1 FROM app_metrics;", &rows(), 3).await.unwrap();
        cache.put(&fresh, "fresh question", "SELECT 1 FROM app_metrics;", &rows(), 3).await.unwrap();
        backdate(&cache, &old, 30).await;

        let policy = CachePolicy {
            max_age: Some(chrono::Duration::days(7)),
            ..Default::default()
        };
        assert_eq!(cache.prune_with(&policy).await.unwrap(), 1);
        assert!(cache.get(&old).await.unwrap().is_none());
        assert!(cache.get(&fresh).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_put_enforces_entry_cap() {
        let policy = CachePolicy {
            max_entries: Some(2),
            ..Default::default()
        };
        let cache = ResultCache::in_memory(policy).await.unwrap();

        let oldest = Fingerprint::of("first");
        cache.put(&oldest, "first", "SELECT 1 FROM app_metrics;", &rows(), 3).await.unwrap();
        backdate(&cache, &oldest, 1).await;
        cache.put(&Fingerprint::of("second"), "second", "SELECT 1 FROM app_metrics;", &rows(), 3).await.unwrap();
        cache.put(&Fingerprint::of("third"), "third", "SELECT 1 FROM app_metrics;", &rows(), 3).await.unwrap();

        assert_eq!(cache.stats().await.unwrap().entries, 2);
        assert!(cache.get(&oldest).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unbounded_policy_never_prunes() {
        let cache = cache().await;
        let fp = Fingerprint::of("ancient");
        cache.put(&fp, "ancient", "SELECT 1 FROM app_metrics;", &rows(), 3).await.unwrap();
        backdate(&cache, &fp, 3650).await;

        assert_eq!(cache.prune().await.unwrap(), 0);
        assert!(cache.get(&fp).await.unwrap().is_some());
    }

    #[test]
    fn test_policy_from_config() {
        let config = CacheConfig {
            max_entries: Some(100),
            max_age_days: Some(7),
            ..Default::default()
        };
        let policy = CachePolicy::from_config(&config);
        assert_eq!(policy.max_entries, Some(100));
        assert_eq!(policy.max_age, Some(chrono::Duration::days(7)));
        assert!(!policy.is_unbounded());
        assert!(CachePolicy::from_config(&CacheConfig::default()).is_unbounded());
    }

    #[tokio::test]
    async fn test_open_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.db");

        let cache = ResultCache::open(&path, CachePolicy::default()).await.unwrap();
        assert!(path.exists());
        cache.close().await;
    }

    #[tokio::test]
    async fn test_entries_survive_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.db");
        let fp = Fingerprint::of("persisted");

        let cache = ResultCache::open(&path, CachePolicy::default()).await.unwrap();
        cache.put(&fp, "persisted", "SELECT 1 FROM app_metrics;", &rows(), 3).await.unwrap();
        cache.close().await;

        let reopened = ResultCache::open(&path, CachePolicy::default()).await.unwrap();
        let entry = reopened.get(&fp).await.unwrap().unwrap();
        assert_eq!(entry.rows, rows());
        reopened.close().await;
    }

    #[tokio::test]
    async fn test_corrupt_file_is_recovered() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cache.db");
        std::fs::write(&path, b"definitely not a sqlite database").unwrap();

        let cache = ResultCache::open(&path, CachePolicy::default()).await.unwrap();
        assert!(path.with_extension("db.bak").exists());
        assert_eq!(cache.stats().await.unwrap().entries, 0);
        cache.close().await;
    }
}
