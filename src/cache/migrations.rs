//! Schema versioning and migrations for the cache database.
//!
//! Forward-only; each version runs once and is recorded in `schema_versions`.

use crate::error::{AppError, Result};
use sqlx::sqlite::SqlitePool;
use tracing::info;

const CURRENT_VERSION: i32 = 2;

/// Runs all pending migrations on the database.
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    ensure_schema_versions_table(pool).await?;

    let current = get_current_version(pool).await?;

    if current > CURRENT_VERSION {
        return Err(AppError::persistence(format!(
            "Cache schema version ({}) is newer than supported version ({}). \
             Please upgrade appquery or point it at a different cache path.",
            current, CURRENT_VERSION
        )));
    }

    if current < CURRENT_VERSION {
        info!(
            "Migrating cache database from version {} to {}",
            current, CURRENT_VERSION
        );
        run_pending_migrations(pool, current).await?;
    }

    Ok(())
}

async fn ensure_schema_versions_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_versions (
            version INTEGER PRIMARY KEY,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| AppError::persistence(format!("Failed to create schema_versions table: {e}")))?;

    Ok(())
}

async fn get_current_version(pool: &SqlitePool) -> Result<i32> {
    let row: Option<(Option<i32>,)> = sqlx::query_as("SELECT MAX(version) FROM schema_versions")
        .fetch_optional(pool)
        .await
        .map_err(|e| AppError::persistence(format!("Failed to get schema version: {e}")))?;

    Ok(row.and_then(|(v,)| v).unwrap_or(0))
}

async fn run_pending_migrations(pool: &SqlitePool, from_version: i32) -> Result<()> {
    for version in (from_version + 1)..=CURRENT_VERSION {
        run_migration(pool, version).await?;
        record_version(pool, version).await?;
        info!("Applied cache migration v{}", version);
    }
    Ok(())
}

async fn record_version(pool: &SqlitePool, version: i32) -> Result<()> {
    sqlx::query("INSERT INTO schema_versions (version) VALUES (?)")
        .bind(version)
        .execute(pool)
        .await
        .map_err(|e| AppError::persistence(format!("Failed to record migration: {e}")))?;
    Ok(())
}

async fn run_migration(pool: &SqlitePool, version: i32) -> Result<()> {
    match version {
        1 => migration_v1(pool).await,
        2 => migration_v2(pool).await,
        _ => Err(AppError::persistence(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: the result cache table, one row per fingerprint.
async fn migration_v1(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS query_cache (
            fingerprint TEXT PRIMARY KEY,
            question TEXT NOT NULL,
            sql_text TEXT NOT NULL,
            result_data TEXT NOT NULL,
            row_count INTEGER NOT NULL DEFAULT 0,
            created_at TEXT NOT NULL,
            last_accessed TEXT NOT NULL,
            access_count INTEGER NOT NULL DEFAULT 1 CHECK (access_count >= 1)
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| AppError::persistence(format!("Failed to create query_cache table: {e}")))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_query_cache_created_at ON query_cache(created_at)")
        .execute(pool)
        .await
        .map_err(|e| AppError::persistence(format!("Failed to create created_at index: {e}")))?;

    Ok(())
}

/// Migration v2: index `last_accessed` for eviction.
async fn migration_v2(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_query_cache_last_accessed ON query_cache(last_accessed)
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| AppError::persistence(format!("Failed to create last_accessed index: {e}")))?;

    Ok(())
}
