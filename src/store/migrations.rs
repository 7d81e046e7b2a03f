//! Database migrations.

use super::StorageError;
use sqlx::SqlitePool;
use tracing::{info, instrument};

const SCHEMA_VERSION: i64 = 1;

#[instrument(skip(pool))]
pub async fn run(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| StorageError::Migration(e.to_string()))?;

    let current_version: Option<i64> =
        sqlx::query_scalar("SELECT version FROM schema_version LIMIT 1")
            .fetch_optional(pool)
            .await
            .map_err(|e| StorageError::Migration(e.to_string()))?;
    let current_version = current_version.unwrap_or(0);

    if current_version >= SCHEMA_VERSION {
        info!("Database schema is up to date (version {})", current_version);
        return Ok(());
    }

    info!("Migrating database from version {} to {}", current_version, SCHEMA_VERSION);

    if current_version < 1 {
        migrate_to_v1(pool).await?;
    }

    let mut tx = pool.begin().await?;
    sqlx::query("DELETE FROM schema_version").execute(&mut *tx).await?;
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(SCHEMA_VERSION)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    Ok(())
}

/// Creates the samples table and its timestamp index.
async fn migrate_to_v1(pool: &SqlitePool) -> Result<(), StorageError> {
    info!("Applying migration v1: samples table");

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS samples (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            timestamp_ms INTEGER NOT NULL,
            cpu_percent REAL,
            cpu_per_core TEXT NOT NULL DEFAULT '[]',
            memory_percent REAL,
            disk_percent REAL,
            disk_details TEXT NOT NULL DEFAULT '[]',
            net_sent INTEGER,
            net_recv INTEGER
        )
        "#,
    )
    .execute(pool)
    .await
    .map_err(|e| StorageError::Migration(e.to_string()))?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_samples_timestamp ON samples(timestamp_ms)")
        .execute(pool)
        .await
        .map_err(|e| StorageError::Migration(e.to_string()))?;

    Ok(())
}
