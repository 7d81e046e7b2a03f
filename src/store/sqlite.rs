//! SQLite-backed sample store.

use super::{migrations, StorageError};
use crate::core::{DiskPartition, MetricsStore, Sample};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow,
    SqliteSynchronous,
};
use sqlx::Row;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, instrument};

const SAMPLE_COLUMNS: &str = "id, timestamp_ms, cpu_percent, cpu_per_core, memory_percent, \
                              disk_percent, disk_details, net_sent, net_recv";

/// A [`MetricsStore`] persisting samples to a single SQLite file.
///
/// The database runs in WAL mode so API reads proceed while the collector
/// writes.
#[derive(Clone, Debug)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Opens (creating if missing) the database at `db_path` and runs migrations.
    #[instrument(skip(db_path))]
    pub async fn open(db_path: impl AsRef<Path>, max_connections: u32) -> Result<Self, StorageError> {
        let db_path = db_path.as_ref();
        info!("Opening sample store at {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await?;

        let store = Self { pool };
        migrations::run(&store.pool).await?;
        info!("Sample store ready");
        Ok(store)
    }

    /// Creates a store backed by a private in-memory database.
    ///
    /// The pool is pinned to a single connection that is never recycled,
    /// since every SQLite in-memory connection is its own database.
    pub async fn in_memory() -> Result<Self, StorageError> {
        let options = SqliteConnectOptions::new().in_memory(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        migrations::run(&store.pool).await?;
        Ok(store)
    }

    /// Number of rows currently stored.
    pub async fn count(&self) -> Result<u64, StorageError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM samples")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Closes the pool, waiting for in-flight queries to finish.
    pub async fn close(&self) {
        self.pool.close().await;
    }

    fn row_to_sample(row: &SqliteRow) -> Result<Sample, StorageError> {
        let id: i64 = row.try_get("id")?;
        let timestamp_ms: i64 = row.try_get("timestamp_ms")?;
        let timestamp = DateTime::<Utc>::from_timestamp_millis(timestamp_ms).ok_or_else(|| {
            StorageError::CorruptRow {
                id,
                reason: format!("timestamp {} out of range", timestamp_ms),
            }
        })?;

        let cpu_per_core: Vec<f64> = serde_json::from_str(row.try_get::<&str, _>("cpu_per_core")?)?;
        let disk_details: Vec<DiskPartition> =
            serde_json::from_str(row.try_get::<&str, _>("disk_details")?)?;

        Ok(Sample {
            timestamp,
            cpu_percent: row.try_get("cpu_percent")?,
            cpu_per_core,
            memory_percent: row.try_get("memory_percent")?,
            disk_percent: row.try_get("disk_percent")?,
            net_sent: row.try_get::<Option<i64>, _>("net_sent")?.map(|v| v.max(0) as u64),
            net_recv: row.try_get::<Option<i64>, _>("net_recv")?.map(|v| v.max(0) as u64),
            disk_details,
        })
    }
}

fn counter_to_sql(value: Option<u64>) -> Option<i64> {
    value.map(|v| i64::try_from(v).unwrap_or(i64::MAX))
}

#[async_trait]
impl MetricsStore for SqliteStore {
    #[instrument(skip(self, sample), fields(timestamp = %sample.timestamp))]
    async fn append(&self, sample: &Sample) -> Result<(), StorageError> {
        sample.validate().map_err(StorageError::InvalidSample)?;

        let cpu_per_core = serde_json::to_string(&sample.cpu_per_core)?;
        let disk_details = serde_json::to_string(&sample.disk_details)?;

        sqlx::query(
            r#"
            INSERT INTO samples (timestamp_ms, cpu_percent, cpu_per_core, memory_percent,
                                 disk_percent, disk_details, net_sent, net_recv)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(sample.timestamp.timestamp_millis())
        .bind(sample.cpu_percent)
        .bind(cpu_per_core)
        .bind(sample.memory_percent)
        .bind(sample.disk_percent)
        .bind(disk_details)
        .bind(counter_to_sql(sample.net_sent))
        .bind(counter_to_sql(sample.net_recv))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn query_range(&self, since: DateTime<Utc>) -> Result<Vec<Sample>, StorageError> {
        let sql = format!(
            "SELECT {} FROM samples WHERE timestamp_ms >= ? ORDER BY timestamp_ms ASC, id ASC",
            SAMPLE_COLUMNS
        );
        let rows = sqlx::query(&sql)
            .bind(since.timestamp_millis())
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(Self::row_to_sample).collect()
    }

    #[instrument(skip(self))]
    async fn latest(&self) -> Result<Option<Sample>, StorageError> {
        let sql = format!(
            "SELECT {} FROM samples ORDER BY timestamp_ms DESC, id DESC LIMIT 1",
            SAMPLE_COLUMNS
        );
        let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
        row.as_ref().map(Self::row_to_sample).transpose()
    }

    #[instrument(skip(self))]
    async fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<u64, StorageError> {
        let result = sqlx::query("DELETE FROM samples WHERE timestamp_ms < ?")
            .bind(cutoff.timestamp_millis())
            .execute(&self.pool)
            .await?;

        let deleted = result.rows_affected();
        if deleted > 0 {
            debug!(deleted, %cutoff, "Purged expired samples");
        }
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn sample_at(timestamp: DateTime<Utc>, cpu: f64) -> Sample {
        Sample {
            cpu_percent: Some(cpu),
            memory_percent: Some(50.0),
            net_sent: Some(u64::MAX),
            net_recv: None,
            disk_details: vec![DiskPartition::from_space("/", "/dev/sda1", 100, 40).unwrap()],
            disk_percent: Some(60.0),
            ..Sample::empty(timestamp)
        }
    }

    #[tokio::test]
    async fn test_latest_is_none_on_empty_store() {
        let store = SqliteStore::in_memory().await.unwrap();
        assert!(store.latest().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_columns_survive_a_write() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = DateTime::<Utc>::from_timestamp_millis(Utc::now().timestamp_millis()).unwrap();
        let sample = sample_at(now, 12.5);
        store.append(&sample).await.unwrap();

        let stored = store.latest().await.unwrap().unwrap();
        assert_eq!(stored.timestamp, now);
        assert_eq!(stored.cpu_percent, Some(12.5));
        assert_eq!(stored.net_sent, Some(i64::MAX as u64), "counters saturate at i64::MAX");
        assert_eq!(stored.net_recv, None);
        assert_eq!(stored.disk_details, sample.disk_details);
    }

    #[tokio::test]
    async fn test_invalid_sample_is_rejected() {
        let store = SqliteStore::in_memory().await.unwrap();
        let sample = sample_at(Utc::now(), 140.0);
        let err = store.append(&sample).await.unwrap_err();
        assert!(matches!(err, StorageError::InvalidSample(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_latest_prefers_newest_timestamp() {
        let store = SqliteStore::in_memory().await.unwrap();
        let now = Utc::now();
        store.append(&sample_at(now, 1.0)).await.unwrap();
        store.append(&sample_at(now - ChronoDuration::minutes(5), 2.0)).await.unwrap();

        let latest = store.latest().await.unwrap().unwrap();
        assert_eq!(latest.cpu_percent, Some(1.0));
    }
}
