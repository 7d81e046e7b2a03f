//! Persistent storage for collected samples.
//!
//! Samples live in a single SQLite table. The store is append-only apart
//! from the retention sweep, which bulk-deletes rows older than a cutoff.

pub mod migrations;
pub mod sqlite;

use std::time::Duration;
use thiserror::Error;

pub use sqlite::SqliteStore;

/// Samples older than this are removed by the retention sweep.
pub const RETENTION_HORIZON: Duration = Duration::from_secs(7 * 24 * 3600);

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("failed to encode or decode sample column: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid sample: {0}")]
    InvalidSample(String),

    #[error("invalid retention horizon: {0}")]
    InvalidHorizon(String),

    #[error("corrupt row {id}: {reason}")]
    CorruptRow { id: i64, reason: String },

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
