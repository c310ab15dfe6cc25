//! The storage engine: a pooled SQLite connection plus the paper
//! repository built on top of it.
//!
//! `Database` follows a standard `sqlx` pooled-connection setup: WAL +
//! busy-timeout pragmas, a `new()`/`new_in_memory()` pair, and
//! `#[instrument]`ed queries throughout.

mod papers;

pub use papers::{NewPaper, Paper, PaperStore, RollbackResult};

use std::path::Path;

use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::{instrument, warn};

/// Current schema version. Fresh databases are created directly at this
/// version; see DESIGN.md Open Question 2 (v5 shape, no `paper_id` column).
/// Recorded into `schema_version` after every successful migration run so
/// `probe_existing_version` can actually see it on the next open.
pub const CURRENT_VERSION: i64 = 1;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const BUSY_TIMEOUT_MS: u32 = 5000;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database connection error: {0}")]
    Connection(#[from] sqlx::Error),
    #[error("database migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
}

/// A pooled connection to the pipeline's SQLite store (working copy,
/// production store, or backup — all share this wrapper). `read_only` is
/// set when the file's recorded schema version is newer than
/// `CURRENT_VERSION`: writes are never attempted against such a database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
    read_only: bool,
}

impl Database {
    #[instrument(skip_all, fields(path = %path.display()))]
    pub async fn new(path: &Path) -> Result<Self, StorageError> {
        if let Some(found) = probe_existing_version(path).await {
            if found > CURRENT_VERSION {
                warn!(found, supported = CURRENT_VERSION, path = %path.display(), "database schema is newer than supported; opening read-only");
                let db_url = format!("sqlite:{}?mode=ro", path.display());
                let pool = SqlitePoolOptions::new().max_connections(1).connect(&db_url).await?;
                return Ok(Self { pool, read_only: true });
            }
        }

        let db_url = format!("sqlite:{}?mode=rwc", path.display());
        let pool = SqlitePoolOptions::new()
            .max_connections(DEFAULT_MAX_CONNECTIONS)
            .connect(&db_url)
            .await?;

        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query(&format!("PRAGMA busy_timeout={BUSY_TIMEOUT_MS}")).execute(&pool).await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        record_schema_version(&pool).await?;
        Ok(Self { pool, read_only: false })
    }

    #[instrument(skip_all)]
    pub async fn new_in_memory() -> Result<Self, StorageError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        record_schema_version(&pool).await?;
        Ok(Self { pool, read_only: false })
    }

    #[must_use]
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// True when this handle was opened read-only because the file's
    /// recorded schema version is newer than this build supports.
    #[must_use]
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    #[instrument(skip_all)]
    pub async fn is_wal_enabled(&self) -> Result<bool, StorageError> {
        let (mode,): (String,) = sqlx::query_as("PRAGMA journal_mode")
            .fetch_one(&self.pool)
            .await?;
        Ok(mode.eq_ignore_ascii_case("wal"))
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Opens a short-lived read-only connection to check the file's recorded
/// schema version, without running migrations against it. Returns `None`
/// for a database that doesn't exist yet or has never recorded a version.
async fn probe_existing_version(path: &Path) -> Option<i64> {
    if !path.is_file() {
        return None;
    }
    let db_url = format!("sqlite:{}?mode=ro", path.display());
    let pool = SqlitePoolOptions::new().max_connections(1).connect(&db_url).await.ok()?;
    let row: Option<(i64,)> =
        sqlx::query_as("SELECT MAX(version) FROM schema_version").fetch_optional(&pool).await.ok().flatten();
    pool.close().await;
    row.map(|(v,)| v)
}

/// Records the current schema version, idempotently, right after
/// migrations run so a later `probe_existing_version` call can see it.
async fn record_schema_version(pool: &SqlitePool) -> Result<(), StorageError> {
    sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?) ON CONFLICT(version) DO NOTHING")
        .bind(CURRENT_VERSION)
        .bind(chrono::Local::now().to_rfc3339())
        .execute(pool)
        .await?;
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_in_memory_runs_migrations() {
        let db = Database::new_in_memory().await.expect("open in-memory db");
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM papers")
            .fetch_one(db.pool())
            .await
            .expect("query papers table");
        assert_eq!(count, 0);
    }

    #[tokio::test]
    async fn new_creates_file_backed_db_with_wal() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("metadata.db");
        let db = Database::new(&path).await.expect("open file db");
        assert!(db.is_wal_enabled().await.expect("check wal"));
        assert!(!db.is_read_only());
    }

    #[tokio::test]
    async fn reopening_records_schema_version() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("metadata.db");
        {
            let db = Database::new(&path).await.expect("open file db");
            db.close().await;
        }
        let version = probe_existing_version(&path).await;
        assert_eq!(version, Some(CURRENT_VERSION));
    }

    #[tokio::test]
    async fn future_schema_version_opens_read_only() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("metadata.db");
        {
            let db = Database::new(&path).await.expect("open file db");
            sqlx::query("INSERT INTO schema_version (version, applied_at) VALUES (?, ?)")
                .bind(CURRENT_VERSION + 1)
                .bind("2099-01-01T00:00:00Z")
                .execute(db.pool())
                .await
                .expect("insert future version");
            db.close().await;
        }

        let db = Database::new(&path).await.expect("reopen file db");
        assert!(db.is_read_only());
    }
}
