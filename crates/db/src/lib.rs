// crates/db/src/lib.rs
// SQLite-backed store shared by every worker process on a host.

mod kv_store;
mod migrations;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{ConnectOptions, SqlitePool};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, info};

use jobtrail_core::StoreError;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Failed to determine cache directory")]
    NoCacheDir,

    #[error("Failed to create database directory: {0}")]
    CreateDir(#[from] std::io::Error),
}

pub type DbResult<T> = Result<T, DbError>;

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        StoreError::backend(err)
    }
}

/// [`jobtrail_core::KvStore`] over a SQLite connection pool.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteStore {
    /// Open (or create) the store at the given path and run migrations.
    pub async fn new(path: &Path) -> DbResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30))
            .log_slow_statements(
                tracing::log::LevelFilter::Warn,
                std::time::Duration::from_secs(5),
            );

        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        let store = Self {
            pool,
            db_path: path.to_owned(),
        };
        store.run_migrations().await?;

        info!("Job history store opened at {}", path.display());
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    ///
    /// A single connection: shared-cache table locks are not covered by
    /// `busy_timeout`, and one connection keeps the database alive.
    pub async fn new_in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .shared_cache(true)
            .busy_timeout(std::time::Duration::from_secs(5));
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .connect_with(options)
            .await?;
        let store = Self {
            pool,
            db_path: PathBuf::new(),
        };
        store.run_migrations().await?;
        Ok(store)
    }

    /// Open the store at the default location: `~/.cache/jobtrail/jobtrail.db`
    pub async fn open_default() -> DbResult<Self> {
        let path = default_db_path()?;
        Self::new(&path).await
    }

    /// Run all inline migrations not yet recorded in `_migrations`.
    async fn run_migrations(&self) -> DbResult<()> {
        sqlx::query("CREATE TABLE IF NOT EXISTS _migrations (version INTEGER PRIMARY KEY)")
            .execute(&self.pool)
            .await?;

        let row: (i64,) = sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM _migrations")
            .fetch_one(&self.pool)
            .await?;
        let current_version = row.0 as usize;

        for (i, migration) in migrations::MIGRATIONS.iter().enumerate() {
            let version = i + 1;
            if version > current_version {
                sqlx::query(migration).execute(&self.pool).await?;
                sqlx::query("INSERT INTO _migrations (version) VALUES (?)")
                    .bind(version as i64)
                    .execute(&self.pool)
                    .await?;
                debug!(version, "Applied migration");
            }
        }
        Ok(())
    }

    /// Delete every key whose expiry has passed. Reads already skip them;
    /// this reclaims the rows. Returns how many keys were removed.
    pub async fn purge_expired(&self) -> DbResult<u64> {
        let now = kv_store::now_ms();
        let mut tx = self.pool.begin().await?;
        let expired: Vec<(String,)> = sqlx::query_as(
            "DELETE FROM kv_keys WHERE expires_at IS NOT NULL AND expires_at <= ? RETURNING key",
        )
        .bind(now)
        .fetch_all(&mut *tx)
        .await?;
        for (key,) in &expired {
            kv_store::delete_values(&mut *tx, key).await?;
        }
        tx.commit().await?;
        if !expired.is_empty() {
            info!(count = expired.len(), "Purged expired keys");
        }
        Ok(expired.len() as u64)
    }

    /// Get a reference to the underlying connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Get the path to the database file.
    /// Returns an empty path for in-memory stores.
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }
}

/// Returns the default database path: `~/.cache/jobtrail/jobtrail.db`
pub fn default_db_path() -> DbResult<PathBuf> {
    dirs::cache_dir()
        .map(|dir| dir.join("jobtrail").join("jobtrail.db"))
        .ok_or(DbError::NoCacheDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_runs_migrations() {
        let store = SqliteStore::new_in_memory().await.unwrap();
        let (version,): (i64,) = sqlx::query_as("SELECT MAX(version) FROM _migrations")
            .fetch_one(store.pool())
            .await
            .unwrap();
        assert_eq!(version as usize, migrations::MIGRATIONS.len());
        assert_eq!(store.db_path(), Path::new(""));
    }

    #[tokio::test]
    async fn test_reopen_skips_applied_migrations() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("history.db");

        let first = SqliteStore::new(&path).await.unwrap();
        first.pool().close().await;

        let second = SqliteStore::new(&path).await.unwrap();
        let (rows,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM _migrations")
            .fetch_one(second.pool())
            .await
            .unwrap();
        assert_eq!(rows as usize, migrations::MIGRATIONS.len());
        assert_eq!(second.db_path(), path.as_path());
    }

    #[test]
    fn test_default_db_path_layout() {
        if let Ok(path) = default_db_path() {
            assert!(path.ends_with("jobtrail/jobtrail.db"));
        }
    }
}
