//! # SQLite Backend
//!
//! Durable [`CacheBackend`] so that the pending-operation queue survives an
//! app relaunch.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Durable Cache Storage                              │
//! │                                                                         │
//! │  SqliteConfig::new(path) ← Configure pool settings                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SqliteBackend::open(config).await ← Create pool + run migrations      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌───────────────────────────────────────────────────────────────┐     │
//! │  │  cache_entries                                                │     │
//! │  │  key (PK)                 │ value (BLOB) │ stored_at_ms       │     │
//! │  │  ─────────────────────────┼──────────────┼──────────────────  │     │
//! │  │  pending_sync_operations  │ [{…},{…}]    │ 1772356364000      │     │
//! │  │  aisles:list              │ [{…}]        │ 1772356301512      │     │
//! │  └───────────────────────────────────────────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## WAL Mode
//! File databases use WAL journaling with NORMAL synchronous: readers don't
//! block the writer, and a crash can lose at most the last transaction, never
//! corrupt the file.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::{debug, info};

use crate::backend::{CacheBackend, CacheEntry};
use crate::error::{CacheError, CacheResult};
use crate::migrations;

// =============================================================================
// Configuration
// =============================================================================

/// SQLite backend configuration.
///
/// ## Example
/// ```rust,ignore
/// let config = SqliteConfig::new("/path/to/medstock-cache.db").max_connections(2);
/// ```
#[derive(Debug, Clone)]
pub struct SqliteConfig {
    /// Path to the SQLite database file. `None` means in-memory.
    pub database_path: Option<PathBuf>,

    /// Maximum number of connections in the pool.
    /// Default: 4 (cache traffic is light and mostly serialized)
    pub max_connections: u32,

    /// Minimum number of connections to keep alive.
    pub min_connections: u32,

    /// Time to wait for a pooled connection.
    pub connect_timeout: Duration,

    /// Idle timeout before closing a connection. `None` keeps connections open.
    pub idle_timeout: Option<Duration>,

    /// Whether to run migrations on open.
    pub run_migrations: bool,
}

impl SqliteConfig {
    /// Creates a configuration for a database file (created if missing).
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SqliteConfig {
            database_path: Some(path.into()),
            max_connections: 4,
            min_connections: 1,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Some(Duration::from_secs(600)),
            run_migrations: true,
        }
    }

    /// Creates an in-memory configuration (for testing).
    ///
    /// A single connection that never idles out: an in-memory SQLite database
    /// lives exactly as long as its connection.
    pub fn in_memory() -> Self {
        SqliteConfig {
            database_path: None,
            max_connections: 1,
            min_connections: 1,
            connect_timeout: Duration::from_secs(5),
            idle_timeout: None,
            run_migrations: true,
        }
    }

    /// Sets the maximum number of connections.
    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the connection timeout.
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Sets whether to run migrations on open.
    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    fn connect_options(&self) -> CacheResult<SqliteConnectOptions> {
        match &self.database_path {
            Some(path) => Ok(SqliteConnectOptions::new()
                .filename(path)
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .create_if_missing(true)),
            None => SqliteConnectOptions::from_str("sqlite::memory:")
                .map_err(|e| CacheError::ConnectionFailed(e.to_string())),
        }
    }
}

// =============================================================================
// SQLite Backend
// =============================================================================

/// Cache backend persisting entries in the `cache_entries` table.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    pool: SqlitePool,
}

impl SqliteBackend {
    /// Opens (and if needed creates) the cache database.
    ///
    /// ## What This Does
    /// 1. Creates the parent directory and database file if missing
    /// 2. Configures WAL + NORMAL synchronous for file databases
    /// 3. Creates the connection pool
    /// 4. Runs migrations (if enabled)
    pub async fn open(config: SqliteConfig) -> CacheResult<Self> {
        info!(
            path = %config
                .database_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| ":memory:".to_string()),
            "Opening cache database"
        );

        if let Some(parent) = config.database_path.as_ref().and_then(|p| p.parent()) {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;
            }
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(config.connect_timeout)
            .idle_timeout(config.idle_timeout)
            .max_lifetime(None::<Duration>)
            .connect_with(config.connect_options()?)
            .await
            .map_err(|e| CacheError::ConnectionFailed(e.to_string()))?;

        debug!(max_connections = config.max_connections, "Cache pool created");

        if config.run_migrations {
            migrations::run_migrations(&pool).await?;
        }

        Ok(SqliteBackend { pool })
    }

    /// Returns a reference to the connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Closes the pool. Further operations fail with `ConnectionFailed`.
    pub async fn close(&self) {
        info!("Closing cache database");
        self.pool.close().await;
    }

    /// Checks if the database can execute queries.
    pub async fn health_check(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

fn decode_stored_at(key: &str, millis: i64) -> CacheResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis)
        .ok_or_else(|| CacheError::corrupt(key, format!("stored_at_ms out of range: {}", millis)))
}

#[async_trait]
impl CacheBackend for SqliteBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let row: Option<(Vec<u8>, i64)> =
            sqlx::query_as("SELECT value, stored_at_ms FROM cache_entries WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        match row {
            Some((value, millis)) => Ok(Some(CacheEntry {
                value,
                stored_at: decode_stored_at(key, millis)?,
            })),
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> CacheResult<()> {
        sqlx::query(
            r#"
            INSERT INTO cache_entries (key, value, stored_at_ms)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(key) DO UPDATE SET
                value = excluded.value,
                stored_at_ms = excluded.stored_at_ms
            "#,
        )
        .bind(key)
        .bind(entry.value)
        .bind(entry.stored_at.timestamp_millis())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        let result = sqlx::query("DELETE FROM cache_entries WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn clear(&self) -> CacheResult<u64> {
        let result = sqlx::query("DELETE FROM cache_entries")
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn purge_stored_before(
        &self,
        cutoff: DateTime<Utc>,
        keep: &[String],
    ) -> CacheResult<u64> {
        let mut query =
            QueryBuilder::<Sqlite>::new("DELETE FROM cache_entries WHERE stored_at_ms < ");
        query.push_bind(cutoff.timestamp_millis());

        if !keep.is_empty() {
            query.push(" AND key NOT IN (");
            let mut keys = query.separated(", ");
            for key in keep {
                keys.push_bind(key.clone());
            }
            keys.push_unseparated(")");
        }

        let result = query.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        let keys: Vec<String> = sqlx::query_scalar("SELECT key FROM cache_entries ORDER BY key")
            .fetch_all(&self.pool)
            .await?;

        Ok(keys)
    }

    async fn stored_at(&self, key: &str) -> CacheResult<Option<DateTime<Utc>>> {
        let millis: Option<i64> =
            sqlx::query_scalar("SELECT stored_at_ms FROM cache_entries WHERE key = ?1")
                .bind(key)
                .fetch_optional(&self.pool)
                .await?;

        millis.map(|m| decode_stored_at(key, m)).transpose()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
