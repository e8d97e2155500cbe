//! # Cache Error Types
//!
//! Error types for cache operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  sqlx::Error / serde_json::Error                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  CacheError (this module) ← "the storage medium failed"                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SyncError::Persistence (medstock-sync)                                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  enqueue() returns Err  /  SyncState::Error(message)                   │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! A missing or expired key is never an error: it is `Ok(None)`.

use thiserror::Error;

/// Cache operation errors.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Opening the storage medium failed.
    ///
    /// ## When This Occurs
    /// - Database file can't be created (permissions, missing directory)
    /// - Disk full
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Reading from or writing to the storage medium failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A value could not be serialized for storage.
    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// A stored entry exists but cannot be decoded as the requested type.
    ///
    /// Only surfaced by [`ExpiringCache::fetch_strict`](crate::ExpiringCache::fetch_strict);
    /// the lenient `fetch` treats this as absence.
    #[error("Corrupt cache entry '{key}': {reason}")]
    Corrupt { key: String, reason: String },

    /// Internal cache error.
    #[error("Internal cache error: {0}")]
    Internal(String),
}

impl CacheError {
    /// Creates a Corrupt error for a given key.
    pub fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        CacheError::Corrupt {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<sqlx::Error> for CacheError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => {
                CacheError::ConnectionFailed("connection pool timed out".to_string())
            }
            sqlx::Error::PoolClosed => {
                CacheError::ConnectionFailed("connection pool is closed".to_string())
            }
            other => CacheError::QueryFailed(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for CacheError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        CacheError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        CacheError::Serialization(err.to_string())
    }
}

/// Result type alias for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;
