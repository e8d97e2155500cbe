//! # medstock-cache: Expiring Key-Value Cache
//!
//! This crate provides [`ExpiringCache`], a generic key-value store with a
//! cache-wide time-to-live, and the storage media it can sit on.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Cache Layer                                     │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    ExpiringCache                                │   │
//! │  │  save<T>(value, key)   fetch<T>(key)   exists(key)              │   │
//! │  │  remove(key)           clear_all()     purge_expired()          │   │
//! │  └────────────────────────────┬────────────────────────────────────┘   │
//! │                               │ Arc<dyn CacheBackend>                  │
//! │             ┌─────────────────┴─────────────────┐                      │
//! │             ▼                                   ▼                      │
//! │  ┌────────────────────┐             ┌────────────────────────┐        │
//! │  │   MemoryBackend    │             │     SqliteBackend      │        │
//! │  │   (process-local)  │             │  (WAL, migrations,     │        │
//! │  │                    │             │   survives relaunch)   │        │
//! │  └────────────────────┘             └────────────────────────┘        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use medstock_cache::{ExpiringCache, SqliteBackend, SqliteConfig};
//!
//! let backend = SqliteBackend::open(SqliteConfig::new("./medstock-cache.db")).await?;
//! let cache = ExpiringCache::new(Arc::new(backend), TimeDelta::days(30));
//!
//! cache.save(&42, "answer").await?;
//! let answer: Option<i32> = cache.fetch("answer").await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod backend;
pub mod cache;
pub mod error;
pub mod migrations;
pub mod sqlite;

// =============================================================================
// Re-exports
// =============================================================================

pub use backend::{CacheBackend, CacheEntry, MemoryBackend};
pub use cache::ExpiringCache;
pub use error::{CacheError, CacheResult};
pub use sqlite::{SqliteBackend, SqliteConfig};
