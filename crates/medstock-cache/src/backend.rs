//! # Cache Backends
//!
//! The storage medium behind [`ExpiringCache`](crate::ExpiringCache).
//!
//! A backend stores raw [`CacheEntry`] records and knows nothing about TTLs or
//! value types; expiry and (de)serialization live one layer up.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ExpiringCache  ── save / fetch / exists / remove / clear_all ──┐      │
//! │                                                                  │      │
//! │                                                                  ▼      │
//! │  dyn CacheBackend ── get / put / delete / clear / purge ─────────┐     │
//! │         │                                                         │     │
//! │         ├── MemoryBackend  (HashMap behind a tokio RwLock)        │     │
//! │         └── SqliteBackend  (cache_entries table, see sqlite.rs)   │     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::error::CacheResult;

// =============================================================================
// Cache Entry
// =============================================================================

/// A stored slot: serialized value plus insertion time.
///
/// The TTL is not stored per entry; it is a property of the cache reading it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Serialized value (serde_json bytes).
    pub value: Vec<u8>,

    /// When the value was saved.
    pub stored_at: DateTime<Utc>,
}

impl CacheEntry {
    /// Creates an entry stamped with the current time.
    pub fn now(value: Vec<u8>) -> Self {
        CacheEntry {
            value,
            stored_at: Utc::now(),
        }
    }
}

// =============================================================================
// Backend Trait
// =============================================================================

/// Storage medium for cache entries.
///
/// Every method fails only when the medium itself fails; a missing key is
/// `Ok(None)` / `Ok(false)`.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Reads the entry stored under `key`.
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>>;

    /// Inserts or overwrites the entry under `key`.
    async fn put(&self, key: &str, entry: CacheEntry) -> CacheResult<()>;

    /// Deletes `key`. Returns true if something was deleted.
    async fn delete(&self, key: &str) -> CacheResult<bool>;

    /// Deletes every entry. Returns how many were deleted.
    async fn clear(&self) -> CacheResult<u64>;

    /// Deletes every entry stored strictly before `cutoff`, except those
    /// under a key in `keep`.
    async fn purge_stored_before(
        &self,
        cutoff: DateTime<Utc>,
        keep: &[String],
    ) -> CacheResult<u64>;

    /// Lists stored keys in ascending order.
    async fn keys(&self) -> CacheResult<Vec<String>>;

    /// Reads only the insertion time of `key`.
    ///
    /// Backends that can answer without loading the value should override this.
    async fn stored_at(&self, key: &str) -> CacheResult<Option<DateTime<Utc>>> {
        Ok(self.get(key).await?.map(|entry| entry.stored_at))
    }
}

// =============================================================================
// Memory Backend
// =============================================================================

/// Process-local backend. Contents are lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: RwLock<HashMap<String, CacheEntry>>,
}

impl MemoryBackend {
    /// Creates an empty memory backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired or not.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns true if nothing is stored.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    async fn get(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn put(&self, key: &str, entry: CacheEntry) -> CacheResult<()> {
        self.entries.write().await.insert(key.to_string(), entry);
        Ok(())
    }

    async fn delete(&self, key: &str) -> CacheResult<bool> {
        Ok(self.entries.write().await.remove(key).is_some())
    }

    async fn clear(&self) -> CacheResult<u64> {
        let mut entries = self.entries.write().await;
        let count = entries.len() as u64;
        entries.clear();
        Ok(count)
    }

    async fn purge_stored_before(
        &self,
        cutoff: DateTime<Utc>,
        keep: &[String],
    ) -> CacheResult<u64> {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|key, entry| entry.stored_at >= cutoff || keep.contains(key));
        Ok((before - entries.len()) as u64)
    }

    async fn keys(&self) -> CacheResult<Vec<String>> {
        let mut keys: Vec<String> = self.entries.read().await.keys().cloned().collect();
        keys.sort();
        Ok(keys)
    }

    async fn stored_at(&self, key: &str) -> CacheResult<Option<DateTime<Utc>>> {
        Ok(self.entries.read().await.get(key).map(|entry| entry.stored_at))
    }
}
