//! # Expiring Cache
//!
//! Generic, type-erasing key-value store with a cache-wide time-to-live.
//!
//! ## Read Contract
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  fetch::<T>(key)                                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  backend.get(key) ── medium failed ──────────────────► Err(CacheError) │
//! │       │                                                                 │
//! │       ├── no entry ──────────────────────────────────► Ok(None)        │
//! │       │                                                                 │
//! │       ├── now > stored_at + ttl ── delete(key) ──────► Ok(None)        │
//! │       │   (lazy eviction, or ttl <= 0)                                  │
//! │       │                                                                 │
//! │       ├── bytes don't decode as T ───────────────────► Ok(None)        │
//! │       │   (fetch_strict: Err(Corrupt))                                  │
//! │       │                                                                 │
//! │       └── decoded ───────────────────────────────────► Ok(Some(T))     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! There is no background sweep thread. Callers that want one can run
//! [`ExpiringCache::purge_expired`] on their own schedule.
//!
//! ## Pinned Keys
//! A key registered with [`ExpiringCache::pin`] never expires: reads ignore
//! its age and `purge_expired` skips it. The pending-operation queue is
//! pinned; a write waiting for the network must not age out.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::backend::{CacheBackend, CacheEntry, MemoryBackend};
use crate::error::{CacheError, CacheResult};

/// Expiring key-value cache over a pluggable backend.
#[derive(Clone)]
pub struct ExpiringCache {
    backend: Arc<dyn CacheBackend>,
    ttl: TimeDelta,
    pinned: Arc<RwLock<HashSet<String>>>,
}

impl std::fmt::Debug for ExpiringCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpiringCache").field("ttl", &self.ttl).finish()
    }
}

impl ExpiringCache {
    /// Creates a cache over `backend`.
    ///
    /// A zero or negative `ttl` means every entry expires immediately.
    pub fn new(backend: Arc<dyn CacheBackend>, ttl: TimeDelta) -> Self {
        ExpiringCache {
            backend,
            ttl,
            pinned: Arc::new(RwLock::new(HashSet::new())),
        }
    }

    /// Creates a cache over `backend` from a std duration.
    pub fn with_std_ttl(backend: Arc<dyn CacheBackend>, ttl: std::time::Duration) -> Self {
        Self::new(backend, TimeDelta::from_std(ttl).unwrap_or(TimeDelta::MAX))
    }

    /// Creates a process-local cache.
    pub fn in_memory(ttl: TimeDelta) -> Self {
        Self::new(Arc::new(MemoryBackend::new()), ttl)
    }

    /// The cache-wide time-to-live.
    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    /// The underlying storage medium.
    pub fn backend(&self) -> &Arc<dyn CacheBackend> {
        &self.backend
    }

    /// Exempts `key` from expiry. Clones of this cache share the pin set.
    pub fn pin(&self, key: impl Into<String>) {
        let key = key.into();
        let mut pinned = self.pinned.write().unwrap_or_else(|e| e.into_inner());
        if pinned.insert(key.clone()) {
            debug!(key = %key, "Cache key pinned");
        }
    }

    /// Returns true if `key` is exempt from expiry.
    pub fn is_pinned(&self, key: &str) -> bool {
        self.pinned
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains(key)
    }

    fn pinned_keys(&self) -> Vec<String> {
        self.pinned
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    fn is_expired(&self, key: &str, stored_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        if self.is_pinned(key) {
            return false;
        }
        if self.ttl <= TimeDelta::zero() {
            return true;
        }
        match stored_at.checked_add_signed(self.ttl) {
            Some(expires_at) => now > expires_at,
            None => false,
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Serializes `value` and stores it under `key`, stamped now.
    ///
    /// Overwrites any existing entry under `key`.
    pub async fn save<T>(&self, value: &T, key: &str) -> CacheResult<()>
    where
        T: Serialize + ?Sized,
    {
        let bytes = serde_json::to_vec(value)?;
        self.backend.put(key, CacheEntry::now(bytes)).await?;
        debug!(key = %key, "Cache entry saved");
        Ok(())
    }

    /// Deletes `key`. Absent keys are fine; a failing medium is logged.
    pub async fn remove(&self, key: &str) {
        if let Err(e) = self.backend.delete(key).await {
            warn!(?e, key = %key, "Failed to remove cache entry");
        }
    }

    /// Empties the cache. A failing medium is logged.
    pub async fn clear_all(&self) {
        match self.backend.clear().await {
            Ok(count) => debug!(count, "Cache cleared"),
            Err(e) => warn!(?e, "Failed to clear cache"),
        }
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Loads a live entry, evicting it first if it has expired.
    async fn live_entry(&self, key: &str) -> CacheResult<Option<CacheEntry>> {
        let Some(entry) = self.backend.get(key).await? else {
            return Ok(None);
        };

        if self.is_expired(key, entry.stored_at, Utc::now()) {
            self.evict(key).await;
            return Ok(None);
        }

        Ok(Some(entry))
    }

    async fn evict(&self, key: &str) {
        debug!(key = %key, "Evicting expired cache entry");
        if let Err(e) = self.backend.delete(key).await {
            warn!(?e, key = %key, "Failed to evict expired cache entry");
        }
    }

    /// Returns the value under `key`, or `None` if absent, expired or not
    /// decodable as `T`.
    ///
    /// Errors only when the storage medium fails.
    pub async fn fetch<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let Some(entry) = self.live_entry(key).await? else {
            return Ok(None);
        };

        match serde_json::from_slice(&entry.value) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                warn!(key = %key, error = %e, "Cache entry does not decode, treating as absent");
                Ok(None)
            }
        }
    }

    /// Like [`fetch`](Self::fetch), but an undecodable entry is an error.
    ///
    /// Used where silently treating data as absent would lose it, e.g. the
    /// persisted pending-operation queue.
    pub async fn fetch_strict<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let Some(entry) = self.live_entry(key).await? else {
            return Ok(None);
        };

        serde_json::from_slice(&entry.value)
            .map(Some)
            .map_err(|e| CacheError::corrupt(key, e.to_string()))
    }

    /// Returns true if a live entry exists under `key`.
    ///
    /// Follows the same expiry rule as `fetch` without decoding the value.
    /// A failing medium reads as `false`.
    pub async fn exists(&self, key: &str) -> bool {
        match self.backend.stored_at(key).await {
            Ok(Some(stored_at)) => {
                if self.is_expired(key, stored_at, Utc::now()) {
                    self.evict(key).await;
                    false
                } else {
                    true
                }
            }
            Ok(None) => false,
            Err(e) => {
                warn!(?e, key = %key, "Cache existence check failed");
                false
            }
        }
    }

    /// Read-through helper: returns the cached value or awaits `loader`,
    /// caches its result and returns it.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let aisles: Vec<Aisle> = cache
    ///     .get_or_load("aisles:list", || remote.list_aisles())
    ///     .await?;
    /// ```
    pub async fn get_or_load<T, F, Fut, E>(&self, key: &str, loader: F) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: From<CacheError>,
    {
        if let Some(hit) = self.fetch::<T>(key).await? {
            return Ok(hit);
        }

        let value = loader().await?;
        if let Err(e) = self.save(&value, key).await {
            warn!(?e, key = %key, "Loaded value could not be cached");
        }
        Ok(value)
    }

    // =========================================================================
    // Maintenance
    // =========================================================================

    /// Deletes every expired entry in one pass. Returns how many were removed.
    ///
    /// Pinned keys are kept regardless of age.
    pub async fn purge_expired(&self) -> CacheResult<u64> {
        let cutoff = if self.ttl <= TimeDelta::zero() {
            Some(DateTime::<Utc>::MAX_UTC)
        } else {
            Utc::now().checked_sub_signed(self.ttl)
        };

        let purged = match cutoff {
            Some(cutoff) => {
                self.backend
                    .purge_stored_before(cutoff, &self.pinned_keys())
                    .await?
            }
            None => 0,
        };

        if purged > 0 {
            debug!(purged, "Purged expired cache entries");
        }
        Ok(purged)
    }

    /// Lists every stored key, live or not.
    pub async fn keys(&self) -> CacheResult<Vec<String>> {
        self.backend.keys().await
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Aisle {
        id: String,
        label: String,
    }

    /// Backend whose medium is permanently broken.
    struct FailingBackend;

    #[async_trait]
    impl CacheBackend for FailingBackend {
        async fn get(&self, _key: &str) -> CacheResult<Option<CacheEntry>> {
            Err(CacheError::QueryFailed("disk I/O error".into()))
        }
        async fn put(&self, _key: &str, _entry: CacheEntry) -> CacheResult<()> {
            Err(CacheError::QueryFailed("disk I/O error".into()))
        }
        async fn delete(&self, _key: &str) -> CacheResult<bool> {
            Err(CacheError::QueryFailed("disk I/O error".into()))
        }
        async fn clear(&self) -> CacheResult<u64> {
            Err(CacheError::QueryFailed("disk I/O error".into()))
        }
        async fn purge_stored_before(
            &self,
            _cutoff: DateTime<Utc>,
            _keep: &[String],
        ) -> CacheResult<u64> {
            Err(CacheError::QueryFailed("disk I/O error".into()))
        }
        async fn keys(&self) -> CacheResult<Vec<String>> {
            Err(CacheError::QueryFailed("disk I/O error".into()))
        }
    }

    #[tokio::test]
    async fn test_save_then_fetch_returns_value() {
        let cache = ExpiringCache::in_memory(TimeDelta::seconds(60));
        let aisle = Aisle {
            id: "a-1".into(),
            label: "Antibiotics".into(),
        };

        cache.save(&aisle, "aisle:a-1").await.unwrap();
        let fetched: Option<Aisle> = cache.fetch("aisle:a-1").await.unwrap();
        assert_eq!(fetched, Some(aisle));
    }

    #[tokio::test]
    async fn test_entry_expires_after_ttl() {
        let cache = ExpiringCache::in_memory(TimeDelta::milliseconds(100));
        cache.save(&"short-lived", "k").await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert!(!cache.exists("k").await);
        let fetched: Option<String> = cache.fetch("k").await.unwrap();
        assert_eq!(fetched, None);
    }

    #[tokio::test]
    async fn test_fetch_evicts_expired_entry() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = ExpiringCache::new(backend.clone(), TimeDelta::milliseconds(100));
        cache.save(&1u32, "k").await.unwrap();

        tokio::time::sleep(Duration::from_millis(200)).await;

        assert_eq!(cache.fetch::<u32>("k").await.unwrap(), None);
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_zero_and_negative_ttl_expire_immediately() {
        for ttl in [TimeDelta::zero(), TimeDelta::seconds(-5)] {
            let cache = ExpiringCache::in_memory(ttl);
            cache.save(&42, "x").await.unwrap();
            assert!(!cache.exists("x").await);
            assert_eq!(cache.fetch::<i32>("x").await.unwrap(), None);
        }
    }

    #[tokio::test]
    async fn test_clear_all_scenario() {
        let cache = ExpiringCache::in_memory(TimeDelta::seconds(60));
        cache.save(&42, "x").await.unwrap();
        assert_eq!(cache.fetch::<i32>("x").await.unwrap(), Some(42));

        cache.clear_all().await;
        assert_eq!(cache.fetch::<i32>("x").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_type_mismatch_reads_as_absent() {
        let cache = ExpiringCache::in_memory(TimeDelta::seconds(60));
        cache.save(&"not a number", "x").await.unwrap();

        assert_eq!(cache.fetch::<i64>("x").await.unwrap(), None);
        assert!(cache.exists("x").await);

        let err = cache.fetch_strict::<i64>("x").await.unwrap_err();
        assert!(matches!(err, CacheError::Corrupt { .. }));
    }

    #[tokio::test]
    async fn test_remove_is_unconditional() {
        let cache = ExpiringCache::in_memory(TimeDelta::seconds(60));
        cache.remove("missing").await;

        cache.save(&1, "k").await.unwrap();
        cache.remove("k").await;
        assert!(!cache.exists("k").await);
    }

    #[tokio::test]
    async fn test_failing_medium_surfaces_on_save_and_fetch() {
        let cache = ExpiringCache::new(Arc::new(FailingBackend), TimeDelta::seconds(60));

        assert!(cache.save(&1, "k").await.is_err());
        assert!(cache.fetch::<i32>("k").await.is_err());

        // exists / remove / clear_all never raise
        assert!(!cache.exists("k").await);
        cache.remove("k").await;
        cache.clear_all().await;
    }

    #[tokio::test]
    async fn test_get_or_load_reads_through() {
        let cache = ExpiringCache::in_memory(TimeDelta::seconds(60));

        let first: Result<Vec<u32>, CacheError> =
            cache.get_or_load("stock", || async { Ok(vec![3, 1]) }).await;
        assert_eq!(first.unwrap(), vec![3, 1]);

        // cached now; the loader must not run again
        let second: Result<Vec<u32>, CacheError> = cache
            .get_or_load("stock", || async {
                Err(CacheError::Internal("loader should not run".into()))
            })
            .await;
        assert_eq!(second.unwrap(), vec![3, 1]);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = ExpiringCache::new(backend.clone(), TimeDelta::seconds(60));

        backend
            .put(
                "stale",
                CacheEntry {
                    value: b"1".to_vec(),
                    stored_at: Utc::now() - TimeDelta::minutes(5),
                },
            )
            .await
            .unwrap();
        cache.save(&2, "fresh").await.unwrap();

        assert_eq!(cache.purge_expired().await.unwrap(), 1);
        assert_eq!(cache.keys().await.unwrap(), vec!["fresh".to_string()]);
    }

    #[tokio::test]
    async fn test_pinned_key_never_expires() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = ExpiringCache::new(backend.clone(), TimeDelta::zero());
        cache.pin("queue");

        cache.save(&vec![1, 2], "queue").await.unwrap();
        cache.save(&3, "scratch").await.unwrap();

        assert!(cache.is_pinned("queue"));
        assert!(cache.exists("queue").await);
        assert_eq!(
            cache.fetch_strict::<Vec<i32>>("queue").await.unwrap(),
            Some(vec![1, 2])
        );
        assert_eq!(cache.fetch::<i32>("scratch").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_purge_expired_skips_pinned_keys() {
        let backend = Arc::new(MemoryBackend::new());
        let cache = ExpiringCache::new(backend.clone(), TimeDelta::seconds(60));
        cache.clone().pin("queue");

        for key in ["queue", "stale"] {
            backend
                .put(
                    key,
                    CacheEntry {
                        value: b"[]".to_vec(),
                        stored_at: Utc::now() - TimeDelta::days(365),
                    },
                )
                .await
                .unwrap();
        }

        assert_eq!(cache.purge_expired().await.unwrap(), 1);
        assert_eq!(cache.keys().await.unwrap(), vec!["queue".to_string()]);
        assert_eq!(cache.fetch::<Vec<u8>>("queue").await.unwrap(), Some(vec![]));
    }
}
