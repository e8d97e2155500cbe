//! # Pending Queue
//!
//! Durable, deduplicated list of operations waiting to reach the remote.
//!
//! ## Storage Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ExpiringCache["pending_sync_operations"]                               │
//! │                                                                         │
//! │  [                                                                      │
//! │    { "dedup_key": "med-001", "operation": { "id": …, "type": … } },    │
//! │    { "dedup_key": "aisle-7", "operation": { … } },                      │
//! │  ]                                                                      │
//! │                                                                         │
//! │  enqueue(op, key):  drop entry with same key ─► append ─► save         │
//! │  drain():           snapshot in insertion order                         │
//! │  clear_drained(s):  remove exactly the snapshot entries ─► save        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Concurrency
//! Every read-modify-write runs under one async mutex, so concurrent
//! enqueues never lose each other's entries.
//!
//! The queue is read with [`ExpiringCache::fetch_strict`]: a queue entry
//! that no longer decodes is reported, never silently treated as empty.
//!
//! ## Expiry
//! The queue key is pinned in the cache, so neither lazy eviction nor
//! `purge_expired` can drop queued writes however long the device stays
//! offline.

use std::sync::Arc;

use medstock_cache::ExpiringCache;
use medstock_core::validation::{validate_dedup_key, validate_operation};
use medstock_core::SyncOperation;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::error::SyncResult;

// =============================================================================
// Queue Entry
// =============================================================================

/// One queued intent and the identifier it is deduplicated by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedOperation {
    /// Caller-supplied identifier, typically the mutated entity's id.
    pub dedup_key: String,

    /// The operation to dispatch.
    pub operation: SyncOperation,
}

// =============================================================================
// Pending Queue
// =============================================================================

/// Cache-backed pending-operation queue.
pub struct PendingQueue {
    cache: Arc<ExpiringCache>,
    key: String,
    lock: Mutex<()>,
}

impl std::fmt::Debug for PendingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingQueue").field("key", &self.key).finish()
    }
}

impl PendingQueue {
    /// Creates a queue stored under `key` in `cache` and pins that key.
    pub fn new(cache: Arc<ExpiringCache>, key: impl Into<String>) -> Self {
        let key = key.into();
        cache.pin(key.clone());
        Self {
            cache,
            key,
            lock: Mutex::new(()),
        }
    }

    /// The cache key the queue is stored under.
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Adds `operation`, replacing any entry already queued under `dedup_key`.
    ///
    /// The replacement moves to the tail: insertion order reflects the most
    /// recent intent for each key.
    pub async fn enqueue(&self, operation: SyncOperation, dedup_key: &str) -> SyncResult<()> {
        validate_dedup_key(dedup_key)?;
        validate_operation(&operation)?;

        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;

        let before = entries.len();
        entries.retain(|entry| entry.dedup_key != dedup_key);
        let replaced = entries.len() != before;

        entries.push(QueuedOperation {
            dedup_key: dedup_key.to_string(),
            operation,
        });
        self.store(&entries).await?;

        debug!(
            dedup_key = %dedup_key,
            replaced,
            pending = entries.len(),
            "Operation enqueued"
        );
        Ok(())
    }

    /// Returns every queued entry in insertion order without removing any.
    pub async fn drain(&self) -> SyncResult<Vec<QueuedOperation>> {
        let _guard = self.lock.lock().await;
        self.load().await
    }

    /// Returns the queued operations in insertion order.
    pub async fn operations(&self) -> SyncResult<Vec<SyncOperation>> {
        Ok(self
            .drain()
            .await?
            .into_iter()
            .map(|entry| entry.operation)
            .collect())
    }

    /// Number of queued operations.
    pub async fn len(&self) -> SyncResult<usize> {
        Ok(self.drain().await?.len())
    }

    /// Returns true if nothing is queued.
    pub async fn is_empty(&self) -> SyncResult<bool> {
        Ok(self.len().await? == 0)
    }

    /// Returns the operation queued under `dedup_key`, if any.
    pub async fn get(&self, dedup_key: &str) -> SyncResult<Option<SyncOperation>> {
        Ok(self
            .drain()
            .await?
            .into_iter()
            .find(|entry| entry.dedup_key == dedup_key)
            .map(|entry| entry.operation))
    }

    /// Drops the entry queued under `dedup_key`. Returns true if one existed.
    pub async fn remove(&self, dedup_key: &str) -> SyncResult<bool> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;

        let before = entries.len();
        entries.retain(|entry| entry.dedup_key != dedup_key);
        if entries.len() == before {
            return Ok(false);
        }

        self.store(&entries).await?;
        info!(dedup_key = %dedup_key, "Queued operation removed");
        Ok(true)
    }

    /// Removes exactly the entries of a previous [`drain`](Self::drain)
    /// snapshot. Entries enqueued or replaced since then stay queued.
    ///
    /// Returns how many entries were removed.
    pub async fn clear_drained(&self, drained: &[QueuedOperation]) -> SyncResult<usize> {
        if drained.is_empty() {
            return Ok(0);
        }

        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;

        let before = entries.len();
        entries.retain(|entry| !drained.contains(entry));
        let removed = before - entries.len();

        if removed > 0 {
            self.store(&entries).await?;
        }

        debug!(removed, remaining = entries.len(), "Drained operations cleared");
        Ok(removed)
    }

    /// Empties the queue unconditionally.
    pub async fn clear(&self) -> SyncResult<()> {
        let _guard = self.lock.lock().await;
        self.store(&[]).await?;
        info!(key = %self.key, "Pending queue cleared");
        Ok(())
    }

    async fn load(&self) -> SyncResult<Vec<QueuedOperation>> {
        Ok(self
            .cache
            .fetch_strict::<Vec<QueuedOperation>>(&self.key)
            .await?
            .unwrap_or_default())
    }

    async fn store(&self, entries: &[QueuedOperation]) -> SyncResult<()> {
        self.cache.save(entries, &self.key).await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
