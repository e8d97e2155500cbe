//! # Sync Orchestrator
//!
//! Owns the pending queue and the sync state machine, and replays queued
//! operations against the remote when a network path exists.
//!
//! ## Drain Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        sync_pending_changes()                           │
//! │                                                                         │
//! │  acquire drain lock                                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  [terminal → Idle] ─► Syncing                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  observer.refresh() ── disconnected ──► Offline        (queue intact)   │
//! │       │ connected                                                       │
//! │       ▼                                                                 │
//! │  queue.drain() ─────── storage error ─► Error(msg)     (queue intact)   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  for op in snapshot: dispatch ── any failure ─► Error  (queue intact)   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  [force only] reconciler.reconcile() ── failure ─► Error                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  queue.clear_drained(snapshot) ─► Success                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Cancellation
//! Each attempt runs on its own Tokio task. Dropping the future returned by
//! `sync_pending_changes` does not abort a drain that is already under way,
//! so the state machine always reaches a terminal state.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use medstock_cache::{ExpiringCache, SqliteBackend, SqliteConfig};
use medstock_core::{SyncOperation, SyncState, SyncStatus};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use crate::config::{SyncConfig, SyncSettings};
use crate::connectivity::ConnectivityObserver;
use crate::error::{SyncError, SyncResult};
use crate::queue::PendingQueue;
use crate::transport::{dispatch_with_timeout, Reconciler, RemoteTransport};

// =============================================================================
// Event Emitter Trait
// =============================================================================

/// Pushes sync events to a host shell (desktop bridge, mobile UI).
///
/// Called synchronously on every transition; implementations must not block.
pub trait SyncEventEmitter: Send + Sync {
    /// Emits a state transition.
    fn emit_state(&self, state: &SyncState);

    /// Emits a failed attempt.
    fn emit_error(&self, message: &str, retryable: bool);
}

/// No-op event emitter.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_state(&self, _state: &SyncState) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
}

// =============================================================================
// Sync Orchestrator
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DrainMode {
    Pending,
    Full,
}

#[derive(Debug, Default)]
struct History {
    last_sync_at: Option<DateTime<Utc>>,
    last_error: Option<String>,
}

struct Inner {
    queue: PendingQueue,
    observer: Arc<ConnectivityObserver>,
    transport: Arc<dyn RemoteTransport>,
    reconciler: Option<Arc<dyn Reconciler>>,
    emitter: Arc<dyn SyncEventEmitter>,
    settings: SyncSettings,
    state_tx: watch::Sender<SyncState>,
    drain_lock: Mutex<()>,
    history: RwLock<History>,
}

/// Entry point of the sync layer. Cheap to clone; clones share all state.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SyncOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncOrchestrator")
            .field("state", &self.state())
            .field("queue", &self.inner.queue)
            .field("observer", &self.inner.observer)
            .finish()
    }
}

impl SyncOrchestrator {
    /// Creates an orchestrator with default settings.
    pub fn new(
        cache: Arc<ExpiringCache>,
        observer: Arc<ConnectivityObserver>,
        transport: Arc<dyn RemoteTransport>,
    ) -> Self {
        Self::from_parts(
            cache,
            observer,
            transport,
            None,
            Arc::new(NoOpEmitter),
            SyncSettings::default(),
        )
    }

    /// Returns a builder seeded with `config`.
    pub fn builder(config: SyncConfig) -> SyncOrchestratorBuilder {
        SyncOrchestratorBuilder::new(config)
    }

    /// Opens the durable cache named by `config` and wires an orchestrator
    /// over it, with a sysfs-backed connectivity observer.
    pub async fn open(config: SyncConfig, transport: Arc<dyn RemoteTransport>) -> SyncResult<Self> {
        let path = config
            .database_path()
            .ok_or_else(|| SyncError::InvalidConfig("No cache database path available".into()))?;

        let backend = SqliteBackend::open(SqliteConfig::new(path)).await?;
        let cache = Arc::new(ExpiringCache::with_std_ttl(Arc::new(backend), config.cache_ttl()));

        SyncOrchestratorBuilder::new(config)
            .with_cache(cache)
            .with_transport(transport)
            .build()
    }

    fn from_parts(
        cache: Arc<ExpiringCache>,
        observer: Arc<ConnectivityObserver>,
        transport: Arc<dyn RemoteTransport>,
        reconciler: Option<Arc<dyn Reconciler>>,
        emitter: Arc<dyn SyncEventEmitter>,
        settings: SyncSettings,
    ) -> Self {
        let (state_tx, _) = watch::channel(SyncState::Idle);
        let queue = PendingQueue::new(cache, settings.queue_key.clone());

        Self {
            inner: Arc::new(Inner {
                queue,
                observer,
                transport,
                reconciler,
                emitter,
                settings,
                state_tx,
                drain_lock: Mutex::new(()),
                history: RwLock::new(History::default()),
            }),
        }
    }

    // =========================================================================
    // Public Operations
    // =========================================================================

    /// Persists `operation` under `identifier`, replacing any operation
    /// already queued for it, then starts a best-effort sync in the background.
    ///
    /// The result reflects persistence only: the triggered sync reports
    /// through the state stream.
    pub async fn enqueue_sync_operation(
        &self,
        operation: SyncOperation,
        identifier: &str,
    ) -> SyncResult<()> {
        self.inner.queue.enqueue(operation, identifier).await?;

        if self.inner.settings.sync_on_enqueue {
            self.spawn_sync();
        }
        Ok(())
    }

    /// Drains the queue to the remote. Returns true only on full success.
    pub async fn sync_pending_changes(&self) -> bool {
        self.run(DrainMode::Pending).await
    }

    /// Same gating and outcome as [`sync_pending_changes`](Self::sync_pending_changes),
    /// followed by a full reconciliation pass when a [`Reconciler`] is attached.
    pub async fn force_sync_all(&self) -> bool {
        self.run(DrainMode::Full).await
    }

    /// Refreshes the observer's status in the background. Never fails.
    pub fn check_connectivity(&self) {
        let observer = Arc::clone(&self.inner.observer);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    observer.refresh().await;
                });
            }
            Err(_) => debug!("No runtime, connectivity check skipped"),
        }
    }

    // =========================================================================
    // Observation
    // =========================================================================

    /// Current state.
    pub fn state(&self) -> SyncState {
        self.inner.state_tx.borrow().clone()
    }

    /// Subscribes to state changes. The receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.inner.state_tx.subscribe()
    }

    /// Snapshot for status bars and diagnostics.
    pub async fn status(&self) -> SyncStatus {
        let pending = match self.inner.queue.len().await {
            Ok(len) => u32::try_from(len).unwrap_or(u32::MAX),
            Err(e) => {
                warn!(error = %e, "Pending count unavailable");
                0
            }
        };

        let (last_sync_at, last_error) = self
            .inner
            .history
            .read()
            .map(|h| (h.last_sync_at, h.last_error.clone()))
            .unwrap_or_default();

        SyncStatus {
            state: self.state(),
            network: self.inner.observer.status(),
            pending_count: pending,
            last_sync_at,
            last_error,
        }
    }

    /// Number of operations waiting to be dispatched.
    pub async fn pending_count(&self) -> SyncResult<usize> {
        self.inner.queue.len().await
    }

    /// Operations waiting to be dispatched, in dispatch order.
    pub async fn pending_operations(&self) -> SyncResult<Vec<SyncOperation>> {
        self.inner.queue.operations().await
    }

    /// The connectivity observer gating every drain.
    pub fn observer(&self) -> &Arc<ConnectivityObserver> {
        &self.inner.observer
    }

    /// The underlying queue, for maintenance.
    pub fn queue(&self) -> &PendingQueue {
        &self.inner.queue
    }

    /// Active settings.
    pub fn settings(&self) -> &SyncSettings {
        &self.inner.settings
    }

    // =========================================================================
    // Drain
    // =========================================================================

    fn spawn_sync(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            debug!("No runtime, sync after enqueue skipped");
            return;
        };

        let this = self.clone();
        runtime.spawn(async move {
            this.sync_pending_changes().await;
        });
    }

    async fn run(&self, mode: DrainMode) -> bool {
        let this = self.clone();
        match tokio::spawn(async move { this.drain(mode).await }).await {
            Ok(synced) => synced,
            Err(e) => {
                let err = SyncError::from(e);
                self.fail(&err);
                false
            }
        }
    }

    async fn drain(&self, mode: DrainMode) -> bool {
        let _guard = self.inner.drain_lock.lock().await;

        if self.state().is_terminal() {
            self.transition(SyncState::Idle);
        }
        self.transition(SyncState::Syncing);

        let network = self.inner.observer.refresh().await;
        if !network.is_connected() {
            info!("No network path, sync deferred");
            self.transition(SyncState::Offline);
            return false;
        }

        match self.push(mode).await {
            Ok(dispatched) => {
                if let Ok(mut history) = self.inner.history.write() {
                    history.last_sync_at = Some(Utc::now());
                    history.last_error = None;
                }
                info!(dispatched, ?mode, %network, "Sync completed");
                self.transition(SyncState::Success);
                true
            }
            Err(e) => {
                self.fail(&e);
                false
            }
        }
    }

    /// Dispatches the current snapshot and removes it once everything landed.
    async fn push(&self, mode: DrainMode) -> SyncResult<usize> {
        let snapshot = self.inner.queue.drain().await?;
        let timeout = self.inner.settings.dispatch_timeout();

        for entry in &snapshot {
            dispatch_with_timeout(self.inner.transport.as_ref(), &entry.operation, timeout).await?;
        }

        if mode == DrainMode::Full {
            if let Some(reconciler) = &self.inner.reconciler {
                debug!("Running full reconciliation");
                reconciler
                    .reconcile()
                    .await
                    .map_err(|e| SyncError::Reconcile {
                        message: e.message,
                        retryable: e.retryable,
                    })?;
            }
        }

        self.inner.queue.clear_drained(&snapshot).await?;
        Ok(snapshot.len())
    }

    fn fail(&self, err: &SyncError) {
        let message = err.to_string();
        warn!(error = %message, retryable = err.is_retryable(), "Sync attempt failed");

        if let Ok(mut history) = self.inner.history.write() {
            history.last_error = Some(message.clone());
        }
        self.inner.emitter.emit_error(&message, err.is_retryable());
        self.transition(SyncState::Error(message));
    }

    fn transition(&self, next: SyncState) {
        let previous = self.inner.state_tx.send_replace(next.clone());
        debug!(from = %previous, to = %next, "Sync state transition");
        self.inner.emitter.emit_state(&next);
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for creating a SyncOrchestrator with options.
pub struct SyncOrchestratorBuilder {
    config: SyncConfig,
    cache: Option<Arc<ExpiringCache>>,
    observer: Option<Arc<ConnectivityObserver>>,
    transport: Option<Arc<dyn RemoteTransport>>,
    reconciler: Option<Arc<dyn Reconciler>>,
    emitter: Option<Arc<dyn SyncEventEmitter>>,
}

impl SyncOrchestratorBuilder {
    /// Creates a new builder with the given config.
    pub fn new(config: SyncConfig) -> Self {
        SyncOrchestratorBuilder {
            config,
            cache: None,
            observer: None,
            transport: None,
            reconciler: None,
            emitter: None,
        }
    }

    /// Sets the cache that stores the queue.
    pub fn with_cache(mut self, cache: Arc<ExpiringCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Sets the connectivity observer. Defaults to a sysfs observer.
    pub fn with_observer(mut self, observer: Arc<ConnectivityObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Sets the remote transport.
    pub fn with_transport(mut self, transport: Arc<dyn RemoteTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Attaches the reconciler run by `force_sync_all`.
    pub fn with_reconciler(mut self, reconciler: Arc<dyn Reconciler>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    /// Sets the event emitter.
    pub fn with_emitter(mut self, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Builds the SyncOrchestrator.
    pub fn build(self) -> SyncResult<SyncOrchestrator> {
        self.config.validate()?;

        let cache = self
            .cache
            .ok_or_else(|| SyncError::InvalidConfig("Cache required".into()))?;
        let transport = self
            .transport
            .ok_or_else(|| SyncError::InvalidConfig("Remote transport required".into()))?;

        let observer = self.observer.unwrap_or_else(|| {
            Arc::new(ConnectivityObserver::from_settings(&self.config.connectivity))
        });
        let emitter = self.emitter.unwrap_or_else(|| Arc::new(NoOpEmitter));

        Ok(SyncOrchestrator::from_parts(
            cache,
            observer,
            transport,
            self.reconciler,
            emitter,
            self.config.sync,
        ))
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connectivity::ManualPathMonitor;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use chrono::TimeDelta;
    use medstock_core::{NetworkMedium, NetworkStatus, OperationKind, Payload};
    use std::time::Duration;
    use tokio::sync::Notify;

    const WIFI: NetworkStatus = NetworkStatus::Connected(NetworkMedium::Wifi);

    // -------------------------------------------------------------------------
    // Test doubles
    // -------------------------------------------------------------------------

    #[derive(Default)]
    struct RecordingTransport {
        dispatched: std::sync::Mutex<Vec<String>>,
        fail_on: std::sync::Mutex<Option<String>>,
    }

    impl RecordingTransport {
        fn dispatched(&self) -> Vec<String> {
            self.dispatched.lock().unwrap().clone()
        }

        fn fail_on(&self, id: Option<&str>) {
            *self.fail_on.lock().unwrap() = id.map(str::to_string);
        }
    }

    #[async_trait]
    impl RemoteTransport for RecordingTransport {
        async fn dispatch(&self, operation: &SyncOperation) -> Result<(), TransportError> {
            self.dispatched.lock().unwrap().push(operation.id.clone());
            if self.fail_on.lock().unwrap().as_deref() == Some(operation.id.as_str()) {
                return Err(TransportError::transient("503 service unavailable"));
            }
            Ok(())
        }
    }

    /// Blocks every dispatch until released.
    #[derive(Default)]
    struct GatedTransport {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl RemoteTransport for GatedTransport {
        async fn dispatch(&self, _operation: &SyncOperation) -> Result<(), TransportError> {
            self.started.notify_one();
            self.release.notified().await;
            Ok(())
        }
    }

    #[derive(Default)]
    struct RecordingEmitter {
        states: std::sync::Mutex<Vec<SyncState>>,
        errors: std::sync::Mutex<Vec<(String, bool)>>,
    }

    impl SyncEventEmitter for RecordingEmitter {
        fn emit_state(&self, state: &SyncState) {
            self.states.lock().unwrap().push(state.clone());
        }

        fn emit_error(&self, message: &str, retryable: bool) {
            self.errors.lock().unwrap().push((message.to_string(), retryable));
        }
    }

    struct CountingReconciler {
        calls: std::sync::atomic::AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Reconciler for CountingReconciler {
        async fn reconcile(&self) -> Result<(), TransportError> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            if self.fail {
                Err(TransportError::permanent("schema mismatch"))
            } else {
                Ok(())
            }
        }
    }

    // -------------------------------------------------------------------------
    // Harness
    // -------------------------------------------------------------------------

    struct Harness {
        orchestrator: SyncOrchestrator,
        monitor: Arc<ManualPathMonitor>,
        cache: Arc<ExpiringCache>,
        emitter: Arc<RecordingEmitter>,
    }

    fn harness_with(
        network: NetworkStatus,
        transport: Arc<dyn RemoteTransport>,
        reconciler: Option<Arc<dyn Reconciler>>,
        sync_on_enqueue: bool,
    ) -> Harness {
        let monitor = Arc::new(ManualPathMonitor::new(network));
        let observer = Arc::new(ConnectivityObserver::new(
            monitor.clone(),
            Duration::from_millis(50),
        ));
        let cache = Arc::new(ExpiringCache::in_memory(TimeDelta::days(30)));
        let emitter = Arc::new(RecordingEmitter::default());

        let mut config = SyncConfig::default();
        config.sync.sync_on_enqueue = sync_on_enqueue;

        let mut builder = SyncOrchestrator::builder(config)
            .with_cache(cache.clone())
            .with_observer(observer)
            .with_transport(transport)
            .with_emitter(emitter.clone());
        if let Some(reconciler) = reconciler {
            builder = builder.with_reconciler(reconciler);
        }

        Harness {
            orchestrator: builder.build().unwrap(),
            monitor,
            cache,
            emitter,
        }
    }

    fn harness(network: NetworkStatus) -> (Harness, Arc<RecordingTransport>) {
        let transport = Arc::new(RecordingTransport::default());
        (harness_with(network, transport.clone(), None, false), transport)
    }

    fn op(id: &str, entity: &str) -> SyncOperation {
        SyncOperation::new(OperationKind::UpdateEntity, entity, Payload::new(b"{}".to_vec()))
            .with_id(id)
    }

    async fn pending_ids(orchestrator: &SyncOrchestrator) -> Vec<String> {
        orchestrator
            .pending_operations()
            .await
            .unwrap()
            .into_iter()
            .map(|o| o.id)
            .collect()
    }

    // -------------------------------------------------------------------------
    // Tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_offline_short_circuits() {
        let (h, transport) = harness(NetworkStatus::Disconnected);
        h.orchestrator.enqueue_sync_operation(op("1", "a"), "a").await.unwrap();
        h.orchestrator.enqueue_sync_operation(op("2", "b"), "b").await.unwrap();

        assert!(!h.orchestrator.sync_pending_changes().await);
        assert_eq!(h.orchestrator.state(), SyncState::Offline);
        assert!(transport.dispatched().is_empty());
        assert_eq!(pending_ids(&h.orchestrator).await, vec!["1", "2"]);
    }

    #[tokio::test]
    async fn test_successful_drain_dispatches_in_order_and_clears() {
        let (h, transport) = harness(WIFI);
        h.orchestrator.enqueue_sync_operation(op("1", "a"), "a").await.unwrap();
        h.orchestrator.enqueue_sync_operation(op("2", "b"), "b").await.unwrap();

        assert!(h.orchestrator.sync_pending_changes().await);
        assert_eq!(transport.dispatched(), vec!["1", "2"]);
        assert_eq!(h.orchestrator.state(), SyncState::Success);
        assert_eq!(h.orchestrator.pending_count().await.unwrap(), 0);

        let status = h.orchestrator.status().await;
        assert!(status.last_sync_at.is_some());
        assert_eq!(status.network, WIFI);
    }

    #[tokio::test]
    async fn test_empty_queue_syncs_successfully() {
        let (h, transport) = harness(WIFI);
        assert!(h.orchestrator.sync_pending_changes().await);
        assert!(transport.dispatched().is_empty());
        assert_eq!(h.orchestrator.state(), SyncState::Success);
    }

    #[tokio::test]
    async fn test_failed_dispatch_keeps_whole_queue() {
        let (h, transport) = harness(WIFI);
        for (id, key) in [("1", "a"), ("2", "b"), ("3", "c")] {
            h.orchestrator.enqueue_sync_operation(op(id, key), key).await.unwrap();
        }
        transport.fail_on(Some("2"));

        assert!(!h.orchestrator.sync_pending_changes().await);
        assert_eq!(transport.dispatched(), vec!["1", "2"]);
        assert_eq!(pending_ids(&h.orchestrator).await, vec!["1", "2", "3"]);

        let SyncState::Error(message) = h.orchestrator.state() else {
            panic!("expected error state");
        };
        assert!(message.contains("503"));
        assert_eq!(
            h.emitter.errors.lock().unwrap().as_slice(),
            &[(message.clone(), true)]
        );

        // Next attempt replays everything, including the one that landed.
        transport.fail_on(None);
        assert!(h.orchestrator.sync_pending_changes().await);
        assert_eq!(transport.dispatched(), vec!["1", "2", "1", "2", "3"]);
        assert!(h.orchestrator.pending_operations().await.unwrap().is_empty());
        assert_eq!(h.orchestrator.status().await.last_error, None);
    }

    #[tokio::test]
    async fn test_reenqueued_identifier_moves_to_tail() {
        let (h, transport) = harness(WIFI);
        h.orchestrator.enqueue_sync_operation(op("a1", "a"), "a").await.unwrap();
        h.orchestrator.enqueue_sync_operation(op("b1", "b"), "b").await.unwrap();
        h.orchestrator.enqueue_sync_operation(op("a2", "a"), "a").await.unwrap();

        assert!(h.orchestrator.sync_pending_changes().await);
        assert_eq!(transport.dispatched(), vec!["b1", "a2"]);
    }

    #[tokio::test]
    async fn test_state_stream_reports_offline() {
        let (h, _) = harness(NetworkStatus::Disconnected);
        let mut rx = h.orchestrator.subscribe();
        assert_eq!(*rx.borrow_and_update(), SyncState::Idle);

        assert!(!h.orchestrator.sync_pending_changes().await);
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow_and_update(), SyncState::Offline);

        // A second attempt passes through Idle before Syncing.
        h.orchestrator.sync_pending_changes().await;
        assert_eq!(
            h.emitter.states.lock().unwrap().as_slice(),
            &[
                SyncState::Syncing,
                SyncState::Offline,
                SyncState::Idle,
                SyncState::Syncing,
                SyncState::Offline,
            ]
        );
    }

    #[tokio::test]
    async fn test_recovers_when_network_returns() {
        let (h, transport) = harness(NetworkStatus::Disconnected);
        h.orchestrator.enqueue_sync_operation(op("1", "a"), "a").await.unwrap();
        assert!(!h.orchestrator.sync_pending_changes().await);

        h.monitor.set(NetworkStatus::Connected(NetworkMedium::Cellular));
        assert!(h.orchestrator.sync_pending_changes().await);
        assert_eq!(transport.dispatched(), vec!["1"]);
    }

    #[tokio::test]
    async fn test_offline_longer_than_ttl_keeps_writes() {
        let monitor = Arc::new(ManualPathMonitor::new(NetworkStatus::Disconnected));
        let transport = Arc::new(RecordingTransport::default());
        let cache = Arc::new(ExpiringCache::in_memory(TimeDelta::milliseconds(100)));

        let mut config = SyncConfig::default();
        config.sync.sync_on_enqueue = false;
        let orchestrator = SyncOrchestrator::builder(config)
            .with_cache(cache.clone())
            .with_observer(Arc::new(ConnectivityObserver::new(
                monitor.clone(),
                Duration::from_millis(50),
            )))
            .with_transport(transport.clone())
            .build()
            .unwrap();

        orchestrator.enqueue_sync_operation(op("1", "a"), "a").await.unwrap();
        assert!(!orchestrator.sync_pending_changes().await);

        tokio::time::sleep(Duration::from_millis(200)).await;
        cache.purge_expired().await.unwrap();
        assert_eq!(orchestrator.pending_count().await.unwrap(), 1);

        monitor.set(WIFI);
        assert!(orchestrator.sync_pending_changes().await);
        assert_eq!(transport.dispatched(), vec!["1"]);
        assert_eq!(orchestrator.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_corrupt_queue_surfaces_errors() {
        let (h, transport) = harness(WIFI);
        h.cache.save("garbage", "pending_sync_operations").await.unwrap();

        let err = h
            .orchestrator
            .enqueue_sync_operation(op("1", "a"), "a")
            .await
            .unwrap_err();
        assert!(err.is_persistence_error());

        assert!(!h.orchestrator.sync_pending_changes().await);
        assert!(matches!(h.orchestrator.state(), SyncState::Error(_)));
        assert!(transport.dispatched().is_empty());

        // Left untouched for inspection.
        let raw: Option<String> = h.cache.fetch("pending_sync_operations").await.unwrap();
        assert_eq!(raw.as_deref(), Some("garbage"));
    }

    #[tokio::test]
    async fn test_enqueue_during_drain_is_preserved() {
        let transport = Arc::new(GatedTransport::default());
        let h = harness_with(WIFI, transport.clone(), None, false);
        h.orchestrator.enqueue_sync_operation(op("1", "a"), "a").await.unwrap();

        let orchestrator = h.orchestrator.clone();
        let drain = tokio::spawn(async move { orchestrator.sync_pending_changes().await });

        transport.started.notified().await;
        assert_eq!(h.orchestrator.state(), SyncState::Syncing);
        h.orchestrator.enqueue_sync_operation(op("2", "b"), "b").await.unwrap();
        transport.release.notify_one();

        assert!(drain.await.unwrap());
        assert_eq!(pending_ids(&h.orchestrator).await, vec!["2"]);
    }

    #[tokio::test]
    async fn test_enqueue_triggers_background_sync() {
        let transport = Arc::new(RecordingTransport::default());
        let h = harness_with(WIFI, transport.clone(), None, true);
        let mut rx = h.orchestrator.subscribe();

        h.orchestrator.enqueue_sync_operation(op("1", "a"), "a").await.unwrap();

        tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|state| *state == SyncState::Success),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(transport.dispatched(), vec!["1"]);
        assert_eq!(h.orchestrator.pending_count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_background_sync_failure_does_not_fail_enqueue() {
        let transport = Arc::new(RecordingTransport::default());
        transport.fail_on(Some("1"));
        let h = harness_with(WIFI, transport.clone(), None, true);
        let mut rx = h.orchestrator.subscribe();

        h.orchestrator.enqueue_sync_operation(op("1", "a"), "a").await.unwrap();

        tokio::time::timeout(
            Duration::from_secs(2),
            rx.wait_for(|state| matches!(state, SyncState::Error(_))),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(h.orchestrator.pending_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_enqueues_all_land() {
        let (h, _) = harness(NetworkStatus::Disconnected);

        let tasks: Vec<_> = (0..100)
            .map(|i| {
                let orchestrator = h.orchestrator.clone();
                tokio::spawn(async move {
                    let key = format!("med-{i}");
                    orchestrator
                        .enqueue_sync_operation(op(&format!("op-{i}"), &key), &key)
                        .await
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(h.orchestrator.pending_count().await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_force_sync_runs_reconciler() {
        let transport = Arc::new(RecordingTransport::default());
        let reconciler = Arc::new(CountingReconciler {
            calls: Default::default(),
            fail: false,
        });
        let h = harness_with(
            WIFI,
            transport.clone(),
            Some(reconciler.clone() as Arc<dyn Reconciler>),
            false,
        );
        h.orchestrator.enqueue_sync_operation(op("1", "a"), "a").await.unwrap();

        assert!(h.orchestrator.sync_pending_changes().await);
        assert_eq!(reconciler.calls.load(std::sync::atomic::Ordering::SeqCst), 0);

        assert!(h.orchestrator.force_sync_all().await);
        assert_eq!(reconciler.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
        assert_eq!(h.orchestrator.state(), SyncState::Success);
    }

    #[tokio::test]
    async fn test_failed_reconcile_keeps_queue() {
        let transport = Arc::new(RecordingTransport::default());
        let reconciler = Arc::new(CountingReconciler {
            calls: Default::default(),
            fail: true,
        });
        let h = harness_with(WIFI, transport, Some(reconciler as Arc<dyn Reconciler>), false);
        h.orchestrator.enqueue_sync_operation(op("1", "a"), "a").await.unwrap();

        assert!(!h.orchestrator.force_sync_all().await);
        assert!(matches!(h.orchestrator.state(), SyncState::Error(m) if m.contains("schema mismatch")));
        assert_eq!(pending_ids(&h.orchestrator).await, vec!["1"]);
    }

    #[tokio::test]
    async fn test_force_sync_without_reconciler_matches_pending_sync() {
        let (h, _) = harness(NetworkStatus::Disconnected);
        assert!(!h.orchestrator.force_sync_all().await);
        assert_eq!(h.orchestrator.state(), SyncState::Offline);
    }

    #[tokio::test]
    async fn test_check_connectivity_refreshes_observer() {
        let (h, _) = harness(WIFI);
        let mut rx = h.orchestrator.observer().subscribe();
        assert_eq!(*rx.borrow_and_update(), NetworkStatus::Disconnected);

        h.orchestrator.check_connectivity();
        tokio::time::timeout(Duration::from_secs(2), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(h.orchestrator.observer().status(), WIFI);
    }

    #[test]
    fn test_builder_requires_transport() {
        let err = SyncOrchestrator::builder(SyncConfig::default())
            .with_cache(Arc::new(ExpiringCache::in_memory(TimeDelta::days(1))))
            .build()
            .unwrap_err();
        assert!(err.is_config_error());
    }
}
