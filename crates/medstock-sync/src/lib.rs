//! # medstock-sync: Offline-First Sync Core
//!
//! Persists local mutations as durable intents and replays them against the
//! remote service once the device has a network path.
//!
//! ## Sync Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Offline-First Write Path                          │
//! │                                                                         │
//! │  Domain repository                                                     │
//! │       │ enqueue_sync_operation(op, entity_id)                          │
//! │       ▼                                                                 │
//! │  ┌──────────────────────┐      ┌──────────────────────────────────┐    │
//! │  │   SyncOrchestrator   │─────►│ PendingQueue                     │    │
//! │  │                      │      │ ExpiringCache["pending_sync_…"]  │    │
//! │  │  Idle → Syncing →    │      │ (SqliteBackend, survives exit)   │    │
//! │  │  Success | Offline | │      └──────────────────────────────────┘    │
//! │  │  Error(msg)          │                                              │
//! │  │                      │◄──── ConnectivityObserver (watch stream)     │
//! │  └──────────┬───────────┘                                              │
//! │             │ dispatch(op) per queued entry, in order                  │
//! │             ▼                                                           │
//! │  dyn RemoteTransport (host supplied)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust,ignore
//! use medstock_sync::{AutoSync, SyncConfig, SyncOrchestrator};
//!
//! let config = SyncConfig::load_or_default(None);
//! let sync = SyncOrchestrator::open(config, Arc::new(MyTransport::new())).await?;
//! let _auto = AutoSync::spawn(sync.clone());
//!
//! sync.enqueue_sync_operation(SyncOperation::update("med-001", &medicine)?, "med-001")
//!     .await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod auto_sync;
pub mod config;
pub mod connectivity;
pub mod error;
pub mod orchestrator;
pub mod queue;
pub mod transport;

// =============================================================================
// Re-exports
// =============================================================================

pub use auto_sync::{AutoSync, AutoSyncHandle};
pub use config::{CacheSettings, ConnectivitySettings, SyncConfig, SyncSettings};
pub use connectivity::{ConnectivityObserver, ManualPathMonitor, PathMonitor, SysfsPathMonitor};
pub use error::{SyncError, SyncResult};
pub use orchestrator::{NoOpEmitter, SyncEventEmitter, SyncOrchestrator, SyncOrchestratorBuilder};
pub use queue::{PendingQueue, QueuedOperation};
pub use transport::{Reconciler, RemoteTransport, TransportError};

pub use medstock_core::{NetworkMedium, NetworkStatus, SyncOperation, SyncState, SyncStatus};
