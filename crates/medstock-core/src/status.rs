//! # Observable Status Types
//!
//! The two status values the sync core publishes upward: the orchestrator's
//! [`SyncState`] and the connectivity observer's [`NetworkStatus`].
//!
//! ## Sync State Machine
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   ┌──────┐  sync call   ┌─────────┐   drain ok      ┌─────────┐        │
//! │   │ Idle │ ───────────► │ Syncing │ ──────────────► │ Success │        │
//! │   └──────┘              └────┬────┘                 └────┬────┘        │
//! │      ▲                       │ no network  ┌─────────┐   │             │
//! │      │                       ├───────────► │ Offline │   │             │
//! │      │                       │             └────┬────┘   │             │
//! │      │                       │ storage /   ┌─────────┐   │             │
//! │      │                       └───────────► │  Error  │   │             │
//! │      │                         transport   └────┬────┘   │             │
//! │      │                                          │        │             │
//! │      └──────────── next attempt begins ─────────┴────────┘             │
//! │                                                                         │
//! │  No state is permanently terminal: the machine is reusable for the     │
//! │  lifetime of the process.                                               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

// =============================================================================
// Sync State
// =============================================================================

/// Externally observable status of the sync orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "state", content = "message", rename_all = "snake_case")]
pub enum SyncState {
    /// Nothing in flight. The queue may or may not be empty.
    #[default]
    Idle,
    /// A drain attempt is in progress.
    Syncing,
    /// The drain completed and every drained operation was removed.
    Success,
    /// The drain was skipped because there is no network. Queue unchanged.
    Offline,
    /// The drain aborted on a storage or transport failure. Queue unchanged.
    Error(String),
}

impl SyncState {
    /// Returns true for `Success`, `Offline` and `Error`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SyncState::Success | SyncState::Offline | SyncState::Error(_)
        )
    }

    /// Returns true while a drain is running.
    pub fn is_syncing(&self) -> bool {
        matches!(self, SyncState::Syncing)
    }

    /// Returns the error message for the `Error` variant.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            SyncState::Error(message) => Some(message),
            _ => None,
        }
    }
}

impl std::fmt::Display for SyncState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncState::Idle => write!(f, "idle"),
            SyncState::Syncing => write!(f, "syncing"),
            SyncState::Success => write!(f, "success"),
            SyncState::Offline => write!(f, "offline"),
            SyncState::Error(message) => write!(f, "error: {}", message),
        }
    }
}

// =============================================================================
// Network Status
// =============================================================================

/// Physical medium of an active network path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum NetworkMedium {
    Wifi,
    Cellular,
    Wired,
    Other,
}

impl std::fmt::Display for NetworkMedium {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkMedium::Wifi => write!(f, "wifi"),
            NetworkMedium::Cellular => write!(f, "cellular"),
            NetworkMedium::Wired => write!(f, "wired"),
            NetworkMedium::Other => write!(f, "other"),
        }
    }
}

/// Coarse reachability signal.
///
/// Absence of information is `Disconnected`, never an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "status", content = "medium", rename_all = "snake_case")]
pub enum NetworkStatus {
    /// A usable path exists over the given medium.
    Connected(NetworkMedium),
    /// No usable path, or nothing known yet.
    #[default]
    Disconnected,
}

impl NetworkStatus {
    /// Returns true when a usable path exists.
    pub fn is_connected(&self) -> bool {
        matches!(self, NetworkStatus::Connected(_))
    }

    /// Returns the medium of the active path, if any.
    pub fn medium(&self) -> Option<NetworkMedium> {
        match self {
            NetworkStatus::Connected(medium) => Some(*medium),
            NetworkStatus::Disconnected => None,
        }
    }
}

impl std::fmt::Display for NetworkStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkStatus::Connected(medium) => write!(f, "connected ({})", medium),
            NetworkStatus::Disconnected => write!(f, "disconnected"),
        }
    }
}

// =============================================================================
// Sync Status Snapshot
// =============================================================================

/// Point-in-time summary of the sync layer, for status bars and diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncStatus {
    /// Current orchestrator state.
    pub state: SyncState,

    /// Last reachability signal seen by the connectivity observer.
    pub network: NetworkStatus,

    /// Operations waiting in the pending queue.
    pub pending_count: u32,

    /// When the last successful drain finished.
    #[ts(as = "Option<String>")]
    pub last_sync_at: Option<DateTime<Utc>>,

    /// Message of the most recent failed attempt, if any.
    pub last_error: Option<String>,
}
