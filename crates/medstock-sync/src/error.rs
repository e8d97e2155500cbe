//! # Sync Error Types
//!
//! Error types for the sync layer.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │   Persistence   │  │      Transport          │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Persistence    │  │  Transport              │ │
//! │  │  ConfigLoad...  │  │  (CacheError)   │  │  Timeout                │ │
//! │  │  ConfigSave...  │  │                 │  │  Reconcile              │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐                             │
//! │  │   Validation    │  │    Internal     │                             │
//! │  │                 │  │                 │                             │
//! │  │  Validation     │  │  ChannelError   │                             │
//! │  │                 │  │  Internal       │                             │
//! │  └─────────────────┘  └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of these reach the caller of `sync_pending_changes`: a failed attempt
//! is reported through [`SyncState::Error`](medstock_core::SyncState) carrying
//! the error's `Display` text.

use medstock_cache::CacheError;
use medstock_core::ValidationError;
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Sync error type covering every failure the sync layer can observe.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid sync configuration.
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Persistence Errors
    // =========================================================================
    /// The queue could not be read from or written to the cache.
    #[error("Queue storage error: {0}")]
    Persistence(#[from] CacheError),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// The remote rejected or failed to receive an operation.
    #[error("Dispatch of operation {operation_id} failed: {message}")]
    Transport {
        operation_id: String,
        message: String,
        retryable: bool,
    },

    /// Dispatch did not complete in time.
    #[error("Dispatch of operation {operation_id} timed out after {secs} seconds")]
    Timeout { operation_id: String, secs: u64 },

    /// The full reconciliation pass after a forced sync failed.
    #[error("Reconciliation failed: {message}")]
    Reconcile { message: String, retryable: bool },

    // =========================================================================
    // Validation Errors
    // =========================================================================
    /// Rejected before touching the queue.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Internal sync error.
    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

impl From<tokio::task::JoinError> for SyncError {
    fn from(err: tokio::task::JoinError) -> Self {
        SyncError::Internal(format!("sync task failed: {}", err))
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

impl SyncError {
    /// Returns true if a later attempt may succeed without intervention.
    ///
    /// ## Retryable Errors
    /// - Timeouts
    /// - Transport and reconcile failures the remote marked transient
    /// - Pool exhaustion on the cache database
    ///
    /// ## Non-Retryable Errors
    /// - Configuration errors
    /// - Validation errors
    /// - Corrupt queue data
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Timeout { .. } => true,
            SyncError::Transport { retryable, .. } => *retryable,
            SyncError::Reconcile { retryable, .. } => *retryable,
            SyncError::Persistence(CacheError::ConnectionFailed(_)) => true,
            _ => false,
        }
    }

    /// Returns true if the queue's storage medium failed.
    pub fn is_persistence_error(&self) -> bool {
        matches!(self, SyncError::Persistence(_))
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}
