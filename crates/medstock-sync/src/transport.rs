//! # Remote Transport
//!
//! The seam between the sync core and whatever talks to the remote service.
//!
//! The core never knows endpoints or wire formats. The host supplies a
//! [`RemoteTransport`] that sends one [`SyncOperation`] at a time, and
//! optionally a [`Reconciler`] that performs the full pull/push pass behind
//! `force_sync_all`.
//!
//! Dispatch must be idempotent on the remote side: a drain that fails half
//! way leaves every operation queued, so the next attempt replays the ones
//! that already went through.

use std::time::Duration;

use async_trait::async_trait;
use medstock_core::SyncOperation;
use thiserror::Error;
use tracing::debug;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Transport Error
// =============================================================================

/// Failure reported by a transport or reconciler.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TransportError {
    /// Human-readable reason.
    pub message: String,

    /// Whether a later attempt may succeed.
    pub retryable: bool,
}

impl TransportError {
    /// A transient failure (network drop, 5xx, throttling).
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// A failure that will repeat until something changes (4xx, schema).
    pub fn permanent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

// =============================================================================
// Traits
// =============================================================================

/// Sends queued operations to the remote service.
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Delivers a single operation. `Ok` means the remote accepted it.
    async fn dispatch(&self, operation: &SyncOperation) -> Result<(), TransportError>;
}

/// Full reconciliation pass run after a forced drain.
#[async_trait]
pub trait Reconciler: Send + Sync {
    async fn reconcile(&self) -> Result<(), TransportError>;
}

// =============================================================================
// Dispatch Helper
// =============================================================================

/// Dispatches `operation`, bounding the wait by `timeout`.
pub(crate) async fn dispatch_with_timeout(
    transport: &dyn RemoteTransport,
    operation: &SyncOperation,
    timeout: Duration,
) -> SyncResult<()> {
    debug!(
        operation_id = %operation.id,
        kind = %operation.kind,
        entity_id = %operation.entity_id,
        "Dispatching operation"
    );

    match tokio::time::timeout(timeout, transport.dispatch(operation)).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(SyncError::Transport {
            operation_id: operation.id.clone(),
            message: e.message,
            retryable: e.retryable,
        }),
        Err(_) => Err(SyncError::Timeout {
            operation_id: operation.id.clone(),
            secs: timeout.as_secs(),
        }),
    }
}
