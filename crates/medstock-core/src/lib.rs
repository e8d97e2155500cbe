//! # medstock-core: Shared Sync Data Types
//!
//! This crate defines the data that flows through the offline synchronization
//! core. It has no I/O: everything here is plain data, serde shapes and
//! validation.
//!
//! ## Module Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          medstock-core                                  │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────────┐   │
//! │  │     types       │   │     status      │   │     validation      │   │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────────  │   │
//! │  │  SyncOperation  │   │  SyncState      │   │  dedup keys         │   │
//! │  │  OperationKind  │   │  NetworkStatus  │   │  entity ids         │   │
//! │  │  Payload        │   │  NetworkMedium  │   │  whole operations   │   │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────────┘   │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  error: CoreError, ValidationError                              │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Who Uses This
//! - Domain repositories build [`SyncOperation`]s when a write cannot be
//!   confirmed against the remote store.
//! - `medstock-sync` persists them, drains them and publishes [`SyncState`].
//! - UI shells render [`SyncState`] / [`NetworkStatus`] (TypeScript bindings are
//!   generated with ts-rs).

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod status;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use status::{NetworkMedium, NetworkStatus, SyncState, SyncStatus};
pub use types::{OperationKind, Payload, SyncOperation};

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Well-known cache key under which the pending-operation queue is persisted.
///
/// This is effectively an on-device schema contract: queues written by a
/// previous app version are read back from this key after an upgrade.
pub const PENDING_SYNC_OPERATIONS_KEY: &str = "pending_sync_operations";

/// Maximum length of a dedup identifier or entity id.
pub const MAX_IDENTIFIER_LEN: usize = 256;
