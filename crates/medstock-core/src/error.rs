//! # Error Types
//!
//! Error types for medstock-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  medstock-core errors (this file)                                      │
//! │  ├── CoreError        - Payload encoding, wrapped validation           │
//! │  └── ValidationError  - Identifier / operation validation failures     │
//! │                                                                         │
//! │  medstock-cache errors (separate crate)                                │
//! │  └── CacheError       - Storage medium failures, corrupt entries       │
//! │                                                                         │
//! │  medstock-sync errors (separate crate)                                 │
//! │  └── SyncError        - Persistence, transport, configuration          │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → SyncError → SyncState::Error      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised while building or decoding sync data.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A payload could not be encoded from, or decoded into, a domain value.
    ///
    /// ## When This Occurs
    /// - A domain repository serializes a value serde cannot represent
    /// - A transport decodes a payload into the wrong domain type
    #[error("Payload encoding failed: {0}")]
    PayloadEncoding(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::PayloadEncoding(err.to_string())
    }
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Invalid format (e.g. control characters in an identifier).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
