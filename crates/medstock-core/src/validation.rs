//! # Validation
//!
//! Checks applied before an operation is accepted into the pending queue.
//! A dedup key is the queue's only identity, so an empty or malformed key would
//! silently merge unrelated intents.

use crate::error::ValidationError;
use crate::types::SyncOperation;
use crate::MAX_IDENTIFIER_LEN;

/// Convenience type alias for validation results.
pub type ValidationResult<T> = Result<T, ValidationError>;

fn validate_identifier(field: &str, value: &str) -> ValidationResult<()> {
    if value.trim().is_empty() {
        return Err(ValidationError::Required {
            field: field.to_string(),
        });
    }

    if value.chars().count() > MAX_IDENTIFIER_LEN {
        return Err(ValidationError::TooLong {
            field: field.to_string(),
            max: MAX_IDENTIFIER_LEN,
        });
    }

    if value.chars().any(char::is_control) {
        return Err(ValidationError::InvalidFormat {
            field: field.to_string(),
            reason: "contains control characters".to_string(),
        });
    }

    Ok(())
}

/// Validates a caller-supplied dedup identifier.
pub fn validate_dedup_key(key: &str) -> ValidationResult<()> {
    validate_identifier("dedup_key", key)
}

/// Validates a remote entity identifier.
pub fn validate_entity_id(entity_id: &str) -> ValidationResult<()> {
    validate_identifier("entity_id", entity_id)
}

/// Validates an operation before it is enqueued.
pub fn validate_operation(operation: &SyncOperation) -> ValidationResult<()> {
    validate_identifier("id", &operation.id)?;
    validate_entity_id(&operation.entity_id)
}
