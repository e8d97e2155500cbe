//! # Sync Operation Types
//!
//! The queued-intent model shared by domain repositories, the pending queue and
//! the remote transport.
//!
//! ## Persisted Shape
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  SyncOperation (serde_json, inside the "pending_sync_operations" list) │
//! │                                                                         │
//! │  {                                                                      │
//! │    "id":        "6f1c…",              ← UUID v4 or caller-chosen       │
//! │    "type":      "adjust_quantity",    ← OperationKind as plain string  │
//! │    "timestamp": "2026-03-01T09:12:44Z",                                 │
//! │    "payload":   "eyJxdHkiOi0yfQ==",   ← opaque bytes, base64           │
//! │    "entity_id": "med-amoxicillin-500"                                   │
//! │  }                                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Forward Compatibility
//! Queues survive app upgrades and downgrades. `OperationKind` is persisted as a
//! bare string, so a kind written by a newer version that this build does not
//! know decodes as [`OperationKind::Other`] and is written back unchanged.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::CoreResult;

// =============================================================================
// Operation Kind
// =============================================================================

/// The kind of remote effect an operation requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum OperationKind {
    /// Create a new remote entity.
    CreateEntity,
    /// Overwrite fields of an existing remote entity.
    UpdateEntity,
    /// Delete a remote entity.
    DeleteEntity,
    /// Apply a stock quantity adjustment.
    AdjustQuantity,
    /// A kind this build does not know about, kept verbatim.
    Other(String),
}

impl OperationKind {
    /// Returns the persisted string form.
    pub fn as_str(&self) -> &str {
        match self {
            OperationKind::CreateEntity => "create_entity",
            OperationKind::UpdateEntity => "update_entity",
            OperationKind::DeleteEntity => "delete_entity",
            OperationKind::AdjustQuantity => "adjust_quantity",
            OperationKind::Other(name) => name,
        }
    }

    /// Returns true if this build understands the kind.
    pub fn is_known(&self) -> bool {
        !matches!(self, OperationKind::Other(_))
    }
}

impl From<String> for OperationKind {
    fn from(value: String) -> Self {
        match value.as_str() {
            "create_entity" => OperationKind::CreateEntity,
            "update_entity" => OperationKind::UpdateEntity,
            "delete_entity" => OperationKind::DeleteEntity,
            "adjust_quantity" => OperationKind::AdjustQuantity,
            _ => OperationKind::Other(value),
        }
    }
}

impl From<&str> for OperationKind {
    fn from(value: &str) -> Self {
        OperationKind::from(value.to_string())
    }
}

impl From<OperationKind> for String {
    fn from(kind: OperationKind) -> Self {
        match kind {
            OperationKind::Other(name) => name,
            known => known.as_str().to_string(),
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payload
// =============================================================================

/// Opaque serialized bytes describing a domain write.
///
/// The sync core never interprets these; it stores them and hands them back to
/// the remote transport. Persisted as standard base64 text.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Payload(Vec<u8>);

impl Payload {
    /// Wraps raw bytes.
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Payload(bytes.into())
    }

    /// Serializes a domain value as JSON bytes.
    ///
    /// ## Example
    /// ```rust,ignore
    /// let payload = Payload::from_json(&StockAdjustment { delta: -2 })?;
    /// ```
    pub fn from_json<T: Serialize + ?Sized>(value: &T) -> CoreResult<Self> {
        Ok(Payload(serde_json::to_vec(value)?))
    }

    /// Decodes the payload as JSON into a domain value.
    pub fn decode_json<T: DeserializeOwned>(&self) -> CoreResult<T> {
        Ok(serde_json::from_slice(&self.0)?)
    }

    /// Returns the raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Consumes the payload and returns the raw bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.0
    }

    /// Number of payload bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the payload carries no bytes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Payload(bytes)
    }
}

impl Serialize for Payload {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(&self.0))
    }
}

impl<'de> Deserialize<'de> for Payload {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD
            .decode(text.as_bytes())
            .map(Payload)
            .map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Sync Operation
// =============================================================================

/// A queued intent to apply a write on the remote store.
///
/// `id` identifies the operation itself. It is distinct from the dedup key the
/// caller supplies when enqueuing (e.g. "one pending stock edit per medicine"
/// uses the medicine id as the dedup key), and from `entity_id`, the remote
/// entity the operation acts on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncOperation {
    /// Unique operation identifier (UUID v4 unless caller-chosen).
    pub id: String,

    /// Kind of remote effect.
    #[serde(rename = "type")]
    #[ts(type = "string")]
    pub kind: OperationKind,

    /// Creation time, used for ordering and display. Not used for expiry.
    #[ts(as = "String")]
    pub timestamp: DateTime<Utc>,

    /// Opaque domain write.
    #[serde(default)]
    #[ts(type = "string")]
    pub payload: Payload,

    /// Remote entity the operation acts upon.
    #[serde(default)]
    pub entity_id: String,
}

impl SyncOperation {
    /// Creates an operation with a fresh UUID v4 id, stamped now.
    pub fn new(kind: OperationKind, entity_id: impl Into<String>, payload: Payload) -> Self {
        SyncOperation {
            id: Uuid::new_v4().to_string(),
            kind,
            timestamp: Utc::now(),
            payload,
            entity_id: entity_id.into(),
        }
    }

    /// Replaces the generated id with a caller-chosen one.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Overrides the creation timestamp (replays, imports, tests).
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Shorthand for a create-entity operation carrying a JSON payload.
    pub fn create<T: Serialize + ?Sized>(entity_id: impl Into<String>, value: &T) -> CoreResult<Self> {
        Ok(Self::new(OperationKind::CreateEntity, entity_id, Payload::from_json(value)?))
    }

    /// Shorthand for an update-entity operation carrying a JSON payload.
    pub fn update<T: Serialize + ?Sized>(entity_id: impl Into<String>, value: &T) -> CoreResult<Self> {
        Ok(Self::new(OperationKind::UpdateEntity, entity_id, Payload::from_json(value)?))
    }

    /// Shorthand for a delete-entity operation (empty payload).
    pub fn delete(entity_id: impl Into<String>) -> Self {
        Self::new(OperationKind::DeleteEntity, entity_id, Payload::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_operation_kind_string_form() {
        assert_eq!(OperationKind::AdjustQuantity.as_str(), "adjust_quantity");
        assert_eq!(OperationKind::from("delete_entity"), OperationKind::DeleteEntity);
        assert!(OperationKind::CreateEntity.is_known());
        assert!(!OperationKind::from("merge_batches").is_known());
    }

    #[test]
    fn test_unknown_kind_survives_reserialization() {
        let persisted = json!({
            "id": "op-1",
            "type": "transfer_between_aisles",
            "timestamp": "2026-03-01T09:12:44Z",
            "payload": "",
            "entity_id": "med-42"
        });

        let op: SyncOperation = serde_json::from_value(persisted).unwrap();
        assert_eq!(
            op.kind,
            OperationKind::Other("transfer_between_aisles".to_string())
        );

        let written = serde_json::to_value(&op).unwrap();
        assert_eq!(written["type"], "transfer_between_aisles");
    }

    #[test]
    fn test_payload_is_base64_on_disk() {
        let op = SyncOperation::new(OperationKind::AdjustQuantity, "med-1", Payload::new(b"hi".to_vec()));
        let value = serde_json::to_value(&op).unwrap();
        assert_eq!(value["payload"], "aGk=");
        assert_eq!(value["type"], "adjust_quantity");
    }

    #[test]
    fn test_older_record_without_payload_or_entity() {
        let persisted = json!({
            "id": "legacy",
            "type": "update_entity",
            "timestamp": "2025-11-20T08:00:00Z"
        });

        let op: SyncOperation = serde_json::from_value(persisted).unwrap();
        assert!(op.payload.is_empty());
        assert_eq!(op.entity_id, "");
    }

    #[test]
    fn test_json_payload_helpers() {
        let op = SyncOperation::update("aisle-3", &json!({ "label": "Antibiotics" })).unwrap();
        let decoded: serde_json::Value = op.payload.decode_json().unwrap();
        assert_eq!(decoded["label"], "Antibiotics");
        assert_eq!(op.kind, OperationKind::UpdateEntity);
        assert!(Uuid::parse_str(&op.id).is_ok());
    }

    #[test]
    fn test_invalid_base64_is_rejected() {
        let persisted = json!({
            "id": "op-2",
            "type": "create_entity",
            "timestamp": "2026-03-01T09:12:44Z",
            "payload": "not base64 !!",
            "entity_id": "med-1"
        });
        assert!(serde_json::from_value::<SyncOperation>(persisted).is_err());
    }
}
