//! Protocol records exchanged over the link.

use serde::{Deserialize, Serialize};

/// The status/sync record carried by every frame.
///
/// All eight fields are opaque strings and all are mandatory on the wire.
/// The all-empty record (`Message::default()`) stands for "no message".
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Message identifier chosen by the sender
    pub id: String,
    /// Command or status verb
    pub action: String,
    /// Identity of the user on the sending device
    pub user_id: String,
    /// Whether the remote task has started
    pub is_started: String,
    /// Whether the remote task has finished
    pub is_finished: String,
    /// Free-form payload, conventionally a bracketed comma list
    pub messages: String,
    /// Sender battery level
    pub battery_percentage: String,
    /// Sender free storage in GB
    #[serde(rename = "freeStorageGB")]
    pub free_storage_gb: String,
}

impl Message {
    /// The record produced by a local `send(text, id)`: only `id` and
    /// `action` are populated.
    pub fn outgoing(id: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            action: action.into(),
            ..Self::default()
        }
    }

    /// Fields in wire order.
    pub fn fields(&self) -> [&str; 8] {
        [
            &self.id,
            &self.action,
            &self.user_id,
            &self.is_started,
            &self.is_finished,
            &self.messages,
            &self.battery_percentage,
            &self.free_storage_gb,
        ]
    }

    /// Build a record from fields in wire order.
    pub fn from_fields(fields: [String; 8]) -> Self {
        let [
            id,
            action,
            user_id,
            is_started,
            is_finished,
            messages,
            battery_percentage,
            free_storage_gb,
        ] = fields;
        Self {
            id,
            action,
            user_id,
            is_started,
            is_finished,
            messages,
            battery_percentage,
            free_storage_gb,
        }
    }

    /// True for the all-empty record.
    pub fn is_empty(&self) -> bool {
        self.fields().iter().all(|f| f.is_empty())
    }

    /// The payload interpreted as a bracketed comma list.
    ///
    /// `"[a,b]"` yields `["a", "b"]`; `"[]"` and `""` yield nothing. Items are
    /// not trimmed.
    pub fn payload_items(&self) -> Vec<&str> {
        let inner = self.messages.strip_prefix('[').unwrap_or(&self.messages);
        let inner = inner.strip_suffix(']').unwrap_or(inner);
        if inner.is_empty() {
            return Vec::new();
        }
        inner.split(',').collect()
    }
}

/// Lifecycle events produced by one connection attempt.
///
/// Each attempt yields `Established` before any `TransferSucceeded`, and at
/// most one terminal `Error` or `Finished`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionResult {
    /// Socket connected; the transfer channel is running.
    Established,
    /// The peer closed the stream cleanly.
    Finished,
    /// A frame was received and decoded.
    TransferSucceeded(Message),
    /// The attempt failed or the session broke.
    Error(String),
}

impl ConnectionResult {
    /// Whether this event ends the attempt.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Finished | Self::Error(_))
    }
}
