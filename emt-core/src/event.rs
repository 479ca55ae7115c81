//! Message (event) types: the unit appended to a stream and the unit read back.
//!
//! The engine treats event payload and metadata as opaque, caller-supplied JSON —
//! it never interprets their shape. `NewEvent` is what a caller submits to
//! `append_to_stream`; `RecordedEvent` is what `read_stream` hands back, decorated
//! with the identity fields the engine assigns (`message_id`, `stream_position`,
//! `global_position`).

use crate::stream::{GlobalPosition, Partition, StreamId, StreamPosition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Default `message_kind` for application events, matching the persisted schema.
pub const MESSAGE_KIND_EVENT: &str = "E";

/// An event submitted by a caller for appending to a stream.
///
/// `data` and `metadata` are opaque JSON values; the engine stores them verbatim and
/// merges its own identity fields into `metadata` on read.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NewEvent {
    /// Event type tag (e.g. `"ItemAdded"`).
    #[serde(rename = "type")]
    pub event_type: String,
    /// Caller-supplied event payload.
    pub data: Value,
    /// Caller-supplied metadata, merged with engine-assigned identity fields on read.
    #[serde(default)]
    pub metadata: Option<Value>,
}

impl NewEvent {
    /// Construct a new event with no caller metadata.
    #[must_use]
    pub fn new(event_type: impl Into<String>, data: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            metadata: None,
        }
    }

    /// Construct a new event with caller metadata.
    #[must_use]
    pub fn with_metadata(event_type: impl Into<String>, data: Value, metadata: Value) -> Self {
        Self {
            event_type: event_type.into(),
            data,
            metadata: Some(metadata),
        }
    }
}

/// A fully persisted message, as returned by `read_stream`.
///
/// `metadata` is the caller's original metadata merged with `messageId`, `streamId`,
/// `streamPosition`, and `globalPosition`, matching the read contract in the design.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RecordedEvent {
    /// Identifier assigned by the appender at write time.
    pub message_id: String,
    /// The stream this message belongs to.
    pub stream_id: StreamId,
    /// The partition this message belongs to.
    pub partition: Partition,
    /// Event type tag.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event payload, verbatim as appended.
    pub data: Value,
    /// Merged metadata: caller-supplied fields plus engine identity fields.
    pub metadata: Value,
    /// Position of this message within its stream (1-based).
    pub stream_position: StreamPosition,
    /// Position of this message in the engine-wide sequence.
    pub global_position: GlobalPosition,
    /// Message kind, `"E"` for ordinary application events.
    pub message_kind: String,
    /// Schema version string. Preserved for bit-exact compatibility: this is written
    /// as the event's index within its append batch, not a payload schema version.
    pub message_schema_version: String,
    /// Insert timestamp, millisecond precision.
    pub created: DateTime<Utc>,
}

impl RecordedEvent {
    /// Build the merged metadata object: caller metadata plus engine identity fields.
    #[must_use]
    pub fn merge_metadata(
        caller_metadata: Option<Value>,
        message_id: &str,
        stream_id: &StreamId,
        stream_position: StreamPosition,
        global_position: GlobalPosition,
    ) -> Value {
        let mut merged = match caller_metadata {
            Some(Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };
        merged.insert("messageId".to_string(), Value::String(message_id.to_string()));
        merged.insert(
            "streamId".to_string(),
            Value::String(stream_id.as_str().to_string()),
        );
        merged.insert(
            "streamPosition".to_string(),
            Value::Number(stream_position.value().into()),
        );
        merged.insert(
            "globalPosition".to_string(),
            Value::Number(global_position.value().into()),
        );
        Value::Object(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_event_without_metadata() {
        let event = NewEvent::new("ItemAdded", serde_json::json!({"sku": "SKU-1"}));
        assert_eq!(event.event_type, "ItemAdded");
        assert!(event.metadata.is_none());
    }

    #[test]
    fn merge_metadata_adds_identity_fields() {
        let merged = RecordedEvent::merge_metadata(
            Some(serde_json::json!({"userId": "u1"})),
            "msg-1",
            &StreamId::new("cart-1"),
            StreamPosition::new(2),
            GlobalPosition::new(42),
        );

        assert_eq!(merged["userId"], "u1");
        assert_eq!(merged["messageId"], "msg-1");
        assert_eq!(merged["streamId"], "cart-1");
        assert_eq!(merged["streamPosition"], 2);
        assert_eq!(merged["globalPosition"], 42);
    }

    #[test]
    fn merge_metadata_without_caller_metadata() {
        let merged = RecordedEvent::merge_metadata(
            None,
            "msg-2",
            &StreamId::new("cart-2"),
            StreamPosition::new(1),
            GlobalPosition::new(1),
        );
        assert_eq!(merged["messageId"], "msg-2");
    }
}
