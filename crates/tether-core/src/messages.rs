//! Message model for persistent connections.
//!
//! Every frame is an [`Envelope`] of the form `{type, payload, id, timestamp}`. The
//! `type` string selects the payload shape; [`decode`] turns a raw frame into
//! either a typed [`Message`] or, for a `type` outside the known set, the
//! untouched envelope so the caller can warn and carry on.
//!
//! Decoding is two-stage (envelope first, payload second) so an unknown type
//! never fails the frame, and a known type with a bad payload is reported as
//! [`DecodeError::InvalidPayload`] rather than as garbage.

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::errors::DecodeError;
use crate::ids::MessageId;

// ─────────────────────────────────────────────────────────────────────────────
// Envelope
// ─────────────────────────────────────────────────────────────────────────────

/// The outer wrapper common to all frames.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// Wire name of the message type.
    #[serde(rename = "type")]
    pub message_type: String,
    /// Type-specific payload.
    #[serde(default)]
    pub payload: Value,
    /// Unique per message.
    #[serde(default)]
    pub id: MessageId,
    /// Creation time. Serialized as epoch milliseconds; RFC 3339 strings are
    /// accepted on input.
    #[serde(with = "timestamp", default = "Utc::now")]
    pub timestamp: DateTime<Utc>,
}

impl Envelope {
    /// Build an envelope with a fresh id and the current time.
    pub fn new(message_type: impl Into<String>, payload: Value) -> Self {
        Self {
            message_type: message_type.into(),
            payload,
            id: MessageId::new(),
            timestamp: Utc::now(),
        }
    }

    /// Heartbeat probe.
    pub fn ping() -> Self {
        Self::new(MessageType::Ping.as_str(), json!({}))
    }

    /// Heartbeat reply.
    pub fn pong() -> Self {
        Self::new(MessageType::Pong.as_str(), json!({}))
    }

    /// Parse a raw text frame.
    pub fn parse(text: &str) -> Result<Self, DecodeError> {
        serde_json::from_str(text).map_err(|e| DecodeError::InvalidEnvelope(e.to_string()))
    }

    /// Serialize to the wire form.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// The known type this envelope carries, if any.
    pub fn known_type(&self) -> Option<MessageType> {
        MessageType::from_wire(&self.message_type)
    }
}

mod timestamp {
    use chrono::{DateTime, Utc};
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_i64(ts.timestamp_millis())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Millis(i64),
            Text(String),
        }

        match Raw::deserialize(d)? {
            Raw::Millis(ms) => DateTime::from_timestamp_millis(ms)
                .ok_or_else(|| D::Error::custom("timestamp out of range")),
            Raw::Text(s) => DateTime::parse_from_rfc3339(&s)
                .map(|dt| dt.with_timezone(&Utc))
                .map_err(D::Error::custom),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Message types
// ─────────────────────────────────────────────────────────────────────────────

/// The closed set of recognised message types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// An item's content or metadata changed.
    ItemUpdated,
    /// An item began executing.
    ExecutionStarted,
    /// An item finished executing.
    ExecutionCompleted,
    /// An item's execution failed.
    ExecutionFailed,
    /// The backend's overall status changed.
    ServerStatusChanged,
    /// A watched file changed on disk.
    FileChanged,
    /// The backend reported an error.
    Error,
    /// Heartbeat probe.
    Ping,
    /// Heartbeat reply.
    Pong,
}

impl MessageType {
    /// Every known type, in wire order.
    pub const ALL: [Self; 9] = [
        Self::ItemUpdated,
        Self::ExecutionStarted,
        Self::ExecutionCompleted,
        Self::ExecutionFailed,
        Self::ServerStatusChanged,
        Self::FileChanged,
        Self::Error,
        Self::Ping,
        Self::Pong,
    ];

    /// Wire name.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ItemUpdated => "item-updated",
            Self::ExecutionStarted => "execution-started",
            Self::ExecutionCompleted => "execution-completed",
            Self::ExecutionFailed => "execution-failed",
            Self::ServerStatusChanged => "server-status-changed",
            Self::FileChanged => "file-changed",
            Self::Error => "error",
            Self::Ping => "ping",
            Self::Pong => "pong",
        }
    }

    /// Look up a wire name. `None` for anything outside the known set.
    pub fn from_wire(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }

    /// Ping and pong never reach subscribers.
    pub fn is_heartbeat(self) -> bool {
        matches!(self, Self::Ping | Self::Pong)
    }
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Payloads
// ─────────────────────────────────────────────────────────────────────────────

/// Payload of `item-updated`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUpdated {
    /// Item name.
    pub name: String,
    /// New item status, when the backend reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    /// Backend-specific item data.
    #[serde(default)]
    pub data: Value,
}

/// Payload of `execution-started`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStarted {
    /// Item name.
    pub name: String,
    /// Backend execution id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
}

/// Payload of `execution-completed`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionCompleted {
    /// Item name.
    pub name: String,
    /// Backend execution id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    /// Wall time of the execution.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    /// Execution output.
    #[serde(default)]
    pub result: Value,
}

/// Payload of `execution-failed`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionFailed {
    /// Item name.
    pub name: String,
    /// Backend execution id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<String>,
    /// Failure description.
    pub error: String,
}

/// Payload of `server-status-changed`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerStatusChanged {
    /// New status label (e.g. `ready`, `busy`, `shutting-down`).
    pub status: String,
    /// Optional human-readable detail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Kind of filesystem change.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileChangeKind {
    /// File created.
    Created,
    /// File modified.
    #[default]
    Modified,
    /// File deleted.
    Deleted,
    /// Any other change label.
    #[serde(other)]
    Other,
}

/// Payload of `file-changed`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileChanged {
    /// Path of the changed file, as reported by the backend.
    pub path: String,
    /// What happened to it.
    #[serde(default)]
    pub change: FileChangeKind,
}

/// Payload of `error`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Error description.
    pub message: String,
    /// Machine-readable code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Extra context.
    #[serde(default)]
    pub details: Value,
}

/// A decoded payload; the variant always matches the envelope `type`.
#[derive(Clone, Debug, PartialEq)]
pub enum MessageBody {
    /// `item-updated`
    ItemUpdated(ItemUpdated),
    /// `execution-started`
    ExecutionStarted(ExecutionStarted),
    /// `execution-completed`
    ExecutionCompleted(ExecutionCompleted),
    /// `execution-failed`
    ExecutionFailed(ExecutionFailed),
    /// `server-status-changed`
    ServerStatusChanged(ServerStatusChanged),
    /// `file-changed`
    FileChanged(FileChanged),
    /// `error`
    Error(ErrorPayload),
    /// `ping`
    Ping,
    /// `pong`
    Pong,
}

impl MessageBody {
    /// The type tag for this body.
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::ItemUpdated(_) => MessageType::ItemUpdated,
            Self::ExecutionStarted(_) => MessageType::ExecutionStarted,
            Self::ExecutionCompleted(_) => MessageType::ExecutionCompleted,
            Self::ExecutionFailed(_) => MessageType::ExecutionFailed,
            Self::ServerStatusChanged(_) => MessageType::ServerStatusChanged,
            Self::FileChanged(_) => MessageType::FileChanged,
            Self::Error(_) => MessageType::Error,
            Self::Ping => MessageType::Ping,
            Self::Pong => MessageType::Pong,
        }
    }

    fn from_payload(message_type: MessageType, payload: Value) -> Result<Self, DecodeError> {
        fn typed<T: DeserializeOwned>(t: MessageType, payload: Value) -> Result<T, DecodeError> {
            serde_json::from_value(payload).map_err(|e| DecodeError::InvalidPayload {
                message_type: t.as_str().to_owned(),
                reason: e.to_string(),
            })
        }

        Ok(match message_type {
            MessageType::ItemUpdated => Self::ItemUpdated(typed(message_type, payload)?),
            MessageType::ExecutionStarted => Self::ExecutionStarted(typed(message_type, payload)?),
            MessageType::ExecutionCompleted => {
                Self::ExecutionCompleted(typed(message_type, payload)?)
            }
            MessageType::ExecutionFailed => Self::ExecutionFailed(typed(message_type, payload)?),
            MessageType::ServerStatusChanged => {
                Self::ServerStatusChanged(typed(message_type, payload)?)
            }
            MessageType::FileChanged => Self::FileChanged(typed(message_type, payload)?),
            MessageType::Error => Self::Error(typed(message_type, payload)?),
            MessageType::Ping => Self::Ping,
            MessageType::Pong => Self::Pong,
        })
    }
}

/// A typed message: envelope metadata plus a decoded body.
#[derive(Clone, Debug, PartialEq)]
pub struct Message {
    /// Envelope id.
    pub id: MessageId,
    /// Envelope timestamp.
    pub timestamp: DateTime<Utc>,
    /// Decoded payload.
    pub body: MessageBody,
}

impl Message {
    /// The type tag for this message.
    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }
}

/// Result of decoding a frame.
#[derive(Clone, Debug, PartialEq)]
pub enum Decoded {
    /// A recognised type with a well-formed payload.
    Known(Message),
    /// A `type` outside the known set. Carried as-is.
    Unknown(Envelope),
}

/// Decode a raw text frame.
pub fn decode(text: &str) -> Result<Decoded, DecodeError> {
    decode_envelope(Envelope::parse(text)?)
}

/// Decode an already-parsed envelope.
pub fn decode_envelope(envelope: Envelope) -> Result<Decoded, DecodeError> {
    let Some(message_type) = envelope.known_type() else {
        return Ok(Decoded::Unknown(envelope));
    };
    let body = MessageBody::from_payload(message_type, envelope.payload)?;
    Ok(Decoded::Known(Message {
        id: envelope.id,
        timestamp: envelope.timestamp,
        body,
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
