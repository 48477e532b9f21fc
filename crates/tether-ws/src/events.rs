//! Notifications published by the connection manager.
//!
//! Every inbound message of a known type is published twice: once as the
//! generic [`ConnectionEvent::Message`] and once as its typed variant, so
//! subscribers can listen at either granularity.

use std::time::Duration;

use tether_core::messages::{
    ErrorPayload, ExecutionCompleted, ExecutionFailed, ExecutionStarted, FileChanged, ItemUpdated,
    ServerStatusChanged,
};
use tether_core::{DecodeError, Envelope, Message};

use crate::state::ConnectionStatus;

/// Connection-level event.
#[derive(Clone, Debug, PartialEq)]
pub enum ConnectionEvent {
    /// Any status change.
    StatusChanged {
        /// Connection key.
        key: String,
        /// Previous status.
        from: ConnectionStatus,
        /// New status.
        to: ConnectionStatus,
    },
    /// The socket opened.
    Connected {
        /// Connection key.
        key: String,
    },
    /// The connection ended without a retry.
    Disconnected {
        /// Connection key.
        key: String,
        /// Close code.
        code: u16,
        /// Close reason.
        reason: String,
    },
    /// A reconnect is scheduled.
    Reconnecting {
        /// Connection key.
        key: String,
        /// One-based retry number.
        attempt: u32,
        /// Wait before the retry.
        delay: Duration,
    },
    /// Reconnects are exhausted; terminal until the next `connect`.
    Failed {
        /// Connection key.
        key: String,
        /// Retries made.
        attempts: u32,
    },
    /// Any known, non-heartbeat message.
    Message {
        /// Connection key.
        key: String,
        /// The decoded message.
        message: Message,
    },
    /// `item-updated`
    ItemUpdated {
        /// Connection key.
        key: String,
        /// Payload.
        payload: ItemUpdated,
    },
    /// `execution-started`
    ExecutionStarted {
        /// Connection key.
        key: String,
        /// Payload.
        payload: ExecutionStarted,
    },
    /// `execution-completed`
    ExecutionCompleted {
        /// Connection key.
        key: String,
        /// Payload.
        payload: ExecutionCompleted,
    },
    /// `execution-failed`
    ExecutionFailed {
        /// Connection key.
        key: String,
        /// Payload.
        payload: ExecutionFailed,
    },
    /// `server-status-changed`
    ServerStatusChanged {
        /// Connection key.
        key: String,
        /// Payload.
        payload: ServerStatusChanged,
    },
    /// `file-changed`
    FileChanged {
        /// Connection key.
        key: String,
        /// Payload.
        payload: FileChanged,
    },
    /// `error` sent by the backend.
    ServerError {
        /// Connection key.
        key: String,
        /// Payload.
        payload: ErrorPayload,
    },
    /// A frame with a `type` outside the known set. Warning only.
    UnknownMessage {
        /// Connection key.
        key: String,
        /// The envelope as received.
        envelope: Envelope,
    },
    /// A frame that could not be decoded. Warning only.
    ProtocolError {
        /// Connection key.
        key: String,
        /// What went wrong.
        error: DecodeError,
    },
    /// The outbound queue was full and evicted its oldest frame.
    MessageDropped {
        /// Connection key.
        key: String,
        /// The evicted frame.
        frame: String,
    },
}

impl ConnectionEvent {
    /// Key of the connection this event belongs to.
    pub fn key(&self) -> &str {
        match self {
            Self::StatusChanged { key, .. }
            | Self::Connected { key }
            | Self::Disconnected { key, .. }
            | Self::Reconnecting { key, .. }
            | Self::Failed { key, .. }
            | Self::Message { key, .. }
            | Self::ItemUpdated { key, .. }
            | Self::ExecutionStarted { key, .. }
            | Self::ExecutionCompleted { key, .. }
            | Self::ExecutionFailed { key, .. }
            | Self::ServerStatusChanged { key, .. }
            | Self::FileChanged { key, .. }
            | Self::ServerError { key, .. }
            | Self::UnknownMessage { key, .. }
            | Self::ProtocolError { key, .. }
            | Self::MessageDropped { key, .. } => key,
        }
    }

    /// Short event name for logs and the CLI.
    pub fn name(&self) -> &'static str {
        match self {
            Self::StatusChanged { .. } => "status_changed",
            Self::Connected { .. } => "connected",
            Self::Disconnected { .. } => "disconnected",
            Self::Reconnecting { .. } => "reconnecting",
            Self::Failed { .. } => "failed",
            Self::Message { .. } => "message",
            Self::ItemUpdated { .. } => "item_updated",
            Self::ExecutionStarted { .. } => "execution_started",
            Self::ExecutionCompleted { .. } => "execution_completed",
            Self::ExecutionFailed { .. } => "execution_failed",
            Self::ServerStatusChanged { .. } => "server_status_changed",
            Self::FileChanged { .. } => "file_changed",
            Self::ServerError { .. } => "server_error",
            Self::UnknownMessage { .. } => "unknown_message",
            Self::ProtocolError { .. } => "protocol_error",
            Self::MessageDropped { .. } => "message_dropped",
        }
    }
}
