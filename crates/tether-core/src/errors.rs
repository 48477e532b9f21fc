//! Error taxonomy shared by the request client and the connection manager.
//!
//! - [`ClassifiedError`]: every failure the request client can surface, tagged
//!   with an [`ErrorKind`]. It is `Clone` because a single failed call is
//!   delivered to every caller that coalesced onto it.
//! - [`ConnectionError`]: socket-level failures on a persistent connection.
//! - [`DecodeError`]: a frame that could not be turned into a message.

use std::fmt;
use std::time::Duration;

use serde_json::Value;
use thiserror::Error;

// ─────────────────────────────────────────────────────────────────────────────
// ClassifiedError
// ─────────────────────────────────────────────────────────────────────────────

/// Category of a request failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// No response was received (refused, reset, DNS, ...).
    Network,
    /// The per-call deadline elapsed before a response arrived.
    Timeout,
    /// The backend answered with a non-2xx status.
    HttpStatus(u16),
    /// The backend answered 429. `retry_after` is the advertised wait, if any.
    RateLimited {
        /// Value of the `Retry-After` header.
        retry_after: Option<Duration>,
    },
    /// The response body was not valid JSON.
    Malformed,
    /// The request was rejected locally before any I/O.
    InvalidRequest,
}

impl ErrorKind {
    /// HTTP status associated with this kind, if any.
    pub fn status(self) -> Option<u16> {
        match self {
            Self::HttpStatus(code) => Some(code),
            Self::RateLimited { .. } => Some(429),
            _ => None,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network => write!(f, "network"),
            Self::Timeout => write!(f, "timeout"),
            Self::HttpStatus(code) => write!(f, "http_{code}"),
            Self::RateLimited { .. } => write!(f, "rate_limited"),
            Self::Malformed => write!(f, "malformed"),
            Self::InvalidRequest => write!(f, "invalid_request"),
        }
    }
}

/// A request failure with its category, original message, and optional
/// structured details from the backend's error body.
#[derive(Clone, Debug, PartialEq, Error)]
#[error("{kind}: {message}")]
pub struct ClassifiedError {
    /// Failure category.
    pub kind: ErrorKind,
    /// Human-readable message.
    pub message: String,
    /// Structured details (usually the decoded error body).
    pub details: Option<Value>,
}

impl ClassifiedError {
    /// Create an error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
        }
    }

    /// Attach structured details.
    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// No response was received.
    pub fn network(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, message)
    }

    /// The call exceeded its deadline.
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// Non-2xx response.
    pub fn http_status(code: u16, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::HttpStatus(code), message)
    }

    /// 429 response.
    pub fn rate_limited(retry_after: Option<Duration>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited { retry_after }, message)
    }

    /// Unparseable body.
    pub fn malformed(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Malformed, message)
    }

    /// Local validation failure.
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    /// HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        self.kind.status()
    }

    /// Whether the backend looked unreachable or overloaded.
    pub fn is_unavailable(&self) -> bool {
        matches!(self.kind, ErrorKind::Network | ErrorKind::HttpStatus(503))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ConnectionError
// ─────────────────────────────────────────────────────────────────────────────

/// Socket-level failure on a persistent connection.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum ConnectionError {
    /// The transport could not establish the socket.
    #[error("failed to connect to {url}: {reason}")]
    ConnectFailed {
        /// Address that was dialled.
        url: String,
        /// Transport-provided reason.
        reason: String,
    },

    /// No `open` arrived within the configured window.
    #[error("connection attempt timed out after {timeout_ms}ms")]
    OpenTimeout {
        /// The open window that elapsed.
        timeout_ms: u64,
    },

    /// Read or write on an established socket failed.
    #[error("transport error: {0}")]
    Transport(String),

    /// No connection is registered under the key.
    #[error("no connection for '{0}'")]
    UnknownKey(String),

    /// An outbound message could not be serialized.
    #[error("failed to encode message: {0}")]
    Encode(String),

    /// The address cannot be turned into a WebSocket URL.
    #[error("invalid connection url '{0}'")]
    InvalidUrl(String),
}

// ─────────────────────────────────────────────────────────────────────────────
// DecodeError
// ─────────────────────────────────────────────────────────────────────────────

/// Why an inbound frame could not be decoded.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum DecodeError {
    /// The frame was not a JSON envelope.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// The envelope named a known type but its payload had the wrong shape.
    #[error("invalid payload for '{message_type}': {reason}")]
    InvalidPayload {
        /// The envelope's `type`.
        message_type: String,
        /// Serde error text.
        reason: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn classified_error_display_includes_kind() {
        let err = ClassifiedError::http_status(404, "Not Found");
        assert_eq!(err.to_string(), "http_404: Not Found");
    }

    #[test]
    fn rate_limited_reports_429() {
        let err = ClassifiedError::rate_limited(Some(Duration::from_secs(2)), "slow down");
        assert_eq!(err.status(), Some(429));
        assert_matches!(
            err.kind,
            ErrorKind::RateLimited { retry_after: Some(d) } if d == Duration::from_secs(2)
        );
    }

    #[test]
    fn unavailable_covers_network_and_503() {
        assert!(ClassifiedError::network("refused").is_unavailable());
        assert!(ClassifiedError::http_status(503, "down").is_unavailable());
        assert!(!ClassifiedError::http_status(500, "boom").is_unavailable());
        assert!(!ClassifiedError::timeout("slow").is_unavailable());
    }

    #[test]
    fn details_are_attached() {
        let err = ClassifiedError::malformed("bad json").with_details(serde_json::json!({"at": 3}));
        assert_eq!(err.details.unwrap()["at"], 3);
    }

    #[test]
    fn connection_error_display() {
        let err = ConnectionError::OpenTimeout { timeout_ms: 10_000 };
        assert!(err.to_string().contains("10000ms"));
        let err = ConnectionError::ConnectFailed {
            url: "ws://127.0.0.1:1/ws/server".into(),
            reason: "refused".into(),
        };
        assert!(err.to_string().contains("ws://127.0.0.1:1/ws/server"));
    }

    #[test]
    fn decode_error_display() {
        let err = DecodeError::InvalidPayload {
            message_type: "file-changed".into(),
            reason: "missing field `path`".into(),
        };
        assert!(err.to_string().contains("file-changed"));
    }
}
