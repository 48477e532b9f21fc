//! # tether-core
//!
//! Shared vocabulary for the tether client crates:
//!
//! - **Branded IDs**: `MessageId`, `RequestId`
//! - **Messages**: the `{type, payload, id, timestamp}` envelope, typed
//!   payloads for every known type, and the two-stage decoder
//! - **Errors**: `ClassifiedError` for requests, `ConnectionError` for sockets,
//!   `DecodeError` for frames
//! - **Encoding**: path-segment and query-component escaping
//! - **Retry**: backoff schedule and `Retry-After` parsing
//! - **Logging**: `tracing` subscriber setup

#![deny(unsafe_code)]

pub mod encoding;
pub mod errors;
pub mod ids;
pub mod logging;
pub mod messages;
pub mod retry;

pub use errors::{ClassifiedError, ConnectionError, DecodeError, ErrorKind};
pub use ids::{MessageId, RequestId};
pub use messages::{Decoded, Envelope, Message, MessageBody, MessageType, decode};
pub use retry::BackoffPolicy;
