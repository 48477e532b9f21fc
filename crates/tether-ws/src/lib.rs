//! # tether-ws
//!
//! Persistent-connection manager for the tether backend.
//!
//! - [`ConnectionManager`]: table of independent keyed connections, each
//!   with its own reconnect, heartbeat and outbound-queue lifecycle
//! - [`ConnectionHandle`]: per-key view returned by `connect`
//! - [`ConnectionEvent`]: lifecycle notifications and decoded messages,
//!   published generically and per message type
//! - [`Connector`]: transport seam; [`TungsteniteConnector`] by default
//! - [`channel_url`]: WebSocket address for a logical [`Channel`]

#![deny(unsafe_code)]

pub mod channels;
pub mod config;
mod connection;
mod dispatch;
mod driver;
pub mod events;
pub mod manager;
pub mod queue;
pub mod state;
pub mod transport;

pub use channels::{Channel, channel_url};
pub use config::ConnectionConfig;
pub use events::ConnectionEvent;
pub use manager::{ConnectionHandle, ConnectionManager};
pub use queue::OutboundQueue;
pub use state::{ConnectionState, ConnectionStatus, Effect, Transition, Trigger};
pub use transport::{
    CLOSE_ABNORMAL, CLOSE_NORMAL, CLOSE_NO_STATUS, Connector, Frame, FrameSink, FrameStream,
    TungsteniteConnector,
};
