//! Notifications published by the request client.

use std::time::Duration;

/// Client-level event, delivered via
/// [`RequestClient::subscribe`](crate::RequestClient::subscribe).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClientEvent {
    /// The backend answered 503.
    BackendUnavailable {
        /// Request path.
        path: String,
    },
    /// The backend answered 429. The client waits `retry_after` once when it
    /// fits within the call's deadline.
    RateLimited {
        /// Request path.
        path: String,
        /// Wait the backend asked for.
        retry_after: Duration,
    },
    /// Consecutive unavailable outcomes reached the threshold.
    FallbackTriggered {
        /// Length of the failure run.
        consecutive_failures: u32,
    },
    /// A success ended fallback mode.
    BackendRecovered,
}

impl ClientEvent {
    /// Short event name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::BackendUnavailable { .. } => "backend_unavailable",
            Self::RateLimited { .. } => "rate_limited",
            Self::FallbackTriggered { .. } => "fallback_triggered",
            Self::BackendRecovered => "backend_recovered",
        }
    }
}
