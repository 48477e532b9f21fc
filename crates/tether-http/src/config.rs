//! Request client configuration.

use std::time::Duration;

use tether_settings::HttpSettings;

/// Runtime configuration for [`RequestClient`](crate::RequestClient).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestClientConfig {
    /// Backend base address, without a trailing slash.
    pub base_url: String,
    /// Deadline for calls that set no timeout of their own.
    pub request_timeout: Duration,
    /// How long a settled dedup entry stays addressable.
    pub dedup_grace: Duration,
    /// Wait before retrying a 429 that carried no usable `Retry-After`.
    pub rate_limit_fallback: Duration,
    /// Consecutive unavailable outcomes before fallback mode.
    pub unavailable_threshold: u32,
}

impl RequestClientConfig {
    /// Defaults with a different base address.
    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        Self {
            base_url: normalize_base(base_url.into()),
            ..Self::default()
        }
    }
}

impl Default for RequestClientConfig {
    fn default() -> Self {
        Self::from(&HttpSettings::default())
    }
}

impl From<&HttpSettings> for RequestClientConfig {
    fn from(s: &HttpSettings) -> Self {
        Self {
            base_url: normalize_base(s.base_url.clone()),
            request_timeout: Duration::from_millis(s.request_timeout_ms),
            dedup_grace: Duration::from_millis(s.dedup_grace_ms),
            rate_limit_fallback: Duration::from_millis(s.rate_limit_fallback_ms),
            unavailable_threshold: s.unavailable_threshold.max(1),
        }
    }
}

fn normalize_base(mut base: String) -> String {
    while base.ends_with('/') {
        let _ = base.pop();
    }
    base
}
