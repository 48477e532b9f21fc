//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` and `#[serde(default)]`,
//! so a partial JSON file only needs the keys it changes.

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SettingsError};

/// Root settings type.
///
/// ```json
/// {
///   "http": { "baseUrl": "http://127.0.0.1:9000" },
///   "connection": { "maxReconnectAttempts": 3 }
/// }
/// ```
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct TetherSettings {
    /// Request client settings.
    pub http: HttpSettings,
    /// Persistent connection settings.
    pub connection: ConnectionSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl TetherSettings {
    /// Reject values that deserialize fine but would break the runtime.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: &str| Err(SettingsError::InvalidValue(msg.to_owned()));

        if self.http.base_url.trim().is_empty() {
            return invalid("http.baseUrl must not be empty");
        }
        if self.http.request_timeout_ms == 0 {
            return invalid("http.requestTimeoutMs must be > 0");
        }
        if self.http.unavailable_threshold == 0 {
            return invalid("http.unavailableThreshold must be > 0");
        }
        if self.connection.queue_capacity == 0 {
            return invalid("connection.queueCapacity must be > 0");
        }
        let multiplier = self.connection.reconnect_multiplier;
        if !multiplier.is_finite() || multiplier < 1.0 {
            return invalid("connection.reconnectMultiplier must be >= 1.0");
        }
        if self.connection.reconnect_max_delay_ms < self.connection.reconnect_base_ms {
            return invalid("connection.reconnectMaxDelayMs must be >= reconnectBaseMs");
        }
        if self.connection.open_timeout_ms == 0 {
            return invalid("connection.openTimeoutMs must be > 0");
        }
        Ok(())
    }
}

/// Request client settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct HttpSettings {
    /// Backend base address.
    pub base_url: String,
    /// Per-call deadline when the request sets none.
    pub request_timeout_ms: u64,
    /// How long a settled dedup entry stays addressable.
    pub dedup_grace_ms: u64,
    /// Wait before the automatic retry of a 429 without `Retry-After`.
    pub rate_limit_fallback_ms: u64,
    /// Consecutive unavailable responses before fallback mode.
    pub unavailable_threshold: u32,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8765".to_string(),
            request_timeout_ms: 30_000,
            dedup_grace_ms: 1_000,
            rate_limit_fallback_ms: 1_000,
            unavailable_threshold: 3,
        }
    }
}

/// Persistent connection settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConnectionSettings {
    /// Delay before the first reconnect.
    pub reconnect_base_ms: u64,
    /// Growth factor between reconnect delays.
    pub reconnect_multiplier: f64,
    /// Cap on any single reconnect delay.
    pub reconnect_max_delay_ms: u64,
    /// Reconnects allowed before the connection is declared failed.
    pub max_reconnect_attempts: u32,
    /// How long an attempt may take to open.
    pub open_timeout_ms: u64,
    /// Ping interval while connected. Zero disables the heartbeat.
    pub heartbeat_interval_ms: u64,
    /// Outbound queue bound per connection.
    pub queue_capacity: usize,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            reconnect_base_ms: 1_000,
            reconnect_multiplier: 2.0,
            reconnect_max_delay_ms: 30_000,
            max_reconnect_attempts: 5,
            open_timeout_ms: 10_000,
            heartbeat_interval_ms: 30_000,
            queue_capacity: 100,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    #[test]
    fn defaults_are_valid() {
        let settings = TetherSettings::default();
        settings.validate().unwrap();
        assert_eq!(settings.http.base_url, "http://127.0.0.1:8765");
        assert_eq!(settings.http.dedup_grace_ms, 1_000);
        assert_eq!(settings.connection.queue_capacity, 100);
        assert_eq!(settings.connection.max_reconnect_attempts, 5);
        assert_eq!(settings.logging.level, "warn");
    }

    #[test]
    fn serializes_camel_case() {
        let json = serde_json::to_value(TetherSettings::default()).unwrap();
        assert_eq!(json["http"]["requestTimeoutMs"], 30_000);
        assert_eq!(json["connection"]["heartbeatIntervalMs"], 30_000);
    }

    #[test]
    fn zero_capacity_rejected() {
        let mut settings = TetherSettings::default();
        settings.connection.queue_capacity = 0;
        assert_matches!(settings.validate(), Err(SettingsError::InvalidValue(msg)) if msg.contains("queueCapacity"));
    }

    #[test]
    fn shrinking_multiplier_rejected() {
        let mut settings = TetherSettings::default();
        settings.connection.reconnect_multiplier = 0.5;
        assert!(settings.validate().is_err());
        settings.connection.reconnect_multiplier = f64::NAN;
        assert!(settings.validate().is_err());
    }
}
