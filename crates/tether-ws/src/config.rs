//! Connection manager configuration.

use std::time::Duration;

use tether_core::BackoffPolicy;
use tether_settings::ConnectionSettings;

/// Runtime configuration shared by every connection of one manager.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionConfig {
    /// Reconnect schedule.
    pub backoff: BackoffPolicy,
    /// How long an attempt may take to open.
    pub open_timeout: Duration,
    /// Ping interval while connected; `None` disables the heartbeat.
    pub heartbeat_interval: Option<Duration>,
    /// Outbound queue bound per connection.
    pub queue_capacity: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self::from(&ConnectionSettings::default())
    }
}

impl From<&ConnectionSettings> for ConnectionConfig {
    fn from(s: &ConnectionSettings) -> Self {
        Self {
            backoff: BackoffPolicy {
                base_delay_ms: s.reconnect_base_ms,
                multiplier: s.reconnect_multiplier,
                max_delay_ms: s.reconnect_max_delay_ms,
                max_attempts: s.max_reconnect_attempts,
            },
            open_timeout: Duration::from_millis(s.open_timeout_ms),
            heartbeat_interval: (s.heartbeat_interval_ms > 0)
                .then_some(Duration::from_millis(s.heartbeat_interval_ms)),
            queue_capacity: s.queue_capacity.max(1),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_follow_settings() {
        let config = ConnectionConfig::default();
        assert_eq!(config.backoff.max_attempts, 5);
        assert_eq!(config.open_timeout, Duration::from_secs(10));
        assert_eq!(config.heartbeat_interval, Some(Duration::from_secs(30)));
        assert_eq!(config.queue_capacity, 100);
    }

    #[test]
    fn zero_heartbeat_disables() {
        let settings = ConnectionSettings {
            heartbeat_interval_ms: 0,
            ..ConnectionSettings::default()
        };
        assert!(ConnectionConfig::from(&settings).heartbeat_interval.is_none());
    }
}
