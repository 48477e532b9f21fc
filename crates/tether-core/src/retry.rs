//! Backoff policy and retry math.
//!
//! Sync-only building blocks shared by the request client and the connection
//! manager. The async waiting lives in the runtime crates.
//!
//! - [`BackoffPolicy`]: reconnect schedule parameters
//! - [`calculate_backoff_delay`]: `min(base * multiplier^attempt, max)`
//! - [`parse_retry_after_header`]: parse a `Retry-After` HTTP header

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ─────────────────────────────────────────────────────────────────────────────
// Configuration
// ─────────────────────────────────────────────────────────────────────────────

/// Default base delay in milliseconds.
pub const DEFAULT_BASE_DELAY_MS: u64 = 1000;
/// Default growth factor between attempts.
pub const DEFAULT_MULTIPLIER: f64 = 2.0;
/// Default delay cap in milliseconds.
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;
/// Default number of reconnect attempts before giving up.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Reconnect schedule.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackoffPolicy {
    /// Delay before the first retry, in ms (default: 1000).
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Growth factor (default: 2.0).
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Upper bound on any single delay, in ms (default: 30000).
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    /// Retries allowed before the connection is declared failed (default: 5).
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_base_delay_ms() -> u64 {
    DEFAULT_BASE_DELAY_MS
}
fn default_multiplier() -> f64 {
    DEFAULT_MULTIPLIER
}
fn default_max_delay_ms() -> u64 {
    DEFAULT_MAX_DELAY_MS
}
fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            multiplier: DEFAULT_MULTIPLIER,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }
}

impl BackoffPolicy {
    /// Delay before the retry numbered `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        Duration::from_millis(calculate_backoff_delay(
            attempt,
            self.base_delay_ms,
            self.multiplier,
            self.max_delay_ms,
        ))
    }

    /// Whether another retry is allowed after `attempts` retries.
    pub fn allows(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Backoff calculation
// ─────────────────────────────────────────────────────────────────────────────

/// Exponential backoff without jitter.
///
/// Formula: `min(max_delay, base_delay * multiplier^attempt)`
///
/// # Arguments
///
/// * `attempt`: zero-based attempt index (0 for first retry)
/// * `base_delay_ms`: base delay in milliseconds
/// * `multiplier`: growth factor; values below 1.0 are treated as 1.0
/// * `max_delay_ms`: maximum delay cap
#[must_use]
pub fn calculate_backoff_delay(
    attempt: u32,
    base_delay_ms: u64,
    multiplier: f64,
    max_delay_ms: u64,
) -> u64 {
    let factor = if multiplier.is_finite() {
        multiplier.max(1.0)
    } else {
        1.0
    };
    let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
    let raw = (base_delay_ms as f64) * factor.powi(exponent);

    if !raw.is_finite() || raw >= max_delay_ms as f64 {
        return max_delay_ms;
    }
    raw.round() as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Retry-After header parsing
// ─────────────────────────────────────────────────────────────────────────────

/// Parse a `Retry-After` HTTP header value.
///
/// The value can be either:
/// - A number of seconds (e.g. `"120"`)
/// - An HTTP-date (e.g. `"Thu, 01 Dec 2025 16:00:00 GMT"`)
///
/// Returns the delay in milliseconds, or `None` if parsing fails.
#[must_use]
pub fn parse_retry_after_header(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(seconds.saturating_mul(1000));
    }

    if let Ok(date) = chrono::DateTime::parse_from_rfc2822(value) {
        let delay_ms = date
            .signed_duration_since(chrono::Utc::now())
            .num_milliseconds();
        return Some(u64::try_from(delay_ms).unwrap_or(0));
    }

    None
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
