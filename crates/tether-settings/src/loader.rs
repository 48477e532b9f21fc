//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`TetherSettings::default()`]
//! 2. If `~/.tether/settings.json` exists, deep-merge user values over defaults
//! 3. Apply `TETHER_*` environment overrides (highest priority)
//! 4. Validate the result
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::{debug, warn};

use crate::errors::Result;
use crate::types::TetherSettings;

/// Resolve the path to the settings file (`~/.tether/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".tether").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<TetherSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// A missing file yields defaults. Invalid JSON or an invalid merged value is
/// an error.
pub fn load_settings_from_path(path: &Path) -> Result<TetherSettings> {
    load_with(path, |name| std::env::var(name).ok())
}

fn load_with(path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<TetherSettings> {
    let defaults = serde_json::to_value(TetherSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: TetherSettings = serde_json::from_value(merged)?;
    apply_overrides(&mut settings, lookup);
    settings.validate()?;
    Ok(settings)
}

/// Recursive deep merge of two JSON values.
pub fn deep_merge(target: Value, source: Value) -> Value {
    match (target, source) {
        (Value::Object(mut target_map), Value::Object(source_map)) => {
            for (key, source_val) in source_map {
                if source_val.is_null() {
                    continue;
                }
                let merged = match target_map.remove(&key) {
                    Some(target_val) => deep_merge(target_val, source_val),
                    None => source_val,
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Apply `TETHER_*` environment variable overrides.
///
/// Integers must parse and fall within the listed range; anything else is
/// logged and ignored.
pub fn apply_env_overrides(settings: &mut TetherSettings) {
    apply_overrides(settings, |name| std::env::var(name).ok());
}

fn apply_overrides(settings: &mut TetherSettings, lookup: impl Fn(&str) -> Option<String>) {
    let env = EnvReader { lookup };

    // ── HTTP ────────────────────────────────────────────────────────
    if let Some(v) = env.string("TETHER_BASE_URL") {
        settings.http.base_url = v;
    }
    if let Some(v) = env.u64("TETHER_REQUEST_TIMEOUT_MS", 1, 3_600_000) {
        settings.http.request_timeout_ms = v;
    }
    if let Some(v) = env.u64("TETHER_DEDUP_GRACE_MS", 0, 60_000) {
        settings.http.dedup_grace_ms = v;
    }
    if let Some(v) = env.u64("TETHER_RATE_LIMIT_FALLBACK_MS", 0, 600_000) {
        settings.http.rate_limit_fallback_ms = v;
    }
    if let Some(v) = env.u64("TETHER_UNAVAILABLE_THRESHOLD", 1, 1_000) {
        settings.http.unavailable_threshold = v as u32;
    }

    // ── Connection ──────────────────────────────────────────────────
    if let Some(v) = env.u64("TETHER_RECONNECT_BASE_MS", 1, 600_000) {
        settings.connection.reconnect_base_ms = v;
    }
    if let Some(v) = env.u64("TETHER_RECONNECT_MAX_DELAY_MS", 1, 3_600_000) {
        settings.connection.reconnect_max_delay_ms = v;
    }
    if let Some(v) = env.u64("TETHER_MAX_RECONNECT_ATTEMPTS", 0, 1_000) {
        settings.connection.max_reconnect_attempts = v as u32;
    }
    if let Some(v) = env.u64("TETHER_OPEN_TIMEOUT_MS", 1, 600_000) {
        settings.connection.open_timeout_ms = v;
    }
    if let Some(v) = env.u64("TETHER_HEARTBEAT_INTERVAL_MS", 0, 3_600_000) {
        settings.connection.heartbeat_interval_ms = v;
    }
    if let Some(v) = env.usize("TETHER_QUEUE_CAPACITY", 1, 100_000) {
        settings.connection.queue_capacity = v;
    }

    // ── Logging ─────────────────────────────────────────────────────
    if let Some(v) = env.string("TETHER_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.trim().parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn string(&self, name: &str) -> Option<String> {
        (self.lookup)(name).filter(|v| !v.is_empty())
    }

    fn u64(&self, name: &str, min: u64, max: u64) -> Option<u64> {
        let val = (self.lookup)(name)?;
        let result = parse_u64_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid integer env var, ignoring");
        }
        result
    }

    fn usize(&self, name: &str, min: usize, max: usize) -> Option<usize> {
        let val = (self.lookup)(name)?;
        let result = parse_usize_range(&val, min, max);
        if result.is_none() {
            warn!(key = name, value = %val, "invalid integer env var, ignoring");
        }
        result
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::errors::SettingsError;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn vars(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let merged = deep_merge(
            json!({"http": {"baseUrl": "a", "dedupGraceMs": 1000}}),
            json!({"http": {"baseUrl": "b"}}),
        );
        assert_eq!(merged["http"]["baseUrl"], "b");
        assert_eq!(merged["http"]["dedupGraceMs"], 1000);
    }

    #[test]
    fn merge_null_preserves_target() {
        let merged = deep_merge(json!({"a": 1}), json!({"a": null}));
        assert_eq!(merged["a"], 1);
    }

    #[test]
    fn merge_array_replace() {
        let merged = deep_merge(json!({"items": [1, 2, 3]}), json!({"items": [4]}));
        assert_eq!(merged["items"], json!([4]));
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let merged = deep_merge(json!({"a": {"nested": true}}), json!({"a": 42}));
        assert_eq!(merged["a"], 42);
    }

    // ── loading ─────────────────────────────────────────────────────

    #[test]
    fn missing_file_returns_defaults() {
        let settings = load_with(Path::new("/nonexistent/settings.json"), vars(&[])).unwrap();
        assert_eq!(settings, TetherSettings::default());
    }

    #[test]
    fn partial_file_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"http": {"baseUrl": "http://localhost:9000"}, "connection": {"maxReconnectAttempts": 3}}"#,
        )
        .unwrap();

        let settings = load_with(&path, vars(&[])).unwrap();
        assert_eq!(settings.http.base_url, "http://localhost:9000");
        assert_eq!(settings.connection.max_reconnect_attempts, 3);
        assert_eq!(settings.connection.reconnect_base_ms, 1_000);
        assert_eq!(settings.http.request_timeout_ms, 30_000);
    }

    #[test]
    fn invalid_json_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert_matches!(load_with(&path, vars(&[])), Err(SettingsError::Json(_)));
    }

    #[test]
    fn invalid_value_in_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"connection": {"queueCapacity": 0}}"#).unwrap();
        assert_matches!(
            load_with(&path, vars(&[])),
            Err(SettingsError::InvalidValue(_))
        );
    }

    #[test]
    fn env_wins_over_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, r#"{"connection": {"queueCapacity": 50}}"#).unwrap();

        let settings = load_with(
            &path,
            vars(&[
                ("TETHER_QUEUE_CAPACITY", "7"),
                ("TETHER_BASE_URL", "http://10.0.0.2:8765"),
                ("TETHER_LOG_LEVEL", "debug"),
            ]),
        )
        .unwrap();
        assert_eq!(settings.connection.queue_capacity, 7);
        assert_eq!(settings.http.base_url, "http://10.0.0.2:8765");
        assert_eq!(settings.logging.level, "debug");
    }

    #[test]
    fn out_of_range_env_is_ignored() {
        let mut settings = TetherSettings::default();
        apply_overrides(
            &mut settings,
            vars(&[
                ("TETHER_QUEUE_CAPACITY", "0"),
                ("TETHER_OPEN_TIMEOUT_MS", "soon"),
                ("TETHER_BASE_URL", ""),
            ]),
        );
        assert_eq!(settings, TetherSettings::default());
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_u64_range_bounds() {
        assert_eq!(parse_u64_range("5", 1, 10), Some(5));
        assert_eq!(parse_u64_range(" 10 ", 1, 10), Some(10));
        assert_eq!(parse_u64_range("11", 1, 10), None);
        assert_eq!(parse_u64_range("-1", 0, 10), None);
    }

    #[test]
    fn parse_usize_range_bounds() {
        assert_eq!(parse_usize_range("100", 1, 100), Some(100));
        assert_eq!(parse_usize_range("0", 1, 100), None);
    }
}
