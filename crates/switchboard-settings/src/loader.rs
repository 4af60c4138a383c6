//! Settings loading with deep merge and environment variable overrides.
//!
//! Loading flow:
//! 1. Start with compiled [`SwitchboardSettings::default()`]
//! 2. If `~/.switchboard/settings.json` exists, deep-merge user values over defaults
//! 3. Apply environment variable overrides (highest priority)
//! 4. Validate cross-field constraints
//!
//! Deep merge rules:
//! - Objects are merged recursively (source overrides target per-key)
//! - Arrays and primitives are replaced entirely by source
//! - Null values in source are skipped (preserving target)

use std::path::{Path, PathBuf};

use serde_json::Value;
use tracing::debug;

use crate::errors::{Result, SettingsError};
use crate::types::{SwitchboardSettings, ThresholdTiers};

/// Resolve the path to the settings file (`~/.switchboard/settings.json`).
pub fn settings_path() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".switchboard").join("settings.json")
}

/// Load settings from the default path with env var overrides.
pub fn load_settings() -> Result<SwitchboardSettings> {
    load_settings_from_path(&settings_path())
}

/// Load settings from a specific path with env var overrides.
///
/// If the file does not exist, returns defaults. Invalid JSON or values that
/// fail [`validate`] are errors.
pub fn load_settings_from_path(path: &Path) -> Result<SwitchboardSettings> {
    let defaults = serde_json::to_value(SwitchboardSettings::default())?;

    let merged = if path.exists() {
        debug!(?path, "loading settings from file");
        let content = std::fs::read_to_string(path)?;
        let user: Value = serde_json::from_str(&content)?;
        deep_merge(defaults, user)
    } else {
        debug!(?path, "settings file not found, using defaults");
        defaults
    };

    let mut settings: SwitchboardSettings = serde_json::from_value(merged)?;
    apply_env_overrides(&mut settings);
    validate(&settings)?;
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
                let merged = if let Some(target_val) = target_map.remove(&key) {
                    deep_merge(target_val, source_val)
                } else {
                    source_val
                };
                let _ = target_map.insert(key, merged);
            }
            Value::Object(target_map)
        }
        (_, source) => source,
    }
}

/// Check cross-field constraints that serde cannot express.
pub fn validate(settings: &SwitchboardSettings) -> Result<()> {
    if settings.coordinator.max_concurrent_operations == 0 {
        return Err(SettingsError::InvalidValue(
            "coordinator.maxConcurrentOperations must be at least 1".into(),
        ));
    }
    if settings.coordinator.stale_operation_ms == 0 {
        return Err(SettingsError::InvalidValue(
            "coordinator.staleOperationMs must be at least 1".into(),
        ));
    }
    if settings.cache.capacity == 0 {
        return Err(SettingsError::InvalidValue(
            "cache.capacity must be at least 1".into(),
        ));
    }
    if settings.performance.metrics_capacity < 2 {
        return Err(SettingsError::InvalidValue(
            "performance.metricsCapacity must be at least 2".into(),
        ));
    }
    let session = &settings.session;
    if session.history_compact_to == 0 || session.history_compact_to >= session.history_limit {
        return Err(SettingsError::InvalidValue(format!(
            "session.historyCompactTo ({}) must be between 1 and historyLimit ({})",
            session.history_compact_to, session.history_limit
        )));
    }
    if session.snapshot_interval == 0 {
        return Err(SettingsError::InvalidValue(
            "session.snapshotInterval must be at least 1".into(),
        ));
    }
    check_tiers("performance.executionTime", settings.performance.execution_time)?;
    check_tiers("performance.tokenUsage", settings.performance.token_usage)?;
    if settings.circuit_breaker.failure_threshold == 0 {
        return Err(SettingsError::InvalidValue(
            "circuitBreaker.failureThreshold must be at least 1".into(),
        ));
    }
    Ok(())
}

fn check_tiers(name: &str, tiers: ThresholdTiers) -> Result<()> {
    if tiers.target <= tiers.warning && tiers.warning <= tiers.critical {
        Ok(())
    } else {
        Err(SettingsError::InvalidValue(format!(
            "{name} tiers must satisfy target <= warning <= critical"
        )))
    }
}

/// Apply environment variable overrides to loaded settings.
///
/// Invalid values are ignored with a warning (fall back to file/default).
pub fn apply_env_overrides(settings: &mut SwitchboardSettings) {
    if let Some(v) = read_env_usize("SWITCHBOARD_MAX_CONCURRENT", 1, 10_000) {
        settings.coordinator.max_concurrent_operations = v;
    }
    if let Some(v) = read_env_bool("SWITCHBOARD_CACHE_ENABLED") {
        settings.cache.enabled = v;
    }
    if let Some(v) = read_env_u64("SWITCHBOARD_CACHE_TTL_MS", 1000, 86_400_000) {
        settings.cache.ttl_ms = v;
    }
    if let Some(v) = read_env_usize("SWITCHBOARD_CACHE_CAPACITY", 1, 1_000_000) {
        settings.cache.capacity = v;
    }
    if let Some(v) = read_env_u64("SWITCHBOARD_HEALTH_INTERVAL_MS", 1000, 3_600_000) {
        settings.router.health_check_interval_ms = v;
    }
    if let Some(v) = read_env_u64("SWITCHBOARD_SESSION_MAX_AGE_MS", 60_000, 2_592_000_000) {
        settings.session.max_age_ms = v;
    }
    if let Some(v) = read_env_string("SWITCHBOARD_LOG_LEVEL") {
        settings.logging.level = v;
    }
}

// ── Pure parsing functions (testable without env vars) ──────────────────────

/// Parse a string as a boolean.
///
/// Accepts (case-insensitive): `true`/`1`/`yes`/`on` or `false`/`0`/`no`/`off`.
pub fn parse_bool(val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Parse a string as a `u64` within a range.
pub fn parse_u64_range(val: &str, min: u64, max: u64) -> Option<u64> {
    let n: u64 = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

/// Parse a string as a `usize` within a range.
pub fn parse_usize_range(val: &str, min: usize, max: usize) -> Option<usize> {
    let n: usize = val.parse().ok()?;
    (n >= min && n <= max).then_some(n)
}

// ── Env var readers (thin wrappers) ─────────────────────────────────────────

fn read_env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn read_env_bool(name: &str) -> Option<bool> {
    let val = std::env::var(name).ok()?;
    let result = parse_bool(&val);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid boolean env var, ignoring");
    }
    result
}

fn read_env_u64(name: &str, min: u64, max: u64) -> Option<u64> {
    let val = std::env::var(name).ok()?;
    let result = parse_u64_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid u64 env var, ignoring");
    }
    result
}

fn read_env_usize(name: &str, min: usize, max: usize) -> Option<usize> {
    let val = std::env::var(name).ok()?;
    let result = parse_usize_range(&val, min, max);
    if result.is_none() {
        tracing::warn!(key = name, value = %val, "invalid usize env var, ignoring");
    }
    result
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    // ── deep_merge ──────────────────────────────────────────────────

    #[test]
    fn merge_nested_override() {
        let target = serde_json::json!({"cache": {"ttlMs": 1, "capacity": 2}});
        let source = serde_json::json!({"cache": {"ttlMs": 10}});
        let merged = deep_merge(target, source);
        assert_eq!(merged["cache"]["ttlMs"], 10);
        assert_eq!(merged["cache"]["capacity"], 2);
    }

    #[test]
    fn merge_array_replace() {
        let target = serde_json::json!({"items": [1, 2, 3]});
        let source = serde_json::json!({"items": [4]});
        let merged = deep_merge(target, source);
        assert_eq!(merged["items"], serde_json::json!([4]));
    }

    #[test]
    fn merge_null_preserves_target() {
        let target = serde_json::json!({"a": 1});
        let source = serde_json::json!({"a": null});
        assert_eq!(deep_merge(target, source)["a"], 1);
    }

    #[test]
    fn merge_primitive_replaces_object() {
        let target = serde_json::json!({"a": {"nested": true}});
        let source = serde_json::json!({"a": 42});
        assert_eq!(deep_merge(target, source)["a"], 42);
    }

    // ── load_settings_from_path ─────────────────────────────────────

    #[test]
    fn load_missing_file_returns_defaults() {
        let settings = load_settings_from_path(Path::new("/nonexistent/settings.json")).unwrap();
        assert_eq!(settings.cache.capacity, 1000);
        assert_eq!(settings.router.catch_all_service, "general");
    }

    #[test]
    fn load_partial_json_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"cache": {"ttlMs": 60000}, "circuitBreaker": {"failureThreshold": 3}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.cache.ttl_ms, 60_000);
        assert_eq!(settings.cache.capacity, 1000);
        assert_eq!(settings.circuit_breaker.failure_threshold, 3);
        assert_eq!(settings.circuit_breaker.cooldown_ms, 30_000);
    }

    #[test]
    fn load_replaces_service_catalogue() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"router": {"services": [{"id": "general"}, {"id": "docs", "domainHints": ["docs"]}]}}"#,
        )
        .unwrap();

        let settings = load_settings_from_path(&path).unwrap();
        assert_eq!(settings.router.services.len(), 2);
        assert_eq!(settings.router.services[1].domain_hints, vec!["docs"]);
        assert!(settings.router.services[1].name_patterns.is_empty());
    }

    #[test]
    fn load_invalid_json_returns_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(&path, "not valid json").unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::Json(_))
        ));
    }

    #[test]
    fn load_rejects_inconsistent_history_bounds() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        std::fs::write(
            &path,
            r#"{"session": {"historyLimit": 10, "historyCompactTo": 20}}"#,
        )
        .unwrap();
        assert!(matches!(
            load_settings_from_path(&path),
            Err(SettingsError::InvalidValue(_))
        ));
    }

    #[test]
    fn validate_rejects_zero_concurrency() {
        let mut settings = SwitchboardSettings::default();
        settings.coordinator.max_concurrent_operations = 0;
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn validate_rejects_zero_stale_bound() {
        let mut settings = SwitchboardSettings::default();
        settings.coordinator.stale_operation_ms = 0;
        assert!(validate(&settings).is_err());
    }

    #[test]
    fn validate_rejects_unordered_tiers() {
        let mut settings = SwitchboardSettings::default();
        settings.performance.execution_time.warning = 50_000;
        assert!(validate(&settings).is_err());
    }

    // ── parsing ─────────────────────────────────────────────────────

    #[test]
    fn parse_bool_variants() {
        for val in &["true", "1", "yes", "on", "TRUE"] {
            assert_eq!(parse_bool(val), Some(true), "failed for {val}");
        }
        for val in &["false", "0", "no", "off", "Off"] {
            assert_eq!(parse_bool(val), Some(false), "failed for {val}");
        }
        assert_eq!(parse_bool("maybe"), None);
    }

    #[test]
    fn parse_u64_bounds() {
        assert_eq!(parse_u64_range("30000", 1000, 600_000), Some(30_000));
        assert_eq!(parse_u64_range("500", 1000, 600_000), None);
        assert_eq!(parse_u64_range("abc", 1000, 600_000), None);
    }

    #[test]
    fn parse_usize_bounds() {
        assert_eq!(parse_usize_range("50", 1, 10_000), Some(50));
        assert_eq!(parse_usize_range("0", 1, 10_000), None);
    }
}
