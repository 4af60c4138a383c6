//! # switchboard-settings
//!
//! Configuration management with layered sources for Switchboard.
//!
//! Settings are loaded from three layers (in priority order):
//! 1. **Compiled defaults**: [`SwitchboardSettings::default()`]
//! 2. **User file**: `~/.switchboard/settings.json` (deep-merged over defaults)
//! 3. **Environment variables**: `SWITCHBOARD_*` overrides (highest priority)
//!
//! Components never read the global; each receives its section at
//! construction. The [`get_settings`] accessor exists for hosts.

#![deny(unsafe_code)]

pub mod errors;
pub mod loader;
pub mod types;

pub use errors::{Result, SettingsError};
pub use loader::{
    apply_env_overrides, deep_merge, load_settings, load_settings_from_path, settings_path,
    validate,
};
pub use types::*;

use std::sync::OnceLock;

static SETTINGS: OnceLock<SwitchboardSettings> = OnceLock::new();

/// Get the global settings instance.
///
/// On first call, loads settings from `~/.switchboard/settings.json` with env
/// var overrides. If loading fails, returns compiled defaults.
pub fn get_settings() -> &'static SwitchboardSettings {
    SETTINGS.get_or_init(|| load_settings().unwrap_or_default())
}

/// Initialize the global settings with a specific value.
///
/// Returns the provided settings back if the global was already initialized.
#[allow(clippy::result_large_err)]
pub fn init_settings(settings: SwitchboardSettings) -> std::result::Result<(), SwitchboardSettings> {
    SETTINGS.set(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn re_exports_work() {
        let _settings = SwitchboardSettings::default();
        let path = settings_path();
        assert!(path.ends_with(".switchboard/settings.json"));
    }

    #[test]
    fn default_settings_are_valid() {
        let settings = SwitchboardSettings::default();
        assert!(validate(&settings).is_ok());
        assert_eq!(settings.coordinator.max_concurrent_operations, 10);
        assert_eq!(settings.circuit_breaker.failure_threshold, 5);
        assert_eq!(settings.circuit_breaker.cooldown_ms, 30_000);
        assert_eq!(settings.cache.ttl_ms, 300_000);
        assert_eq!(settings.session.max_age_ms, 86_400_000);
        assert_eq!(settings.performance.metrics_retention_ms, 3_600_000);
    }
}
