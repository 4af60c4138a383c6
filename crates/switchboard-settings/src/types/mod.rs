//! Settings type definitions.
//!
//! All types use `#[serde(rename_all = "camelCase")]` for the JSON settings
//! file. Each type implements [`Default`] with production values, and every
//! section is `#[serde(default)]` so partial JSON fills the gaps.

mod performance;
mod router;
mod session;

pub use performance::*;
pub use router::*;
pub use session::*;

use serde::{Deserialize, Serialize};

/// Root settings type for Switchboard.
///
/// Loaded from `~/.switchboard/settings.json` with defaults applied for
/// missing fields. Environment variables can override specific values.
///
/// ```json
/// {
///   "coordinator": { "maxConcurrentOperations": 20 },
///   "cache": { "ttlMs": 60000 }
/// }
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SwitchboardSettings {
    /// Settings schema version.
    pub version: String,
    /// Event coordinator settings.
    pub coordinator: CoordinatorSettings,
    /// Timing, thresholds, and analysis settings.
    pub performance: PerformanceSettings,
    /// Result cache settings.
    pub cache: CacheSettings,
    /// Circuit breaker settings.
    pub circuit_breaker: CircuitBreakerSettings,
    /// Capability router settings.
    pub router: RouterSettings,
    /// Session context settings.
    pub session: SessionSettings,
    /// Logging configuration.
    pub logging: LoggingSettings,
}

impl Default for SwitchboardSettings {
    fn default() -> Self {
        Self {
            version: "0.1.0".to_string(),
            coordinator: CoordinatorSettings::default(),
            performance: PerformanceSettings::default(),
            cache: CacheSettings::default(),
            circuit_breaker: CircuitBreakerSettings::default(),
            router: RouterSettings::default(),
            session: SessionSettings::default(),
            logging: LoggingSettings::default(),
        }
    }
}

/// Event coordinator settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CoordinatorSettings {
    /// Maximum operations in flight at once. Excess `pre_tool_use` events are
    /// rejected with `CapacityExceeded`.
    pub max_concurrent_operations: usize,
    /// Dispatch the routing decision to backend services during `pre_tool_use`.
    pub dispatch_on_pre_tool_use: bool,
    /// How many completed operation ids to remember for reuse detection.
    pub completed_id_memory: usize,
    /// An operation in flight longer than this without a `post_tool_use` is
    /// retired as failed by the stale sweep.
    pub stale_operation_ms: u64,
    /// How often the stale sweep runs.
    pub stale_sweep_interval_ms: u64,
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            max_concurrent_operations: 10,
            dispatch_on_pre_tool_use: true,
            completed_id_memory: 1000,
            stale_operation_ms: 600_000,
            stale_sweep_interval_ms: 60_000,
        }
    }
}

/// Logging configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LoggingSettings {
    /// Default `tracing` filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit newline-delimited JSON instead of compact text.
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
