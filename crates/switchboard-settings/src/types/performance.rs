//! Performance governor settings: thresholds, metrics, cache, circuit breaker.

use serde::{Deserialize, Serialize};

/// Three-tier threshold set.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdTiers {
    /// Desired upper bound.
    pub target: u64,
    /// Above this a warning alert is raised.
    pub warning: u64,
    /// Above this a critical alert is raised.
    pub critical: u64,
}

/// Timing, alerting, and optimization analysis settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PerformanceSettings {
    /// Execution time tiers in milliseconds.
    pub execution_time: ThresholdTiers,
    /// Token usage tiers.
    pub token_usage: ThresholdTiers,
    /// Ring buffer capacity for metric records.
    pub metrics_capacity: usize,
    /// Metric records older than this are dropped by maintenance.
    pub metrics_retention_ms: u64,
    /// Durations kept per operation for percentile estimates.
    pub stats_window: usize,
    /// Interval between optimization analyses.
    pub analysis_interval_ms: u64,
    /// Trailing window the analysis looks at.
    pub analysis_window_ms: u64,
    /// Interval between metric/cache cleanup passes.
    pub cleanup_interval_ms: u64,
}

impl Default for PerformanceSettings {
    fn default() -> Self {
        Self {
            execution_time: ThresholdTiers {
                target: 2000,
                warning: 5000,
                critical: 10_000,
            },
            token_usage: ThresholdTiers {
                target: 1000,
                warning: 4000,
                critical: 8000,
            },
            metrics_capacity: 10_000,
            metrics_retention_ms: 3_600_000,
            stats_window: 100,
            analysis_interval_ms: 60_000,
            analysis_window_ms: 600_000,
            cleanup_interval_ms: 60_000,
        }
    }
}

/// Result cache settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CacheSettings {
    /// Whether results are cached at all.
    pub enabled: bool,
    /// Maximum number of entries.
    pub capacity: usize,
    /// Entry time-to-live in milliseconds.
    pub ttl_ms: u64,
    /// Regexes of idempotent operation names whose results may be cached.
    pub cacheable_patterns: Vec<String>,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            capacity: 1000,
            ttl_ms: 300_000,
            cacheable_patterns: vec![
                "^(Read|Glob|Grep|LS|NotebookRead)$".to_string(),
                "^(WebFetch|WebSearch)$".to_string(),
                "^(get|list|search|find|query)_".to_string(),
            ],
        }
    }
}

/// Circuit breaker settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CircuitBreakerSettings {
    /// Consecutive failures that open the breaker.
    pub failure_threshold: u32,
    /// Time since the last failure after which an open breaker reports closed.
    pub cooldown_ms: u64,
}

impl Default for CircuitBreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_ms: 30_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_tiers_are_ordered() {
        let perf = PerformanceSettings::default();
        for tiers in [perf.execution_time, perf.token_usage] {
            assert!(tiers.target < tiers.warning);
            assert!(tiers.warning < tiers.critical);
        }
    }

    #[test]
    fn default_cache_allows_read_only_tools() {
        let cache = CacheSettings::default();
        assert!(cache.enabled);
        assert!(cache.cacheable_patterns.iter().any(|p| p.contains("Read")));
        assert!(!cache.cacheable_patterns.iter().any(|p| p.contains("Write")));
    }

    #[test]
    fn breaker_defaults() {
        let cb = CircuitBreakerSettings::default();
        assert_eq!(cb.failure_threshold, 5);
        assert_eq!(cb.cooldown_ms, 30_000);
    }
}
