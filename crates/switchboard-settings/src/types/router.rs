//! Capability router settings and the default service catalogue.

use serde::{Deserialize, Serialize};

/// Quorum rule for `consensus` execution.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConsensusPolicy {
    /// More than half of the targets must agree.
    #[default]
    Majority,
    /// Every target must succeed with the same result.
    Unanimous,
}

/// Inclusive complexity interval a service accepts.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplexityRange {
    /// Lower bound (inclusive).
    pub min: f64,
    /// Upper bound (inclusive).
    pub max: f64,
}

impl ComplexityRange {
    /// Whether `value` falls inside the range.
    #[must_use]
    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// One capability service as declared in settings.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceSettings {
    /// Service identifier used on the transport.
    pub id: String,
    /// Regexes matched against the operation name.
    pub name_patterns: Vec<String>,
    /// Domains the service specializes in.
    pub domain_hints: Vec<String>,
    /// Complexity interval the service is suited for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity_range: Option<ComplexityRange>,
}

impl ServiceSettings {
    /// Declare a service with name patterns and domain hints.
    #[must_use]
    pub fn new(id: &str, patterns: &[&str], domains: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name_patterns: patterns.iter().map(ToString::to_string).collect(),
            domain_hints: domains.iter().map(ToString::to_string).collect(),
            complexity_range: None,
        }
    }
}

/// Capability router settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RouterSettings {
    /// Service that handles anything no specialist matches.
    pub catch_all_service: String,
    /// Service added for high/critical priority operations.
    pub performance_monitor_service: String,
    /// Interval between background health probes.
    pub health_check_interval_ms: u64,
    /// Upper bound on a single probe.
    pub probe_timeout_ms: u64,
    /// Fixed buffer added to twice the average response time.
    pub timeout_buffer_ms: u64,
    /// Hard cap on any decision's timeout.
    pub max_timeout_ms: u64,
    /// Timeout used by the fallback decision.
    pub fallback_timeout_ms: u64,
    /// Targets selected for parallel or consensus execution.
    pub max_parallel_targets: usize,
    /// Cached routing decisions kept at most.
    pub decision_cache_capacity: usize,
    /// Agreement rule for consensus execution.
    pub consensus_policy: ConsensusPolicy,
    /// Registered capability services.
    pub services: Vec<ServiceSettings>,
}

impl Default for RouterSettings {
    fn default() -> Self {
        Self {
            catch_all_service: "general".to_string(),
            performance_monitor_service: "performance-monitor".to_string(),
            health_check_interval_ms: 30_000,
            probe_timeout_ms: 5000,
            timeout_buffer_ms: 1000,
            max_timeout_ms: 30_000,
            fallback_timeout_ms: 30_000,
            max_parallel_targets: 3,
            decision_cache_capacity: 500,
            consensus_policy: ConsensusPolicy::Majority,
            services: default_services(),
        }
    }
}

/// Default service catalogue: quality validation, task/PRD management, UI
/// generation, deep reasoning, the catch-all, and the performance monitor.
#[must_use]
pub fn default_services() -> Vec<ServiceSettings> {
    let mut reasoning = ServiceSettings::new("reasoning", &[], &["analysis", "architecture"]);
    reasoning.complexity_range = Some(ComplexityRange { min: 0.75, max: 1.0 });

    vec![
        ServiceSettings::new(
            "quality",
            &["^(Edit|MultiEdit|Write)$", "(?i)(lint|test|validate)"],
            &["quality", "testing"],
        ),
        ServiceSettings::new(
            "tasks",
            &["^(Task|TodoWrite|TodoRead)$", "(?i)(prd|task)"],
            &["planning", "tasks"],
        ),
        ServiceSettings::new("ui", &["(?i)(component|^ui_)"], &["ui", "frontend"]),
        reasoning,
        ServiceSettings::new("general", &[], &[]),
        ServiceSettings::new("performance-monitor", &[], &["performance"]),
    ]
}
