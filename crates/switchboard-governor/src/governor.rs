//! The performance governor.
//!
//! Times operations, keeps bounded metrics and rolling per-operation stats,
//! raises threshold alerts, drives the circuit breakers, and owns the result
//! cache. Periodic maintenance (metric retention, cache expiry) and analysis
//! run as background tasks between [`PerformanceGovernor::init`] and
//! [`PerformanceGovernor::cleanup`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use switchboard_core::events::AlertMetric;
use switchboard_core::{BackgroundTasks, EventBus, Operation, OperationId, SwitchboardEvent};
use switchboard_settings::{PerformanceSettings, SwitchboardSettings};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::analysis::{Recommendation, analyze};
use crate::breaker::CircuitBreakers;
use crate::cache::{CacheStats, ResultCache};
use crate::errors::{GovernorError, Result};
use crate::metrics::{MetricRecord, MetricsBuffer};
use crate::stats::OperationStats;
use crate::thresholds::{ThresholdBreach, evaluate};

#[derive(Debug)]
struct RunningTimer {
    operation: String,
    started: Instant,
}

/// How an operation ended.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Completion {
    /// Whether the operation succeeded.
    pub success: bool,
    /// Whether the result came from the cache.
    pub cache_hit: bool,
    /// Tokens consumed, when reported.
    pub token_usage: Option<u64>,
}

impl Completion {
    /// A successful, uncached completion.
    #[must_use]
    pub fn success() -> Self {
        Self {
            success: true,
            ..Self::default()
        }
    }

    /// A failed completion.
    #[must_use]
    pub fn failure() -> Self {
        Self::default()
    }
}

/// Timing result of a completed operation.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedOperation {
    /// Operation name.
    pub operation: String,
    /// Measured duration in milliseconds.
    pub duration_ms: u64,
    /// Whether this completion opened the operation's circuit breaker.
    pub breaker_opened: bool,
    /// Thresholds crossed by this completion.
    #[serde(skip)]
    pub alerts: Vec<ThresholdBreach>,
}

/// Times operations and enforces performance policy.
pub struct PerformanceGovernor {
    settings: PerformanceSettings,
    metrics: Mutex<MetricsBuffer>,
    stats: Mutex<HashMap<String, OperationStats>>,
    timers: Mutex<HashMap<OperationId, RunningTimer>>,
    breakers: CircuitBreakers,
    cache: ResultCache,
    events: Arc<EventBus>,
    recommendations: Mutex<Vec<Recommendation>>,
    tasks: Mutex<Option<BackgroundTasks>>,
}

impl PerformanceGovernor {
    /// Create a governor from the performance, cache, and breaker sections.
    pub fn new(settings: &SwitchboardSettings, events: Arc<EventBus>) -> Result<Self> {
        Ok(Self {
            metrics: Mutex::new(MetricsBuffer::new(settings.performance.metrics_capacity)),
            stats: Mutex::new(HashMap::new()),
            timers: Mutex::new(HashMap::new()),
            breakers: CircuitBreakers::new(&settings.circuit_breaker),
            cache: ResultCache::new(&settings.cache, Arc::clone(&events))?,
            settings: settings.performance.clone(),
            events,
            recommendations: Mutex::new(Vec::new()),
            tasks: Mutex::new(None),
        })
    }

    /// Start maintenance and analysis tasks. Calling twice is a no-op.
    pub fn init(self: &Arc<Self>) {
        let mut tasks = self.tasks.lock();
        if tasks.is_some() {
            return;
        }
        let supervisor = BackgroundTasks::new();

        let governor = Arc::clone(self);
        supervisor.spawn_periodic(
            "governor-maintenance",
            Duration::from_millis(self.settings.cleanup_interval_ms),
            move || {
                let governor = Arc::clone(&governor);
                async move {
                    let _ = governor.run_maintenance();
                }
            },
        );

        let governor = Arc::clone(self);
        supervisor.spawn_periodic(
            "governor-analysis",
            Duration::from_millis(self.settings.analysis_interval_ms),
            move || {
                let governor = Arc::clone(&governor);
                async move {
                    let recs = governor.get_optimization_recommendations();
                    if !recs.is_empty() {
                        info!(count = recs.len(), top = ?recs[0].kind, "optimization recommendations");
                    }
                }
            },
        );
        *tasks = Some(supervisor);
    }

    /// Stop background tasks and drop cached results.
    pub async fn cleanup(&self) {
        let tasks = self.tasks.lock().take();
        if let Some(tasks) = tasks {
            tasks.shutdown().await;
        }
        self.cache.clear();
        self.timers.lock().clear();
    }

    /// Start timing `operation`.
    pub fn start_operation(&self, id: &OperationId, operation: &str) {
        let previous = self.timers.lock().insert(
            id.clone(),
            RunningTimer {
                operation: operation.to_string(),
                started: Instant::now(),
            },
        );
        if previous.is_some() {
            debug!(operation_id = %id, "timer restarted");
        }
    }

    /// Stop timing `id` and record the outcome.
    pub fn complete_operation(&self, id: &OperationId, completion: Completion) -> Result<CompletedOperation> {
        let timer = self
            .timers
            .lock()
            .remove(id)
            .ok_or_else(|| GovernorError::UnknownOperation(id.clone()))?;
        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = timer.started.elapsed().as_millis() as u64;

        let breaker_opened = if completion.success {
            self.breakers.record_success(&timer.operation);
            false
        } else {
            self.breakers.record_failure(&timer.operation)
        };

        let alerts = self.record(id, &timer.operation, duration_ms, completion);
        Ok(CompletedOperation {
            operation: timer.operation,
            duration_ms,
            breaker_opened,
            alerts,
        })
    }

    /// Record a placeholder metric for an event whose operation is not in
    /// flight. It touches neither the breaker nor the rolling stats, and
    /// analysis skips it.
    pub fn record_default_metric(&self, id: &OperationId, operation: &str) {
        self.metrics.lock().push(MetricRecord::placeholder(operation));
        debug!(operation_id = %id, operation, "default metric recorded");
        let _ = self.events.emit(SwitchboardEvent::OperationCompleted {
            operation_id: id.clone(),
            operation: operation.to_string(),
            duration_ms: 0,
            success: false,
            cache_hit: false,
        });
    }

    fn record(
        &self,
        id: &OperationId,
        operation: &str,
        duration_ms: u64,
        completion: Completion,
    ) -> Vec<ThresholdBreach> {
        self.metrics.lock().push(
            MetricRecord::now(operation, duration_ms, completion.success, completion.cache_hit)
                .with_token_usage(completion.token_usage),
        );
        self.stats
            .lock()
            .entry(operation.to_string())
            .or_insert_with(|| OperationStats::new(self.settings.stats_window))
            .record(duration_ms, completion.success);

        let mut alerts = Vec::new();
        alerts.extend(evaluate(
            operation,
            AlertMetric::ExecutionTime,
            self.settings.execution_time,
            duration_ms,
        ));
        if let Some(tokens) = completion.token_usage {
            alerts.extend(evaluate(
                operation,
                AlertMetric::TokenUsage,
                self.settings.token_usage,
                tokens,
            ));
        }
        for alert in &alerts {
            warn!(
                operation,
                metric = ?alert.metric,
                level = ?alert.level,
                value = alert.value,
                threshold = alert.threshold,
                "performance threshold exceeded"
            );
            let _ = self.events.emit(SwitchboardEvent::PerformanceAlert {
                operation: operation.to_string(),
                metric: alert.metric,
                level: alert.level,
                value: alert.value,
                threshold: alert.threshold,
                recommendation: alert.recommendation.clone(),
            });
        }

        debug!(operation, duration_ms, success = completion.success, "operation completed");
        let _ = self.events.emit(SwitchboardEvent::OperationCompleted {
            operation_id: id.clone(),
            operation: operation.to_string(),
            duration_ms,
            success: completion.success,
            cache_hit: completion.cache_hit,
        });
        alerts
    }

    /// Whether the circuit breaker for `operation` is open.
    pub fn is_circuit_breaker_open(&self, operation: &str) -> bool {
        self.breakers.is_open(operation)
    }

    /// The circuit breakers.
    pub fn breakers(&self) -> &CircuitBreakers {
        &self.breakers
    }

    /// Whether results of `operation` may be cached.
    pub fn should_cache(&self, operation: &str) -> bool {
        self.cache.should_cache(operation)
    }

    /// Cache key for `operation`.
    pub fn generate_cache_key(&self, operation: &Operation) -> String {
        self.cache.generate_key(&operation.name, &operation.arguments)
    }

    /// Cached result for `key`.
    pub fn get_cached_result(&self, key: &str) -> Option<Value> {
        self.cache.get(key)
    }

    /// Cache `value` under `key`.
    pub fn cache_result(&self, key: &str, value: Value) {
        self.cache.store(key, value);
    }

    /// Cache counters.
    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Rolling stats for `operation`.
    pub fn operation_stats(&self, operation: &str) -> Option<OperationStats> {
        self.stats.lock().get(operation).cloned()
    }

    /// Stored metric records.
    pub fn metrics_len(&self) -> usize {
        self.metrics.lock().len()
    }

    /// Operations currently being timed.
    pub fn active_timers(&self) -> usize {
        self.timers.lock().len()
    }

    /// Analyze the trailing window and return suggestions, most urgent first.
    pub fn get_optimization_recommendations(&self) -> Vec<Recommendation> {
        let window = self
            .metrics
            .lock()
            .window(Duration::from_millis(self.settings.analysis_window_ms));
        let recs = analyze(&window, self.settings.execution_time);
        self.recommendations.lock().clone_from(&recs);
        recs
    }

    /// Suggestions from the most recent analysis.
    pub fn latest_recommendations(&self) -> Vec<Recommendation> {
        self.recommendations.lock().clone()
    }

    /// Apply metric retention and cache expiry, then drop idle breakers and
    /// the stats of operations with no retained metrics. Returns
    /// `(metrics, entries)` dropped.
    pub fn run_maintenance(&self) -> (usize, usize) {
        let (pruned, stale_stats) = {
            let mut metrics = self.metrics.lock();
            let pruned =
                metrics.prune_older_than(Duration::from_millis(self.settings.metrics_retention_ms));
            let mut stats = self.stats.lock();
            let before = stats.len();
            stats.retain(|operation, _| metrics.contains_operation(operation));
            (pruned, before - stats.len())
        };
        let expired = self.cache.cleanup_expired();
        let idle_breakers = self.breakers.prune_idle();
        if pruned > 0 || expired > 0 || stale_stats > 0 || idle_breakers > 0 {
            debug!(pruned, expired, stale_stats, idle_breakers, "governor maintenance");
        }
        (pruned, expired)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
