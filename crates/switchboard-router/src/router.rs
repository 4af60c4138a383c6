//! The capability router.
//!
//! [`CapabilityRouter::route_request`] turns an [`Operation`] into a
//! [`RoutingDecision`]:
//!
//! 1. Classify the operation (domain hints, complexity) and compute the
//!    decision key from name, hints, complexity and priority.
//! 2. Serve a cached decision if every one of its targets is still online.
//! 3. Select candidates by name pattern, domain hint, or complexity range.
//!    The catch-all is used when nothing matches; the performance monitor
//!    joins every high/critical operation.
//! 4. Order candidates by (load, response time), pick the strategy, derive
//!    the timeout, and attach the fallback list.
//!
//! Routing never fails. Internal errors resolve to
//! [`CapabilityRouter::fallback_decision`].

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use switchboard_core::{BackgroundTasks, EventBus, Operation, Priority, ServiceStatus};
use switchboard_settings::RouterSettings;
use tracing::{debug, instrument, warn};

use crate::classifier::{KeywordClassifier, OperationClassifier};
use crate::decision::{DecisionCache, ExecutionStrategy, RoutingDecision, decision_key};
use crate::errors::{Result, RouterError};
use crate::executor::{ExecutionOutcome, Executor};
use crate::health::HealthMonitor;
use crate::registry::{ServiceDescriptor, ServiceRegistry};
use crate::transport::ServiceTransport;

/// Complexity at or above which parallel execution is requested.
const PARALLEL_COMPLEXITY: f64 = 0.8;
/// Complexity at or above which critical operations require consensus.
const CONSENSUS_COMPLEXITY: f64 = 0.9;
/// Targets kept for non-parallel decisions (primary plus one backup).
const SERIAL_TARGETS: usize = 2;

/// Routes operations to capability services and executes the decisions.
pub struct CapabilityRouter {
    settings: RouterSettings,
    registry: Arc<ServiceRegistry>,
    classifier: Arc<dyn OperationClassifier>,
    decisions: Arc<DecisionCache>,
    executor: Executor,
    health: Arc<HealthMonitor>,
    tasks: Mutex<Option<BackgroundTasks>>,
}

impl CapabilityRouter {
    /// Create a router over the configured service catalogue.
    pub fn new(
        settings: RouterSettings,
        transport: Arc<dyn ServiceTransport>,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        let registry = Arc::new(ServiceRegistry::from_settings(&settings.services)?);
        let decisions = Arc::new(DecisionCache::new(settings.decision_cache_capacity));
        let executor = Executor::new(
            Arc::clone(&registry),
            Arc::clone(&transport),
            settings.consensus_policy,
        );
        let health = Arc::new(HealthMonitor::new(
            Arc::clone(&registry),
            transport,
            Arc::clone(&decisions),
            events,
            Duration::from_millis(settings.probe_timeout_ms),
        ));
        Ok(Self {
            settings,
            registry,
            classifier: Arc::new(KeywordClassifier),
            decisions,
            executor,
            health,
            tasks: Mutex::new(None),
        })
    }

    /// Replace the classifier.
    #[must_use]
    pub fn with_classifier(mut self, classifier: Arc<dyn OperationClassifier>) -> Self {
        self.classifier = classifier;
        self
    }

    /// The service registry.
    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// The health monitor.
    pub fn health(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    /// Number of cached decisions.
    pub fn cached_decisions(&self) -> usize {
        self.decisions.len()
    }

    /// Start the periodic health monitor. Calling twice is a no-op.
    pub fn init(&self) {
        let mut tasks = self.tasks.lock();
        if tasks.is_some() {
            return;
        }
        let supervisor = BackgroundTasks::new();
        let health = Arc::clone(&self.health);
        supervisor.spawn_periodic(
            "router-health",
            Duration::from_millis(self.settings.health_check_interval_ms),
            move || {
                let health = Arc::clone(&health);
                async move {
                    let _ = health.probe_all().await;
                }
            },
        );
        *tasks = Some(supervisor);
    }

    /// Stop background tasks and drop cached decisions.
    pub async fn cleanup(&self) {
        let tasks = self.tasks.lock().take();
        if let Some(tasks) = tasks {
            tasks.shutdown().await;
        }
        self.decisions.clear();
    }

    /// Decide where `operation` goes. Never fails.
    #[instrument(skip_all, fields(operation = %operation.name))]
    pub fn route_request(&self, operation: &Operation) -> RoutingDecision {
        match self.try_route(operation) {
            Ok(decision) => decision,
            Err(err) => {
                warn!(error = %err, kind = %err.kind(), "routing failed, using fallback decision");
                self.fallback_decision(operation)
            }
        }
    }

    /// Deterministic decision used when routing fails: the catch-all,
    /// sequentially, with a generous timeout.
    pub fn fallback_decision(&self, operation: &Operation) -> RoutingDecision {
        RoutingDecision {
            target_services: vec![self.settings.catch_all_service.clone()],
            strategy: ExecutionStrategy::Sequential,
            timeout_ms: self.settings.fallback_timeout_ms,
            fallback_services: Vec::new(),
            domain_hints: Vec::new(),
            complexity: operation.complexity.unwrap_or(0.0),
            cache_key: String::new(),
            is_fallback: true,
            circuit_open: false,
        }
    }

    /// Execute `decision` for `operation`, walking fallbacks on failure.
    #[instrument(skip_all, fields(operation = %operation.name, strategy = %decision.strategy))]
    pub async fn execute_request(
        &self,
        decision: &RoutingDecision,
        operation: &Operation,
    ) -> Result<ExecutionOutcome> {
        self.executor.execute(decision, operation).await
    }

    fn try_route(&self, operation: &Operation) -> Result<RoutingDecision> {
        let classification = self
            .classifier
            .classify(&operation.name, &operation.arguments)?;
        let mut domain_hints = classification.domain_hints;
        domain_hints.sort();
        domain_hints.dedup();
        let complexity = operation
            .complexity
            .unwrap_or(classification.complexity)
            .clamp(0.0, 1.0);
        let priority = operation.effective_priority();
        let key = decision_key(&operation.name, &domain_hints, complexity, priority);

        if let Some(cached) = self.decisions.get(&key) {
            if self.all_online(&cached.target_services) {
                debug!(targets = ?cached.target_services, "decision cache hit");
                return Ok(cached);
            }
            let _ = self.decisions.invalidate(&key);
        }

        let requires_consensus = operation.flag("consensus")
            || (priority == Priority::Critical && complexity >= CONSENSUS_COMPLEXITY);
        let requires_parallel = requires_consensus
            || operation.flag("parallel")
            || priority == Priority::Critical
            || complexity >= PARALLEL_COMPLEXITY;

        let targets = self.select_targets(operation, &domain_hints, complexity, priority, requires_parallel)?;

        let strategy = if targets.len() > 1 && requires_consensus {
            ExecutionStrategy::Consensus
        } else if targets.len() > 1 && requires_parallel {
            ExecutionStrategy::Parallel
        } else if targets.len() > 1 {
            ExecutionStrategy::PrimaryFallback
        } else {
            ExecutionStrategy::Sequential
        };

        let timeout_ms = self.timeout_for(&targets, operation.requested_budget_ms());
        let target_services: Vec<String> = targets.into_iter().map(|s| s.id).collect();
        let fallback_services = [
            &self.settings.catch_all_service,
            &self.settings.performance_monitor_service,
        ]
        .into_iter()
        .filter(|id| self.registry.contains(id) && !target_services.contains(id))
        .cloned()
        .collect();

        let decision = RoutingDecision {
            target_services,
            strategy,
            timeout_ms,
            fallback_services,
            domain_hints,
            complexity,
            cache_key: key,
            is_fallback: false,
            circuit_open: false,
        };
        debug!(
            targets = ?decision.target_services,
            strategy = %decision.strategy,
            timeout_ms,
            "routing decision computed"
        );
        self.decisions.insert(decision.clone());
        Ok(decision)
    }

    fn select_targets(
        &self,
        operation: &Operation,
        domain_hints: &[String],
        complexity: f64,
        priority: Priority,
        parallel: bool,
    ) -> Result<Vec<ServiceDescriptor>> {
        let catch_all = &self.settings.catch_all_service;
        let monitor = &self.settings.performance_monitor_service;

        let mut candidates: Vec<ServiceDescriptor> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|s| &s.id != catch_all && &s.id != monitor)
            .filter(|s| s.status.is_routable())
            .filter(|s| s.capabilities.matches(&operation.name, domain_hints, complexity))
            .collect();

        if candidates.is_empty() {
            let general = self
                .registry
                .get(catch_all)
                .ok_or_else(|| RouterError::NoRoute(operation.name.clone()))?;
            candidates.push(general);
        }

        candidates.sort_by(|a, b| {
            a.current_load
                .cmp(&b.current_load)
                .then_with(|| a.response_time_ms.total_cmp(&b.response_time_ms))
                .then_with(|| a.id.cmp(&b.id))
        });
        let limit = if parallel {
            self.settings.max_parallel_targets.max(1)
        } else {
            SERIAL_TARGETS
        };
        candidates.truncate(limit);

        if priority.is_elevated() && !candidates.iter().any(|s| &s.id == monitor) {
            if let Some(perf) = self.registry.get(monitor) {
                if perf.status.is_routable() {
                    candidates.push(perf);
                }
            }
        }
        Ok(candidates)
    }

    fn timeout_for(&self, targets: &[ServiceDescriptor], requested: Option<u64>) -> u64 {
        #[allow(clippy::cast_precision_loss)]
        let avg = if targets.is_empty() {
            0.0
        } else {
            targets.iter().map(|s| s.response_time_ms).sum::<f64>() / targets.len() as f64
        };
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let derived = (2.0 * avg).ceil() as u64 + self.settings.timeout_buffer_ms;
        requested
            .unwrap_or(0)
            .max(derived)
            .min(self.settings.max_timeout_ms)
    }

    fn all_online(&self, services: &[String]) -> bool {
        services
            .iter()
            .all(|id| self.registry.status(id) == Some(ServiceStatus::Online))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
