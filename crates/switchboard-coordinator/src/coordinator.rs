//! The event coordinator.
//!
//! [`Coordinator::handle`] is the single entry point for lifecycle events.
//! It composes the three leaf components:
//!
//! - `pre_tool_use`: admit under the concurrency cap, start the timer, enrich
//!   from the session, route, serve a cached result or dispatch.
//! - `post_tool_use`: retire the operation, stop the timer (driving the
//!   breaker), record it in the session, cache the result, predict the next
//!   operation.
//! - `context_update` / `session_start` / `session_end`: session bookkeeping.
//!
//! An operation whose pre-dispatch exhausts every target is retired on the
//! spot as a failure. One that never receives its `post_tool_use` (the host
//! dropped it, or the handling future was cancelled) is retired the same way
//! by the stale sweep once `staleOperationMs` has passed.
//!
//! Every failure is reported in-band as a [`HookResponse`]; nothing here can
//! take the host down.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use switchboard_core::{BackgroundTasks, ErrorKind, EventBus, OperationId};
use switchboard_governor::{Completion, PerformanceGovernor};
use switchboard_router::{CapabilityRouter, ServiceTransport};
use switchboard_session::{HistoryEntry, SessionStore};
use switchboard_settings::{CoordinatorSettings, SwitchboardSettings};
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::errors::{CoordinatorError, Result};
use crate::event::{EventKind, InboundEvent};
use crate::ledger::{ActiveOperation, OperationLedger};
use crate::response::{CoordinatorStatus, HookOutcome, HookResponse};

struct Handled {
    outcome: HookOutcome,
    degraded: Option<(ErrorKind, String)>,
}

impl Handled {
    fn done(outcome: HookOutcome) -> Self {
        Self {
            outcome,
            degraded: None,
        }
    }
}

/// Composes router, governor, and session store behind one event handler.
pub struct Coordinator {
    settings: CoordinatorSettings,
    router: Arc<CapabilityRouter>,
    governor: Arc<PerformanceGovernor>,
    sessions: Arc<SessionStore>,
    ledger: Arc<OperationLedger>,
    events: Arc<EventBus>,
    tasks: Mutex<Option<BackgroundTasks>>,
}

impl Coordinator {
    /// Build every component from `settings`.
    pub fn new(
        settings: &SwitchboardSettings,
        transport: Arc<dyn ServiceTransport>,
        events: Arc<EventBus>,
    ) -> Result<Self> {
        let router = CapabilityRouter::new(settings.router.clone(), transport, Arc::clone(&events))?;
        let governor = PerformanceGovernor::new(settings, Arc::clone(&events))?;
        let sessions = SessionStore::new(settings.session.clone(), Arc::clone(&events));
        Ok(Self {
            ledger: Arc::new(OperationLedger::new(
                settings.coordinator.max_concurrent_operations,
                settings.coordinator.completed_id_memory,
            )),
            settings: settings.coordinator.clone(),
            router: Arc::new(router),
            governor: Arc::new(governor),
            sessions: Arc::new(sessions),
            events,
            tasks: Mutex::new(None),
        })
    }

    /// The capability router.
    pub fn router(&self) -> &Arc<CapabilityRouter> {
        &self.router
    }

    /// The performance governor.
    pub fn governor(&self) -> &Arc<PerformanceGovernor> {
        &self.governor
    }

    /// The session store.
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// The event bus every component publishes on.
    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    /// Operations currently in flight.
    pub fn active_operations(&self) -> usize {
        self.ledger.active_len()
    }

    /// Whether `id` is in flight.
    pub fn is_active(&self, id: &OperationId) -> bool {
        self.ledger.is_active(id)
    }

    /// Start every component's background tasks and the stale sweep.
    pub fn init(&self) {
        self.router.init();
        self.governor.init();
        self.sessions.init();
        {
            let mut tasks = self.tasks.lock();
            if tasks.is_none() {
                let supervisor = BackgroundTasks::new();
                let ledger = Arc::clone(&self.ledger);
                let governor = Arc::clone(&self.governor);
                let sessions = Arc::clone(&self.sessions);
                let max_age = Duration::from_millis(self.settings.stale_operation_ms);
                supervisor.spawn_periodic(
                    "coordinator-stale-sweep",
                    Duration::from_millis(self.settings.stale_sweep_interval_ms),
                    move || {
                        let ledger = Arc::clone(&ledger);
                        let governor = Arc::clone(&governor);
                        let sessions = Arc::clone(&sessions);
                        async move {
                            let _ = sweep_stale(&ledger, &governor, &sessions, max_age);
                        }
                    },
                );
                *tasks = Some(supervisor);
            }
        }
        info!(
            max_concurrent = self.settings.max_concurrent_operations,
            dispatch = self.settings.dispatch_on_pre_tool_use,
            "coordinator initialized"
        );
    }

    /// Stop background tasks and drop in-flight bookkeeping.
    pub async fn cleanup(&self) {
        let tasks = self.tasks.lock().take();
        if let Some(tasks) = tasks {
            tasks.shutdown().await;
        }
        self.router.cleanup().await;
        self.governor.cleanup().await;
        self.sessions.cleanup().await;
        self.ledger.clear();
        info!("coordinator stopped");
    }

    /// Retire as failed every operation in flight longer than
    /// `staleOperationMs`. Returns how many were retired.
    pub fn sweep_stale_operations(&self) -> usize {
        sweep_stale(
            &self.ledger,
            &self.governor,
            &self.sessions,
            Duration::from_millis(self.settings.stale_operation_ms),
        )
    }

    /// Parse and handle a JSON event.
    pub async fn handle_json(&self, raw: &str) -> HookResponse {
        match InboundEvent::from_json(raw) {
            Ok(event) => self.handle(event).await,
            Err(err) => {
                warn!(error = %err, "rejecting malformed event");
                HookResponse::failure(None, &err, 0)
            }
        }
    }

    /// Handle one lifecycle event.
    #[instrument(skip_all, fields(kind = %event.event_kind, tool = %event.tool_name, session_id = %event.session_id))]
    pub async fn handle(&self, event: InboundEvent) -> HookResponse {
        let started = Instant::now();
        let operation_id = match event.event_kind {
            EventKind::PreToolUse => Some(event.execution_id.clone().unwrap_or_default()),
            _ => event.execution_id.clone(),
        };

        let handled = match (event.event_kind, operation_id.clone()) {
            (EventKind::PreToolUse, Some(id)) => self.pre_tool_use(&event, id).await,
            (EventKind::PostToolUse, Some(id)) => self.post_tool_use(&event, id),
            (EventKind::PostToolUse | EventKind::PreToolUse, None) => Err(CoordinatorError::InvalidEvent(
                "tool events require an executionId".into(),
            )),
            (EventKind::ContextUpdate, _) => Ok(self.context_update(&event)),
            (EventKind::SessionStart, _) => Ok(self.session_start(&event)),
            (EventKind::SessionEnd, _) => self.session_end(&event),
        };

        #[allow(clippy::cast_possible_truncation)]
        let duration_ms = started.elapsed().as_millis() as u64;
        match handled {
            Ok(Handled {
                outcome,
                degraded: None,
            }) => {
                debug!(duration_ms, "event handled");
                HookResponse::ok(operation_id, outcome, duration_ms)
            }
            Ok(Handled {
                outcome,
                degraded: Some((kind, message)),
            }) => {
                debug!(duration_ms, kind = %kind, "event handled in degraded mode");
                HookResponse::degraded(operation_id, outcome, kind, message, duration_ms)
            }
            Err(err) => {
                let kind = err.kind();
                if kind.is_user_visible() {
                    warn!(error = %err, kind = %kind, duration_ms, "event failed");
                } else {
                    debug!(error = %err, kind = %kind, duration_ms, "event degraded to failure response");
                }
                HookResponse::failure(operation_id, &err, duration_ms)
            }
        }
    }

    /// Point-in-time view across components.
    pub fn status(&self) -> CoordinatorStatus {
        CoordinatorStatus {
            active_operations: self.ledger.active_len(),
            max_concurrent_operations: self.settings.max_concurrent_operations,
            services: self.router.registry().statuses().into_iter().collect(),
            open_breakers: self.governor.breakers().open_breakers(),
            cache: self.governor.cache_stats(),
            cached_decisions: self.router.cached_decisions(),
            sessions: self.sessions.len(),
            metrics: self.governor.metrics_len(),
        }
    }

    async fn pre_tool_use(&self, event: &InboundEvent, id: OperationId) -> Result<Handled> {
        if let Err(err) = self.ledger.admit(event.to_operation(id.clone())) {
            if matches!(err, CoordinatorError::ReusedOperation(_)) {
                warn!(operation_id = %id, "completed operation id reused");
                self.governor.record_default_metric(&id, &event.tool_name);
            }
            return Err(err);
        }
        self.governor.start_operation(&id, &event.tool_name);

        let operation = self
            .sessions
            .get_enriched_context(&event.session_id, event.to_operation(id));
        let mut decision = self.router.route_request(&operation);
        let circuit_open = self.governor.is_circuit_breaker_open(&operation.name);
        decision.circuit_open = circuit_open;

        let cached = if self.governor.should_cache(&operation.name) {
            self.governor
                .get_cached_result(&self.governor.generate_cache_key(&operation))
        } else {
            None
        };
        self.ledger.attach(
            operation.clone(),
            decision.domain_hints.first().cloned(),
            decision.complexity,
            cached.is_some(),
        );

        let priority = operation.effective_priority();
        let budget_ms = operation.requested_budget_ms();
        if cached.is_some() {
            debug!(operation = %operation.name, "serving cached result");
            return Ok(Handled::done(HookOutcome::PreToolUse {
                decision,
                priority,
                budget_ms,
                cached,
                execution: None,
                circuit_open,
            }));
        }

        if circuit_open {
            warn!(operation = %operation.name, "circuit breaker open, dispatch skipped");
            return Ok(Handled {
                degraded: Some((
                    ErrorKind::CircuitOpen,
                    format!("Circuit breaker open for {}", operation.name),
                )),
                outcome: HookOutcome::PreToolUse {
                    decision,
                    priority,
                    budget_ms,
                    cached: None,
                    execution: None,
                    circuit_open,
                },
            });
        }

        let execution = if self.settings.dispatch_on_pre_tool_use {
            match self.router.execute_request(&decision, &operation).await {
                Ok(outcome) => Some(outcome),
                Err(err) => {
                    if let Ok(active) = self.ledger.complete(&operation.id) {
                        retire_failed(&self.governor, &self.sessions, operation.id.clone(), &active);
                    }
                    return Err(err.into());
                }
            }
        } else {
            None
        };
        Ok(Handled::done(HookOutcome::PreToolUse {
            decision,
            priority,
            budget_ms,
            cached: None,
            execution,
            circuit_open,
        }))
    }

    fn post_tool_use(&self, event: &InboundEvent, id: OperationId) -> Result<Handled> {
        let active = match self.ledger.complete(&id) {
            Ok(active) => active,
            Err(err) => {
                warn!(operation_id = %id, error = %err, "post_tool_use for an operation not in flight");
                self.governor.record_default_metric(&id, &event.tool_name);
                return Err(err);
            }
        };

        let success = event.succeeded();
        let completed = self.governor.complete_operation(
            &id,
            Completion {
                success,
                cache_hit: active.cache_hit,
                token_usage: event.token_usage,
            },
        )?;
        if completed.breaker_opened {
            warn!(operation = %completed.operation, "circuit breaker opened");
        }

        let operation = &active.operation;
        let entry = HistoryEntry::new(id, operation.name.clone(), completed.duration_ms, success)
            .with_domain(active.domain.clone())
            .with_routing(operation.effective_priority(), active.complexity);
        let session =
            self.sessions
                .update_session_context(&operation.session_id, entry, event.state_updates());

        let cached = match &event.result {
            Some(result) if success && !active.cache_hit && self.governor.should_cache(&operation.name) => {
                self.governor
                    .cache_result(&self.governor.generate_cache_key(operation), result.clone());
                true
            }
            _ => false,
        };

        let prediction = self.sessions.predict_next_operation(&operation.session_id);
        if let Some(p) = &prediction {
            debug!(next = %p.operation, confidence = p.confidence, "predicted next operation");
        }
        Ok(Handled::done(HookOutcome::PostToolUse {
            completed,
            session,
            cached,
            prediction,
        }))
    }

    fn context_update(&self, event: &InboundEvent) -> Handled {
        self.sessions
            .merge_state(&event.session_id, &Value::Object(event.tool_arguments.clone()));
        Handled::done(HookOutcome::ContextUpdated {
            session_id: event.session_id.clone(),
        })
    }

    fn session_start(&self, event: &InboundEvent) -> Handled {
        let created = self.sessions.initialize_session(&event.session_id);
        Handled::done(HookOutcome::SessionStarted {
            session_id: event.session_id.clone(),
            created,
        })
    }

    fn session_end(&self, event: &InboundEvent) -> Result<Handled> {
        let summary = self.sessions.end_session(&event.session_id)?;
        info!(
            session_id = %summary.session_id,
            operations = summary.operations,
            avg_time_ms = summary.aggregate.avg_time_ms,
            success_rate = summary.aggregate.success_rate,
            "session ended"
        );
        Ok(Handled::done(HookOutcome::SessionEnded { summary }))
    }
}

/// Record an operation that will never see its `post_tool_use` as a failure:
/// stop its timer (driving the breaker) and append it to the session history.
fn retire_failed(
    governor: &PerformanceGovernor,
    sessions: &SessionStore,
    id: OperationId,
    active: &ActiveOperation,
) {
    let completed = match governor.complete_operation(&id, Completion::failure()) {
        Ok(completed) => completed,
        Err(err) => {
            debug!(operation_id = %id, error = %err, "no timer to stop for retired operation");
            return;
        }
    };
    if completed.breaker_opened {
        warn!(operation = %completed.operation, "circuit breaker opened");
    }
    let operation = &active.operation;
    let entry = HistoryEntry::new(id, operation.name.clone(), completed.duration_ms, false)
        .with_domain(active.domain.clone())
        .with_routing(operation.effective_priority(), active.complexity);
    let _ = sessions.update_session_context(&operation.session_id, entry, None);
}

fn sweep_stale(
    ledger: &OperationLedger,
    governor: &PerformanceGovernor,
    sessions: &SessionStore,
    max_age: Duration,
) -> usize {
    let stale = ledger.take_stale(max_age);
    let count = stale.len();
    for (id, active) in stale {
        warn!(
            operation_id = %id,
            operation = %active.operation.name,
            "retiring operation that never completed"
        );
        retire_failed(governor, sessions, id, &active);
    }
    count
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
