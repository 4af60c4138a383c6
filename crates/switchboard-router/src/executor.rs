//! Decision execution.
//!
//! Dispatches a [`RoutingDecision`] through a [`ServiceTransport`] according to
//! its [`ExecutionStrategy`], bounding each call by the decision timeout. When
//! the strategy fails, the fallback list is walked in order; exhausting it
//! yields [`RouterError::AllTargetsFailed`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use serde::Serialize;
use serde_json::{Map, Value};
use switchboard_core::Operation;
use switchboard_core::canonical::canonical_json;
use switchboard_settings::ConsensusPolicy;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::decision::{ExecutionStrategy, RoutingDecision};
use crate::errors::{Result, RouterError};
use crate::registry::ServiceRegistry;
use crate::transport::{ServiceRequest, ServiceTransport};

/// One call to one service.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchAttempt {
    /// Target service.
    pub service_id: String,
    /// Whether the call succeeded within the timeout.
    pub success: bool,
    /// Observed call duration.
    pub duration_ms: u64,
    /// Whether the call hit the decision timeout.
    pub timed_out: bool,
    /// Failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip)]
    result: Option<Value>,
}

impl DispatchAttempt {
    fn to_error(&self, timeout_ms: u64) -> RouterError {
        if self.timed_out {
            RouterError::Timeout {
                service: self.service_id.clone(),
                timeout_ms,
            }
        } else {
            RouterError::Dispatch {
                service: self.service_id.clone(),
                message: self.error.clone().unwrap_or_default(),
            }
        }
    }
}

/// Aggregated result of executing a decision.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionOutcome {
    /// Strategy that was executed.
    pub strategy: ExecutionStrategy,
    /// Aggregated result value.
    pub result: Value,
    /// Services whose results make up `result`.
    pub served_by: Vec<String>,
    /// Every call made, in completion-independent dispatch order.
    pub attempts: Vec<DispatchAttempt>,
    /// Whether a fallback service produced the result.
    pub used_fallback: bool,
    /// Wall time for the whole execution.
    pub duration_ms: u64,
}

type StrategyResult = Result<(Value, Vec<String>)>;

/// Executes routing decisions against the transport.
pub struct Executor {
    registry: Arc<ServiceRegistry>,
    transport: Arc<dyn ServiceTransport>,
    consensus: ConsensusPolicy,
}

impl Executor {
    /// Create an executor.
    pub fn new(
        registry: Arc<ServiceRegistry>,
        transport: Arc<dyn ServiceTransport>,
        consensus: ConsensusPolicy,
    ) -> Self {
        Self {
            registry,
            transport,
            consensus,
        }
    }

    /// Execute `decision` for `operation`.
    pub async fn execute(
        &self,
        decision: &RoutingDecision,
        operation: &Operation,
    ) -> Result<ExecutionOutcome> {
        let started = Instant::now();
        let request = ServiceRequest::for_operation(operation);
        let timeout = Duration::from_millis(decision.timeout_ms.max(1));
        let mut attempts = Vec::new();

        let targets = &decision.target_services;
        let primary = match decision.strategy {
            ExecutionStrategy::Sequential => {
                self.run_sequential(targets, &request, timeout, &mut attempts).await
            }
            ExecutionStrategy::Parallel => {
                self.run_parallel(targets, &request, timeout, &mut attempts).await
            }
            ExecutionStrategy::PrimaryFallback => {
                self.run_first_success(targets, &request, timeout, &mut attempts).await
            }
            ExecutionStrategy::Consensus => {
                self.run_consensus(targets, &request, timeout, &mut attempts).await
            }
        };

        let (result, served_by, used_fallback) = match primary {
            Ok((result, served_by)) => (result, served_by, false),
            Err(err) => {
                warn!(
                    operation = %operation.name,
                    strategy = %decision.strategy,
                    error = %err,
                    "targets failed, walking fallback chain"
                );
                let remaining: Vec<String> = decision
                    .fallback_services
                    .iter()
                    .filter(|s| !attempts.iter().any(|a| &a.service_id == *s))
                    .cloned()
                    .collect();
                match self
                    .run_first_success(&remaining, &request, timeout, &mut attempts)
                    .await
                {
                    Ok((result, served_by)) => (result, served_by, true),
                    Err(_) => {
                        return Err(RouterError::AllTargetsFailed {
                            attempted: attempts.into_iter().map(|a| a.service_id).collect(),
                        });
                    }
                }
            }
        };

        Ok(ExecutionOutcome {
            strategy: decision.strategy,
            result,
            served_by,
            attempts,
            used_fallback,
            duration_ms: millis(started.elapsed()),
        })
    }

    async fn dispatch_one(
        &self,
        service_id: &str,
        request: &ServiceRequest,
        timeout: Duration,
    ) -> DispatchAttempt {
        let guard = self.registry.dispatch(service_id);
        let started = Instant::now();
        let response =
            tokio::time::timeout(timeout, self.transport.issue(service_id, request.clone())).await;
        let elapsed = started.elapsed();

        let (success, result, error, timed_out) = match response {
            Ok(r) if r.success => (true, Some(r.result.unwrap_or(Value::Null)), None, false),
            Ok(r) => (
                false,
                None,
                Some(r.error.unwrap_or_else(|| "service reported failure".into())),
                false,
            ),
            Err(_) => (
                false,
                None,
                Some(format!("timed out after {}ms", timeout.as_millis())),
                true,
            ),
        };
        let _ = guard.finish(success);
        debug!(service = service_id, success, elapsed_ms = millis(elapsed), "dispatch finished");

        DispatchAttempt {
            service_id: service_id.to_string(),
            success,
            duration_ms: millis(elapsed),
            timed_out,
            error,
            result,
        }
    }

    async fn run_sequential(
        &self,
        targets: &[String],
        request: &ServiceRequest,
        timeout: Duration,
        attempts: &mut Vec<DispatchAttempt>,
    ) -> StrategyResult {
        let mut batch = Vec::with_capacity(targets.len());
        for target in targets {
            batch.push(self.dispatch_one(target, request, timeout).await);
        }
        aggregate(batch, timeout, attempts)
    }

    async fn run_parallel(
        &self,
        targets: &[String],
        request: &ServiceRequest,
        timeout: Duration,
        attempts: &mut Vec<DispatchAttempt>,
    ) -> StrategyResult {
        let batch = join_all(
            targets
                .iter()
                .map(|target| self.dispatch_one(target, request, timeout)),
        )
        .await;
        aggregate(batch, timeout, attempts)
    }

    async fn run_first_success(
        &self,
        targets: &[String],
        request: &ServiceRequest,
        timeout: Duration,
        attempts: &mut Vec<DispatchAttempt>,
    ) -> StrategyResult {
        let mut last_error = None;
        for target in targets {
            let mut attempt = self.dispatch_one(target, request, timeout).await;
            if attempt.success {
                let result = attempt.result.take().unwrap_or(Value::Null);
                attempts.push(attempt);
                return Ok((result, vec![target.clone()]));
            }
            last_error = Some(attempt.to_error(millis(timeout)));
            attempts.push(attempt);
        }
        Err(last_error.unwrap_or_else(|| RouterError::AllTargetsFailed {
            attempted: Vec::new(),
        }))
    }

    async fn run_consensus(
        &self,
        targets: &[String],
        request: &ServiceRequest,
        timeout: Duration,
        attempts: &mut Vec<DispatchAttempt>,
    ) -> StrategyResult {
        let mut batch = join_all(
            targets
                .iter()
                .map(|target| self.dispatch_one(target, request, timeout)),
        )
        .await;

        let mut groups: HashMap<String, (Value, Vec<String>)> = HashMap::new();
        for attempt in &mut batch {
            if let Some(value) = attempt.result.take() {
                let group = groups
                    .entry(canonical_json(&value))
                    .or_insert_with(|| (value, Vec::new()));
                group.1.push(attempt.service_id.clone());
            }
        }
        attempts.extend(batch);

        let required = match self.consensus {
            ConsensusPolicy::Majority => targets.len() / 2 + 1,
            ConsensusPolicy::Unanimous => targets.len(),
        };
        let best = groups
            .into_values()
            .max_by(|a, b| a.1.len().cmp(&b.1.len()).then_with(|| b.1.cmp(&a.1)));
        match best {
            Some((value, agreeing)) if agreeing.len() >= required => {
                debug!(agreeing = agreeing.len(), required, "consensus reached");
                Ok((value, agreeing))
            }
            best => Err(RouterError::ConsensusNotReached {
                agreeing: best.map_or(0, |(_, agreeing)| agreeing.len()),
                required,
            }),
        }
    }
}

/// Fold a batch into `(result, served_by)`. One success yields its value;
/// several yield an object keyed by service id.
fn aggregate(
    mut batch: Vec<DispatchAttempt>,
    timeout: Duration,
    attempts: &mut Vec<DispatchAttempt>,
) -> StrategyResult {
    let mut results = Map::new();
    let mut served_by = Vec::new();
    for attempt in &mut batch {
        if let Some(value) = attempt.result.take() {
            served_by.push(attempt.service_id.clone());
            let _ = results.insert(attempt.service_id.clone(), value);
        }
    }
    let last_error = batch.last().map(|a| a.to_error(millis(timeout)));
    attempts.extend(batch);

    match served_by.len() {
        0 => Err(last_error.unwrap_or_else(|| RouterError::AllTargetsFailed {
            attempted: Vec::new(),
        })),
        1 => {
            let value = results.into_iter().next().map_or(Value::Null, |(_, v)| v);
            Ok((value, served_by))
        }
        _ => Ok((Value::Object(results), served_by)),
    }
}

#[allow(clippy::cast_possible_truncation)]
fn millis(duration: Duration) -> u64 {
    duration.as_millis() as u64
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{MockServiceTransport, ServiceResponse};
    use assert_matches::assert_matches;
    use serde_json::json;
    use switchboard_core::SessionId;
    use switchboard_settings::default_services;

    fn decision(strategy: ExecutionStrategy, targets: &[&str], fallbacks: &[&str]) -> RoutingDecision {
        RoutingDecision {
            target_services: targets.iter().map(ToString::to_string).collect(),
            strategy,
            timeout_ms: 1000,
            fallback_services: fallbacks.iter().map(ToString::to_string).collect(),
            domain_hints: vec![],
            complexity: 0.5,
            cache_key: "k".into(),
            is_fallback: false,
            circuit_open: false,
        }
    }

    fn executor(transport: MockServiceTransport, policy: ConsensusPolicy) -> (Executor, Arc<ServiceRegistry>) {
        let registry = Arc::new(ServiceRegistry::from_settings(&default_services()).unwrap());
        let exec = Executor::new(Arc::clone(&registry), Arc::new(transport), policy);
        (exec, registry)
    }

    fn op() -> Operation {
        Operation::new("Edit", SessionId::from("s1"))
    }

    #[tokio::test]
    async fn primary_fallback_stops_at_first_success() {
        let mut transport = MockServiceTransport::new();
        let _ = transport
            .expect_issue()
            .withf(|id, _| id == "quality")
            .times(1)
            .returning(|_, _| ServiceResponse::failed("lint crashed"));
        let _ = transport
            .expect_issue()
            .withf(|id, _| id == "ui")
            .times(1)
            .returning(|_, _| ServiceResponse::ok(json!("edited")));
        let (exec, registry) = executor(transport, ConsensusPolicy::Majority);

        let outcome = exec
            .execute(&decision(ExecutionStrategy::PrimaryFallback, &["quality", "ui"], &["general"]), &op())
            .await
            .unwrap();
        assert_eq!(outcome.result, json!("edited"));
        assert_eq!(outcome.served_by, vec!["ui"]);
        assert!(!outcome.used_fallback);
        assert_eq!(outcome.attempts.len(), 2);
        assert_eq!(registry.get("quality").unwrap().error_count, 1);
    }

    #[tokio::test]
    async fn fallback_chain_runs_after_targets_fail() {
        let mut transport = MockServiceTransport::new();
        let _ = transport
            .expect_issue()
            .withf(|id, _| id == "quality")
            .returning(|_, _| ServiceResponse::failed("down"));
        let _ = transport
            .expect_issue()
            .withf(|id, _| id == "general")
            .returning(|_, _| ServiceResponse::ok(json!({"handled": true})));
        let (exec, _) = executor(transport, ConsensusPolicy::Majority);

        let outcome = exec
            .execute(&decision(ExecutionStrategy::Sequential, &["quality"], &["general"]), &op())
            .await
            .unwrap();
        assert!(outcome.used_fallback);
        assert_eq!(outcome.served_by, vec!["general"]);
    }

    #[tokio::test]
    async fn exhausted_chain_reports_all_attempts() {
        let mut transport = MockServiceTransport::new();
        let _ = transport
            .expect_issue()
            .returning(|_, _| ServiceResponse::failed("nope"));
        let (exec, _) = executor(transport, ConsensusPolicy::Majority);

        let err = exec
            .execute(
                &decision(ExecutionStrategy::PrimaryFallback, &["quality", "ui"], &["general", "quality"]),
                &op(),
            )
            .await
            .unwrap_err();
        assert_matches!(err, RouterError::AllTargetsFailed { attempted } => {
            assert_eq!(attempted, vec!["quality", "ui", "general"]);
        });
    }

    #[tokio::test]
    async fn parallel_aggregates_by_service() {
        let mut transport = MockServiceTransport::new();
        let _ = transport
            .expect_issue()
            .returning(|id, _| ServiceResponse::ok(json!(id.len())));
        let (exec, registry) = executor(transport, ConsensusPolicy::Majority);

        let outcome = exec
            .execute(&decision(ExecutionStrategy::Parallel, &["ui", "tasks"], &[]), &op())
            .await
            .unwrap();
        assert_eq!(outcome.result, json!({"ui": 2, "tasks": 5}));
        assert_eq!(registry.get("ui").unwrap().current_load, 0);
    }

    #[tokio::test]
    async fn majority_consensus_returns_agreed_value() {
        let mut transport = MockServiceTransport::new();
        let _ = transport.expect_issue().returning(|id, _| {
            if id == "tasks" {
                ServiceResponse::ok(json!({"b": 2, "a": 1}))
            } else if id == "ui" {
                ServiceResponse::ok(json!({"a": 1, "b": 2}))
            } else {
                ServiceResponse::ok(json!({"a": 0}))
            }
        });
        let (exec, _) = executor(transport, ConsensusPolicy::Majority);

        let outcome = exec
            .execute(&decision(ExecutionStrategy::Consensus, &["tasks", "ui", "quality"], &[]), &op())
            .await
            .unwrap();
        assert_eq!(outcome.result, json!({"a": 1, "b": 2}));
        assert_eq!(outcome.served_by.len(), 2);
    }

    #[tokio::test]
    async fn unanimous_consensus_fails_on_disagreement() {
        let mut transport = MockServiceTransport::new();
        let _ = transport
            .expect_issue()
            .returning(|id, _| ServiceResponse::ok(json!(id == "ui")));
        let (exec, _) = executor(transport, ConsensusPolicy::Unanimous);

        let err = exec
            .execute(&decision(ExecutionStrategy::Consensus, &["tasks", "ui", "quality"], &[]), &op())
            .await
            .unwrap_err();
        assert_matches!(err, RouterError::AllTargetsFailed { .. });
    }

    struct SlowTransport;

    #[async_trait::async_trait]
    impl ServiceTransport for SlowTransport {
        async fn issue(&self, service_id: &str, _request: ServiceRequest) -> ServiceResponse {
            if service_id == "ui" {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            ServiceResponse::ok(json!(service_id))
        }

        async fn probe(&self, _service_id: &str) -> switchboard_core::ServiceStatus {
            switchboard_core::ServiceStatus::Online
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_dispatch_failure() {
        let registry = Arc::new(ServiceRegistry::from_settings(&default_services()).unwrap());
        let exec = Executor::new(Arc::clone(&registry), Arc::new(SlowTransport), ConsensusPolicy::Majority);

        let outcome = exec
            .execute(&decision(ExecutionStrategy::PrimaryFallback, &["ui", "general"], &[]), &op())
            .await
            .unwrap();
        assert_eq!(outcome.served_by, vec!["general"]);
        assert!(outcome.attempts[0].timed_out);
        assert_eq!(registry.get("ui").unwrap().error_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn aborted_dispatch_releases_load() {
        let registry = Arc::new(ServiceRegistry::from_settings(&default_services()).unwrap());
        let exec = Arc::new(Executor::new(
            Arc::clone(&registry),
            Arc::new(SlowTransport),
            ConsensusPolicy::Majority,
        ));

        let mut slow = decision(ExecutionStrategy::Sequential, &["ui"], &[]);
        slow.timeout_ms = 3_600_000;
        let task = {
            let exec = Arc::clone(&exec);
            tokio::spawn(async move { exec.execute(&slow, &op()).await })
        };
        for _ in 0..5 {
            tokio::task::yield_now().await;
        }
        assert_eq!(registry.get("ui").unwrap().current_load, 1);

        task.abort();
        assert!(task.await.unwrap_err().is_cancelled());
        let ui = registry.get("ui").unwrap();
        assert_eq!(ui.current_load, 0);
        assert_eq!(ui.error_count, 1);
    }
}
