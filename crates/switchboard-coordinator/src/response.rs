//! Structured responses returned to the host.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::Value;
use switchboard_core::{ErrorKind, OperationId, Priority, ServiceStatus, SessionId};
use switchboard_governor::{CacheStats, CompletedOperation, OpenBreaker};
use switchboard_router::{ExecutionOutcome, RoutingDecision};
use switchboard_session::{Prediction, SessionSummary, SessionUpdate};

use crate::errors::CoordinatorError;

/// What a handled event produced.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HookOutcome {
    /// Routing (and optionally dispatch) for an operation about to run.
    #[serde(rename_all = "camelCase")]
    PreToolUse {
        /// Routing decision.
        decision: RoutingDecision,
        /// Priority after enrichment.
        priority: Priority,
        /// Budget after enrichment.
        #[serde(skip_serializing_if = "Option::is_none")]
        budget_ms: Option<u64>,
        /// Cached result served instead of dispatching.
        #[serde(skip_serializing_if = "Option::is_none")]
        cached: Option<Value>,
        /// Result of dispatching the decision.
        #[serde(skip_serializing_if = "Option::is_none")]
        execution: Option<ExecutionOutcome>,
        /// Whether the operation's circuit breaker is open.
        circuit_open: bool,
    },
    /// Bookkeeping for a finished operation.
    #[serde(rename_all = "camelCase")]
    PostToolUse {
        /// Timing and breaker result.
        completed: CompletedOperation,
        /// Session after recording the operation.
        session: SessionUpdate,
        /// Whether the result was stored in the cache.
        cached: bool,
        /// Likely next operation.
        #[serde(skip_serializing_if = "Option::is_none")]
        prediction: Option<Prediction>,
    },
    /// State updates were merged into the session.
    #[serde(rename_all = "camelCase")]
    ContextUpdated {
        /// Updated session.
        session_id: SessionId,
    },
    /// Session created or refreshed.
    #[serde(rename_all = "camelCase")]
    SessionStarted {
        /// Session id.
        session_id: SessionId,
        /// Whether the session was new.
        created: bool,
    },
    /// Session retired.
    #[serde(rename_all = "camelCase")]
    SessionEnded {
        /// Final statistics.
        summary: SessionSummary,
    },
}

/// Response to one inbound event. Never an `Err`; failures are reported in-band.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HookResponse {
    /// Whether the event was handled. Degraded outcomes still count.
    pub success: bool,
    /// Operation the event belongs to.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<OperationId>,
    /// Failure or degradation message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Failure or degradation class.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    /// Time spent handling the event.
    pub duration_ms: u64,
    /// What the event produced.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub outcome: Option<HookOutcome>,
}

impl HookResponse {
    pub(crate) fn ok(operation_id: Option<OperationId>, outcome: HookOutcome, duration_ms: u64) -> Self {
        Self {
            success: true,
            operation_id,
            error: None,
            error_kind: None,
            duration_ms,
            outcome: Some(outcome),
        }
    }

    /// Handled, but in a reduced mode (e.g. dispatch skipped).
    pub(crate) fn degraded(
        operation_id: Option<OperationId>,
        outcome: HookOutcome,
        kind: ErrorKind,
        message: String,
        duration_ms: u64,
    ) -> Self {
        Self {
            success: true,
            operation_id,
            error: Some(message),
            error_kind: Some(kind),
            duration_ms,
            outcome: Some(outcome),
        }
    }

    pub(crate) fn failure(operation_id: Option<OperationId>, err: &CoordinatorError, duration_ms: u64) -> Self {
        Self {
            success: false,
            operation_id,
            error: Some(err.to_string()),
            error_kind: Some(err.kind()),
            duration_ms,
            outcome: None,
        }
    }

    /// The routing decision, for `pre_tool_use` responses.
    pub fn decision(&self) -> Option<&RoutingDecision> {
        match &self.outcome {
            Some(HookOutcome::PreToolUse { decision, .. }) => Some(decision),
            _ => None,
        }
    }

    /// The cached result served, for `pre_tool_use` responses.
    pub fn cached(&self) -> Option<&Value> {
        match &self.outcome {
            Some(HookOutcome::PreToolUse { cached, .. }) => cached.as_ref(),
            _ => None,
        }
    }

    /// The prediction, for `post_tool_use` responses.
    pub fn prediction(&self) -> Option<&Prediction> {
        match &self.outcome {
            Some(HookOutcome::PostToolUse { prediction, .. }) => prediction.as_ref(),
            _ => None,
        }
    }
}

/// Point-in-time view of the coordinator.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinatorStatus {
    /// Operations in flight.
    pub active_operations: usize,
    /// Concurrency cap.
    pub max_concurrent_operations: usize,
    /// Last known status per service.
    pub services: BTreeMap<String, ServiceStatus>,
    /// Breakers currently open.
    pub open_breakers: Vec<OpenBreaker>,
    /// Result cache counters.
    pub cache: CacheStats,
    /// Cached routing decisions.
    pub cached_decisions: usize,
    /// Live sessions.
    pub sessions: usize,
    /// Stored metric records.
    pub metrics: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn failure_carries_kind() {
        let err = CoordinatorError::CapacityExceeded { active: 2, max: 2 };
        let resp = HookResponse::failure(Some(OperationId::from("op")), &err, 0);
        assert!(!resp.success);
        assert_eq!(resp.error_kind, Some(ErrorKind::CapacityExceeded));
        let wire = serde_json::to_value(&resp).unwrap();
        assert_eq!(wire["errorKind"], "capacity_exceeded");
        assert_eq!(wire["operationId"], "op");
        assert!(wire.get("outcome").is_none());
    }

    #[test]
    fn outcome_is_tagged() {
        let resp = HookResponse::ok(
            None,
            HookOutcome::SessionStarted {
                session_id: SessionId::from("s"),
                created: true,
            },
            1,
        );
        let wire = serde_json::to_value(&resp).unwrap();
        assert_eq!(
            wire["outcome"],
            json!({"type": "session_started", "sessionId": "s", "created": true})
        );
        assert!(resp.decision().is_none());
        assert!(resp.prediction().is_none());
    }
}
