//! Inbound lifecycle events.
//!
//! The host emits one [`InboundEvent`] per tool-invocation lifecycle point.
//! Field names are `camelCase` on the wire, event kinds `snake_case`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use switchboard_core::{Operation, OperationId, PerformanceBudget, Priority, SessionId};

use crate::errors::{CoordinatorError, Result};

/// Lifecycle point an event was emitted at.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    /// Before a tool runs.
    PreToolUse,
    /// After a tool ran.
    PostToolUse,
    /// Session state changed outside a tool call.
    ContextUpdate,
    /// A session began.
    SessionStart,
    /// A session ended.
    SessionEnd,
}

impl EventKind {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::PreToolUse => "pre_tool_use",
            Self::PostToolUse => "post_tool_use",
            Self::ContextUpdate => "context_update",
            Self::SessionStart => "session_start",
            Self::SessionEnd => "session_end",
        }
    }

    /// Whether events of this kind count against the concurrency cap.
    #[must_use]
    pub fn is_capacity_checked(self) -> bool {
        self == Self::PreToolUse
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-supplied routing hints. Anything absent is derived.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EventContext {
    /// Explicit priority.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Explicit complexity estimate in `[0, 1]`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<f64>,
    /// Explicit time budget in milliseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub budget_ms: Option<u64>,
}

/// One lifecycle event from the host.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEvent {
    /// Lifecycle point.
    pub event_kind: EventKind,
    /// Tool being invoked. Empty for session events.
    #[serde(default)]
    pub tool_name: String,
    /// Tool arguments, or state updates for `context_update`.
    #[serde(default)]
    pub tool_arguments: Map<String, Value>,
    /// Owning session.
    pub session_id: SessionId,
    /// Operation id. Generated for `pre_tool_use` when absent; required for `post_tool_use`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_id: Option<OperationId>,
    /// Tool result (`post_tool_use`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Tool error (`post_tool_use`). Its presence marks the operation failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Tokens consumed (`post_tool_use`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_usage: Option<u64>,
    /// Routing hints.
    #[serde(default)]
    pub context: EventContext,
}

impl InboundEvent {
    /// A bare event of `kind` for `session_id`.
    #[must_use]
    pub fn new(event_kind: EventKind, session_id: impl Into<SessionId>) -> Self {
        Self {
            event_kind,
            tool_name: String::new(),
            tool_arguments: Map::new(),
            session_id: session_id.into(),
            execution_id: None,
            result: None,
            error: None,
            token_usage: None,
            context: EventContext::default(),
        }
    }

    /// A `pre_tool_use` event.
    #[must_use]
    pub fn pre_tool_use(tool: impl Into<String>, session_id: impl Into<SessionId>, execution_id: impl Into<OperationId>) -> Self {
        Self::new(EventKind::PreToolUse, session_id)
            .with_tool(tool)
            .with_execution_id(execution_id)
    }

    /// A `post_tool_use` event.
    #[must_use]
    pub fn post_tool_use(tool: impl Into<String>, session_id: impl Into<SessionId>, execution_id: impl Into<OperationId>) -> Self {
        Self::new(EventKind::PostToolUse, session_id)
            .with_tool(tool)
            .with_execution_id(execution_id)
    }

    /// Parse a JSON event.
    pub fn from_json(raw: &str) -> Result<Self> {
        serde_json::from_str(raw).map_err(|e| CoordinatorError::InvalidEvent(e.to_string()))
    }

    /// Set the tool name.
    #[must_use]
    pub fn with_tool(mut self, tool: impl Into<String>) -> Self {
        self.tool_name = tool.into();
        self
    }

    /// Set the execution id.
    #[must_use]
    pub fn with_execution_id(mut self, id: impl Into<OperationId>) -> Self {
        self.execution_id = Some(id.into());
        self
    }

    /// Set the tool arguments. Non-object values are wrapped under `"value"`.
    #[must_use]
    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.tool_arguments = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            other => {
                let mut map = Map::new();
                let _ = map.insert("value".into(), other);
                map
            }
        };
        self
    }

    /// Set the tool result.
    #[must_use]
    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Mark the tool as failed.
    #[must_use]
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }

    /// Set token usage.
    #[must_use]
    pub fn with_token_usage(mut self, tokens: u64) -> Self {
        self.token_usage = Some(tokens);
        self
    }

    /// Set routing hints.
    #[must_use]
    pub fn with_context(mut self, context: EventContext) -> Self {
        self.context = context;
        self
    }

    /// Whether the tool reported success.
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    /// `result.stateUpdates`, when present.
    pub fn state_updates(&self) -> Option<&Value> {
        self.result.as_ref().and_then(|r| r.get("stateUpdates"))
    }

    /// Build the operation this event describes under `id`.
    pub fn to_operation(&self, id: OperationId) -> Operation {
        let mut operation = Operation::new(self.tool_name.clone(), self.session_id.clone()).with_id(id);
        operation.arguments = self.tool_arguments.clone();
        if let Some(priority) = self.context.priority {
            operation = operation.with_priority(priority);
        }
        if let Some(complexity) = self.context.complexity {
            operation = operation.with_complexity(complexity);
        }
        if let Some(max_time_ms) = self.context.budget_ms {
            operation = operation.with_budget(PerformanceBudget {
                max_time_ms,
                priority: self.context.priority.unwrap_or_default(),
            });
        }
        operation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[test]
    fn parses_wire_format() {
        let raw = r#"{
            "eventKind": "post_tool_use",
            "toolName": "Read",
            "toolArguments": {"file_path": "src/main.rs"},
            "sessionId": "s-1",
            "executionId": "op-1",
            "result": {"content": "fn main() {}", "stateUpdates": {"lastFile": "src/main.rs"}},
            "tokenUsage": 120
        }"#;
        let event = InboundEvent::from_json(raw).unwrap();
        assert_eq!(event.event_kind, EventKind::PostToolUse);
        assert_eq!(event.execution_id.as_deref(), Some("op-1"));
        assert_eq!(event.token_usage, Some(120));
        assert!(event.succeeded());
        assert_eq!(event.state_updates(), Some(&json!({"lastFile": "src/main.rs"})));
    }

    #[test]
    fn session_events_need_no_tool() {
        let event = InboundEvent::from_json(r#"{"eventKind": "session_start", "sessionId": "s"}"#).unwrap();
        assert_eq!(event.event_kind, EventKind::SessionStart);
        assert!(event.tool_name.is_empty());
        assert!(!event.event_kind.is_capacity_checked());
    }

    #[test]
    fn rejects_unknown_kind() {
        let err = InboundEvent::from_json(r#"{"eventKind": "stop", "sessionId": "s"}"#).unwrap_err();
        assert_matches!(err, CoordinatorError::InvalidEvent(_));
    }

    #[test]
    fn context_flows_into_operation() {
        let event = InboundEvent::pre_tool_use("Edit", "s", "op")
            .with_arguments(json!({"file_path": "a.rs"}))
            .with_context(EventContext {
                priority: Some(Priority::High),
                complexity: Some(0.7),
                budget_ms: Some(1500),
            });
        let op = event.to_operation(OperationId::from("op"));
        assert_eq!(op.name, "Edit");
        assert_eq!(op.arguments["file_path"], "a.rs");
        assert_eq!(op.priority, Some(Priority::High));
        assert_eq!(op.complexity, Some(0.7));
        assert_eq!(op.requested_budget_ms(), Some(1500));
    }

    #[test]
    fn bare_event_leaves_defaults_open() {
        let op = InboundEvent::pre_tool_use("Read", "s", "op").to_operation(OperationId::from("op"));
        assert!(op.priority.is_none());
        assert!(op.budget.is_none());
        assert!(op.complexity.is_none());
    }

    #[test]
    fn error_marks_failure() {
        let event = InboundEvent::post_tool_use("Bash", "s", "op").with_error("exit 1");
        assert!(!event.succeeded());
    }
}
