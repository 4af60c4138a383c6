//! Routable operation model.
//!
//! An [`Operation`] is created for every inbound tool invocation. It is
//! immutable apart from the defaults the coordinator assigns during
//! enrichment (budget and priority), which are only ever filled when absent.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::{OperationId, SessionId};

/// Operation priority, ordered from least to most urgent.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    /// Background work; relaxed budgets.
    Low,
    /// Default priority.
    #[default]
    Medium,
    /// Latency-sensitive work.
    High,
    /// Must not be delayed; may require parallel or consensus execution.
    Critical,
}

impl Priority {
    /// `true` for `High` and `Critical`.
    #[must_use]
    pub fn is_elevated(self) -> bool {
        self >= Self::High
    }

    /// Wire name (`"low"`, `"medium"`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    /// Parse a wire name, case-insensitively.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.to_ascii_lowercase().as_str() {
            "low" => Some(Self::Low),
            "medium" | "normal" => Some(Self::Medium),
            "high" => Some(Self::High),
            "critical" | "urgent" => Some(Self::Critical),
            _ => None,
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Latency budget attached to an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceBudget {
    /// Maximum acceptable execution time in milliseconds.
    pub max_time_ms: u64,
    /// Priority the budget was derived for.
    pub priority: Priority,
}

/// A single routable request representing one tool invocation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    /// Operation identifier (the host's execution id when provided).
    pub id: OperationId,
    /// Tool / operation name, e.g. `"Read"` or `"Bash"`.
    pub name: String,
    /// Opaque argument bag.
    #[serde(default)]
    pub arguments: Map<String, Value>,
    /// Owning session.
    pub session_id: SessionId,
    /// Requested priority, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<Priority>,
    /// Caller-supplied complexity estimate in `[0, 1]`, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub complexity: Option<f64>,
    /// Latency budget, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub budget: Option<PerformanceBudget>,
}

impl Operation {
    /// Create an operation with a fresh id and no arguments.
    #[must_use]
    pub fn new(name: impl Into<String>, session_id: SessionId) -> Self {
        Self {
            id: OperationId::new(),
            name: name.into(),
            arguments: Map::new(),
            session_id,
            priority: None,
            complexity: None,
            budget: None,
        }
    }

    /// Replace the operation id.
    #[must_use]
    pub fn with_id(mut self, id: OperationId) -> Self {
        self.id = id;
        self
    }

    /// Replace the argument bag. Non-object values become `{"value": v}`.
    #[must_use]
    pub fn with_arguments(mut self, arguments: Value) -> Self {
        self.arguments = match arguments {
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

    /// Set an explicit priority.
    #[must_use]
    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Set an explicit complexity estimate (clamped to `[0, 1]`).
    #[must_use]
    pub fn with_complexity(mut self, complexity: f64) -> Self {
        self.complexity = Some(complexity.clamp(0.0, 1.0));
        self
    }

    /// Set an explicit budget.
    #[must_use]
    pub fn with_budget(mut self, budget: PerformanceBudget) -> Self {
        self.budget = Some(budget);
        self
    }

    /// Priority used for routing: explicit priority, then the budget's, then `Medium`.
    #[must_use]
    pub fn effective_priority(&self) -> Priority {
        self.priority
            .or_else(|| self.budget.map(|b| b.priority))
            .unwrap_or_default()
    }

    /// Requested budget in milliseconds, if any.
    #[must_use]
    pub fn requested_budget_ms(&self) -> Option<u64> {
        self.budget.map(|b| b.max_time_ms)
    }

    /// Boolean flag lookup in the argument bag (`true`, `"true"`, `1`).
    #[must_use]
    pub fn flag(&self, key: &str) -> bool {
        match self.arguments.get(key) {
            Some(Value::Bool(b)) => *b,
            Some(Value::String(s)) => matches!(s.as_str(), "true" | "1" | "yes"),
            Some(Value::Number(n)) => n.as_i64().is_some_and(|v| v != 0),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn priority_ordering() {
        assert!(Priority::Low < Priority::Medium);
        assert!(Priority::High < Priority::Critical);
        assert!(Priority::High.is_elevated());
        assert!(!Priority::Medium.is_elevated());
    }

    #[test]
    fn priority_parse() {
        assert_eq!(Priority::parse("HIGH"), Some(Priority::High));
        assert_eq!(Priority::parse("urgent"), Some(Priority::Critical));
        assert_eq!(Priority::parse("whenever"), None);
    }

    #[test]
    fn priority_serde_lowercase() {
        assert_eq!(serde_json::to_value(Priority::Critical).unwrap(), json!("critical"));
    }

    #[test]
    fn effective_priority_prefers_explicit() {
        let op = Operation::new("Read", SessionId::from("s1"))
            .with_budget(PerformanceBudget {
                max_time_ms: 100,
                priority: Priority::Low,
            })
            .with_priority(Priority::High);
        assert_eq!(op.effective_priority(), Priority::High);
    }

    #[test]
    fn effective_priority_falls_back_to_budget_then_medium() {
        let op = Operation::new("Read", SessionId::from("s1"));
        assert_eq!(op.effective_priority(), Priority::Medium);
        let op = op.with_budget(PerformanceBudget {
            max_time_ms: 100,
            priority: Priority::Low,
        });
        assert_eq!(op.effective_priority(), Priority::Low);
    }

    #[test]
    fn non_object_arguments_are_wrapped() {
        let op = Operation::new("Bash", SessionId::from("s1")).with_arguments(json!("ls"));
        assert_eq!(op.arguments.get("value"), Some(&json!("ls")));
    }

    #[test]
    fn flag_lookup() {
        let op = Operation::new("Task", SessionId::from("s1"))
            .with_arguments(json!({"parallel": true, "consensus": "yes", "n": 0}));
        assert!(op.flag("parallel"));
        assert!(op.flag("consensus"));
        assert!(!op.flag("n"));
        assert!(!op.flag("missing"));
    }

    #[test]
    fn complexity_is_clamped() {
        let op = Operation::new("Task", SessionId::from("s1")).with_complexity(3.0);
        assert_eq!(op.complexity, Some(1.0));
    }
}
