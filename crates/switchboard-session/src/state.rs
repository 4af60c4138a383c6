//! Per-session state: bounded history, running aggregates, merged context.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use switchboard_core::{OperationId, Priority, SessionId};
use tokio::time::Instant;

use crate::snapshot::ContextSnapshot;

/// One completed operation in a session's history.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    /// Operation id.
    pub operation_id: OperationId,
    /// Operation name.
    pub operation: String,
    /// Primary domain the operation was routed under.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
    /// Priority it ran with.
    pub priority: Priority,
    /// Complexity estimate it was routed with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub complexity: Option<f64>,
    /// Measured duration in milliseconds.
    pub duration_ms: u64,
    /// Whether it succeeded.
    pub success: bool,
    /// Wall-clock completion time.
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    /// An entry stamped now, with medium priority and no domain.
    #[must_use]
    pub fn new(operation_id: OperationId, operation: impl Into<String>, duration_ms: u64, success: bool) -> Self {
        Self {
            operation_id,
            operation: operation.into(),
            domain: None,
            priority: Priority::Medium,
            complexity: None,
            duration_ms,
            success,
            timestamp: Utc::now(),
        }
    }

    /// Attach the routing domain.
    #[must_use]
    pub fn with_domain(mut self, domain: Option<String>) -> Self {
        self.domain = domain;
        self
    }

    /// Attach the priority and complexity it ran with.
    #[must_use]
    pub fn with_routing(mut self, priority: Priority, complexity: Option<f64>) -> Self {
        self.priority = priority;
        self.complexity = complexity;
        self
    }
}

/// Running performance aggregates for a session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionAggregate {
    /// Operations recorded.
    pub count: u64,
    /// Mean duration in milliseconds.
    pub avg_time_ms: f64,
    /// Fraction of operations that succeeded.
    pub success_rate: f64,
}

impl SessionAggregate {
    /// Fold in one operation using incremental means.
    #[allow(clippy::cast_precision_loss)]
    pub fn record(&mut self, duration_ms: u64, success: bool) {
        self.count += 1;
        let n = self.count as f64;
        self.avg_time_ms += (duration_ms as f64 - self.avg_time_ms) / n;
        let outcome = if success { 1.0 } else { 0.0 };
        self.success_rate += (outcome - self.success_rate) / n;
    }
}

/// Everything known about one session.
#[derive(Clone, Debug)]
pub struct SessionState {
    /// Session id.
    pub id: SessionId,
    /// Wall-clock creation time.
    pub started_at: DateTime<Utc>,
    /// Running aggregates.
    pub aggregate: SessionAggregate,
    /// Context merged from state updates.
    pub context: Map<String, Value>,
    pub(crate) history: VecDeque<HistoryEntry>,
    pub(crate) snapshots: VecDeque<ContextSnapshot>,
    pub(crate) appends: u64,
    pub(crate) created: Instant,
    pub(crate) last_activity: Instant,
}

impl SessionState {
    /// A fresh session.
    #[must_use]
    pub fn new(id: SessionId) -> Self {
        let now = Instant::now();
        Self {
            id,
            started_at: Utc::now(),
            aggregate: SessionAggregate::default(),
            context: Map::new(),
            history: VecDeque::new(),
            snapshots: VecDeque::new(),
            appends: 0,
            created: now,
            last_activity: now,
        }
    }

    /// Mark the session active now.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Time since the last activity.
    pub fn idle_for(&self) -> Duration {
        self.last_activity.elapsed()
    }

    /// Time since creation.
    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    /// Append to history, compacting to `compact_to` entries once `limit` is exceeded.
    pub fn push_history(&mut self, entry: HistoryEntry, limit: usize, compact_to: usize) {
        self.history.push_back(entry);
        self.appends += 1;
        if self.history.len() > limit {
            let excess = self.history.len() - compact_to.min(limit);
            let _ = self.history.drain(..excess);
        }
    }

    /// History, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.history.iter()
    }

    /// Current history length.
    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    /// Total appends over the session's lifetime (compaction does not reset it).
    pub fn appends(&self) -> u64 {
        self.appends
    }

    /// Snapshots, oldest first.
    pub fn snapshots(&self) -> impl Iterator<Item = &ContextSnapshot> {
        self.snapshots.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn entry(i: u64) -> HistoryEntry {
        HistoryEntry::new(OperationId::from(format!("op-{i}")), "Read", i, true)
    }

    #[test]
    fn aggregate_uses_incremental_means() {
        let mut agg = SessionAggregate::default();
        agg.record(100, true);
        agg.record(300, false);
        agg.record(200, true);
        assert_eq!(agg.count, 3);
        assert!((agg.avg_time_ms - 200.0).abs() < 1e-9);
        assert!((agg.success_rate - 2.0 / 3.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn history_compacts_on_overflow() {
        let mut state = SessionState::new(SessionId::from("s"));
        for i in 0..101 {
            state.push_history(entry(i), 100, 50);
        }
        assert_eq!(state.history_len(), 50);
        assert_eq!(state.history().next().unwrap().duration_ms, 51);
        assert_eq!(state.appends(), 101);
    }

    proptest! {
        #[test]
        fn history_never_exceeds_limit(n in 0u64..400) {
            let rt = tokio::runtime::Builder::new_current_thread().enable_time().build().unwrap();
            rt.block_on(async {
                let mut state = SessionState::new(SessionId::from("s"));
                for i in 0..n {
                    state.push_history(entry(i), 100, 50);
                    assert!(state.history_len() <= 100);
                }
                if n > 0 {
                    assert_eq!(state.history().last().unwrap().duration_ms, n - 1);
                }
            });
        }
    }
}
