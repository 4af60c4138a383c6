//! In-flight operation tracking.
//!
//! Each operation id moves `CREATED -> IN_FLIGHT -> COMPLETED -> removed`.
//! Admission and the capacity check happen under one lock so a burst can
//! never push the active count past the cap. Completed ids are remembered in
//! a bounded FIFO so late reuse can be told apart from an id never seen.
//! Operations that never see their `post_tool_use` are drained by
//! [`OperationLedger::take_stale`].

use std::collections::{HashMap, HashSet, VecDeque};
use std::time::Duration;

use parking_lot::Mutex;
use switchboard_core::{Operation, OperationId};
use tokio::time::Instant;

use crate::errors::{CoordinatorError, Result};

/// An operation between `pre_tool_use` and `post_tool_use`.
#[derive(Clone, Debug)]
pub struct ActiveOperation {
    /// The operation, enriched once routing has run.
    pub operation: Operation,
    /// Primary domain it was routed under.
    pub domain: Option<String>,
    /// Complexity it was routed with.
    pub complexity: Option<f64>,
    /// Whether `pre_tool_use` served a cached result.
    pub cache_hit: bool,
    /// When the operation was admitted.
    pub admitted_at: Instant,
}

#[derive(Debug, Default)]
struct LedgerInner {
    active: HashMap<OperationId, ActiveOperation>,
    completed: VecDeque<OperationId>,
    completed_set: HashSet<OperationId>,
}

impl LedgerInner {
    fn remember(&mut self, id: &OperationId, memory: usize) {
        if memory == 0 {
            return;
        }
        if self.completed_set.insert(id.clone()) {
            self.completed.push_back(id.clone());
        }
        while self.completed.len() > memory {
            if let Some(oldest) = self.completed.pop_front() {
                let _ = self.completed_set.remove(&oldest);
            }
        }
    }
}

/// Counted set of in-flight operations plus recently completed ids.
#[derive(Debug)]
pub struct OperationLedger {
    max_active: usize,
    completed_memory: usize,
    inner: Mutex<LedgerInner>,
}

impl OperationLedger {
    /// Create a ledger admitting at most `max_active` operations.
    pub fn new(max_active: usize, completed_memory: usize) -> Self {
        Self {
            max_active,
            completed_memory,
            inner: Mutex::new(LedgerInner::default()),
        }
    }

    /// Admit `operation` as in flight.
    pub fn admit(&self, operation: Operation) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.completed_set.contains(&operation.id) {
            return Err(CoordinatorError::ReusedOperation(operation.id));
        }
        if inner.active.contains_key(&operation.id) {
            return Err(CoordinatorError::InvalidEvent(format!(
                "operation {} is already in flight",
                operation.id
            )));
        }
        if inner.active.len() >= self.max_active {
            return Err(CoordinatorError::CapacityExceeded {
                active: inner.active.len(),
                max: self.max_active,
            });
        }
        let _ = inner.active.insert(
            operation.id.clone(),
            ActiveOperation {
                operation,
                domain: None,
                complexity: None,
                cache_hit: false,
                admitted_at: Instant::now(),
            },
        );
        Ok(())
    }

    /// Replace the stored operation with its enriched form and routing facts.
    pub fn attach(&self, operation: Operation, domain: Option<String>, complexity: f64, cache_hit: bool) {
        let mut inner = self.inner.lock();
        if let Some(active) = inner.active.get_mut(&operation.id) {
            active.operation = operation;
            active.domain = domain;
            active.complexity = Some(complexity);
            active.cache_hit = cache_hit;
        }
    }

    /// Move `id` from in flight to completed.
    pub fn complete(&self, id: &OperationId) -> Result<ActiveOperation> {
        let mut inner = self.inner.lock();
        let Some(active) = inner.active.remove(id) else {
            return Err(if inner.completed_set.contains(id) {
                CoordinatorError::ReusedOperation(id.clone())
            } else {
                CoordinatorError::UnknownOperation(id.clone())
            });
        };
        inner.remember(id, self.completed_memory);
        Ok(active)
    }

    /// Complete every operation admitted more than `max_age` ago and return
    /// them, oldest first.
    pub fn take_stale(&self, max_age: Duration) -> Vec<(OperationId, ActiveOperation)> {
        let mut inner = self.inner.lock();
        let stale: Vec<OperationId> = inner
            .active
            .iter()
            .filter(|(_, active)| active.admitted_at.elapsed() > max_age)
            .map(|(id, _)| id.clone())
            .collect();
        let mut taken: Vec<(OperationId, ActiveOperation)> = stale
            .into_iter()
            .filter_map(|id| inner.active.remove(&id).map(|active| (id, active)))
            .collect();
        taken.sort_by_key(|(_, active)| active.admitted_at);
        for (id, _) in &taken {
            inner.remember(id, self.completed_memory);
        }
        taken
    }

    /// Operations in flight.
    pub fn active_len(&self) -> usize {
        self.inner.lock().active.len()
    }

    /// Whether `id` is in flight.
    pub fn is_active(&self, id: &OperationId) -> bool {
        self.inner.lock().active.contains_key(id)
    }

    /// Forget everything.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.active.clear();
        inner.completed.clear();
        inner.completed_set.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use switchboard_core::SessionId;

    fn op(id: &str) -> Operation {
        Operation::new("Read", SessionId::from("s")).with_id(OperationId::from(id))
    }

    #[test]
    fn admits_up_to_cap() {
        let ledger = OperationLedger::new(2, 10);
        ledger.admit(op("a")).unwrap();
        ledger.admit(op("b")).unwrap();
        assert_matches!(
            ledger.admit(op("c")),
            Err(CoordinatorError::CapacityExceeded { active: 2, max: 2 })
        );
        let _ = ledger.complete(&OperationId::from("a")).unwrap();
        ledger.admit(op("c")).unwrap();
        assert_eq!(ledger.active_len(), 2);
    }

    #[test]
    fn duplicate_in_flight_is_rejected() {
        let ledger = OperationLedger::new(5, 10);
        ledger.admit(op("a")).unwrap();
        assert_matches!(ledger.admit(op("a")), Err(CoordinatorError::InvalidEvent(_)));
    }

    #[test]
    fn completed_ids_are_remembered() {
        let ledger = OperationLedger::new(5, 10);
        ledger.admit(op("a")).unwrap();
        let _ = ledger.complete(&OperationId::from("a")).unwrap();
        assert_matches!(
            ledger.complete(&OperationId::from("a")),
            Err(CoordinatorError::ReusedOperation(_))
        );
        assert_matches!(ledger.admit(op("a")), Err(CoordinatorError::ReusedOperation(_)));
        assert_matches!(
            ledger.complete(&OperationId::from("never")),
            Err(CoordinatorError::UnknownOperation(_))
        );
    }

    #[test]
    fn completed_memory_is_bounded() {
        let ledger = OperationLedger::new(100, 3);
        for i in 0..5 {
            let id = format!("op-{i}");
            ledger.admit(op(&id)).unwrap();
            let _ = ledger.complete(&OperationId::from(id)).unwrap();
        }
        assert!(ledger.admit(op("op-0")).is_ok());
        assert_matches!(ledger.admit(op("op-4")), Err(CoordinatorError::ReusedOperation(_)));
    }

    #[test]
    fn attach_updates_routing_facts() {
        let ledger = OperationLedger::new(5, 10);
        ledger.admit(op("a")).unwrap();
        let enriched = op("a").with_complexity(0.4);
        ledger.attach(enriched, Some("filesystem".into()), 0.4, true);
        let active = ledger.complete(&OperationId::from("a")).unwrap();
        assert_eq!(active.domain.as_deref(), Some("filesystem"));
        assert_eq!(active.complexity, Some(0.4));
        assert_eq!(active.operation.complexity, Some(0.4));
        assert!(active.cache_hit);
    }

    #[tokio::test(start_paused = true)]
    async fn stale_operations_are_taken_and_remembered() {
        let ledger = OperationLedger::new(2, 10);
        ledger.admit(op("old")).unwrap();
        tokio::time::advance(Duration::from_secs(50)).await;
        ledger.admit(op("young")).unwrap();
        tokio::time::advance(Duration::from_secs(20)).await;

        let taken = ledger.take_stale(Duration::from_secs(60));
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].0, OperationId::from("old"));
        assert_eq!(ledger.active_len(), 1);
        assert_matches!(
            ledger.complete(&OperationId::from("old")),
            Err(CoordinatorError::ReusedOperation(_))
        );
        ledger.admit(op("next")).unwrap();
    }
}
