//! Routing decisions and the decision cache.

use std::collections::{HashMap, VecDeque};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use switchboard_core::Priority;
use switchboard_core::canonical::canonical_hash;

/// How a decision's targets are dispatched.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionStrategy {
    /// Issue targets one at a time and aggregate their results.
    Sequential,
    /// Issue all targets concurrently and aggregate their results.
    Parallel,
    /// Try targets in order, stopping at the first success.
    PrimaryFallback,
    /// Issue all targets concurrently and require agreement.
    Consensus,
}

impl ExecutionStrategy {
    /// Wire name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "sequential",
            Self::Parallel => "parallel",
            Self::PrimaryFallback => "primary-fallback",
            Self::Consensus => "consensus",
        }
    }
}

impl std::fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chosen targets, strategy, and timeout for one operation.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutingDecision {
    /// Services to dispatch to. Non-empty.
    pub target_services: Vec<String>,
    /// Dispatch strategy.
    pub strategy: ExecutionStrategy,
    /// Per-call timeout in milliseconds.
    pub timeout_ms: u64,
    /// Services tried, in order, once targets fail.
    pub fallback_services: Vec<String>,
    /// Domain hints the decision was derived from.
    pub domain_hints: Vec<String>,
    /// Complexity the decision was derived from.
    pub complexity: f64,
    /// Cache key for this decision.
    pub cache_key: String,
    /// Whether this is the deterministic fallback decision.
    #[serde(default)]
    pub is_fallback: bool,
    /// Set by the caller when the operation's circuit breaker is open.
    #[serde(default)]
    pub circuit_open: bool,
}

impl RoutingDecision {
    /// Every service this decision may contact, targets first.
    pub fn all_services(&self) -> impl Iterator<Item = &str> {
        self.target_services
            .iter()
            .chain(self.fallback_services.iter())
            .map(String::as_str)
    }
}

/// Deterministic cache key over the routing-relevant fields of an operation.
///
/// Complexity is bucketed to one decimal so near-identical estimates share a
/// decision. Volatile fields (ids, timestamps) never enter the key.
#[must_use]
pub fn decision_key(name: &str, domain_hints: &[String], complexity: f64, priority: Priority) -> String {
    let mut hints: Vec<&str> = domain_hints.iter().map(String::as_str).collect();
    hints.sort_unstable();
    hints.dedup();
    canonical_hash(&serde_json::json!({
        "name": name,
        "domainHints": hints,
        "complexity": format!("{complexity:.1}"),
        "priority": priority.as_str(),
    }))
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<String, RoutingDecision>,
    order: VecDeque<String>,
}

/// Capacity-bounded decision cache. The oldest insertion is evicted first.
#[derive(Debug)]
pub struct DecisionCache {
    capacity: usize,
    inner: Mutex<CacheInner>,
}

impl DecisionCache {
    /// Create a cache holding at most `capacity` decisions.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            inner: Mutex::new(CacheInner::default()),
        }
    }

    /// Cached decision for `key`.
    pub fn get(&self, key: &str) -> Option<RoutingDecision> {
        self.inner.lock().entries.get(key).cloned()
    }

    /// Store a decision under its `cache_key`.
    pub fn insert(&self, decision: RoutingDecision) {
        let mut inner = self.inner.lock();
        let key = decision.cache_key.clone();
        if inner.entries.insert(key.clone(), decision).is_none() {
            inner.order.push_back(key);
        }
        while inner.entries.len() > self.capacity {
            let Some(oldest) = inner.order.pop_front() else {
                break;
            };
            let _ = inner.entries.remove(&oldest);
        }
    }

    /// Drop the decision for `key`.
    pub fn invalidate(&self, key: &str) -> bool {
        let mut inner = self.inner.lock();
        let removed = inner.entries.remove(key).is_some();
        if removed {
            inner.order.retain(|k| k != key);
        }
        removed
    }

    /// Drop every decision that targets `service_id`. Returns how many were dropped.
    pub fn invalidate_service(&self, service_id: &str) -> usize {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner
            .entries
            .retain(|_, d| !d.target_services.iter().any(|s| s == service_id));
        let CacheInner { entries, order } = &mut *inner;
        order.retain(|k| entries.contains_key(k));
        before - entries.len()
    }

    /// Number of cached decisions.
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop everything.
    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.entries.clear();
        inner.order.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn decision(key: &str, targets: &[&str]) -> RoutingDecision {
        RoutingDecision {
            target_services: targets.iter().map(ToString::to_string).collect(),
            strategy: ExecutionStrategy::Sequential,
            timeout_ms: 5000,
            fallback_services: vec![],
            domain_hints: vec![],
            complexity: 0.1,
            cache_key: key.to_string(),
            is_fallback: false,
            circuit_open: false,
        }
    }

    #[test]
    fn key_ignores_hint_order_and_fine_complexity() {
        let a = decision_key("Edit", &["ui".into(), "code".into()], 0.31, Priority::Medium);
        let b = decision_key("Edit", &["code".into(), "ui".into()], 0.34, Priority::Medium);
        assert_eq!(a, b);
    }

    #[test]
    fn key_distinguishes_priority() {
        let a = decision_key("Edit", &[], 0.3, Priority::Medium);
        let b = decision_key("Edit", &[], 0.3, Priority::High);
        assert_ne!(a, b);
    }

    #[test]
    fn strategy_wire_names() {
        assert_eq!(
            serde_json::to_value(ExecutionStrategy::PrimaryFallback).unwrap(),
            "primary-fallback"
        );
        assert_eq!(ExecutionStrategy::Consensus.to_string(), "consensus");
    }

    #[test]
    fn cache_evicts_oldest_beyond_capacity() {
        let cache = DecisionCache::new(2);
        cache.insert(decision("a", &["x"]));
        cache.insert(decision("b", &["x"]));
        cache.insert(decision("c", &["x"]));
        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert!(cache.get("c").is_some());
    }

    #[test]
    fn reinserting_key_does_not_duplicate_order() {
        let cache = DecisionCache::new(2);
        cache.insert(decision("a", &["x"]));
        cache.insert(decision("a", &["y"]));
        cache.insert(decision("b", &["x"]));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get("a").unwrap().target_services, vec!["y"]);
    }

    #[test]
    fn invalidate_service_drops_targeting_decisions() {
        let cache = DecisionCache::new(10);
        cache.insert(decision("a", &["ui", "general"]));
        cache.insert(decision("b", &["quality"]));
        assert_eq!(cache.invalidate_service("ui"), 1);
        assert!(cache.get("a").is_none());
        assert!(cache.get("b").is_some());
        assert!(cache.invalidate("b"));
        assert!(cache.is_empty());
    }

    proptest! {
        #[test]
        fn cache_never_exceeds_capacity(cap in 1usize..20, keys in proptest::collection::vec("[a-z]{1,3}", 0..100)) {
            let cache = DecisionCache::new(cap);
            for key in &keys {
                cache.insert(decision(key, &["general"]));
                prop_assert!(cache.len() <= cap);
            }
        }
    }
}
