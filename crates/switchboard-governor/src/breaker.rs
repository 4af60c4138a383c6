//! Per-operation circuit breakers.
//!
//! A breaker opens after `failure_threshold` consecutive failures of one
//! operation name. Any success closes it and resets the count. An open
//! breaker is re-evaluated lazily: once `cooldown` has passed since the last
//! failure, the next [`CircuitBreakers::is_open`] query closes it.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use serde::Serialize;
use switchboard_settings::CircuitBreakerSettings;
use tokio::time::Instant;
use tracing::{debug, warn};

/// State of one breaker.
#[derive(Clone, Copy, Debug, Default)]
pub struct BreakerState {
    /// Consecutive failures.
    pub failure_count: u32,
    /// When the most recent failure was recorded.
    pub last_failure: Option<Instant>,
    /// Whether the breaker is open.
    pub is_open: bool,
}

/// Serializable view of an open breaker.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpenBreaker {
    /// Operation name.
    pub operation: String,
    /// Consecutive failures recorded.
    pub failure_count: u32,
}

/// Circuit breakers keyed by operation name.
#[derive(Debug)]
pub struct CircuitBreakers {
    failure_threshold: u32,
    cooldown: Duration,
    states: Mutex<HashMap<String, BreakerState>>,
}

impl CircuitBreakers {
    /// Create breakers from settings.
    #[must_use]
    pub fn new(settings: &CircuitBreakerSettings) -> Self {
        Self {
            failure_threshold: settings.failure_threshold.max(1),
            cooldown: Duration::from_millis(settings.cooldown_ms),
            states: Mutex::new(HashMap::new()),
        }
    }

    /// Record a success: closes the breaker and resets its count.
    pub fn record_success(&self, operation: &str) {
        let mut states = self.states.lock();
        if let Some(state) = states.get_mut(operation) {
            if state.is_open {
                debug!(operation, "circuit breaker closed by success");
            }
            *state = BreakerState::default();
        }
    }

    /// Record a failure. Returns `true` if this failure opened the breaker.
    pub fn record_failure(&self, operation: &str) -> bool {
        let mut states = self.states.lock();
        let state = states.entry(operation.to_string()).or_default();
        state.failure_count = state.failure_count.saturating_add(1);
        state.last_failure = Some(Instant::now());
        if !state.is_open && state.failure_count >= self.failure_threshold {
            state.is_open = true;
            warn!(operation, failures = state.failure_count, "circuit breaker opened");
            return true;
        }
        false
    }

    /// Whether the breaker for `operation` is open, closing it first if the
    /// cooldown has elapsed since the last failure.
    pub fn is_open(&self, operation: &str) -> bool {
        let mut states = self.states.lock();
        let Some(state) = states.get_mut(operation) else {
            return false;
        };
        if state.is_open
            && state
                .last_failure
                .is_some_and(|t| t.elapsed() >= self.cooldown)
        {
            debug!(operation, "circuit breaker cooled down");
            *state = BreakerState::default();
        }
        state.is_open
    }

    /// Current state for `operation`, without lazy re-evaluation.
    pub fn state(&self, operation: &str) -> Option<BreakerState> {
        self.states.lock().get(operation).copied()
    }

    /// Every breaker currently open (after lazy re-evaluation), sorted by name.
    pub fn open_breakers(&self) -> Vec<OpenBreaker> {
        let names: Vec<String> = self.states.lock().keys().cloned().collect();
        let mut open: Vec<OpenBreaker> = names
            .into_iter()
            .filter(|name| self.is_open(name))
            .filter_map(|name| {
                self.state(&name).map(|s| OpenBreaker {
                    operation: name,
                    failure_count: s.failure_count,
                })
            })
            .collect();
        open.sort_by(|a, b| a.operation.cmp(&b.operation));
        open
    }

    /// Drop breakers with nothing to remember: closed with no failures, or
    /// open past their cooldown. Returns how many were dropped.
    pub fn prune_idle(&self) -> usize {
        let cooldown = self.cooldown;
        let mut states = self.states.lock();
        let before = states.len();
        states.retain(|_, state| {
            let cooled = state.is_open && state.last_failure.is_some_and(|t| t.elapsed() >= cooldown);
            let idle = !state.is_open && state.failure_count == 0;
            !(cooled || idle)
        });
        before - states.len()
    }

    /// Number of tracked breakers.
    pub fn len(&self) -> usize {
        self.states.lock().len()
    }

    /// Whether no breakers are tracked.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every breaker.
    pub fn clear(&self) {
        self.states.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn breakers() -> CircuitBreakers {
        CircuitBreakers::new(&CircuitBreakerSettings::default())
    }

    #[tokio::test(start_paused = true)]
    async fn opens_exactly_at_threshold() {
        let cb = breakers();
        for _ in 0..4 {
            assert!(!cb.record_failure("Bash"));
        }
        assert!(!cb.is_open("Bash"));
        assert!(cb.record_failure("Bash"));
        assert!(cb.is_open("Bash"));
        assert!(!cb.record_failure("Bash"));
    }

    #[tokio::test(start_paused = true)]
    async fn success_closes_immediately() {
        let cb = breakers();
        for _ in 0..5 {
            let _ = cb.record_failure("Bash");
        }
        assert!(cb.is_open("Bash"));
        cb.record_success("Bash");
        assert!(!cb.is_open("Bash"));
        assert_eq!(cb.state("Bash").unwrap().failure_count, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn success_resets_consecutive_count() {
        let cb = breakers();
        for _ in 0..4 {
            let _ = cb.record_failure("Bash");
        }
        cb.record_success("Bash");
        for _ in 0..4 {
            let _ = cb.record_failure("Bash");
        }
        assert!(!cb.is_open("Bash"));
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_closes_lazily() {
        let cb = breakers();
        for _ in 0..5 {
            let _ = cb.record_failure("Bash");
        }
        tokio::time::advance(Duration::from_secs(29)).await;
        assert!(cb.is_open("Bash"));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(cb.state("Bash").unwrap().is_open);
        assert!(!cb.is_open("Bash"));
        assert!(!cb.state("Bash").unwrap().is_open);
    }

    #[tokio::test(start_paused = true)]
    async fn breakers_are_per_operation() {
        let cb = breakers();
        for _ in 0..5 {
            let _ = cb.record_failure("Bash");
        }
        assert!(!cb.is_open("Read"));
        assert_eq!(
            cb.open_breakers(),
            vec![OpenBreaker {
                operation: "Bash".into(),
                failure_count: 5
            }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn prune_keeps_only_breakers_with_state() {
        let cb = breakers();
        let _ = cb.record_failure("Read");
        cb.record_success("Read");
        let _ = cb.record_failure("Grep");
        for _ in 0..5 {
            let _ = cb.record_failure("Bash");
        }
        assert_eq!(cb.prune_idle(), 1);
        assert!(cb.state("Read").is_none());
        assert_eq!(cb.len(), 2);

        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(cb.prune_idle(), 1);
        assert!(cb.state("Bash").is_none());
        assert_eq!(cb.state("Grep").unwrap().failure_count, 1);
    }
}
