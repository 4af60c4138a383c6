//! Per-operation rolling statistics.

use std::collections::VecDeque;

use serde::Serialize;

/// Rolling statistics for one operation name.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationStats {
    /// Completed executions.
    pub count: u64,
    /// Failed executions.
    pub failures: u64,
    /// Mean duration over all executions in milliseconds.
    pub avg_ms: f64,
    /// Longest duration seen.
    pub max_ms: u64,
    #[serde(skip)]
    recent: VecDeque<u64>,
    #[serde(skip)]
    window: usize,
}

impl OperationStats {
    /// Empty statistics keeping `window` recent durations.
    #[must_use]
    pub fn new(window: usize) -> Self {
        Self {
            count: 0,
            failures: 0,
            avg_ms: 0.0,
            max_ms: 0,
            recent: VecDeque::with_capacity(window.max(1)),
            window: window.max(1),
        }
    }

    /// Fold in one execution.
    #[allow(clippy::cast_precision_loss)]
    pub fn record(&mut self, duration_ms: u64, success: bool) {
        self.count += 1;
        if !success {
            self.failures += 1;
        }
        self.avg_ms += (duration_ms as f64 - self.avg_ms) / self.count as f64;
        self.max_ms = self.max_ms.max(duration_ms);
        if self.recent.len() == self.window {
            let _ = self.recent.pop_front();
        }
        self.recent.push_back(duration_ms);
    }

    /// Fraction of executions that failed.
    #[allow(clippy::cast_precision_loss)]
    pub fn failure_rate(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.failures as f64 / self.count as f64
        }
    }

    /// 95th percentile over the recent window (nearest rank).
    pub fn p95(&self) -> Option<u64> {
        percentile(self.recent.iter().copied().collect(), 0.95)
    }

    /// Durations currently in the window, oldest first.
    pub fn recent(&self) -> impl Iterator<Item = u64> + '_ {
        self.recent.iter().copied()
    }
}

/// Nearest-rank percentile of `values` (`q` in `(0, 1]`).
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn percentile(mut values: Vec<u64>, q: f64) -> Option<u64> {
    if values.is_empty() {
        return None;
    }
    values.sort_unstable();
    let rank = (q * values.len() as f64).ceil() as usize;
    values.get(rank.clamp(1, values.len()) - 1).copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_average() {
        let mut stats = OperationStats::new(100);
        for d in [100, 200, 300] {
            stats.record(d, true);
        }
        assert_eq!(stats.count, 3);
        assert!((stats.avg_ms - 200.0).abs() < 1e-9);
        assert_eq!(stats.max_ms, 300);
    }

    #[test]
    fn window_is_bounded() {
        let mut stats = OperationStats::new(3);
        for d in 1..=5 {
            stats.record(d, true);
        }
        assert_eq!(stats.recent().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(stats.count, 5);
    }

    #[test]
    fn p95_of_one_to_hundred() {
        let mut stats = OperationStats::new(100);
        for d in (1..=100).rev() {
            stats.record(d, true);
        }
        assert_eq!(stats.p95(), Some(95));
    }

    #[test]
    fn failure_rate_counts_failures() {
        let mut stats = OperationStats::new(10);
        stats.record(10, false);
        stats.record(10, true);
        stats.record(10, true);
        stats.record(10, true);
        assert!((stats.failure_rate() - 0.25).abs() < 1e-9);
    }

    #[test]
    fn percentile_edges() {
        assert_eq!(percentile(vec![], 0.95), None);
        assert_eq!(percentile(vec![7], 0.95), Some(7));
        assert_eq!(percentile(vec![1, 2], 0.5), Some(1));
    }
}
