//! Session context settings.

use serde::{Deserialize, Serialize};

/// Session history, snapshot, enrichment, and expiry settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionSettings {
    /// Sessions inactive longer than this are swept.
    pub max_age_ms: u64,
    /// History length that triggers compaction.
    pub history_limit: usize,
    /// History length kept after compaction.
    pub history_compact_to: usize,
    /// A snapshot is captured every this many appends.
    pub snapshot_interval: usize,
    /// Snapshots kept per session.
    pub snapshot_limit: usize,
    /// Interval between expiry sweeps.
    pub sweep_interval_ms: u64,
    /// Budget for sessions without enough history to judge.
    pub default_budget_ms: u64,
    /// Tightened budget for fast, reliable sessions.
    pub fast_budget_ms: u64,
    /// Relaxed budget for slow or unreliable sessions.
    pub relaxed_budget_ms: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            max_age_ms: 86_400_000,
            history_limit: 100,
            history_compact_to: 50,
            snapshot_interval: 10,
            snapshot_limit: 100,
            sweep_interval_ms: 60_000,
            default_budget_ms: 5000,
            fast_budget_ms: 3000,
            relaxed_budget_ms: 10_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compaction_target_below_limit() {
        let s = SessionSettings::default();
        assert!(s.history_compact_to < s.history_limit);
        assert!(s.fast_budget_ms < s.default_budget_ms);
        assert!(s.default_budget_ms < s.relaxed_budget_ms);
    }
}
