//! Budget and priority defaults derived from session performance.

use switchboard_core::{Operation, PerformanceBudget, Priority};
use switchboard_settings::SessionSettings;

use crate::state::SessionAggregate;

/// Average below which a session counts as fast.
const FAST_AVG_MS: f64 = 1000.0;
/// Success rate above which a fast session counts as reliable.
const RELIABLE_SUCCESS: f64 = 0.9;
/// Average above which a session counts as slow.
const SLOW_AVG_MS: f64 = 3000.0;
/// Success rate below which a session counts as unreliable.
const UNRELIABLE_SUCCESS: f64 = 0.7;

/// Budget and priority a session's track record earns.
pub fn session_defaults(aggregate: Option<&SessionAggregate>, settings: &SessionSettings) -> (u64, Priority) {
    match aggregate {
        Some(agg) if agg.count > 0 => {
            if agg.avg_time_ms < FAST_AVG_MS && agg.success_rate > RELIABLE_SUCCESS {
                (settings.fast_budget_ms, Priority::High)
            } else if agg.avg_time_ms > SLOW_AVG_MS || agg.success_rate < UNRELIABLE_SUCCESS {
                (settings.relaxed_budget_ms, Priority::Low)
            } else {
                (settings.default_budget_ms, Priority::Medium)
            }
        }
        _ => (settings.default_budget_ms, Priority::Medium),
    }
}

/// Fill budget and priority absent from `base`. Present values are never overwritten.
#[must_use]
pub fn enrich(mut base: Operation, aggregate: Option<&SessionAggregate>, settings: &SessionSettings) -> Operation {
    let (budget_ms, priority) = session_defaults(aggregate, settings);
    if base.budget.is_none() {
        base.budget = Some(PerformanceBudget {
            max_time_ms: budget_ms,
            priority: base.priority.unwrap_or(priority),
        });
    }
    if base.priority.is_none() {
        base.priority = Some(priority);
    }
    base
}
