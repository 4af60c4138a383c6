//! Three-tier threshold evaluation.

use switchboard_core::events::{AlertLevel, AlertMetric};
use switchboard_settings::ThresholdTiers;

/// A crossed threshold.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ThresholdBreach {
    /// Measured quantity.
    pub metric: AlertMetric,
    /// Severity.
    pub level: AlertLevel,
    /// Observed value.
    pub value: u64,
    /// Threshold that was crossed.
    pub threshold: u64,
    /// Generated remediation hint.
    pub recommendation: String,
}

/// Compare `value` against `tiers`. Values above `critical` yield a critical
/// breach, values above `warning` a warning; anything else is fine.
pub fn evaluate(
    operation: &str,
    metric: AlertMetric,
    tiers: ThresholdTiers,
    value: u64,
) -> Option<ThresholdBreach> {
    let (level, threshold) = if value > tiers.critical {
        (AlertLevel::Critical, tiers.critical)
    } else if value > tiers.warning {
        (AlertLevel::Warning, tiers.warning)
    } else {
        return None;
    };
    Some(ThresholdBreach {
        metric,
        level,
        value,
        threshold,
        recommendation: recommend(operation, metric, level, tiers.target),
    })
}

fn recommend(operation: &str, metric: AlertMetric, level: AlertLevel, target: u64) -> String {
    match (metric, level) {
        (AlertMetric::ExecutionTime, AlertLevel::Critical) => format!(
            "{operation} is far over its {target}ms target; cache its results or split the work across parallel services"
        ),
        (AlertMetric::ExecutionTime, AlertLevel::Warning) => format!(
            "{operation} is running slow; consider caching or tightening its inputs to reach the {target}ms target"
        ),
        (AlertMetric::TokenUsage, AlertLevel::Critical) => format!(
            "{operation} used far more than {target} tokens; trim context or summarize before calling it"
        ),
        (AlertMetric::TokenUsage, AlertLevel::Warning) => format!(
            "{operation} token usage is above target ({target}); review the size of its inputs"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIERS: ThresholdTiers = ThresholdTiers {
        target: 2000,
        warning: 5000,
        critical: 10_000,
    };

    #[test]
    fn below_warning_is_quiet() {
        assert!(evaluate("Read", AlertMetric::ExecutionTime, TIERS, 5000).is_none());
        assert!(evaluate("Read", AlertMetric::ExecutionTime, TIERS, 3000).is_none());
    }

    #[test]
    fn warning_tier() {
        let breach = evaluate("Bash", AlertMetric::ExecutionTime, TIERS, 6000).unwrap();
        assert_eq!(breach.level, AlertLevel::Warning);
        assert_eq!(breach.threshold, 5000);
        assert!(breach.recommendation.contains("Bash"));
    }

    #[test]
    fn critical_tier() {
        let breach = evaluate("Task", AlertMetric::TokenUsage, TIERS, 12_000).unwrap();
        assert_eq!(breach.level, AlertLevel::Critical);
        assert_eq!(breach.threshold, 10_000);
        assert!(breach.recommendation.contains("tokens"));
    }
}
