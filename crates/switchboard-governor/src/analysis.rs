//! Optimization analysis over a trailing window of metrics.

use std::collections::BTreeMap;

use serde::Serialize;
use switchboard_settings::ThresholdTiers;

use crate::metrics::MetricRecord;

/// Cache hit rate below which caching is recommended.
const LOW_HIT_RATE: f64 = 0.3;
/// Share of operations over the warning threshold that suggests parallelizing.
const SLOW_SHARE: f64 = 0.2;
/// Per-operation failure rate that suggests a circuit breaker.
const FAILURE_RATE: f64 = 0.1;

/// What to change.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
    /// Cache more results.
    EnableCaching,
    /// Fan slow operations out across services.
    Parallelize,
    /// Gate a failing operation behind its circuit breaker.
    AdoptCircuitBreaker,
    /// Bring average latency back under target.
    ReduceLatency,
}

/// Urgency of a recommendation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecommendationPriority {
    /// Nice to have.
    Low,
    /// Worth doing soon.
    Medium,
    /// Act now.
    High,
}

/// One optimization suggestion.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Recommendation {
    /// Suggested change.
    pub kind: RecommendationKind,
    /// Urgency.
    pub priority: RecommendationPriority,
    /// Operation the suggestion targets, if specific.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Observed value that triggered it.
    pub observed: f64,
    /// Human-readable suggestion.
    pub message: String,
}

/// Analyze `records` and return suggestions, most urgent first.
#[allow(clippy::cast_precision_loss)]
pub fn analyze(records: &[MetricRecord], tiers: ThresholdTiers) -> Vec<Recommendation> {
    let records: Vec<&MetricRecord> = records.iter().filter(|r| !r.default).collect();
    if records.is_empty() {
        return Vec::new();
    }
    let total = records.len() as f64;
    let mut out = Vec::new();

    let avg = records.iter().map(|r| r.duration_ms as f64).sum::<f64>() / total;
    if avg > tiers.target as f64 {
        out.push(Recommendation {
            kind: RecommendationKind::ReduceLatency,
            priority: if avg > tiers.warning as f64 {
                RecommendationPriority::High
            } else {
                RecommendationPriority::Medium
            },
            operation: None,
            observed: avg,
            message: format!(
                "average duration {avg:.0}ms exceeds the {}ms target",
                tiers.target
            ),
        });
    }

    let hit_rate = records.iter().filter(|r| r.cache_hit).count() as f64 / total;
    if hit_rate < LOW_HIT_RATE {
        out.push(Recommendation {
            kind: RecommendationKind::EnableCaching,
            priority: RecommendationPriority::Medium,
            operation: None,
            observed: hit_rate,
            message: format!(
                "cache hit rate is {:.0}%; widen the cacheable set for idempotent operations",
                hit_rate * 100.0
            ),
        });
    }

    let slow_share = records
        .iter()
        .filter(|r| r.duration_ms > tiers.warning)
        .count() as f64
        / total;
    if slow_share > SLOW_SHARE {
        out.push(Recommendation {
            kind: RecommendationKind::Parallelize,
            priority: RecommendationPriority::High,
            operation: None,
            observed: slow_share,
            message: format!(
                "{:.0}% of operations exceed {}ms; run independent work in parallel",
                slow_share * 100.0,
                tiers.warning
            ),
        });
    }

    let mut per_op: BTreeMap<&str, (u64, u64)> = BTreeMap::new();
    for record in &records {
        let entry = per_op.entry(record.operation.as_str()).or_default();
        entry.0 += 1;
        if !record.success {
            entry.1 += 1;
        }
    }
    for (operation, (count, failures)) in per_op {
        let rate = failures as f64 / count as f64;
        if rate > FAILURE_RATE {
            out.push(Recommendation {
                kind: RecommendationKind::AdoptCircuitBreaker,
                priority: RecommendationPriority::High,
                operation: Some(operation.to_string()),
                observed: rate,
                message: format!(
                    "{operation} fails {:.0}% of the time; gate it behind its circuit breaker",
                    rate * 100.0
                ),
            });
        }
    }

    out.sort_by(|a, b| b.priority.cmp(&a.priority));
    out
}
