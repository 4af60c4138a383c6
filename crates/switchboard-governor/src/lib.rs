//! # switchboard-governor
//!
//! Performance governor for Switchboard.
//!
//! - **Timing**: [`PerformanceGovernor::start_operation`] /
//!   [`PerformanceGovernor::complete_operation`] feed a bounded
//!   [`MetricsBuffer`] and per-operation [`OperationStats`]
//! - **Alerts**: three-tier thresholds for execution time and token usage,
//!   published as `performance_alert` events; never fail the caller
//! - **Circuit breakers**: [`CircuitBreakers`] per operation name with lazy
//!   cooldown
//! - **Result cache**: [`ResultCache`] with an allow-list of idempotent
//!   operations, canonical keys, TTL, and capacity eviction
//! - **Analysis**: [`analyze`] turns a trailing window into prioritized
//!   [`Recommendation`]s

#![deny(unsafe_code)]

pub mod analysis;
pub mod breaker;
pub mod cache;
pub mod errors;
pub mod governor;
pub mod metrics;
pub mod stats;
pub mod thresholds;

pub use analysis::{Recommendation, RecommendationKind, RecommendationPriority, analyze};
pub use breaker::{BreakerState, CircuitBreakers, OpenBreaker};
pub use cache::{CacheStats, ResultCache};
pub use errors::{GovernorError, Result};
pub use governor::{Completion, CompletedOperation, PerformanceGovernor};
pub use metrics::{MetricRecord, MetricsBuffer};
pub use stats::{OperationStats, percentile};
pub use thresholds::{ThresholdBreach, evaluate};
