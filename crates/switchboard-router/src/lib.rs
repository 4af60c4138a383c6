//! # switchboard-router
//!
//! Capability router for Switchboard.
//!
//! Maintains the registry of backend capability services and decides, per
//! operation, which service(s) handle it, with what strategy and timeout.
//!
//! - **Registry**: [`ServiceRegistry`] of [`ServiceDescriptor`]s with health,
//!   moving averages, and load
//! - **Classification**: [`OperationClassifier`] derives domain hints and
//!   complexity; [`KeywordClassifier`] is the default
//! - **Decisions**: [`RoutingDecision`] with an [`ExecutionStrategy`], cached
//!   in a bounded [`DecisionCache`]
//! - **Execution**: [`Executor`] dispatches through a [`ServiceTransport`]
//!   and walks the fallback chain
//! - **Health**: [`HealthMonitor`] probes services in the background

#![deny(unsafe_code)]

pub mod classifier;
pub mod decision;
pub mod errors;
pub mod executor;
pub mod health;
pub mod registry;
pub mod router;
pub mod transport;

pub use classifier::{Classification, KeywordClassifier, OperationClassifier};
pub use decision::{DecisionCache, ExecutionStrategy, RoutingDecision, decision_key};
pub use errors::{Result, RouterError};
pub use executor::{DispatchAttempt, ExecutionOutcome, Executor};
pub use health::HealthMonitor;
pub use registry::{CapabilitySet, DispatchGuard, ServiceDescriptor, ServiceRegistry};
pub use router::CapabilityRouter;
pub use transport::{ServiceRequest, ServiceResponse, ServiceTransport};
