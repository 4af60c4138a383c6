//! # switchboard-coordinator
//!
//! Event coordinator for Switchboard.
//!
//! The [`Coordinator`] receives host lifecycle events ([`InboundEvent`]) and
//! composes the leaf components around them:
//!
//! - [`switchboard_router::CapabilityRouter`] picks and executes targets
//! - [`switchboard_governor::PerformanceGovernor`] times, caches, and breaks circuits
//! - [`switchboard_session::SessionStore`] enriches requests and records history
//!
//! In-flight operations are tracked by an [`OperationLedger`] that enforces the
//! concurrency cap. Every event yields a [`HookResponse`]; failures are
//! reported in-band with an [`ErrorKind`](switchboard_core::ErrorKind).

#![deny(unsafe_code)]

pub mod coordinator;
pub mod errors;
pub mod event;
pub mod ledger;
pub mod response;

pub use coordinator::Coordinator;
pub use errors::{CoordinatorError, Result};
pub use event::{EventContext, EventKind, InboundEvent};
pub use ledger::{ActiveOperation, OperationLedger};
pub use response::{CoordinatorStatus, HookOutcome, HookResponse};
