//! # switchboard-core
//!
//! Foundation types, events, errors, and utilities for the Switchboard router.
//!
//! This crate provides the shared vocabulary that the router, governor,
//! session, and coordinator crates depend on:
//!
//! - **Branded IDs**: `SessionId`, `OperationId` as newtypes for type safety
//! - **Operations**: [`Operation`] with [`Priority`] and [`PerformanceBudget`]
//! - **Service health**: [`ServiceStatus`] shared by the router and events
//! - **Events**: [`SwitchboardEvent`] and the broadcast [`EventBus`]
//! - **Canonical keys**: sorted-field JSON serialization and hashing
//! - **Background tasks**: cancellable periodic maintenance via [`BackgroundTasks`]
//! - **Errors**: the [`ErrorKind`] taxonomy surfaced at the coordinator boundary

#![deny(unsafe_code)]

pub mod canonical;
pub mod errors;
pub mod events;
pub mod ids;
pub mod logging;
pub mod operation;
pub mod service;
pub mod tasks;

pub use errors::ErrorKind;
pub use events::{EventBus, SwitchboardEvent};
pub use ids::{OperationId, SessionId};
pub use operation::{Operation, PerformanceBudget, Priority};
pub use service::ServiceStatus;
pub use tasks::BackgroundTasks;
