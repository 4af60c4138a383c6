//! # switchboard-session
//!
//! Per-session context for Switchboard.
//!
//! A [`SessionStore`] owns every live [`SessionState`]: a bounded history,
//! running aggregates, a context deep-merged from state updates, and
//! periodic [`ContextSnapshot`]s. From that state it fills missing budgets
//! and priorities ([`enrich`]) and predicts the next operation ([`predict`]).
//! Idle sessions are removed by a background sweep.

#![deny(unsafe_code)]

pub mod enrichment;
pub mod errors;
pub mod prediction;
pub mod snapshot;
pub mod state;
pub mod store;

pub use enrichment::{enrich, session_defaults};
pub use errors::{Result, SessionError};
pub use prediction::{Prediction, PredictionBasis, predict};
pub use snapshot::{ContextSnapshot, dominant_domain};
pub use state::{HistoryEntry, SessionAggregate, SessionState};
pub use store::{SessionStore, SessionSummary, SessionUpdate};
