//! Error taxonomy shared across components.
//!
//! Each crate defines its own `thiserror` enum. Every variant maps onto one
//! [`ErrorKind`], which is what the coordinator reports on the wire. Only
//! [`ErrorKind::CapacityExceeded`] and [`ErrorKind::AllTargetsFailed`] are
//! user-visible failures; everything else degrades gracefully.

use serde::{Deserialize, Serialize};

/// Classification of a failure at the coordinator boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Rejected before dispatch because the concurrency cap was reached.
    CapacityExceeded,
    /// Internal routing error; always resolved to a fallback decision.
    RoutingFailure,
    /// A target call failed or timed out.
    DispatchFailure,
    /// Every target and fallback failed.
    AllTargetsFailed,
    /// Unknown or retired session / operation id.
    SessionNotFound,
    /// Nothing cached for the key. Normal control flow.
    CacheMiss,
    /// Dispatch skipped because the operation's circuit breaker is open.
    CircuitOpen,
    /// The inbound event was malformed.
    InvalidEvent,
}

impl ErrorKind {
    /// Whether the failure should be surfaced to the user as a real error.
    #[must_use]
    pub fn is_user_visible(self) -> bool {
        matches!(self, Self::CapacityExceeded | Self::AllTargetsFailed)
    }

    /// Wire name (`"capacity_exceeded"`, ...).
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CapacityExceeded => "capacity_exceeded",
            Self::RoutingFailure => "routing_failure",
            Self::DispatchFailure => "dispatch_failure",
            Self::AllTargetsFailed => "all_targets_failed",
            Self::SessionNotFound => "session_not_found",
            Self::CacheMiss => "cache_miss",
            Self::CircuitOpen => "circuit_open",
            Self::InvalidEvent => "invalid_event",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_capacity_and_exhaustion_are_user_visible() {
        assert!(ErrorKind::CapacityExceeded.is_user_visible());
        assert!(ErrorKind::AllTargetsFailed.is_user_visible());
        assert!(!ErrorKind::RoutingFailure.is_user_visible());
        assert!(!ErrorKind::SessionNotFound.is_user_visible());
        assert!(!ErrorKind::CacheMiss.is_user_visible());
        assert!(!ErrorKind::CircuitOpen.is_user_visible());
    }

    #[test]
    fn display_matches_serde() {
        let json = serde_json::to_value(ErrorKind::AllTargetsFailed).unwrap();
        assert_eq!(json.as_str(), Some(ErrorKind::AllTargetsFailed.as_str()));
    }
}
