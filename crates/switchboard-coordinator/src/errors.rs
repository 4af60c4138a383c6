//! Coordinator error types.

use switchboard_core::{ErrorKind, OperationId};
use switchboard_governor::GovernorError;
use switchboard_router::RouterError;
use switchboard_session::SessionError;
use thiserror::Error;

/// Errors surfaced by [`Coordinator::handle`](crate::Coordinator::handle).
#[derive(Debug, Error)]
pub enum CoordinatorError {
    /// The concurrency cap was reached. Nothing was dispatched.
    #[error("Capacity exceeded: {active} operations in flight (max {max})")]
    CapacityExceeded {
        /// Operations in flight when the event arrived.
        active: usize,
        /// Configured cap.
        max: usize,
    },

    /// The event could not be parsed or is missing a required field.
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// The event refers to an operation that is not in flight.
    #[error("Unknown operation: {0}")]
    UnknownOperation(OperationId),

    /// The operation id already completed and cannot be reused.
    #[error("Operation id reused after completion: {0}")]
    ReusedOperation(OperationId),

    /// Router failure.
    #[error(transparent)]
    Router(#[from] RouterError),

    /// Governor failure.
    #[error(transparent)]
    Governor(#[from] GovernorError),

    /// Session failure.
    #[error(transparent)]
    Session(#[from] SessionError),
}

impl CoordinatorError {
    /// Boundary classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            Self::InvalidEvent(_) => ErrorKind::InvalidEvent,
            Self::UnknownOperation(_) | Self::ReusedOperation(_) => ErrorKind::SessionNotFound,
            Self::Router(err) => err.kind(),
            Self::Governor(err) => err.kind(),
            Self::Session(err) => err.kind(),
        }
    }
}

/// Convenience alias for coordinator results.
pub type Result<T> = std::result::Result<T, CoordinatorError>;

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::SessionId;

    #[test]
    fn kinds_follow_taxonomy() {
        let capacity = CoordinatorError::CapacityExceeded { active: 10, max: 10 };
        assert_eq!(capacity.kind(), ErrorKind::CapacityExceeded);
        assert!(capacity.kind().is_user_visible());

        let reused = CoordinatorError::ReusedOperation(OperationId::from("op-1"));
        assert_eq!(reused.kind(), ErrorKind::SessionNotFound);
        assert!(!reused.kind().is_user_visible());

        let all_failed = CoordinatorError::from(RouterError::AllTargetsFailed {
            attempted: vec!["general".into()],
        });
        assert_eq!(all_failed.kind(), ErrorKind::AllTargetsFailed);

        let missing = CoordinatorError::from(SessionError::NotFound(SessionId::from("s")));
        assert_eq!(missing.kind(), ErrorKind::SessionNotFound);
    }

    #[test]
    fn messages_are_readable() {
        let err = CoordinatorError::CapacityExceeded { active: 3, max: 3 };
        assert_eq!(err.to_string(), "Capacity exceeded: 3 operations in flight (max 3)");
    }
}
