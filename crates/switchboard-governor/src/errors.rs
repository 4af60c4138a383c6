//! Governor error types.

use switchboard_core::{ErrorKind, OperationId};
use thiserror::Error;

/// Errors raised by the performance governor.
#[derive(Debug, Error)]
pub enum GovernorError {
    /// A cacheable-name pattern is not a valid regex.
    #[error("Invalid cacheable pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The offending pattern.
        pattern: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// `complete_operation` was called for an id with no running timer.
    #[error("No timer running for operation {0}")]
    UnknownOperation(OperationId),
}

impl GovernorError {
    /// Boundary classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPattern { .. } => ErrorKind::RoutingFailure,
            Self::UnknownOperation(_) => ErrorKind::SessionNotFound,
        }
    }
}

/// Convenience alias for governor results.
pub type Result<T> = std::result::Result<T, GovernorError>;
