//! Router error types.

use switchboard_core::ErrorKind;
use thiserror::Error;

/// Errors raised inside the capability router.
///
/// Routing errors never leave [`route_request`](crate::CapabilityRouter::route_request);
/// they resolve to the fallback decision. Dispatch errors surface from
/// [`execute_request`](crate::CapabilityRouter::execute_request) only once the
/// whole fallback chain is exhausted.
#[derive(Debug, Error)]
pub enum RouterError {
    /// A configured name pattern is not a valid regex.
    #[error("Invalid name pattern for service '{service}': {source}")]
    InvalidPattern {
        /// Service that declared the pattern.
        service: String,
        /// Underlying regex error.
        #[source]
        source: regex::Error,
    },

    /// A service id is not registered.
    #[error("Unknown service: {0}")]
    UnknownService(String),

    /// The classifier could not derive hints for an operation.
    #[error("Classification failed: {0}")]
    Classification(String),

    /// No candidate could be selected and no catch-all is registered.
    #[error("No route for operation '{0}'")]
    NoRoute(String),

    /// A single target call failed.
    #[error("Dispatch to '{service}' failed: {message}")]
    Dispatch {
        /// Target service.
        service: String,
        /// Error reported by the transport or the service.
        message: String,
    },

    /// A single target call exceeded the decision timeout.
    #[error("Dispatch to '{service}' timed out after {timeout_ms}ms")]
    Timeout {
        /// Target service.
        service: String,
        /// Decision timeout in milliseconds.
        timeout_ms: u64,
    },

    /// Consensus targets did not reach the configured quorum.
    #[error("Consensus not reached: {agreeing} of {required} required targets agreed")]
    ConsensusNotReached {
        /// Size of the largest agreeing group.
        agreeing: usize,
        /// Agreeing targets the policy requires.
        required: usize,
    },

    /// Targets and fallbacks all failed.
    #[error("All targets failed: {}", attempted.join(", "))]
    AllTargetsFailed {
        /// Services attempted, in order.
        attempted: Vec<String>,
    },
}

impl RouterError {
    /// Boundary classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidPattern { .. }
            | Self::UnknownService(_)
            | Self::Classification(_)
            | Self::NoRoute(_) => ErrorKind::RoutingFailure,
            Self::Dispatch { .. } | Self::Timeout { .. } | Self::ConsensusNotReached { .. } => {
                ErrorKind::DispatchFailure
            }
            Self::AllTargetsFailed { .. } => ErrorKind::AllTargetsFailed,
        }
    }
}

/// Convenience alias for router results.
pub type Result<T> = std::result::Result<T, RouterError>;
