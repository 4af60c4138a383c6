//! Session error types.

use switchboard_core::{ErrorKind, SessionId};
use thiserror::Error;

/// Errors raised by the session store.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The session does not exist or has expired.
    #[error("Session not found: {0}")]
    NotFound(SessionId),
}

impl SessionError {
    /// Boundary classification of this error.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::SessionNotFound,
        }
    }
}

/// Convenience alias for session results.
pub type Result<T> = std::result::Result<T, SessionError>;
