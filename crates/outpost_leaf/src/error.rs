//! Error types for the leaf client.

use outpost_core::{ReplicateError, RepositoryError};
use outpost_protocol::{ProtocolError, TransportError};
use thiserror::Error;

/// Result type for leaf operations.
pub type LeafResult<T> = Result<T, LeafError>;

/// Errors that can end a connection attempt.
#[derive(Error, Debug)]
pub enum LeafError {
    /// Reading or writing the connection failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The origin sent something the protocol does not allow.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The origin could not be reached.
    #[error("failed to dial origin: {0}")]
    Dial(String),

    /// The origin URL is unusable.
    #[error("invalid origin url: {0}")]
    InvalidUrl(String),

    /// The origin rejected the credential.
    #[error("origin rejected the leaf credential")]
    Unauthorized,

    /// Origin and leaf cannot talk to each other.
    #[error("version mismatch: local={local}, remote={remote}")]
    VersionMismatch {
        /// Leaf version.
        local: String,
        /// Origin version.
        remote: String,
    },

    /// The origin refused the registration.
    #[error("registration rejected by origin at version {0}")]
    Rejected(String),

    /// Dialing or registering took too long.
    #[error("operation timed out")]
    Timeout,

    /// Local storage failed.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// A blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    StorageTask(#[from] tokio::task::JoinError),

    /// The outbound queue is gone.
    #[error("replication error: {0}")]
    Replicate(#[from] ReplicateError),

    /// `run` was called on a client that is already running.
    #[error("leaf client is already running")]
    AlreadyRunning,
}

impl LeafError {
    /// Returns true if the client must stop instead of redialing.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            LeafError::Unauthorized
                | LeafError::VersionMismatch { .. }
                | LeafError::InvalidUrl(_)
                | LeafError::AlreadyRunning
        )
    }

    /// Returns true if the client should redial after a delay.
    pub fn is_retryable(&self) -> bool {
        !self.is_fatal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fatal_errors() {
        assert!(LeafError::Unauthorized.is_fatal());
        assert!(LeafError::VersionMismatch {
            local: "1.3.0".into(),
            remote: "1.4.0".into(),
        }
        .is_fatal());
        assert!(LeafError::InvalidUrl("ftp://x".into()).is_fatal());
    }

    #[test]
    fn retryable_errors() {
        assert!(LeafError::Timeout.is_retryable());
        assert!(LeafError::Dial("connection refused".into()).is_retryable());
        assert!(LeafError::from(TransportError::Closed).is_retryable());
        assert!(LeafError::from(ProtocolError::EmptyFrame).is_retryable());
        assert!(LeafError::Rejected("1.4.0".into()).is_retryable());
    }

    #[test]
    fn error_display() {
        let err = LeafError::VersionMismatch {
            local: "1.3.0".into(),
            remote: "1.4.0".into(),
        };
        assert_eq!(err.to_string(), "version mismatch: local=1.3.0, remote=1.4.0");
    }
}
