//! Error types for the origin.

use outpost_core::{ReplicateError, RepositoryError};
use outpost_protocol::{ProtocolError, TransportError};
use thiserror::Error;

/// Result type for origin operations.
pub type OriginResult<T> = Result<T, OriginError>;

/// Errors that can occur while serving leaves.
#[derive(Error, Debug)]
pub enum OriginError {
    /// The credential was missing or invalid.
    #[error("not authorized: {0}")]
    Unauthorized(String),

    /// The leaf broke the protocol.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// The leaf's version is incompatible.
    #[error("version mismatch: origin={origin}, leaf={leaf}")]
    VersionMismatch {
        /// Origin version.
        origin: String,
        /// Leaf version.
        leaf: String,
    },

    /// The leaf did not register in time.
    #[error("handshake timed out")]
    HandshakeTimeout,

    /// Reading or writing the connection failed.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Storage failed.
    #[error("repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// A blocking storage task panicked or was cancelled.
    #[error("storage task failed: {0}")]
    StorageTask(#[from] tokio::task::JoinError),

    /// Fan-out failed.
    #[error("replication error: {0}")]
    Replicate(#[from] ReplicateError),

    /// I/O error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl OriginError {
    /// Returns true if the leaf caused the error.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            OriginError::Unauthorized(_)
                | OriginError::Protocol(_)
                | OriginError::VersionMismatch { .. }
                | OriginError::HandshakeTimeout
        )
    }

    /// Returns true if the origin itself failed.
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            OriginError::Repository(_)
                | OriginError::StorageTask(_)
                | OriginError::Replicate(_)
                | OriginError::Io(_)
                | OriginError::Transport(_)
        )
    }
}
