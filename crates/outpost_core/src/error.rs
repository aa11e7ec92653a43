//! Error types for repository and replication operations.

use thiserror::Error;
use uuid::Uuid;

/// Result type for repository operations.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Errors reported by a [`crate::Repository`] implementation.
#[derive(Debug, Error)]
pub enum RepositoryError {
    /// A partial update targeted a record that does not exist.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Entity kind, e.g. `"space"`.
        kind: &'static str,
        /// The missing identifier.
        id: Uuid,
    },

    /// The storage backend failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl RepositoryError {
    /// Creates a not-found error.
    pub fn not_found(kind: &'static str, id: Uuid) -> Self {
        Self::NotFound { kind, id }
    }
}

/// Result type for propagation calls.
pub type ReplicateResult<T> = Result<T, ReplicateError>;

/// Errors returned by a [`crate::Replicator`].
#[derive(Debug, Error)]
pub enum ReplicateError {
    /// The outbound queue or mailbox has been shut down.
    #[error("replication channel closed")]
    Closed,

    /// The change could not be encoded for the wire.
    #[error("encoding failed: {0}")]
    Encode(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_display() {
        let err = RepositoryError::not_found("space", Uuid::nil());
        assert_eq!(
            err.to_string(),
            "space 00000000-0000-0000-0000-000000000000 not found"
        );
    }
}
