//! Error types returned by collaborators.
//!
//! Source readers and target stores report failures as
//! [`CollaboratorError`]. The reconciler never inspects these directly; every
//! call site hands them to the [`ErrorClassifier`](crate::ErrorClassifier),
//! which produces the connector-level [`SyncError`](crate::SyncError).

use crate::catalog::TargetId;
use thiserror::Error;

/// Failure reported by a source reader or target store.
#[derive(Debug, Error)]
pub enum CollaboratorError {
    /// The source could not answer a catalog query.
    #[error("query failed: {0}")]
    Query(String),

    /// The metadata repository reported a failure.
    #[error("repository error: {0}")]
    Repository(String),

    /// The caller lacks permission for the operation.
    #[error("not authorized: {0}")]
    NotAuthorized(String),

    /// A parameter passed to the collaborator was rejected.
    #[error("invalid parameter `{name}`: {reason}")]
    InvalidParameter {
        /// Name of the offending parameter.
        name: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Anything else.
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl CollaboratorError {
    /// Create an invalid parameter error.
    pub fn invalid_parameter(name: impl Into<String>, reason: impl Into<String>) -> Self {
        CollaboratorError::InvalidParameter {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Errors raised by the bundled target stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Deserialization error.
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// No record with the given identity.
    #[error("record not found: {0}")]
    NotFound(TargetId),

    /// A record was written under a parent that does not exist.
    #[error("unknown parent: {0}")]
    UnknownParent(TargetId),
}

impl From<StoreError> for CollaboratorError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(id) => {
                CollaboratorError::invalid_parameter("target_id", format!("no record {}", id))
            }
            StoreError::UnknownParent(id) => {
                CollaboratorError::invalid_parameter("parent", format!("no record {}", id))
            }
            other => CollaboratorError::Repository(other.to_string()),
        }
    }
}

/// Errors raised while loading a catalog snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// The snapshot file could not be read.
    #[error("failed to read snapshot {path}: {source}")]
    Io {
        /// Path of the snapshot file.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The snapshot is not valid JSON or does not match the expected shape.
    #[error("invalid snapshot: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<SnapshotError> for CollaboratorError {
    fn from(err: SnapshotError) -> Self {
        CollaboratorError::Query(err.to_string())
    }
}
