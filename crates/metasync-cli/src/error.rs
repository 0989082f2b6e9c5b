//! Runner error types.

use thiserror::Error;

/// Runner errors.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),

    /// Repository could not be opened or flushed.
    #[error("repository error: {0}")]
    Store(#[from] metasync_core::StoreError),

    /// Snapshot could not be read.
    #[error("snapshot error: {0}")]
    Snapshot(#[from] metasync_core::SnapshotError),

    /// A refresh cycle failed.
    #[error("refresh failed: {0}")]
    Sync(#[from] metasync_core::SyncError),

    /// The blocking cycle task did not complete.
    #[error("task error: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// IO error.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
