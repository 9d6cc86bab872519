//! Error types for storeops-sync.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that stop a sync before the mirror tool reports an exit status.
/// A non-zero exit is not an error: it is a [`crate::SyncOutcome`] with
/// `success == false`.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to start {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("sync cancelled")]
    Cancelled,
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
