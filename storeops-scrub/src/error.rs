//! Error types for storeops-scrub.

use std::path::PathBuf;

use thiserror::Error;

use crate::transaction::TransactionError;

/// Errors that abort a whole scrub. Per-file failures never surface here;
/// they are counted in the report instead.
#[derive(Debug, Error)]
pub enum ScrubError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error(transparent)]
    Transaction(#[from] TransactionError),

    #[error("lock error: {0}")]
    Lock(#[from] storeops_core::LockError),

    #[error("completion marker JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("scrub interrupted by shutdown request")]
    Interrupted,
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ScrubError {
    ScrubError::Io {
        path: path.into(),
        source,
    }
}
