use std::path::PathBuf;

use thiserror::Error;

/// Errors from mount probing.
#[derive(Debug, Error)]
pub enum MountError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> MountError {
    MountError::Io {
        path: path.into(),
        source,
    }
}
