//! Error types for storeops-core.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating the configuration document.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON parse error on load — includes file path and serde_json's line/column.
    #[error("failed to parse configuration at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("configuration not found at {path}")]
    NotFound { path: PathBuf },

    /// The document parsed but describes an unusable spec.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors from the last-run state file.
#[derive(Debug, Error)]
pub enum StateError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse last-run state at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("state serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors from process lock handling. Contention is not an error: it is
/// reported as `Ok(None)` by [`crate::lock::ProcessLock::try_acquire`].
#[derive(Debug, Error)]
pub enum LockError {
    #[error("I/O error on lock file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub(crate) fn config_io(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn state_io(path: impl Into<PathBuf>, source: std::io::Error) -> StateError {
    StateError::Io {
        path: path.into(),
        source,
    }
}

pub(crate) fn lock_io(path: impl Into<PathBuf>, source: std::io::Error) -> LockError {
    LockError::Io {
        path: path.into(),
        source,
    }
}
