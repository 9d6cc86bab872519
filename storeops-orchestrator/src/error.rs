use thiserror::Error;

/// Error surface for an orchestrator run and the standalone commands.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("configuration error: {0}")]
    Config(#[from] storeops_core::ConfigError),

    #[error("last-run state error: {0}")]
    State(#[from] storeops_core::StateError),

    #[error("lock error: {0}")]
    Lock(#[from] storeops_core::LockError),

    #[error("notification error: {0}")]
    Notify(#[from] storeops_notify::NotifyError),

    #[error("sync error: {0}")]
    Sync(#[from] storeops_sync::SyncError),

    #[error("scrub error: {0}")]
    Scrub(#[from] storeops_scrub::ScrubError),

    #[error("{task} task join failure: {reason}")]
    Join { task: &'static str, reason: String },
}
