//! Error types for storeops-notify.

use thiserror::Error;

/// Errors raised while rendering or delivering a notification. Delivery
/// errors are logged by the dispatcher and never propagate into operations.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// Tera template engine error.
    #[error("template engine error: {0}")]
    Tera(#[from] tera::Error),

    #[error("context serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("webhook {url} failed: {reason}")]
    Webhook { url: String, reason: String },

    #[error("mail to {address} failed: {reason}")]
    Mail { address: String, reason: String },
}
