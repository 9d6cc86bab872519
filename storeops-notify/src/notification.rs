//! Notification model and the sending seam.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};

/// Severity of a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Good,
    Info,
    Warning,
    Error,
}

impl Status {
    pub fn as_str(self) -> &'static str {
        match self {
            Status::Good => "good",
            Status::Info => "info",
            Status::Warning => "warning",
            Status::Error => "error",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A transient message. Serializes to the webhook body; `details` is
/// omitted when absent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub subject: String,
    pub job: String,
    pub status: Status,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

impl Notification {
    pub fn new(
        subject: impl Into<String>,
        job: impl Into<String>,
        status: Status,
        message: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            job: job.into(),
            status,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

/// Delivers notifications. Implementations must never panic or propagate
/// delivery failures; they report whether anything was delivered.
pub trait Notifier: Send + Sync {
    /// Returns `true` when at least one target accepted the notification or
    /// there is nothing configured to send to.
    fn send(&self, notification: &Notification) -> bool;

    /// Whether any target is configured at all.
    fn has_targets(&self) -> bool {
        true
    }
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn send(&self, notification: &Notification) -> bool {
        (**self).send(notification)
    }

    fn has_targets(&self) -> bool {
        (**self).has_targets()
    }
}

/// Records notifications in memory. Clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MemoryNotifier {
    sent: Arc<Mutex<Vec<Notification>>>,
}

impl MemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn subjects(&self) -> Vec<String> {
        self.sent().into_iter().map(|n| n.subject).collect()
    }
}

impl Notifier for MemoryNotifier {
    fn send(&self, notification: &Notification) -> bool {
        match self.sent.lock() {
            Ok(mut sent) => {
                sent.push(notification.clone());
                true
            }
            Err(_) => false,
        }
    }
}
