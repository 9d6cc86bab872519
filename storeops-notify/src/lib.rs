//! # storeops-notify
//!
//! Notification model, transports and schedules.
//!
//! - [`Notification`] is the transient message: subject, job, status, message
//!   and optional details.
//! - [`Notifier`] is the sending seam. [`Dispatcher`] fans a notification out
//!   to the configured webhook/mailbox targets; [`MemoryNotifier`] records
//!   them in-process.
//! - [`RunSummary`] turns per-operation outcomes into the end-of-run summary.
//! - [`progress`] schedules deferred progress updates for long scrubs.

pub mod dispatch;
pub mod error;
pub mod notification;
pub mod progress;
pub mod render;
pub mod summary;

pub use dispatch::Dispatcher;
pub use error::NotifyError;
pub use notification::{MemoryNotifier, Notification, Notifier, Status};
pub use progress::{ProgressSnapshot, ScrubProgress};
pub use render::MessageRenderer;
pub use summary::{OperationReport, Outcome, RunSummary};
