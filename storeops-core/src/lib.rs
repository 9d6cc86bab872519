//! storeops core library — typed configuration, last-run state, scheduling,
//! process locks and runtime paths.
//!
//! Public API surface:
//! - [`types`] — specs, intervals, operation ids
//! - [`config`] — load / validate the JSON configuration
//! - [`state`] — last-run timestamps (atomic save)
//! - [`schedule`] — `is_due` frequency checks
//! - [`lock`] — advisory process locks
//! - [`paths`] — well-known runtime locations

pub mod config;
pub mod error;
pub mod lock;
pub mod paths;
pub mod schedule;
pub mod state;
pub mod types;

pub use config::Config;
pub use error::{ConfigError, LockError, StateError};
pub use lock::ProcessLock;
pub use paths::RuntimePaths;
pub use state::LastRunState;
pub use types::{
    Interval, NotifyKind, NotifyTarget, OperationId, RecoveryPolicy, Redundancy, ScrubSpec,
    SyncSpec,
};
