//! # storeops-sync
//!
//! One-way mirror of a directory tree through an external mirroring tool.
//!
//! Call [`run_sync`] with a [`MirrorCommand`] (rsync by default). Progress
//! records from the tool are parsed as they stream in and logged at most once
//! per [`progress::PROGRESS_LOG_INTERVAL`]; the final statistics block is
//! parsed into [`TransferStats`].

pub mod command;
pub mod engine;
pub mod error;
pub mod progress;
pub mod stats;

pub use command::MirrorCommand;
pub use engine::{run_sync, SyncOutcome};
pub use error::SyncError;
pub use stats::TransferStats;
