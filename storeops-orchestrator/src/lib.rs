//! Orchestrator runtime: one scheduled pass over every configured sync and
//! scrub, plus the process plumbing around it (signals, tracing, log files).

mod error;
pub mod log_rotation;
pub mod logging;
pub mod operations;
mod runtime;
pub mod shutdown;

pub use error::OrchestratorError;
pub use logging::init_tracing;
pub use operations::{deliver, scrub_with_progress, sync_with_notification};
pub use runtime::{DuePlan, Orchestrator, RunOutcome};
pub use shutdown::{spawn_signal_listener, Shutdown, ShutdownSignal};
