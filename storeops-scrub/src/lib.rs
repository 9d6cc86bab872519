//! # storeops-scrub
//!
//! Per-file parity protection of a directory tree.
//!
//! [`run_scrub`] walks a directory, (re)creates a parity set for every new or
//! modified file through a [`ParityTool`], optionally verifies and repairs
//! each file, removes parity sets whose source file is gone and finally
//! writes a [`CompletionMarker`] into the parity database. Every parity
//! mutation runs inside a [`Transaction`] so an interrupted create never
//! leaves a truncated set behind.

pub mod engine;
pub mod error;
pub mod marker;
pub mod naming;
pub mod recovery;
pub mod tool;
pub mod transaction;

pub use engine::{run_scrub, RetryPolicy, ScrubOptions, ScrubReport, ScrubRun, DEFAULT_TIMEOUT};
pub use error::ScrubError;
pub use marker::{CompletionMarker, CorruptedFile};
pub use naming::parity_base_name;
pub use recovery::Recovery;
pub use tool::{CreateRequest, Par2Tool, ParityTool, ToolOutput};
pub use transaction::{StepError, Transaction, TransactionError};
