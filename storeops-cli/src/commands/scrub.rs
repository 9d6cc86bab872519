//! `storage-ops scrub` — one parity pass over a directory tree.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use storeops_core::types::resolve_database;
use storeops_core::{Redundancy, RuntimePaths};
use storeops_notify::progress::PROGRESS_OFFSETS;
use storeops_orchestrator::{init_tracing, scrub_with_progress, OrchestratorError};
use storeops_scrub::{Par2Tool, ScrubError, ScrubOptions, ScrubRun};

use super::{absolute, block_on_with_signals, load_config, notifier_for, Tools};

/// Arguments for `storage-ops scrub`.
#[derive(Args, Debug)]
pub struct ScrubArgs {
    /// Directory tree to protect.
    pub directory: PathBuf,

    /// Parity database; relative paths are taken inside `directory`.
    pub database: PathBuf,

    /// Parity redundancy in percent (1-100).
    pub redundancy: Redundancy,

    /// Append this run's log to the given file.
    pub log_file: PathBuf,

    /// Only create and refresh parity; skip verification and repair.
    #[arg(long)]
    pub no_verify: bool,
}

impl ScrubArgs {
    pub fn run(self, paths: &RuntimePaths, tools: &Tools) -> Result<i32> {
        init_tracing(Some(&self.log_file));

        let config = load_config(paths)?;
        let notifier = notifier_for(config.as_ref())?;

        let directory = absolute(&self.directory)?;
        let database = resolve_database(&directory, &self.database);
        // Same key as the orchestrator's lock for this spec.
        let lock_file = paths.scrub_lock(&directory, &database);
        let mut options = ScrubOptions::new(&directory, &database, self.redundancy, lock_file)
            .with_verify(!self.no_verify);
        if let Some(config) = &config {
            options.recovery = config.recovery;
        }

        let tool = Arc::new(Par2Tool::new(tools.par2.clone()));
        let (result, signal_code) = block_on_with_signals(|shutdown| async move {
            let result =
                scrub_with_progress(options, tool, notifier, &PROGRESS_OFFSETS, shutdown.token())
                    .await;
            (result, shutdown.exit_code())
        })?;

        Ok(match result {
            Ok(ScrubRun::Completed(report)) => {
                println!("{}", report.summary_message());
                0
            }
            Ok(ScrubRun::Busy { lock }) => {
                println!("another scrub of this directory is running (lock {})", lock.display());
                0
            }
            Err(OrchestratorError::Scrub(ScrubError::Interrupted)) => signal_code,
            Err(err) => {
                tracing::error!(error = %err, "scrub failed");
                1
            }
        })
    }
}
