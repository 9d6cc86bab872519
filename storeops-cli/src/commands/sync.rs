//! `storage-ops sync` — mirror one directory onto another.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use storeops_core::RuntimePaths;
use storeops_orchestrator::{init_tracing, sync_with_notification, OrchestratorError};
use storeops_sync::SyncError;

use super::{absolute, block_on_with_signals, load_config, notifier_for, Tools};

/// Arguments for `storage-ops sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Directory to copy from.
    pub source: PathBuf,

    /// Directory to mirror into; created when absent.
    pub destination: PathBuf,
}

impl SyncArgs {
    pub fn run(self, paths: &RuntimePaths, tools: &Tools) -> Result<i32> {
        init_tracing(None);

        let config = load_config(paths)?;
        let notifier = notifier_for(config.as_ref())?;
        let source = absolute(&self.source)?;
        let destination = absolute(&self.destination)?;
        let mirror = tools.mirror();

        let (result, signal_code) = block_on_with_signals(|shutdown| async move {
            let result =
                sync_with_notification(&source, &destination, &mirror, notifier, shutdown.token())
                    .await;
            (result, shutdown.exit_code())
        })?;

        Ok(match result {
            Ok(outcome) if outcome.success() => {
                println!("✓ {}", outcome.summary());
                0
            }
            Ok(outcome) => {
                eprintln!("✗ {}", outcome.summary());
                1
            }
            Err(OrchestratorError::Sync(SyncError::Cancelled)) => signal_code,
            Err(err) => {
                tracing::error!(error = %err, "sync failed");
                1
            }
        })
    }
}
