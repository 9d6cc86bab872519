//! `storage-ops` with no subcommand: one orchestrator run.

use std::sync::Arc;

use anyhow::{Context, Result};
use storeops_core::RuntimePaths;
use storeops_mounts::SystemProbe;
use storeops_orchestrator::{init_tracing, Orchestrator};
use storeops_scrub::Par2Tool;

use super::{block_on_with_signals, load_config, notifier_for, Tools};

pub fn run(paths: &RuntimePaths, tools: &Tools) -> Result<i32> {
    init_tracing(Some(&paths.orchestrator_log()));

    let Some(config) = load_config(paths)? else {
        tracing::info!(
            config = %paths.config_file.display(),
            "no configuration; nothing to do"
        );
        return Ok(0);
    };
    if !config.has_storage_ops() {
        tracing::info!("no sync or scrub specs configured");
        return Ok(0);
    }

    let notifier = notifier_for(Some(&config))?;
    let orchestrator = Orchestrator::new(paths.clone(), config, SystemProbe::load(), notifier)
        .with_mirror(tools.mirror())
        .with_parity_tool(Arc::new(Par2Tool::new(tools.par2.clone())));

    let outcome = block_on_with_signals(|shutdown| async move {
        orchestrator.run(&shutdown).await
    })?
    .context("orchestrator run failed")?;

    Ok(outcome.exit_code())
}
