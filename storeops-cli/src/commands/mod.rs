//! Subcommand implementations and the plumbing they share.

pub mod run;
pub mod scrub;
pub mod seed;
pub mod status;
pub mod sync;

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use storeops_core::{config, Config, ConfigError, RuntimePaths};
use storeops_notify::{Dispatcher, Notifier};
use storeops_orchestrator::{spawn_signal_listener, Shutdown};
use storeops_sync::MirrorCommand;

/// External tool locations.
#[derive(Debug, Clone)]
pub struct Tools {
    pub rsync: PathBuf,
    pub par2: PathBuf,
}

impl Tools {
    pub fn mirror(&self) -> MirrorCommand {
        MirrorCommand {
            program: self.rsync.clone(),
            ..MirrorCommand::rsync()
        }
    }
}

/// The configuration, or `None` when no file exists.
pub fn load_config(paths: &RuntimePaths) -> Result<Option<Config>> {
    match config::load(paths) {
        Ok(config) => Ok(Some(config)),
        Err(ConfigError::NotFound { .. }) => Ok(None),
        Err(err) => Err(err).context("failed to load configuration"),
    }
}

/// Dispatcher for the configured targets (none without a config file).
pub fn notifier_for(config: Option<&Config>) -> Result<Arc<dyn Notifier>> {
    let (targets, host) = match config {
        Some(config) => (config.notify_specs.clone(), config.friendly_name.clone()),
        None => (vec![], Config::default().friendly_name),
    };
    let dispatcher =
        Dispatcher::new(targets, host).context("failed to prepare notification templates")?;
    Ok(Arc::new(dispatcher))
}

/// Drive `work` on a fresh runtime with SIGINT/SIGTERM wired to `Shutdown`.
pub fn block_on_with_signals<F, Fut, T>(work: F) -> Result<T>
where
    F: FnOnce(Shutdown) -> Fut,
    Fut: Future<Output = T>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(async move {
        let shutdown = Shutdown::new();
        let listener = spawn_signal_listener(shutdown.clone());
        let result = work(shutdown.clone()).await;
        listener.abort();
        let _ = listener.await;
        Ok(result)
    })
}

/// Relative command-line paths are taken against the working directory.
pub fn absolute(path: &Path) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path.to_path_buf());
    }
    let cwd = std::env::current_dir().context("could not determine working directory")?;
    Ok(cwd.join(path))
}

/// `"3h"`, `"2d"`: age of a UNIX timestamp relative to `now`.
pub fn format_age(now: f64, timestamp: f64) -> String {
    let seconds = (now - timestamp).max(0.0) as u64;
    if seconds < 60 {
        return format!("{seconds}s");
    }
    if seconds < 60 * 60 {
        return format!("{}m", seconds / 60);
    }
    if seconds < 60 * 60 * 24 {
        return format!("{}h", seconds / (60 * 60));
    }
    format!("{}d", seconds / (60 * 60 * 24))
}
