//! `storage-ops seed` — enrol scrub specs in the schedule.
//!
//! Full scrubs and fast parity passes never start on their own for a spec
//! with no last-run record. Seeding writes a zero timestamp for both, which
//! makes them due on the next orchestrator run.

use anyhow::{bail, Context, Result};
use clap::Args;
use storeops_core::state;
use storeops_core::{Config, LastRunState, ProcessLock, RuntimePaths};

/// Arguments for `storage-ops seed`.
#[derive(Args, Debug)]
pub struct SeedArgs {
    /// List what would be seeded without writing the state file.
    #[arg(long)]
    pub dry_run: bool,
}

impl SeedArgs {
    pub fn run(self, paths: &RuntimePaths) -> Result<i32> {
        let config = storeops_core::config::load(paths).context("failed to load configuration")?;

        let lock_path = paths.global_lock();
        let Some(_lock) = ProcessLock::try_acquire(&lock_path, "seed")
            .with_context(|| format!("failed to take {}", lock_path.display()))?
        else {
            bail!("a storage-ops run is in progress; try again when it finishes");
        };

        let mut last_run =
            state::load_at(&paths.state_file).context("failed to load last-run state")?;
        let seeded = seed(&config, &mut last_run);

        let prefix = if self.dry_run { "[dry-run] " } else { "" };
        if seeded.is_empty() {
            println!("{prefix}✓ every scrub spec is already scheduled");
            return Ok(0);
        }
        for directory in &seeded {
            println!("{prefix}✓ seeded {directory}");
        }
        if !self.dry_run {
            state::save_at(&paths.state_file, &last_run)
                .context("failed to write last-run state")?;
        }
        Ok(0)
    }
}

/// Record `0` for every missing scrub and parity id; returns the directories
/// touched.
pub fn seed(config: &Config, last_run: &mut LastRunState) -> Vec<String> {
    let mut touched = Vec::new();
    for spec in &config.scrub_specs {
        let mut changed = false;
        for id in [spec.scrub_id(), spec.parity_id()] {
            if !last_run.contains(&id) {
                last_run.record(&id, 0.0);
                changed = true;
            }
        }
        if changed {
            touched.push(spec.directory.display().to_string());
        }
    }
    touched
}
