//! One orchestrator run.
//!
//! A run takes the global lock, loads the last-run state, works out which
//! operations are due, runs them in three phases (syncs, then full scrubs,
//! then fast parity passes), persists the new state in one write and sends
//! the run summary. Nothing but a failed state write aborts the run; every
//! other failure is recorded against its operation.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use storeops_core::schedule::is_due_at;
use storeops_core::state::{self, unix_now};
use storeops_core::{
    Config, LastRunState, OperationId, ProcessLock, RuntimePaths, ScrubSpec, StateError, SyncSpec,
};
use storeops_mounts::{MountProbe, MountValidator};
use storeops_notify::progress::PROGRESS_OFFSETS;
use storeops_notify::summary::start_notification;
use storeops_notify::{MessageRenderer, Notifier, OperationReport, Outcome, RunSummary};
use storeops_scrub::{Par2Tool, ParityTool, RetryPolicy, ScrubError, ScrubOptions, ScrubRun};
use storeops_sync::{MirrorCommand, SyncError};

use crate::error::OrchestratorError;
use crate::operations::{deliver, scrub_with_progress, sync_with_notification};
use crate::shutdown::{Shutdown, ShutdownSignal};

/// How a run ended.
#[derive(Debug)]
pub enum RunOutcome {
    /// Another run holds the global lock.
    Busy,
    /// No operation was due; nothing was touched.
    NothingDue,
    Finished(RunSummary),
    /// A shutdown signal stopped the run. Completed operations were still
    /// recorded.
    Interrupted {
        signal: Option<ShutdownSignal>,
        summary: RunSummary,
    },
}

impl RunOutcome {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunOutcome::Busy | RunOutcome::NothingDue => 0,
            RunOutcome::Finished(summary) if summary.has_failures() => 1,
            RunOutcome::Finished(_) => 0,
            RunOutcome::Interrupted { signal, .. } => {
                signal.map(ShutdownSignal::exit_code).unwrap_or(1)
            }
        }
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        match self {
            RunOutcome::Finished(summary) | RunOutcome::Interrupted { summary, .. } => {
                Some(summary)
            }
            RunOutcome::Busy | RunOutcome::NothingDue => None,
        }
    }
}

/// Operations due in one run, in execution order within each phase.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DuePlan {
    pub syncs: Vec<SyncSpec>,
    pub scrubs: Vec<ScrubSpec>,
    pub parity_updates: Vec<ScrubSpec>,
}

impl DuePlan {
    /// Syncs default to due on first sight; scrubs and fast passes wait to
    /// be seeded.
    pub fn compute(config: &Config, last_run: &LastRunState, now: f64) -> Self {
        Self {
            syncs: config
                .sync_specs
                .iter()
                .filter(|spec| is_due_at(last_run, &spec.operation_id(), spec.interval, true, now))
                .cloned()
                .collect(),
            scrubs: config
                .scrub_specs
                .iter()
                .filter(|spec| is_due_at(last_run, &spec.scrub_id(), spec.interval, false, now))
                .cloned()
                .collect(),
            parity_updates: config
                .scrub_specs
                .iter()
                .filter(|spec| {
                    is_due_at(
                        last_run,
                        &spec.parity_id(),
                        spec.interval.fast_parity(),
                        false,
                        now,
                    )
                })
                .cloned()
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.syncs.is_empty() && self.scrubs.is_empty() && self.parity_updates.is_empty()
    }
}

enum Step {
    Done(OperationReport),
    Stop,
}

pub struct Orchestrator<P> {
    paths: RuntimePaths,
    config: Config,
    mounts: MountValidator<P>,
    notifier: Arc<dyn Notifier>,
    mirror: MirrorCommand,
    parity: Arc<dyn ParityTool>,
    progress_offsets: Vec<Duration>,
    retry: RetryPolicy,
}

impl<P: MountProbe> Orchestrator<P> {
    pub fn new(
        paths: RuntimePaths,
        config: Config,
        probe: P,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let mounts = MountValidator::from_config(probe, &config);
        Self {
            paths,
            config,
            mounts,
            notifier,
            mirror: MirrorCommand::rsync(),
            parity: Arc::new(Par2Tool::default()),
            progress_offsets: PROGRESS_OFFSETS.to_vec(),
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_mirror(mut self, mirror: MirrorCommand) -> Self {
        self.mirror = mirror;
        self
    }

    pub fn with_parity_tool(mut self, tool: Arc<dyn ParityTool>) -> Self {
        self.parity = tool;
        self
    }

    pub fn with_progress_offsets(mut self, offsets: Vec<Duration>) -> Self {
        self.progress_offsets = offsets;
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub async fn run(&self, shutdown: &Shutdown) -> Result<RunOutcome, OrchestratorError> {
        let lock_path = self.paths.global_lock();
        let Some(_lock) = ProcessLock::try_acquire(&lock_path, "orchestrator")? else {
            tracing::info!(lock = %lock_path.display(), "another storage-ops run is in progress; skipping");
            return Ok(RunOutcome::Busy);
        };

        let mut last_run = self.load_state()?;
        let plan = DuePlan::compute(&self.config, &last_run, unix_now());
        if plan.is_empty() {
            tracing::info!("no operations due");
            return Ok(RunOutcome::NothingDue);
        }
        tracing::info!(
            syncs = plan.syncs.len(),
            scrubs = plan.scrubs.len(),
            parity_updates = plan.parity_updates.len(),
            "storage operations starting"
        );

        let notify = self.notifier.has_targets();
        if notify {
            deliver(
                self.notifier.clone(),
                start_notification(
                    &self.config.friendly_name,
                    self.config.sync_specs.len(),
                    self.config.scrub_specs.len(),
                ),
            )
            .await;
        }

        let mut summary = RunSummary::start();
        let completed = self
            .run_phases(&plan, &mut last_run, &mut summary, shutdown)
            .await;
        summary.finish();

        // Completed operations are recorded even when the run was cut short.
        state::save_at(&self.paths.state_file, &last_run)?;

        if !completed {
            tracing::warn!(
                counts = %summary.counts_line(),
                "storage operations interrupted"
            );
            return Ok(RunOutcome::Interrupted {
                signal: shutdown.signal(),
                summary,
            });
        }

        tracing::info!(counts = %summary.counts_line(), "storage operations finished");
        if notify {
            match MessageRenderer::new().and_then(|renderer| {
                summary.to_notification(&renderer, &self.config.friendly_name)
            }) {
                Ok(note) => deliver(self.notifier.clone(), note).await,
                Err(err) => tracing::error!(error = %err, "cannot render run summary"),
            }
        }
        Ok(RunOutcome::Finished(summary))
    }

    /// `false` when a shutdown stopped the run.
    async fn run_phases(
        &self,
        plan: &DuePlan,
        last_run: &mut LastRunState,
        summary: &mut RunSummary,
        shutdown: &Shutdown,
    ) -> bool {
        for spec in &plan.syncs {
            if shutdown.is_requested() {
                return false;
            }
            match self.sync_one(spec, last_run, shutdown).await {
                Step::Done(report) => summary.syncs.push(report),
                Step::Stop => return false,
            }
        }

        let mut fully_scrubbed = HashSet::<OperationId>::new();
        for spec in &plan.scrubs {
            if shutdown.is_requested() {
                return false;
            }
            match self.scrub_one(spec, true, last_run, shutdown).await {
                Step::Done(report) => {
                    if report.outcome == Outcome::Succeeded {
                        fully_scrubbed.insert(spec.parity_id());
                    }
                    summary.scrubs.push(report);
                }
                Step::Stop => return false,
            }
        }

        for spec in &plan.parity_updates {
            if fully_scrubbed.contains(&spec.parity_id()) {
                tracing::debug!(directory = %spec.directory.display(), "fast pass satisfied by full scrub");
                continue;
            }
            if shutdown.is_requested() {
                return false;
            }
            match self.scrub_one(spec, false, last_run, shutdown).await {
                Step::Done(report) => summary.parity_updates.push(report),
                Step::Stop => return false,
            }
        }
        true
    }

    async fn sync_one(
        &self,
        spec: &SyncSpec,
        last_run: &mut LastRunState,
        shutdown: &Shutdown,
    ) -> Step {
        let name = format!("{} -> {}", spec.source.display(), spec.destination.display());
        let check = self
            .mounts
            .check([spec.source.as_path(), spec.destination.as_path()]);
        if let Some(reason) = check.reason() {
            tracing::warn!(op = %spec.operation_id(), "skipping sync: {reason}");
            return Step::Done(OperationReport::skipped(name, reason));
        }

        match sync_with_notification(
            &spec.source,
            &spec.destination,
            &self.mirror,
            self.notifier.clone(),
            shutdown.token(),
        )
        .await
        {
            Ok(outcome) if outcome.success() => {
                last_run.record(&spec.operation_id(), unix_now());
                Step::Done(OperationReport::succeeded(name, outcome.summary()))
            }
            Ok(outcome) => Step::Done(OperationReport::failed(name, outcome.summary())),
            Err(OrchestratorError::Sync(SyncError::Cancelled)) => Step::Stop,
            Err(err) => {
                tracing::error!(op = %spec.operation_id(), error = %err, "sync failed");
                Step::Done(OperationReport::failed(name, err.to_string()))
            }
        }
    }

    async fn scrub_one(
        &self,
        spec: &ScrubSpec,
        verify: bool,
        last_run: &mut LastRunState,
        shutdown: &Shutdown,
    ) -> Step {
        let database = spec.resolved_database();
        let name = spec.directory.display().to_string();
        let id = if verify { spec.scrub_id() } else { spec.parity_id() };

        let check = self
            .mounts
            .check([spec.directory.as_path(), database.as_path()]);
        if let Some(reason) = check.reason() {
            tracing::warn!(op = %id, "skipping scrub: {reason}");
            return Step::Done(OperationReport::skipped(name, reason));
        }

        let mut options = ScrubOptions::from_spec(
            spec,
            self.paths.scrub_lock(&spec.directory, &database),
        )
        .with_verify(verify);
        options.retry = self.retry;
        options.recovery = self.config.recovery;

        let result = scrub_with_progress(
            options,
            self.parity.clone(),
            self.notifier.clone(),
            &self.progress_offsets,
            shutdown.token(),
        )
        .await;

        match result {
            Ok(ScrubRun::Completed(report)) => {
                let now = unix_now();
                last_run.record(&id, now);
                if verify {
                    last_run.record(&spec.parity_id(), now);
                }
                Step::Done(OperationReport::succeeded(name, report.summary_message()))
            }
            Ok(ScrubRun::Busy { .. }) => Step::Done(OperationReport::skipped(
                name,
                "another scrub of this directory is running",
            )),
            Err(OrchestratorError::Scrub(ScrubError::Interrupted)) => Step::Stop,
            Err(err) => {
                if shutdown.is_requested() {
                    return Step::Stop;
                }
                tracing::error!(op = %id, error = %err, "scrub failed");
                Step::Done(OperationReport::failed(name, err.to_string()))
            }
        }
    }

    /// An unreadable state file is moved aside and the run continues with
    /// an empty schedule.
    fn load_state(&self) -> Result<LastRunState, OrchestratorError> {
        match state::load_at(&self.paths.state_file) {
            Ok(last_run) => Ok(last_run),
            Err(StateError::Parse { path, source }) => {
                let aside = state::quarantine_at(&path)?;
                tracing::warn!(
                    path = %path.display(),
                    moved_to = %aside.display(),
                    error = %source,
                    "last-run state unreadable; starting from an empty schedule"
                );
                Ok(LastRunState::default())
            }
            Err(err) => Err(err.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use storeops_core::{Interval, Redundancy};
    use std::path::PathBuf;

    const NOW: f64 = 1_700_000_000.0;
    const DAY: f64 = 86_400.0;

    fn config() -> Config {
        Config {
            sync_specs: vec![SyncSpec {
                source: PathBuf::from("/srv/a"),
                destination: PathBuf::from("/srv/b"),
                interval: Interval::Daily,
            }],
            scrub_specs: vec![ScrubSpec {
                directory: PathBuf::from("/srv/a"),
                database: PathBuf::from(".pardatabase"),
                redundancy: Redundancy::new(5).unwrap(),
                interval: Interval::Weekly,
            }],
            ..Config::default()
        }
    }

    #[test]
    fn unseeded_scrubs_wait_while_syncs_run() {
        let plan = DuePlan::compute(&config(), &LastRunState::default(), NOW);
        assert_eq!(plan.syncs.len(), 1);
        assert!(plan.scrubs.is_empty());
        assert!(plan.parity_updates.is_empty());
    }

    #[test]
    fn fast_pass_runs_daily_between_weekly_scrubs() {
        let config = config();
        let spec = &config.scrub_specs[0];
        let mut last_run = LastRunState::default();
        last_run.record(&config.sync_specs[0].operation_id(), NOW);
        last_run.record(&spec.scrub_id(), NOW - 2.0 * DAY);
        last_run.record(&spec.parity_id(), NOW - DAY);

        let plan = DuePlan::compute(&config, &last_run, NOW);
        assert!(plan.syncs.is_empty());
        assert!(plan.scrubs.is_empty());
        assert_eq!(plan.parity_updates, vec![spec.clone()]);
    }

    #[test]
    fn seeded_specs_are_due_immediately() {
        let config = config();
        let spec = &config.scrub_specs[0];
        let mut last_run = LastRunState::default();
        last_run.record(&spec.scrub_id(), 0.0);
        last_run.record(&spec.parity_id(), 0.0);

        let plan = DuePlan::compute(&config, &last_run, NOW);
        assert_eq!(plan.scrubs.len(), 1);
        assert_eq!(plan.parity_updates.len(), 1);
        assert!(!plan.is_empty());
    }

    #[test]
    fn exit_codes() {
        assert_eq!(RunOutcome::Busy.exit_code(), 0);
        assert_eq!(RunOutcome::NothingDue.exit_code(), 0);

        let mut summary = RunSummary::start();
        summary.syncs.push(OperationReport::skipped("a", "not mounted"));
        assert_eq!(RunOutcome::Finished(summary.clone()).exit_code(), 0);

        summary.scrubs.push(OperationReport::failed("b", "boom"));
        assert_eq!(RunOutcome::Finished(summary.clone()).exit_code(), 1);

        let interrupted = RunOutcome::Interrupted {
            signal: Some(ShutdownSignal::Terminate),
            summary,
        };
        assert_eq!(interrupted.exit_code(), 143);
    }
}
