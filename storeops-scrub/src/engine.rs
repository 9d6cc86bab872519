//! The scrub run.
//!
//! ```text
//! lock ─▶ validate ─▶ recover ─▶ protect each file ─▶ drop orphans ─▶ marker
//!                                  (create / verify / repair)
//! ```
//!
//! Each parity replacement is one [`Transaction`] segment: the old set is
//! stashed in `<db>/.staging`, the new set is created (with retries), then
//! the stash is discarded and a checkpoint commits the file. A failure or a
//! deadline rolls back the open segment, which restores the old set and
//! removes any partial new one.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant, SystemTime};

use chrono::Local;
use serde::Serialize;
use storeops_core::types::{normalize_lexically, resolve_database};
use storeops_core::{ProcessLock, RecoveryPolicy, Redundancy, ScrubSpec};
use storeops_notify::{MessageRenderer, Notification, Notifier, ScrubProgress, Status};
use tokio_util::sync::CancellationToken;
use walkdir::WalkDir;

use crate::error::{io_err, ScrubError};
use crate::marker::{self, CompletionMarker, CorruptedFile};
use crate::naming::{
    group_by_base, parity_base_for, parity_family, protected_relative, remove_family,
    volume_base_name, STAGING_DIR,
};
use crate::recovery::{self, Recovery};
use crate::tool::{CreateRequest, ParityTool};
use crate::transaction::{StepError, Transaction, TransactionError};

/// Hard limit on one scrub run.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(7_200);

/// A file is stale when it is newer than its parity by more than this.
pub const MTIME_TOLERANCE: Duration = Duration::from_secs(1);

pub const SCRUB_JOB: &str = "scrub";

const SLEEP_SLICE: Duration = Duration::from_millis(100);

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Retry schedule for parity creation: `base_delay * 2^attempt`, capped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(attempt))
            .min(self.max_delay)
    }
}

#[derive(Debug, Clone)]
pub struct ScrubOptions {
    pub directory: PathBuf,
    /// Absolute parity database.
    pub database: PathBuf,
    pub redundancy: Redundancy,
    /// Verify (and repair) every file; `false` is the fast parity-only pass.
    pub verify: bool,
    pub timeout: Duration,
    pub retry: RetryPolicy,
    pub recovery: RecoveryPolicy,
    /// Per-directory lock held for the whole run.
    pub lock_file: PathBuf,
}

impl ScrubOptions {
    /// `database` may be relative to `directory`.
    pub fn new(
        directory: impl Into<PathBuf>,
        database: impl AsRef<Path>,
        redundancy: Redundancy,
        lock_file: impl Into<PathBuf>,
    ) -> Self {
        let directory = directory.into();
        let database = resolve_database(&directory, database.as_ref());
        Self {
            directory,
            database,
            redundancy,
            verify: true,
            timeout: DEFAULT_TIMEOUT,
            retry: RetryPolicy::default(),
            recovery: RecoveryPolicy::default(),
            lock_file: lock_file.into(),
        }
    }

    pub fn from_spec(spec: &ScrubSpec, lock_file: impl Into<PathBuf>) -> Self {
        Self::new(&spec.directory, &spec.database, spec.redundancy, lock_file)
    }

    pub fn with_verify(mut self, verify: bool) -> Self {
        self.verify = verify;
        self
    }

    pub fn mode(&self) -> &'static str {
        if self.verify {
            "full"
        } else {
            "fast"
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScrubReport {
    pub directory: PathBuf,
    pub database: PathBuf,
    pub mode: String,
    pub files_processed: u64,
    /// New or replaced parity sets.
    pub files_created: u64,
    /// Replaced because the file changed.
    pub files_updated: u64,
    pub files_verified: u64,
    pub files_repaired: u64,
    pub files_failed: u64,
    pub orphans_removed: u64,
    pub total_file_size_mb: f64,
    pub redundancy: u8,
    pub duration_seconds: f64,
    pub corrupted_files: Vec<CorruptedFile>,
}

impl ScrubReport {
    fn new(options: &ScrubOptions) -> Self {
        Self {
            directory: options.directory.clone(),
            database: options.database.clone(),
            mode: options.mode().to_string(),
            files_processed: 0,
            files_created: 0,
            files_updated: 0,
            files_verified: 0,
            files_repaired: 0,
            files_failed: 0,
            orphans_removed: 0,
            total_file_size_mb: 0.0,
            redundancy: options.redundancy.percent(),
            duration_seconds: 0.0,
            corrupted_files: Vec::new(),
        }
    }

    pub fn has_warnings(&self) -> bool {
        self.files_repaired > 0 || self.files_failed > 0 || !self.corrupted_files.is_empty()
    }

    /// `Processed N files[, updated U][, repaired R][, verified V][, failed F]`
    pub fn summary_message(&self) -> String {
        let mut message = format!("Processed {} files", self.files_processed);
        for (label, count) in [
            ("updated", self.files_updated),
            ("repaired", self.files_repaired),
            ("verified", self.files_verified),
            ("failed", self.files_failed),
        ] {
            if count > 0 {
                message.push_str(&format!(", {label} {count}"));
            }
        }
        message
    }

    pub fn notification(&self) -> Notification {
        let (subject, status) = if self.has_warnings() {
            ("Warning: Scrub completed", Status::Warning)
        } else {
            ("Success: Scrub completed", Status::Good)
        };
        let notification = Notification::new(subject, SCRUB_JOB, status, self.summary_message());
        match MessageRenderer::new().and_then(|r| r.scrub_summary(self)) {
            Ok(details) => notification.with_details(details),
            Err(e) => {
                tracing::warn!(error = %e, "could not render scrub summary");
                notification
            }
        }
    }

    fn to_marker(&self, started_at: chrono::DateTime<Local>) -> CompletionMarker {
        CompletionMarker {
            completed_at: Local::now(),
            started_at,
            duration_seconds: self.duration_seconds,
            directory: self.directory.clone(),
            database: self.database.clone(),
            redundancy_percent: self.redundancy,
            verify_mode: self.mode.clone(),
            files_processed: self.files_processed,
            files_updated: self.files_updated,
            files_verified: self.files_verified,
            files_repaired: self.files_repaired,
            total_file_size_mb: self.total_file_size_mb,
            corrupted_files: self.corrupted_files.clone(),
            timezone: marker::local_timezone(),
        }
    }
}

#[derive(Debug)]
pub enum ScrubRun {
    Completed(ScrubReport),
    /// Another scrub of the same directory holds the lock.
    Busy { lock: PathBuf },
}

impl ScrubRun {
    pub fn report(&self) -> Option<&ScrubReport> {
        match self {
            ScrubRun::Completed(report) => Some(report),
            ScrubRun::Busy { .. } => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Scrub `options.directory` once. Blocking; run it on a blocking thread.
///
/// Per-file failures are counted in the report and never abort the run.
/// Validation failures, the deadline and cancellation do.
pub fn run_scrub<T: ParityTool + ?Sized>(
    options: &ScrubOptions,
    tool: &T,
    notifier: &dyn Notifier,
    progress: &ScrubProgress,
    cancel: &CancellationToken,
) -> Result<ScrubRun, ScrubError> {
    let Some(_lock) = ProcessLock::try_acquire(&options.lock_file, "scrub")? else {
        tracing::info!(
            directory = %options.directory.display(),
            lock = %options.lock_file.display(),
            "another scrub of this directory is running; skipping"
        );
        return Ok(ScrubRun::Busy {
            lock: options.lock_file.clone(),
        });
    };

    tracing::info!(
        directory = %options.directory.display(),
        database = %options.database.display(),
        mode = options.mode(),
        redundancy = %options.redundancy,
        "scrub started"
    );

    let mut scrub = Scrub {
        options,
        tool,
        notifier,
        progress,
        cancel,
        staging: options.database.join(STAGING_DIR),
        report: ScrubReport::new(options),
        corruption_notified: false,
    };
    let result = scrub.run();
    if result.is_err() {
        scrub.prune_staging();
    }
    progress.finish();

    let directory = options.directory.display();
    match result {
        Ok(report) => {
            tracing::info!(
                directory = %directory,
                processed = report.files_processed,
                created = report.files_created,
                verified = report.files_verified,
                repaired = report.files_repaired,
                failed = report.files_failed,
                orphans = report.orphans_removed,
                "scrub completed"
            );
            notifier.send(&report.notification());
            Ok(ScrubRun::Completed(report))
        }
        Err(ScrubError::Validation(reason)) => {
            tracing::error!(directory = %directory, "scrub validation failed: {reason}");
            notifier.send(
                &Notification::new(
                    "Error: Scrub validation failed",
                    SCRUB_JOB,
                    Status::Error,
                    format!("Validation failed for {directory}"),
                )
                .with_details(reason.clone()),
            );
            Err(ScrubError::Validation(reason))
        }
        Err(ScrubError::Interrupted) => {
            tracing::warn!(directory = %directory, "scrub interrupted; open changes rolled back");
            Err(ScrubError::Interrupted)
        }
        Err(e) => {
            tracing::error!(directory = %directory, error = %e, "scrub failed");
            notifier.send(&Notification::new(
                "Error: Scrub failed",
                SCRUB_JOB,
                Status::Error,
                format!("Scrub failed for {directory}: {e}"),
            ));
            Err(e)
        }
    }
}

// ---------------------------------------------------------------------------
// Run state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Freshness {
    Missing,
    Stale,
    Current,
}

struct Scrub<'a, T: ?Sized> {
    options: &'a ScrubOptions,
    tool: &'a T,
    notifier: &'a dyn Notifier,
    progress: &'a ScrubProgress,
    cancel: &'a CancellationToken,
    staging: PathBuf,
    report: ScrubReport,
    corruption_notified: bool,
}

impl<'a, T: ParityTool + ?Sized> Scrub<'a, T> {
    fn run(&mut self) -> Result<ScrubReport, ScrubError> {
        let started_at = Local::now();
        let clock = Instant::now();
        let mut tx = Transaction::new(
            format!("scrub:{}", self.options.directory.display()),
            self.options.timeout,
        );

        self.validate(&mut tx)?;

        match recovery::recover(&self.options.database, &self.options.recovery, SystemTime::now())? {
            Recovery::MarkerPresent => {
                marker::remove_at(&self.options.database)?;
            }
            Recovery::KeptIntact { .. } | Recovery::Purged { .. } => {}
        }

        let seen = self.protect_tree(&mut tx)?;
        self.check_interrupt(&mut tx)?;
        tx.create_checkpoint("parity_complete");

        self.remove_orphans(&mut tx, &seen)?;
        self.check_interrupt(&mut tx)?;
        self.discard_stash();

        self.report.duration_seconds = round2(clock.elapsed().as_secs_f64());
        marker::write_at(&self.options.database, &self.report.to_marker(started_at))?;
        tx.create_checkpoint("scrub_complete");
        Ok(self.report.clone())
    }

    fn validate(&self, tx: &mut Transaction<'a>) -> Result<(), ScrubError> {
        let options: &'a ScrubOptions = self.options;
        let directory = options.directory.as_path();
        let database = options.database.as_path();

        tx.add_validation_step(
            move || {
                let meta = std::fs::metadata(directory)
                    .map_err(|e| StepError::new(format!("{}: {e}", directory.display())))?;
                if !meta.is_dir() {
                    return Err(StepError::new(format!("{} is not a directory", directory.display())));
                }
                std::fs::read_dir(directory)
                    .map_err(|e| StepError::new(format!("{} is not readable: {e}", directory.display())))?;
                Ok(())
            },
            "scrubbed directory exists and is readable",
            "validate_directory",
        );
        tx.add_validation_step(
            move || {
                if normalize_lexically(directory).starts_with(database) {
                    return Err(StepError::new(format!(
                        "parity database {} must not be the scrubbed directory or one of its parents",
                        database.display()
                    )));
                }
                std::fs::create_dir_all(database)
                    .map_err(|e| StepError::new(format!("{}: {e}", database.display())))?;
                let probe = database.join(".write_test");
                std::fs::write(&probe, b"")
                    .and_then(|()| std::fs::remove_file(&probe))
                    .map_err(|e| StepError::new(format!("{} is not writable: {e}", database.display())))?;
                Ok(())
            },
            "parity database is writable",
            "validate_database",
        );

        match tx.execute() {
            Ok(()) => {
                tx.create_checkpoint("validation_complete");
                Ok(())
            }
            Err(TransactionError::StepFailed { message, .. }) => Err(ScrubError::Validation(message)),
            Err(e) => Err(e.into()),
        }
    }

    /// Abort with a rollback of the open segment on shutdown or deadline.
    fn check_interrupt(&self, tx: &mut Transaction<'a>) -> Result<(), ScrubError> {
        if self.cancel.is_cancelled() {
            tx.rollback("shutdown requested");
            return Err(ScrubError::Interrupted);
        }
        if tx.is_expired() {
            tx.rollback("deadline exceeded");
            return Err(TransactionError::TimedOut {
                name: tx.name().to_string(),
                timeout: tx.timeout(),
            }
            .into());
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Per-file protection
    // -----------------------------------------------------------------------

    fn protect_tree(&mut self, tx: &mut Transaction<'a>) -> Result<HashSet<PathBuf>, ScrubError> {
        let directory = self.options.directory.clone();
        let database = self.options.database.clone();
        let mut seen = HashSet::new();
        let mut total_bytes = 0u64;

        let walker = WalkDir::new(&directory)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !e.path().starts_with(&database));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    tracing::warn!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            self.check_interrupt(tx)?;

            let Ok(relative) = entry.path().strip_prefix(&directory).map(Path::to_path_buf) else {
                continue;
            };
            total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            seen.insert(relative.clone());

            let base = parity_base_for(&database, &relative);
            if self.ensure_parity(tx, entry.path(), &relative, &base)? && self.options.verify {
                self.verify_file(&relative, &base);
            }
        }

        self.report.total_file_size_mb = round2(total_bytes as f64 / (1024.0 * 1024.0));
        Ok(seen)
    }

    /// Make sure `relative` has a current parity set. Returns `false` when
    /// creation failed; the old set, if any, is back in place.
    fn ensure_parity(
        &mut self,
        tx: &mut Transaction<'a>,
        file: &Path,
        relative: &Path,
        base: &Path,
    ) -> Result<bool, ScrubError> {
        let freshness = freshness(file, base);
        if freshness == Freshness::Current {
            self.report.files_processed += 1;
            self.progress.add_processed();
            return Ok(true);
        }

        let stash = self.stash_plan(&parity_family(base)?)?;
        let id = relative.display().to_string();

        let (stash_fwd, stash_back) = (stash.clone(), stash.clone());
        tx.add_step(
            move || move_all(&stash_fwd, false),
            move || move_all(&stash_back, true),
            "stash previous parity set",
            &format!("stash:{id}"),
        );

        let options: &'a ScrubOptions = self.options;
        let (tool, cancel) = (self.tool, self.cancel);
        let (directory, redundancy, retry) =
            (options.directory.as_path(), options.redundancy, options.retry);
        let (relative_owned, base_create, base_undo) =
            (relative.to_path_buf(), base.to_path_buf(), base.to_path_buf());
        tx.add_step(
            move || {
                let request = CreateRequest {
                    directory,
                    relative: &relative_owned,
                    base: &base_create,
                    redundancy,
                };
                create_with_retry(tool, &request, &retry, cancel)
            },
            move || remove_family(&base_undo).map(|_| ()).map_err(StepError::new),
            "create parity set",
            &format!("create:{id}"),
        );

        tx.add_step(
            move || {
                for (_, staged) in &stash {
                    remove_if_exists(staged)?;
                }
                Ok(())
            },
            || Ok(()),
            "discard previous parity set",
            &format!("discard:{id}"),
        );

        match tx.execute() {
            Ok(()) => {
                tx.create_checkpoint(&format!("file:{id}"));
                if freshness == Freshness::Stale {
                    self.report.files_updated += 1;
                    self.progress.add_updated();
                    tracing::info!(file = %id, "parity updated");
                } else {
                    tracing::debug!(file = %id, "parity created");
                }
                self.report.files_created += 1;
                self.report.files_processed += 1;
                self.progress.add_processed();
                Ok(true)
            }
            Err(TransactionError::StepFailed { message, .. }) => {
                tracing::error!(file = %id, "parity creation failed: {message}");
                self.report.files_failed += 1;
                self.report.corrupted_files.push(CorruptedFile {
                    path: relative.to_path_buf(),
                    detected_at: Local::now(),
                    repaired: false,
                    error: Some(format!("parity creation failed: {}", last_line(&message))),
                });
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Map each family member to its slot under the staging area.
    fn stash_plan(&self, family: &[PathBuf]) -> Result<Vec<(PathBuf, PathBuf)>, ScrubError> {
        family
            .iter()
            .map(|member| {
                let rel = member.strip_prefix(&self.options.database).map_err(|_| {
                    io_err(
                        member,
                        std::io::Error::new(
                            std::io::ErrorKind::InvalidInput,
                            "parity file outside the database",
                        ),
                    )
                })?;
                Ok((member.clone(), self.staging.join(rel)))
            })
            .collect()
    }

    fn verify_file(&mut self, relative: &Path, base: &Path) {
        let options: &'a ScrubOptions = self.options;
        let directory = options.directory.as_path();
        let verdict = self.tool.verify(directory, base, self.cancel);
        if self.cancel.is_cancelled() {
            return;
        }
        self.report.files_verified += 1;
        self.progress.add_verified();
        if verdict.success {
            return;
        }

        tracing::warn!(file = %relative.display(), "verification failed; attempting repair");
        let repair = self.tool.repair(directory, base, self.cancel);
        let entry = CorruptedFile {
            path: relative.to_path_buf(),
            detected_at: Local::now(),
            repaired: repair.success,
            error: (!repair.success).then(|| last_line(&repair.output).to_string()),
        };
        if repair.success {
            self.report.files_repaired += 1;
            self.progress.add_repaired();
            tracing::info!(file = %relative.display(), "file repaired");
        } else {
            tracing::error!(file = %relative.display(), "repair failed: {}", last_line(&repair.output));
        }

        if !self.corruption_notified {
            self.corruption_notified = true;
            self.notifier.send(&corruption_notification(directory, &entry));
        }
        self.report.corrupted_files.push(entry);
    }

    // -----------------------------------------------------------------------
    // Orphans
    // -----------------------------------------------------------------------

    fn remove_orphans(&mut self, tx: &mut Transaction<'a>, seen: &HashSet<PathBuf>) -> Result<(), ScrubError> {
        let database = self.options.database.clone();
        let groups = group_by_base(recovery::parity_files(&database)?);

        for (base, members) in groups {
            let Some(relative) = protected_relative(&database, &base) else {
                continue;
            };
            if self.is_protected(&relative, seen) {
                continue;
            }
            // A `<name>.par2.volN+M.par2` volume also reads as belonging to
            // `<name>.par2`; keep it while that file is still protected.
            let members: Vec<PathBuf> = members
                .into_iter()
                .filter(|member| {
                    !volume_owner(&database, member).is_some_and(|owner| self.is_protected(&owner, seen))
                })
                .collect();
            if members.is_empty() {
                continue;
            }
            self.check_interrupt(tx)?;

            let id = relative.display().to_string();
            let stash = self.stash_plan(&members)?;
            let (stash_fwd, stash_back) = (stash.clone(), stash.clone());
            tx.add_step(
                move || move_all(&stash_fwd, false),
                move || move_all(&stash_back, true),
                "stash orphaned parity set",
                &format!("orphan:{id}"),
            );
            tx.add_step(
                move || {
                    for (_, staged) in &stash {
                        remove_if_exists(staged)?;
                    }
                    Ok(())
                },
                || Ok(()),
                "delete orphaned parity set",
                &format!("orphan-delete:{id}"),
            );

            match tx.execute() {
                Ok(()) => {
                    tx.create_checkpoint(&format!("orphan:{id}"));
                    self.report.orphans_removed += 1;
                    tracing::info!(file = %id, files = members.len(), "removed orphaned parity set");
                }
                Err(TransactionError::StepFailed { message, .. }) => {
                    tracing::warn!(file = %id, "could not remove orphaned parity set: {message}");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    fn is_protected(&self, relative: &Path, seen: &HashSet<PathBuf>) -> bool {
        seen.contains(relative) || self.options.directory.join(relative).exists()
    }

    /// Drop staging directories a rollback emptied. Anything still stashed
    /// stays for recovery on the next run.
    fn prune_staging(&self) {
        for entry in WalkDir::new(&self.staging).contents_first(true).into_iter().flatten() {
            if entry.file_type().is_dir() {
                let _ = std::fs::remove_dir(entry.path());
            }
        }
    }

    fn discard_stash(&self) {
        match std::fs::remove_dir_all(&self.staging) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %self.staging.display(), error = %e, "could not remove staging area"),
        }
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Protected file a recovery volume names through the volume pattern alone.
fn volume_owner(database: &Path, volume: &Path) -> Option<PathBuf> {
    let base = volume_base_name(volume.file_name()?.to_str()?)?;
    protected_relative(database, &volume.with_file_name(base))
}

fn freshness(file: &Path, base: &Path) -> Freshness {
    let Ok(parity_mtime) = std::fs::metadata(base).and_then(|m| m.modified()) else {
        return Freshness::Missing;
    };
    let Ok(file_mtime) = std::fs::metadata(file).and_then(|m| m.modified()) else {
        return Freshness::Stale;
    };
    if file_mtime > parity_mtime + MTIME_TOLERANCE {
        Freshness::Stale
    } else {
        Freshness::Current
    }
}

/// Move `from → to` for every pair, or `to → from` when `back` is set.
/// Pairs whose source is already gone are skipped.
fn move_all(pairs: &[(PathBuf, PathBuf)], back: bool) -> Result<(), StepError> {
    for (original, staged) in pairs {
        let (from, to) = if back { (staged, original) } else { (original, staged) };
        if !from.exists() {
            continue;
        }
        if let Some(parent) = to.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(from, to)
            .map_err(|e| StepError::new(format!("{} -> {}: {e}", from.display(), to.display())))?;
    }
    Ok(())
}

fn remove_if_exists(path: &Path) -> Result<(), StepError> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(StepError::new(io_err(path, e))),
    }
}

fn create_with_retry<T: ParityTool + ?Sized>(
    tool: &T,
    request: &CreateRequest<'_>,
    retry: &RetryPolicy,
    cancel: &CancellationToken,
) -> Result<(), StepError> {
    if let Some(parent) = request.base.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let attempts = retry.attempts.max(1);
    let mut last = String::new();
    for attempt in 0..attempts {
        let out = tool.create(request, cancel);
        if out.success {
            return Ok(());
        }
        last = out.output;
        // Never leave a truncated set behind, even between attempts.
        remove_family(request.base).map_err(StepError::new)?;

        if cancel.is_cancelled() {
            return Err(StepError::new("cancelled"));
        }
        tracing::warn!(
            file = %request.relative.display(),
            attempt = attempt + 1,
            attempts,
            "parity creation attempt failed: {}",
            last_line(&last)
        );
        if attempt + 1 < attempts && !sleep_unless_cancelled(retry.delay(attempt), cancel) {
            return Err(StepError::new("cancelled"));
        }
    }
    Err(StepError::new(last))
}

/// Returns `false` when cancelled before `delay` elapsed.
fn sleep_unless_cancelled(delay: Duration, cancel: &CancellationToken) -> bool {
    let deadline = Instant::now() + delay;
    loop {
        if cancel.is_cancelled() {
            return false;
        }
        let now = Instant::now();
        if now >= deadline {
            return true;
        }
        std::thread::sleep(SLEEP_SLICE.min(deadline - now));
    }
}

fn corruption_notification(directory: &Path, entry: &CorruptedFile) -> Notification {
    let path = directory.join(&entry.path);
    if entry.repaired {
        Notification::new(
            "Warning: Corruption detected",
            SCRUB_JOB,
            Status::Warning,
            format!("Corruption detected and repaired in {}", path.display()),
        )
    } else {
        Notification::new(
            "Error: Corruption detected",
            SCRUB_JOB,
            Status::Error,
            format!("Corruption detected in {}; repair failed", path.display()),
        )
        .with_details(entry.error.clone().unwrap_or_default())
    }
}

fn last_line(output: &str) -> &str {
    output
        .lines()
        .rev()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("")
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ─── Tests ───────────────────────────────────────────────────────────────────
