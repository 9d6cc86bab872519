//! Deferred progress notifications for long scrubs.
//!
//! Timers fire at cumulative offsets from the start of the scrub (1h, 3h, 7h,
//! 15h, 27h, 51h, 75h) and read the live [`ScrubProgress`] counters at fire
//! time. They stop when the scrub finishes or the cancellation token fires;
//! nothing is sent after either.
//!
//! Timers only produce [`Notification`]s into a channel. Delivery happens in
//! [`spawn_delivery`], which moves each blocking send onto the blocking pool.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::notification::{Notification, Notifier, Status};

const HOUR: u64 = 3_600;

/// Offsets from scrub start: 1h, then +2h, +4h, +8h, +12h, +24h, +24h.
pub const PROGRESS_OFFSETS: [Duration; 7] = [
    Duration::from_secs(HOUR),
    Duration::from_secs(3 * HOUR),
    Duration::from_secs(7 * HOUR),
    Duration::from_secs(15 * HOUR),
    Duration::from_secs(27 * HOUR),
    Duration::from_secs(51 * HOUR),
    Duration::from_secs(75 * HOUR),
];

/// Live counters shared between a running scrub and its progress timers.
#[derive(Debug, Default)]
pub struct ScrubProgress {
    processed: AtomicU64,
    updated: AtomicU64,
    verified: AtomicU64,
    repaired: AtomicU64,
    finished: AtomicBool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ProgressSnapshot {
    pub processed: u64,
    pub updated: u64,
    pub verified: u64,
    pub repaired: u64,
}

impl ScrubProgress {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_updated(&self) {
        self.updated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_verified(&self) {
        self.verified.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_repaired(&self) {
        self.repaired.fetch_add(1, Ordering::Relaxed);
    }

    pub fn finish(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    pub fn snapshot(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            processed: self.processed.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            verified: self.verified.load(Ordering::Relaxed),
            repaired: self.repaired.load(Ordering::Relaxed),
        }
    }
}

/// Start the progress timers for a scrub of `directory` beginning now.
pub fn spawn_progress_timers(
    directory: PathBuf,
    progress: Arc<ScrubProgress>,
    cancel: CancellationToken,
    outbox: mpsc::UnboundedSender<Notification>,
) -> JoinHandle<()> {
    spawn_progress_timers_with(&PROGRESS_OFFSETS, directory, progress, cancel, outbox)
}

/// `spawn_progress_timers` with explicit offsets.
pub fn spawn_progress_timers_with(
    offsets: &[Duration],
    directory: PathBuf,
    progress: Arc<ScrubProgress>,
    cancel: CancellationToken,
    outbox: mpsc::UnboundedSender<Notification>,
) -> JoinHandle<()> {
    let offsets = offsets.to_vec();
    tokio::spawn(async move {
        let started = Instant::now();
        for offset in offsets {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep_until(started + offset) => {}
            }
            if cancel.is_cancelled() || progress.is_finished() {
                return;
            }
            let note = progress_notification(&directory, offset, progress.snapshot());
            if outbox.send(note).is_err() {
                return;
            }
        }
    })
}

/// Drain `inbox` into `notifier` until every sender is gone.
pub fn spawn_delivery(
    notifier: Arc<dyn Notifier>,
    mut inbox: mpsc::UnboundedReceiver<Notification>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(note) = inbox.recv().await {
            let notifier = notifier.clone();
            let subject = note.subject.clone();
            if let Err(err) = tokio::task::spawn_blocking(move || notifier.send(&note)).await {
                tracing::warn!(subject = %subject, error = %err, "notification task failed");
            }
        }
    })
}

fn progress_notification(
    directory: &std::path::Path,
    elapsed: Duration,
    snapshot: ProgressSnapshot,
) -> Notification {
    let hours = elapsed.as_secs() / HOUR;
    Notification::new(
        "Scrub in progress",
        "scrub",
        Status::Info,
        format!(
            "Scrub of {} running for {hours}h: {} files processed, {} updated, {} verified, {} repaired",
            directory.display(),
            snapshot.processed,
            snapshot.updated,
            snapshot.verified,
            snapshot.repaired
        ),
    )
}
