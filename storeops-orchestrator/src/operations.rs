//! Async wrappers around the blocking engines.
//!
//! The parity engine and the notification transports block, so they run on
//! the blocking pool. A scrub is paired with its progress timers and a
//! delivery task for the notifications those timers produce; both are torn
//! down before the scrub's result is returned.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use storeops_notify::progress::{spawn_delivery, spawn_progress_timers_with};
use storeops_notify::{Notification, Notifier, ScrubProgress};
use storeops_scrub::{run_scrub, ParityTool, ScrubOptions, ScrubRun};
use storeops_sync::{run_sync, MirrorCommand, SyncOutcome};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;

use crate::error::OrchestratorError;

/// Run one scrub on the blocking pool with progress notifications at
/// `offsets` from its start.
pub async fn scrub_with_progress(
    options: ScrubOptions,
    tool: Arc<dyn ParityTool>,
    notifier: Arc<dyn Notifier>,
    offsets: &[Duration],
    cancel: &CancellationToken,
) -> Result<ScrubRun, OrchestratorError> {
    let progress = ScrubProgress::new();
    let timers_cancel = cancel.child_token();
    let (outbox, inbox) = mpsc::unbounded_channel::<Notification>();

    let timers = spawn_progress_timers_with(
        offsets,
        options.directory.clone(),
        progress.clone(),
        timers_cancel.clone(),
        outbox,
    );
    let delivery = spawn_delivery(notifier.clone(), inbox);

    let scrub = {
        let cancel = cancel.clone();
        let progress = progress.clone();
        tokio::task::spawn_blocking(move || {
            run_scrub(&options, tool.as_ref(), notifier.as_ref(), &progress, &cancel)
        })
    };
    let result = scrub.await;

    // The timer task owns the only sender; once it stops, delivery drains
    // whatever is queued and exits.
    timers_cancel.cancel();
    handle_join("progress_timers", timers.await)?;
    handle_join("notification_delivery", delivery.await)?;

    Ok(handle_join("scrub", result)??)
}

/// Mirror `source` onto `destination` and send the per-sync notification.
pub async fn sync_with_notification(
    source: &Path,
    destination: &Path,
    mirror: &MirrorCommand,
    notifier: Arc<dyn Notifier>,
    cancel: &CancellationToken,
) -> Result<SyncOutcome, OrchestratorError> {
    let outcome = run_sync(source, destination, mirror, cancel).await?;
    deliver(notifier, outcome.notification()).await;
    Ok(outcome)
}

/// Send one notification on the blocking pool. Delivery failures are logged
/// by the transports and never surface here.
pub async fn deliver(notifier: Arc<dyn Notifier>, notification: Notification) {
    let subject = notification.subject.clone();
    if let Err(err) = tokio::task::spawn_blocking(move || notifier.send(&notification)).await {
        tracing::warn!(subject = %subject, error = %err, "notification task failed");
    }
}

pub(crate) fn handle_join<T>(
    task: &'static str,
    result: Result<T, JoinError>,
) -> Result<T, OrchestratorError> {
    result.map_err(|err| OrchestratorError::Join {
        task,
        reason: err.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    use storeops_core::Redundancy;
    use storeops_notify::MemoryNotifier;
    use storeops_scrub::{CreateRequest, ToolOutput};
    use tempfile::TempDir;

    /// Writes an empty base for every file; every verify passes.
    struct BlankTool;

    impl ParityTool for BlankTool {
        fn create(&self, request: &CreateRequest<'_>, _cancel: &CancellationToken) -> ToolOutput {
            match std::fs::write(request.base, b"") {
                Ok(()) => ToolOutput::ok("Done"),
                Err(e) => ToolOutput::failed(e.to_string()),
            }
        }

        fn verify(&self, _dir: &Path, _base: &Path, _cancel: &CancellationToken) -> ToolOutput {
            ToolOutput::ok("All files are correct")
        }

        fn repair(&self, _dir: &Path, _base: &Path, _cancel: &CancellationToken) -> ToolOutput {
            ToolOutput::ok("Repair complete.")
        }
    }

    fn options(root: &Path) -> ScrubOptions {
        let data = root.join("data");
        std::fs::create_dir_all(&data).unwrap();
        std::fs::write(data.join("a.txt"), "alpha").unwrap();
        ScrubOptions::new(
            data,
            ".pardatabase",
            Redundancy::new(5).unwrap(),
            root.join("locks/scrub.lock"),
        )
    }

    #[tokio::test]
    async fn scrub_completes_and_tears_down_timers() {
        let tmp = TempDir::new().unwrap();
        let notifier = MemoryNotifier::new();

        let run = scrub_with_progress(
            options(tmp.path()),
            Arc::new(BlankTool),
            Arc::new(notifier.clone()),
            &[Duration::from_secs(3_600)],
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        let report = run.report().expect("completed");
        assert_eq!(report.files_processed, 1);
        assert_eq!(notifier.subjects(), vec!["Success: Scrub completed"]);
        assert!(tmp.path().join("data/.pardatabase/a.txt.par2").is_file());
    }

    #[tokio::test]
    async fn sync_failure_is_reported_not_raised() {
        let tmp = TempDir::new().unwrap();
        let notifier = MemoryNotifier::new();
        let mirror = MirrorCommand::new("sh", ["-c", "echo 'no space left' >&2; exit 11"]);

        let outcome = sync_with_notification(
            tmp.path(),
            &tmp.path().join("copy"),
            &mirror,
            Arc::new(notifier.clone()),
            &CancellationToken::new(),
        )
        .await
        .unwrap();

        assert!(!outcome.success());
        assert_eq!(notifier.subjects(), vec!["Error: Sync failed"]);
        assert_eq!(outcome.destination, tmp.path().join("copy"));
        assert!(outcome.stderr.contains("no space left"));
    }
}
