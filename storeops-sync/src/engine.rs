//! Mirror-tool driver.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::{Duration, Instant};

use storeops_notify::{Notification, Status};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

use crate::command::MirrorCommand;
use crate::error::{io_err, SyncError};
use crate::progress::{parse_progress, ProgressThrottle, RecordSplitter, PROGRESS_LOG_INTERVAL};
use crate::stats::{parse_stats, TransferStats};

/// Output lines kept per stream. The stats block sits at the end of stdout,
/// so a tail is enough even when `-v` lists millions of files.
const STDOUT_TAIL_LINES: usize = 64;
const STDERR_TAIL_LINES: usize = 64;

/// Result of one mirror run that reached an exit status.
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub source: PathBuf,
    pub destination: PathBuf,
    pub exit_code: Option<i32>,
    pub stats: TransferStats,
    pub stderr: String,
    pub duration: Duration,
}

impl SyncOutcome {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }

    /// One-line summary for logs and the run summary.
    pub fn summary(&self) -> String {
        if self.success() {
            let mut msg = format!("Synced {} files", self.stats.files_transferred);
            if self.stats.total_file_size > 0 {
                msg.push_str(&format!(" ({} MB)", self.stats.total_file_size_mb()));
            }
            msg.push_str(&format!(" in {:.1}s", self.duration.as_secs_f64()));
            msg
        } else {
            let code = self
                .exit_code
                .map(|c| c.to_string())
                .unwrap_or_else(|| "signal".to_string());
            match self.stderr.lines().last() {
                Some(line) => format!("mirror tool exited with {code}: {line}"),
                None => format!("mirror tool exited with {code}"),
            }
        }
    }

    pub fn notification(&self) -> Notification {
        if self.success() {
            Notification::new("Success: Sync completed", "sync", Status::Good, self.summary())
                .with_details(format!(
                    "Sync Summary:\nSource: {}\nDestination: {}\nFiles transferred: {}\nTotal size: {} MB\nDuration: {:.1}s\n",
                    self.source.display(),
                    self.destination.display(),
                    self.stats.files_transferred,
                    self.stats.total_file_size_mb(),
                    self.duration.as_secs_f64()
                ))
        } else {
            Notification::new(
                "Error: Sync failed",
                "sync",
                Status::Error,
                format!(
                    "Sync failed: {} -> {}",
                    self.source.display(),
                    self.destination.display()
                ),
            )
            .with_details(format!("Error:\n{}", self.stderr))
        }
    }
}

/// Mirror `source` onto `destination`, creating the destination if absent.
///
/// A non-zero exit is reported through [`SyncOutcome::success`]. Cancelling
/// `cancel` kills the tool and returns [`SyncError::Cancelled`].
pub async fn run_sync(
    source: &Path,
    destination: &Path,
    command: &MirrorCommand,
    cancel: &CancellationToken,
) -> Result<SyncOutcome, SyncError> {
    tokio::fs::create_dir_all(destination)
        .await
        .map_err(|e| io_err(destination, e))?;

    tracing::info!("starting sync: {} -> {}", source.display(), destination.display());
    let started = Instant::now();

    let mut child = Command::new(&command.program)
        .args(command.argv(source, destination))
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| SyncError::Spawn {
            program: command.program.clone(),
            source: e,
        })?;

    let streams = pump_output(&mut child, cancel).await;
    let (stdout_tail, stderr_tail) = match streams {
        Some(tails) => tails,
        None => return Err(cancelled(&mut child, source).await),
    };

    let status = tokio::select! {
        _ = cancel.cancelled() => return Err(cancelled(&mut child, source).await),
        status = child.wait() => status.map_err(|e| io_err(&command.program, e))?,
    };

    let outcome = SyncOutcome {
        source: source.to_path_buf(),
        destination: destination.to_path_buf(),
        exit_code: status.code(),
        stats: parse_stats(&join_tail(&stdout_tail)),
        stderr: join_tail(&stderr_tail),
        duration: started.elapsed(),
    };
    if outcome.success() {
        tracing::info!("✓ sync completed: {}", outcome.summary());
    } else {
        tracing::error!("✗ sync failed: {}", outcome.summary());
    }
    Ok(outcome)
}

/// Read stdout and stderr together until both close. Returns the retained
/// tails, or `None` if cancelled first.
async fn pump_output(
    child: &mut Child,
    cancel: &CancellationToken,
) -> Option<(VecDeque<String>, VecDeque<String>)> {
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut out_split = RecordSplitter::default();
    let mut err_split = RecordSplitter::default();
    let mut out_tail = VecDeque::new();
    let mut err_tail = VecDeque::new();
    let mut throttle = ProgressThrottle::new(PROGRESS_LOG_INTERVAL);
    let mut out_buf = [0u8; 8192];
    let mut err_buf = [0u8; 4096];

    while stdout.is_some() || stderr.is_some() {
        tokio::select! {
            _ = cancel.cancelled() => return None,
            read = read_some(&mut stdout, &mut out_buf), if stdout.is_some() => match read {
                Some(n) => {
                    for record in out_split.push(&out_buf[..n]) {
                        on_stdout_record(record, &mut throttle, &mut out_tail);
                    }
                }
                None => {
                    stdout = None;
                    if let Some(record) = out_split.finish() {
                        on_stdout_record(record, &mut throttle, &mut out_tail);
                    }
                }
            },
            read = read_some(&mut stderr, &mut err_buf), if stderr.is_some() => match read {
                Some(n) => {
                    for record in err_split.push(&err_buf[..n]) {
                        tracing::warn!("mirror stderr: {record}");
                        push_tail(&mut err_tail, record, STDERR_TAIL_LINES);
                    }
                }
                None => {
                    stderr = None;
                    if let Some(record) = err_split.finish() {
                        push_tail(&mut err_tail, record, STDERR_TAIL_LINES);
                    }
                }
            },
        }
    }
    Some((out_tail, err_tail))
}

/// `Some(n)` for a non-empty read, `None` at EOF or on a read error.
async fn read_some<R: AsyncReadExt + Unpin>(reader: &mut Option<R>, buf: &mut [u8]) -> Option<usize> {
    let reader = reader.as_mut()?;
    match reader.read(buf).await {
        Ok(0) | Err(_) => None,
        Ok(n) => Some(n),
    }
}

fn on_stdout_record(record: String, throttle: &mut ProgressThrottle, tail: &mut VecDeque<String>) {
    if let Some(progress) = parse_progress(&record) {
        if throttle.ready() {
            let transfers = progress
                .transfers
                .map(|n| format!(", {n} files"))
                .unwrap_or_default();
            tracing::info!(
                "sync progress: {}% ({} bytes{transfers}) at {}, eta {}",
                progress.percent,
                progress.bytes,
                progress.rate,
                progress.eta
            );
        }
        return;
    }
    push_tail(tail, record, STDOUT_TAIL_LINES);
}

fn push_tail(tail: &mut VecDeque<String>, record: String, cap: usize) {
    if tail.len() == cap {
        tail.pop_front();
    }
    tail.push_back(record);
}

fn join_tail(tail: &VecDeque<String>) -> String {
    tail.iter().map(String::as_str).collect::<Vec<_>>().join("\n")
}

async fn cancelled(child: &mut Child, source: &Path) -> SyncError {
    tracing::warn!("sync of {} cancelled, stopping mirror tool", source.display());
    let _ = child.start_kill();
    let _ = child.wait().await;
    SyncError::Cancelled
}
