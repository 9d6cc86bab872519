//! Mirror engine tests driven by `sh -c` scripts standing in for rsync.
//!
//! The engine appends `<source>/` and `<destination>/`, which `sh -c` exposes
//! to the script as `$0` and `$1`.

use std::time::Duration;

use storeops_notify::Status;
use storeops_sync::{run_sync, MirrorCommand, SyncError};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn script(body: &str) -> MirrorCommand {
    MirrorCommand::new("sh", ["-c", body])
}

const FAKE_RSYNC: &str = r#"
cp -R "$0". "$1"
printf 'sending incremental file list\n'
printf '  1,024  50%%  1.00MB/s  0:00:01 (xfr#1, to-chk=1/2)\r'
printf '  2,048 100%%  1.00MB/s  0:00:00 (xfr#2, to-chk=0/2)\n'
printf 'Number of files: 3 (reg: 2, dir: 1)\n'
printf 'Number of regular files transferred: 2\n'
printf 'Total file size: 2,097,152 bytes\n'
printf 'Total transferred file size: 2,048 bytes\n'
"#;

#[tokio::test]
async fn successful_run_copies_and_parses_stats() {
    init_logging();
    let src = TempDir::new().expect("src");
    let dst_root = TempDir::new().expect("dst");
    std::fs::write(src.path().join("a.txt"), b"alpha").expect("seed a");
    std::fs::write(src.path().join("b.txt"), b"beta").expect("seed b");
    let destination = dst_root.path().join("nested").join("mirror");

    let outcome = run_sync(
        src.path(),
        &destination,
        &script(FAKE_RSYNC),
        &CancellationToken::new(),
    )
    .await
    .expect("sync runs");

    assert!(outcome.success(), "stderr: {}", outcome.stderr);
    assert_eq!(outcome.stats.files_transferred, 2);
    assert_eq!(outcome.stats.total_file_size, 2_097_152);
    assert_eq!(std::fs::read(destination.join("a.txt")).expect("copied"), b"alpha");
    assert!(outcome.summary().starts_with("Synced 2 files (2 MB)"));

    let note = outcome.notification();
    assert_eq!(note.status, Status::Good);
    assert_eq!(note.subject, "Success: Sync completed");
}

#[tokio::test]
async fn nonzero_exit_is_an_outcome_with_stderr() {
    init_logging();
    let src = TempDir::new().expect("src");
    let dst = TempDir::new().expect("dst");

    let outcome = run_sync(
        src.path(),
        dst.path(),
        &script("echo 'rsync: change_dir failed: No such file' >&2; exit 23"),
        &CancellationToken::new(),
    )
    .await
    .expect("tool ran");

    assert!(!outcome.success());
    assert_eq!(outcome.exit_code, Some(23));
    assert!(outcome.stderr.contains("change_dir failed"));
    assert!(outcome.summary().contains("exited with 23"));

    let note = outcome.notification();
    assert_eq!(note.status, Status::Error);
    assert!(note.details.expect("details").contains("change_dir failed"));
}

#[tokio::test]
async fn missing_program_is_a_spawn_error() {
    let src = TempDir::new().expect("src");
    let dst = TempDir::new().expect("dst");
    let err = run_sync(
        src.path(),
        dst.path(),
        &MirrorCommand::new("/nonexistent/rsync", Vec::<String>::new()),
        &CancellationToken::new(),
    )
    .await
    .unwrap_err();
    assert!(matches!(err, SyncError::Spawn { .. }), "got: {err}");
}

#[tokio::test]
async fn cancellation_kills_the_tool() {
    let src = TempDir::new().expect("src");
    let dst = TempDir::new().expect("dst");
    let cancel = CancellationToken::new();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        trigger.cancel();
    });

    let started = std::time::Instant::now();
    let err = run_sync(src.path(), dst.path(), &script("exec sleep 30"), &cancel)
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Cancelled));
    assert!(started.elapsed() < Duration::from_secs(10));
}
