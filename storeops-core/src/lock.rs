//! Advisory process locks.
//!
//! A lock is a plain file under the runtime lock directory holding
//! `"<operation>:<pid>:<timestamp>"`, exclusively locked with `flock` through
//! `fs2`. Acquisition never blocks: contention is `Ok(None)`.
//!
//! Dropping the guard removes the file and then releases the lock. Removing
//! first means a waiter that opened the old inode finds it unlinked when it
//! re-checks identity and retries against the fresh path.

use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Seek, SeekFrom, Write};
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use fs2::FileExt;

use crate::error::{lock_io, LockError};

/// Held advisory lock. Released on drop.
#[derive(Debug)]
pub struct ProcessLock {
    file: File,
    path: PathBuf,
}

impl ProcessLock {
    /// Try to take the lock at `path` for `operation`.
    ///
    /// Returns `Ok(None)` when another process holds it.
    pub fn try_acquire(path: &Path, operation: &str) -> Result<Option<Self>, LockError> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| lock_io(dir, e))?;
        }

        // The holder may unlink the file between our open and our flock; one
        // retry against the recreated path covers that window.
        for _ in 0..2 {
            let file = OpenOptions::new()
                .read(true)
                .write(true)
                .create(true)
                .truncate(false)
                .open(path)
                .map_err(|e| lock_io(path, e))?;

            match FileExt::try_lock_exclusive(&file) {
                Ok(()) => {}
                Err(err) if is_contention(&err) => return Ok(None),
                Err(err) => return Err(lock_io(path, err)),
            }

            if !same_file(&file, path)? {
                let _ = FileExt::unlock(&file);
                continue;
            }

            let mut lock = Self {
                file,
                path: path.to_path_buf(),
            };
            lock.write_owner(operation)?;
            return Ok(Some(lock));
        }
        Ok(None)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_owner(&mut self, operation: &str) -> Result<(), LockError> {
        let stamp = chrono::Utc::now().timestamp();
        let line = format!("{operation}:{}:{stamp}", std::process::id());
        let path = self.path.clone();
        self.file.set_len(0).map_err(|e| lock_io(&path, e))?;
        self.file
            .seek(SeekFrom::Start(0))
            .map_err(|e| lock_io(&path, e))?;
        self.file
            .write_all(line.as_bytes())
            .map_err(|e| lock_io(&path, e))?;
        self.file.flush().map_err(|e| lock_io(&path, e))
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                tracing::warn!(path = %self.path.display(), error = %err, "failed to remove lock file");
            }
        }
        let _ = FileExt::unlock(&self.file);
    }
}

fn is_contention(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::WouldBlock
        || err.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

fn same_file(file: &File, path: &Path) -> Result<bool, LockError> {
    let held = file.metadata().map_err(|e| lock_io(path, e))?;
    match fs::metadata(path) {
        Ok(on_disk) => Ok(held.dev() == on_disk.dev() && held.ino() == on_disk.ino()),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
        Err(err) => Err(lock_io(path, err)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    #[test]
    fn second_acquire_is_contention_not_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("locks").join("storage-ops.lock");
        let first = ProcessLock::try_acquire(&path, "orchestrator").unwrap();
        assert!(first.is_some());
        let second = ProcessLock::try_acquire(&path, "orchestrator").unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn lock_file_records_owner_and_is_removed_on_drop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scrub.lock");
        {
            let _lock = ProcessLock::try_acquire(&path, "scrub").unwrap().unwrap();
            let contents = fs::read_to_string(&path).unwrap();
            let parts: Vec<&str> = contents.split(':').collect();
            assert_eq!(parts[0], "scrub");
            assert_eq!(parts[1], std::process::id().to_string());
            assert!(parts[2].parse::<i64>().is_ok());
        }
        assert!(!path.exists());
        assert!(ProcessLock::try_acquire(&path, "scrub").unwrap().is_some());
    }

    #[derive(Clone, Default)]
    struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_unlink_on_drop_is_logged() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("scrub.lock");
        let lock = ProcessLock::try_acquire(&path, "scrub").unwrap().unwrap();
        fs::remove_file(&path).unwrap();
        fs::create_dir(&path).unwrap();

        let captured = Captured::default();
        let writer = captured.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(move || writer.clone())
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, || drop(lock));

        let logged = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
        assert!(logged.contains("WARN"), "{logged}");
        assert!(logged.contains("failed to remove lock file"), "{logged}");
        assert!(path.is_dir());
    }
}
