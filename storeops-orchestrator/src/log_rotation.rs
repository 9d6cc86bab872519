//! Size-based rotation for storage-ops log files.
//!
//! A log is rotated before it is opened for a run once it reaches 10 MiB.
//! At most 5 rotated copies are kept:
//!   storage-ops.log → storage-ops.log.1 → … → storage-ops.log.5

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Maximum log file size before rotation (10 MiB).
pub const MAX_LOG_BYTES: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated backup files to keep.
pub const MAX_ROTATED_FILES: usize = 5;

/// Rotate `log_path` if its size has reached `max_bytes`.
///
/// The oldest copy is deleted, `<name>.<n>` shifts to `<name>.<n+1>`, the
/// live file becomes `<name>.1` and a fresh empty `<name>` is created.
/// Returns `false` when the file is under the threshold or missing.
pub fn rotate_if_needed(log_path: &Path, max_bytes: u64, max_files: usize) -> io::Result<bool> {
    let size = match fs::metadata(log_path) {
        Ok(meta) => meta.len(),
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(err) => return Err(err),
    };
    if size < max_bytes {
        return Ok(false);
    }

    let oldest = numbered_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }
    for n in (1..max_files).rev() {
        let src = numbered_path(log_path, n);
        if src.exists() {
            fs::rename(&src, numbered_path(log_path, n + 1))?;
        }
    }
    fs::rename(log_path, numbered_path(log_path, 1))?;

    fs::OpenOptions::new()
        .create(true)
        .truncate(true)
        .write(true)
        .open(log_path)?;
    Ok(true)
}

/// Rotate if needed, then open `log_path` for appending.
pub fn open_for_append(log_path: &Path) -> io::Result<(fs::File, bool)> {
    if let Some(dir) = log_path.parent() {
        fs::create_dir_all(dir)?;
    }
    let rotated = rotate_if_needed(log_path, MAX_LOG_BYTES, MAX_ROTATED_FILES)?;
    let file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    Ok((file, rotated))
}

/// `<base>.<n>`, e.g. `storage-ops.log.2`.
pub fn numbered_path(base: &Path, n: usize) -> PathBuf {
    let name = base
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("storage-ops.log");
    base.with_file_name(format!("{name}.{n}"))
}

// ─── Tests ────────────────────────────────────────────────────────────────────
