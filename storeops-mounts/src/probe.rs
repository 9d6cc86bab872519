//! Mount-point probing.

use std::collections::HashSet;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};

use crate::error::{io_err, MountError};

pub const MOUNTINFO: &str = "/proc/self/mountinfo";

/// Answers "is this directory a mount point?".
pub trait MountProbe {
    fn is_mount_point(&self, path: &Path) -> Result<bool, MountError>;
}

/// Probe backed by the kernel mount table, falling back to a device-id
/// comparison with the parent when the table is unavailable.
#[derive(Debug, Clone, Default)]
pub struct SystemProbe {
    mount_points: Option<HashSet<PathBuf>>,
}

impl SystemProbe {
    /// Snapshot `/proc/self/mountinfo`. A missing table is not an error.
    pub fn load() -> Self {
        match fs::read_to_string(MOUNTINFO) {
            Ok(text) => Self {
                mount_points: Some(parse_mountinfo(&text)),
            },
            Err(err) => {
                tracing::debug!(error = %err, "mount table unavailable, using device ids");
                Self { mount_points: None }
            }
        }
    }
}

impl MountProbe for SystemProbe {
    fn is_mount_point(&self, path: &Path) -> Result<bool, MountError> {
        if let Some(points) = &self.mount_points {
            return Ok(points.contains(path));
        }
        let meta = fs::metadata(path).map_err(|e| io_err(path, e))?;
        let Some(parent) = path.parent() else {
            return Ok(true);
        };
        let parent_meta = fs::metadata(parent).map_err(|e| io_err(parent, e))?;
        Ok(meta.dev() != parent_meta.dev() || meta.ino() == parent_meta.ino())
    }
}

/// Mount points listed in a mountinfo table (field 5, octal escapes decoded).
pub fn parse_mountinfo(text: &str) -> HashSet<PathBuf> {
    text.lines()
        .filter_map(|line| line.split_whitespace().nth(4))
        .map(|field| PathBuf::from(unescape_octal(field)))
        .collect()
}

/// The kernel escapes space, tab, newline and backslash as `\ooo`.
fn unescape_octal(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = std::str::from_utf8(&bytes[i + 1..i + 4]).ok();
            if let Some(value) = digits.and_then(|d| u8::from_str_radix(d, 8).ok()) {
                out.push(value);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}
