//! Well-known runtime locations.
//!
//! Every path the system touches outside the scrubbed trees hangs off one
//! [`RuntimePaths`] value, so tests (and non-root installs) re-root the whole
//! layout with `STORAGE_OPS_ROOT` instead of patching individual constants.

use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};

pub const ROOT_ENV: &str = "STORAGE_OPS_ROOT";

pub const CONFIG_FILE: &str = "/etc/storage-ops/config.json";
pub const STATE_FILE: &str = "/var/lib/storage-ops/last_run.json";
pub const LOCK_DIR: &str = "/run/lock/storage-ops";
pub const LOG_DIR: &str = "/var/log/storage-ops";

pub const GLOBAL_LOCK_NAME: &str = "storage-ops.lock";
pub const ORCHESTRATOR_LOG_NAME: &str = "storage-ops.log";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    pub config_file: PathBuf,
    pub state_file: PathBuf,
    pub lock_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl RuntimePaths {
    /// The production layout.
    pub fn system() -> Self {
        Self {
            config_file: PathBuf::from(CONFIG_FILE),
            state_file: PathBuf::from(STATE_FILE),
            lock_dir: PathBuf::from(LOCK_DIR),
            log_dir: PathBuf::from(LOG_DIR),
        }
    }

    /// The production layout re-rooted under `root`.
    pub fn under(root: &Path) -> Self {
        let rebase = |p: &str| root.join(p.trim_start_matches('/'));
        Self {
            config_file: rebase(CONFIG_FILE),
            state_file: rebase(STATE_FILE),
            lock_dir: rebase(LOCK_DIR),
            log_dir: rebase(LOG_DIR),
        }
    }

    /// `under($STORAGE_OPS_ROOT)` when set and non-empty, else [`Self::system`].
    pub fn from_env() -> Self {
        match std::env::var_os(ROOT_ENV) {
            Some(root) if !root.is_empty() => Self::under(Path::new(&root)),
            _ => Self::system(),
        }
    }

    pub fn global_lock(&self) -> PathBuf {
        self.lock_dir.join(GLOBAL_LOCK_NAME)
    }

    /// Lock file for one `(directory, database)` pair. The name carries a
    /// digest of the pair rather than the paths themselves.
    pub fn scrub_lock(&self, directory: &Path, database: &Path) -> PathBuf {
        self.lock_dir
            .join(format!("scrub-{}.lock", pair_digest(directory, database)))
    }

    pub fn orchestrator_log(&self) -> PathBuf {
        self.log_dir.join(ORCHESTRATOR_LOG_NAME)
    }
}

fn pair_digest(directory: &Path, database: &Path) -> String {
    let mut hasher = Sha256::new();
    hasher.update(directory.to_string_lossy().as_bytes());
    hasher.update(b":");
    hasher.update(database.to_string_lossy().as_bytes());
    let digest = hex::encode(hasher.finalize());
    digest[..16].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn under_rebases_every_location() {
        let paths = RuntimePaths::under(Path::new("/tmp/t"));
        assert_eq!(paths.config_file, PathBuf::from("/tmp/t/etc/storage-ops/config.json"));
        assert_eq!(paths.state_file, PathBuf::from("/tmp/t/var/lib/storage-ops/last_run.json"));
        assert_eq!(paths.global_lock(), PathBuf::from("/tmp/t/run/lock/storage-ops/storage-ops.lock"));
    }

    #[test]
    fn scrub_lock_is_stable_and_distinct_per_pair() {
        let paths = RuntimePaths::system();
        let a = paths.scrub_lock(Path::new("/mnt/a"), Path::new("/mnt/a/.db"));
        let again = paths.scrub_lock(Path::new("/mnt/a"), Path::new("/mnt/a/.db"));
        let b = paths.scrub_lock(Path::new("/mnt/b"), Path::new("/mnt/a/.db"));
        assert_eq!(a, again);
        assert_ne!(a, b);
        let name = a.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("scrub-") && name.ends_with(".lock"));
        assert_eq!(name.len(), "scrub-".len() + 16 + ".lock".len());
        assert!(!name.contains("mnt"));
    }
}
