//! Advisory-strict mount validation.

use std::path::{Path, PathBuf};

use storeops_core::Config;

use crate::probe::MountProbe;

/// Outcome of validating an operation's paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MountCheck {
    Valid,
    Invalid { path: PathBuf, reason: String },
}

impl MountCheck {
    pub fn is_valid(&self) -> bool {
        matches!(self, MountCheck::Valid)
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            MountCheck::Valid => None,
            MountCheck::Invalid { reason, .. } => Some(reason),
        }
    }
}

/// Checks that paths which must live on a mounted filesystem actually do.
#[derive(Debug, Clone)]
pub struct MountValidator<P> {
    probe: P,
    mount_root: PathBuf,
    network_mounts: Vec<PathBuf>,
}

impl<P: MountProbe> MountValidator<P> {
    pub fn new(probe: P, mount_root: impl Into<PathBuf>, network_mounts: Vec<PathBuf>) -> Self {
        Self {
            probe,
            mount_root: mount_root.into(),
            network_mounts,
        }
    }

    pub fn from_config(probe: P, config: &Config) -> Self {
        Self::new(probe, config.mount_root.clone(), config.network_mounts.clone())
    }

    /// Validate every path; the first failure decides.
    pub fn check<'a>(&self, paths: impl IntoIterator<Item = &'a Path>) -> MountCheck {
        for path in paths {
            let result = self.check_one(path);
            if !result.is_valid() {
                return result;
            }
        }
        MountCheck::Valid
    }

    /// Validate one path.
    ///
    /// A path that does not exist yet is judged by its nearest existing
    /// ancestor, so a destination can be created on demand as long as its
    /// parent lives on a real mount.
    pub fn check_one(&self, path: &Path) -> MountCheck {
        let Some(boundary) = self.boundary_for(path) else {
            return MountCheck::Valid;
        };

        let Some(existing) = nearest_existing_ancestor(path) else {
            return invalid(path, format!("no existing ancestor of {}", path.display()));
        };
        let existing = std::fs::canonicalize(&existing).unwrap_or(existing);
        let boundary = std::fs::canonicalize(&boundary).unwrap_or(boundary);

        let mut cursor = Some(existing.as_path());
        while let Some(dir) = cursor {
            if dir == boundary || dir == Path::new("/") || !dir.starts_with(&boundary) {
                break;
            }
            match self.probe.is_mount_point(dir) {
                Ok(true) => {
                    tracing::debug!(path = %path.display(), mount = %dir.display(), "path is on a mount");
                    return MountCheck::Valid;
                }
                Ok(false) => cursor = dir.parent(),
                Err(err) => {
                    return invalid(path, format!("cannot probe {}: {err}", dir.display()));
                }
            }
        }
        invalid(
            path,
            format!(
                "{} is not on a mounted filesystem (nearest existing ancestor: {})",
                path.display(),
                existing.display()
            ),
        )
    }

    /// Whether `path` must sit on a mount at all.
    pub fn requires_mount(&self, path: &Path) -> bool {
        self.boundary_for(path).is_some()
    }

    /// The directory a mount must be found strictly below (mount root) or at
    /// or below (network target). `None` when the path is unconstrained.
    fn boundary_for(&self, path: &Path) -> Option<PathBuf> {
        if let Some(target) = self.network_mounts.iter().find(|m| path.starts_with(m)) {
            return Some(
                target
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| target.clone()),
            );
        }
        if path.starts_with(&self.mount_root) && path != self.mount_root {
            return Some(self.mount_root.clone());
        }
        None
    }
}

/// Walk up from `path` to the first ancestor (inclusive) that exists.
pub fn nearest_existing_ancestor(path: &Path) -> Option<PathBuf> {
    path.ancestors()
        .find(|candidate| !candidate.as_os_str().is_empty() && candidate.exists())
        .map(Path::to_path_buf)
}

fn invalid(path: &Path, reason: String) -> MountCheck {
    MountCheck::Invalid {
        path: path.to_path_buf(),
        reason,
    }
}
