//! Mount validator tests against a fake probe.
//!
//! Each test builds its own `TempDir` layout: `<tmp>/mnt` plays the mount
//! root and the fake probe declares which directories are mount points.

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use rstest::rstest;
use storeops_mounts::{MountCheck, MountError, MountProbe, MountValidator};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helper
// ---------------------------------------------------------------------------

struct FakeProbe(HashSet<PathBuf>);

impl MountProbe for FakeProbe {
    fn is_mount_point(&self, path: &Path) -> Result<bool, MountError> {
        Ok(self.0.contains(path))
    }
}

struct Layout {
    _tmp: TempDir,
    root: PathBuf,
}

impl Layout {
    fn new() -> Self {
        let tmp = TempDir::new().expect("tempdir");
        let root = fs::canonicalize(tmp.path()).expect("canonical tempdir");
        fs::create_dir_all(root.join("mnt/disk1/photos")).expect("disk1");
        fs::create_dir_all(root.join("mnt/disk2")).expect("disk2");
        fs::create_dir_all(root.join("srv/nfs/share")).expect("nfs");
        fs::create_dir_all(root.join("home/user")).expect("home");
        Self { _tmp: tmp, root }
    }

    fn path(&self, rel: &str) -> PathBuf {
        self.root.join(rel)
    }

    fn validator(&self, mounts: &[&str]) -> MountValidator<FakeProbe> {
        let probe = FakeProbe(mounts.iter().map(|m| self.path(m)).collect());
        MountValidator::new(probe, self.path("mnt"), vec![self.path("srv/nfs/share")])
    }
}

// ---------------------------------------------------------------------------
// Cases
// ---------------------------------------------------------------------------

#[rstest]
#[case::mounted_existing("mnt/disk1/photos", true)]
#[case::mounted_new_destination("mnt/disk1/photos/2024/new", true)]
#[case::unmounted_drive("mnt/disk2/backup", false)]
#[case::dangling_under_root("mnt/ghost/backup", false)]
#[case::unconstrained_path("home/user/documents", true)]
#[case::network_mount_missing("srv/nfs/share/data", false)]
fn validates_paths(#[case] rel: &str, #[case] expected: bool) {
    let layout = Layout::new();
    let validator = layout.validator(&["mnt/disk1"]);
    let check = validator.check_one(&layout.path(rel));
    assert_eq!(check.is_valid(), expected, "{rel}: {check:?}");
}

#[test]
fn network_target_itself_may_be_the_mount() {
    let layout = Layout::new();
    let validator = layout.validator(&["srv/nfs/share"]);
    assert!(validator.check_one(&layout.path("srv/nfs/share/data")).is_valid());
}

#[test]
fn invalid_result_carries_reason_and_path() {
    let layout = Layout::new();
    let validator = layout.validator(&["mnt/disk1"]);
    let source = layout.path("mnt/disk1/photos");
    let destination = layout.path("mnt/disk2/photos");

    let check = validator.check([source.as_path(), destination.as_path()]);
    match check {
        MountCheck::Invalid { path, reason } => {
            assert_eq!(path, destination);
            assert!(reason.contains("not on a mounted filesystem"), "{reason}");
        }
        MountCheck::Valid => panic!("unmounted destination must be rejected"),
    }
}

#[test]
fn only_paths_under_guards_require_mounts() {
    let layout = Layout::new();
    let validator = layout.validator(&[]);
    assert!(validator.requires_mount(&layout.path("mnt/disk1")));
    assert!(validator.requires_mount(&layout.path("srv/nfs/share/x")));
    assert!(!validator.requires_mount(&layout.path("mnt")));
    assert!(!validator.requires_mount(&layout.path("srv/nfs")));
}
