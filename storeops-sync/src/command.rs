//! The mirror tool invocation.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Program plus fixed arguments. The source and destination are appended as
/// `<source>/` and `<destination>/` so the tool copies directory contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MirrorCommand {
    pub program: PathBuf,
    pub args: Vec<OsString>,
}

impl MirrorCommand {
    pub fn new<I, S>(program: impl Into<PathBuf>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// rsync in one-way, delete-extraneous mode, skipping VCS metadata, with
    /// whole-transfer progress and a final stats block.
    pub fn rsync() -> Self {
        Self::new(
            "rsync",
            [
                "-av",
                "--delete",
                "--delete-delay",
                "--partial",
                "--exclude=.git",
                "--stats",
                "--info=progress2",
            ],
        )
    }

    /// Full argument vector for mirroring `source` onto `destination`.
    pub fn argv(&self, source: &Path, destination: &Path) -> Vec<OsString> {
        let mut argv = self.args.clone();
        argv.push(with_trailing_slash(source));
        argv.push(with_trailing_slash(destination));
        argv
    }
}

impl Default for MirrorCommand {
    fn default() -> Self {
        Self::rsync()
    }
}

fn with_trailing_slash(path: &Path) -> OsString {
    let mut s = path.as_os_str().to_os_string();
    if !path.as_os_str().to_string_lossy().ends_with('/') {
        s.push("/");
    }
    s
}
