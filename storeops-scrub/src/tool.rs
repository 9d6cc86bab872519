//! The parity tool seam.
//!
//! [`ParityTool`] abstracts the external program that creates, verifies and
//! repairs parity sets. [`Par2Tool`] drives the `par2` command line; tests
//! substitute an in-process fake.

use std::ffi::OsStr;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use storeops_core::Redundancy;
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Combined stdout/stderr of one tool invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolOutput {
    pub success: bool,
    pub output: String,
}

impl ToolOutput {
    pub fn ok(output: impl Into<String>) -> Self {
        Self {
            success: true,
            output: output.into(),
        }
    }

    pub fn failed(output: impl Into<String>) -> Self {
        Self {
            success: false,
            output: output.into(),
        }
    }
}

/// One parity-create invocation.
#[derive(Debug, Clone, Copy)]
pub struct CreateRequest<'a> {
    /// Root of the protected tree; the tool runs with this as its cwd.
    pub directory: &'a Path,
    /// Protected file, relative to `directory`.
    pub relative: &'a Path,
    /// Parity base file to create.
    pub base: &'a Path,
    pub redundancy: Redundancy,
}

pub trait ParityTool: Send + Sync {
    fn create(&self, request: &CreateRequest<'_>, cancel: &CancellationToken) -> ToolOutput;

    /// Check the protected file recorded in `base` against its parity.
    fn verify(&self, directory: &Path, base: &Path, cancel: &CancellationToken) -> ToolOutput;

    fn repair(&self, directory: &Path, base: &Path, cancel: &CancellationToken) -> ToolOutput;
}

/// The `par2` command line tool.
#[derive(Debug, Clone)]
pub struct Par2Tool {
    program: PathBuf,
}

impl Default for Par2Tool {
    fn default() -> Self {
        Self::new("par2")
    }
}

impl Par2Tool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, directory: &Path, args: &[&OsStr], cancel: &CancellationToken) -> ToolOutput {
        match self.spawn_and_wait(directory, args, cancel) {
            Ok(output) => output,
            Err(e) => ToolOutput::failed(format!("{}: {e}", self.program.display())),
        }
    }

    fn spawn_and_wait(
        &self,
        directory: &Path,
        args: &[&OsStr],
        cancel: &CancellationToken,
    ) -> std::io::Result<ToolOutput> {
        // One file for both streams keeps the interleaving the tool produced.
        let mut capture = tempfile::tempfile()?;
        let mut child = Command::new(&self.program)
            .args(args)
            .current_dir(directory)
            .stdin(Stdio::null())
            .stdout(capture.try_clone()?)
            .stderr(capture.try_clone()?)
            .spawn()?;

        let status = loop {
            if let Some(status) = child.try_wait()? {
                break Some(status);
            }
            if cancel.is_cancelled() {
                tracing::warn!(program = %self.program.display(), "cancelled; killing parity tool");
                let _ = child.kill();
                let _ = child.wait();
                break None;
            }
            std::thread::sleep(POLL_INTERVAL);
        };

        capture.seek(SeekFrom::Start(0))?;
        let mut raw = Vec::new();
        capture.read_to_end(&mut raw)?;
        let output = String::from_utf8_lossy(&raw).into_owned();

        Ok(match status {
            Some(status) if status.success() => ToolOutput::ok(output),
            Some(status) => ToolOutput::failed(format!("{output}\nexit status: {status}")),
            None => ToolOutput::failed(format!("{output}\ncancelled")),
        })
    }
}

impl ParityTool for Par2Tool {
    fn create(&self, request: &CreateRequest<'_>, cancel: &CancellationToken) -> ToolOutput {
        let redundancy = format!("-r{}", request.redundancy.percent());
        self.run(
            request.directory,
            &[
                OsStr::new("create"),
                OsStr::new("-B"),
                request.directory.as_os_str(),
                OsStr::new(&redundancy),
                OsStr::new("-n1"),
                request.base.as_os_str(),
                request.relative.as_os_str(),
            ],
            cancel,
        )
    }

    fn verify(&self, directory: &Path, base: &Path, cancel: &CancellationToken) -> ToolOutput {
        self.run(
            directory,
            &[OsStr::new("verify"), OsStr::new("-B"), directory.as_os_str(), base.as_os_str()],
            cancel,
        )
    }

    fn repair(&self, directory: &Path, base: &Path, cancel: &CancellationToken) -> ToolOutput {
        self.run(
            directory,
            &[OsStr::new("repair"), OsStr::new("-B"), directory.as_os_str(), base.as_os_str()],
            cancel,
        )
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
