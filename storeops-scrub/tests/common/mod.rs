//! In-process parity tool for scrub tests.
//!
//! `create` writes `<base>` holding the relative path and a SHA-256 of the
//! file, plus one volume holding a full copy, so `repair` can restore it.

#![allow(dead_code)]

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use sha2::{Digest, Sha256};
use storeops_core::Redundancy;
use storeops_scrub::{CreateRequest, ParityTool, RetryPolicy, ScrubOptions, ToolOutput};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
pub struct HashingTool {
    creates: Mutex<Vec<PathBuf>>,
    failing: Mutex<HashSet<PathBuf>>,
}

impl HashingTool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every create attempt for `relative` writes a partial base and fails.
    pub fn fail_creates_for(&self, relative: &str) {
        self.failing.lock().unwrap().insert(PathBuf::from(relative));
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
    }

    pub fn creates(&self) -> Vec<PathBuf> {
        self.creates.lock().unwrap().clone()
    }
}

pub fn volume_for(base: &Path) -> PathBuf {
    let base = base.to_str().unwrap();
    PathBuf::from(format!("{}.vol000+01.par2", base.strip_suffix(".par2").unwrap()))
}

fn digest(data: &[u8]) -> String {
    hex::encode(Sha256::digest(data))
}

impl ParityTool for HashingTool {
    fn create(&self, request: &CreateRequest<'_>, _cancel: &CancellationToken) -> ToolOutput {
        self.creates.lock().unwrap().push(request.relative.to_path_buf());
        if self.failing.lock().unwrap().contains(request.relative) {
            std::fs::write(request.base, b"PARTIAL").unwrap();
            return ToolOutput::failed("Opening: file\nError: disk full");
        }
        let data = match std::fs::read(request.directory.join(request.relative)) {
            Ok(data) => data,
            Err(e) => return ToolOutput::failed(e.to_string()),
        };
        let header = format!("{}\n{}\n", request.relative.display(), digest(&data));
        std::fs::write(request.base, header).unwrap();
        std::fs::write(volume_for(request.base), &data).unwrap();
        ToolOutput::ok("Done")
    }

    fn verify(&self, directory: &Path, base: &Path, _cancel: &CancellationToken) -> ToolOutput {
        let Ok(header) = std::fs::read_to_string(base) else {
            return ToolOutput::failed("main packet not found");
        };
        let mut lines = header.lines();
        let (Some(relative), Some(hash)) = (lines.next(), lines.next()) else {
            return ToolOutput::failed("damaged parity");
        };
        match std::fs::read(directory.join(relative)) {
            Ok(data) if digest(&data) == hash => ToolOutput::ok("All files are correct"),
            _ => ToolOutput::failed("Repair is required."),
        }
    }

    fn repair(&self, directory: &Path, base: &Path, _cancel: &CancellationToken) -> ToolOutput {
        let header = std::fs::read_to_string(base).unwrap_or_default();
        let Some(relative) = header.lines().next() else {
            return ToolOutput::failed("damaged parity");
        };
        match std::fs::read(volume_for(base)) {
            Ok(data) => {
                std::fs::write(directory.join(relative), data).unwrap();
                ToolOutput::ok("Repair complete.")
            }
            Err(_) => ToolOutput::failed("Repair is not possible."),
        }
    }
}

/// Delegates to [`HashingTool`] except for `relative`, whose create leaves
/// a truncated set behind and cancels the run before failing.
pub struct InterruptingTool {
    pub inner: HashingTool,
    relative: PathBuf,
}

impl InterruptingTool {
    pub fn new(relative: &str) -> Self {
        Self {
            inner: HashingTool::new(),
            relative: PathBuf::from(relative),
        }
    }
}

impl ParityTool for InterruptingTool {
    fn create(&self, request: &CreateRequest<'_>, cancel: &CancellationToken) -> ToolOutput {
        if request.relative != self.relative {
            return self.inner.create(request, cancel);
        }
        std::fs::write(request.base, b"PAR2\0PK").unwrap();
        std::fs::write(volume_for(request.base), b"bra").unwrap();
        cancel.cancel();
        ToolOutput::failed("Opening: file\nInterrupted")
    }

    fn verify(&self, directory: &Path, base: &Path, cancel: &CancellationToken) -> ToolOutput {
        self.inner.verify(directory, base, cancel)
    }

    fn repair(&self, directory: &Path, base: &Path, cancel: &CancellationToken) -> ToolOutput {
        self.inner.repair(directory, base, cancel)
    }
}

/// `<root>/data` with the given files, database `<root>/data/.pardatabase`.
pub struct Fixture {
    pub root: TempDir,
}

impl Fixture {
    pub fn new(files: &[(&str, &str)]) -> Self {
        let root = TempDir::new().unwrap();
        let fixture = Self { root };
        for (name, body) in files {
            fixture.write(name, body);
        }
        fixture
    }

    pub fn data(&self) -> PathBuf {
        self.root.path().join("data")
    }

    pub fn database(&self) -> PathBuf {
        self.data().join(".pardatabase")
    }

    pub fn write(&self, name: &str, body: &str) {
        let path = self.data().join(name);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, body).unwrap();
    }

    pub fn base(&self, relative: &str) -> PathBuf {
        self.database().join(format!("{relative}.par2"))
    }

    pub fn options(&self) -> ScrubOptions {
        let mut options = ScrubOptions::new(
            self.data(),
            ".pardatabase",
            Redundancy::new(5).unwrap(),
            self.root.path().join("locks/scrub.lock"),
        );
        options.retry = RetryPolicy {
            attempts: 3,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        };
        options
    }
}
