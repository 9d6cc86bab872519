//! Parity file naming.
//!
//! A protected file `<dir>/<rel>` owns the parity set rooted at
//! `<db>/<rel>.par2`. The set consists of that base file plus any number of
//! recovery volumes named `<rel>.vol<N>+<M>.par2`. Grouping a file back to
//! its set must never confuse `a.bin`'s volumes with the set of a sibling
//! named `a.bin.vol`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;

use crate::error::{io_err, ScrubError};

pub const PARITY_EXT: &str = ".par2";

/// Directory inside the database used to stash parity sets while they are
/// being replaced. Never scanned as part of the database.
pub const STAGING_DIR: &str = ".staging";

fn volume_re() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(.*)\.vol\d+\+\d+\.par2$").ok())
        .as_ref()
}

/// Canonical base name of the parity set `name` belongs to.
///
/// - `foo.par2.vol000+01.par2` → `foo.par2`
/// - `foo.vol000+01.par2` → `foo.par2`
/// - `foo.par2` → `foo.par2`
pub fn parity_base_name(name: &str) -> String {
    if let Some(idx) = name.find(".par2.vol") {
        return format!("{}{PARITY_EXT}", &name[..idx]);
    }
    if let Some(caps) = volume_re().and_then(|re| re.captures(name)) {
        return format!("{}{PARITY_EXT}", &caps[1]);
    }
    name.to_string()
}

/// Base name read from the volume pattern alone, without the `.par2.vol`
/// shortcut: `movie.par2.vol000+01.par2` → `movie.par2.par2`. `None` for
/// names that are not recovery volumes.
pub fn volume_base_name(name: &str) -> Option<String> {
    let caps = volume_re()?.captures(name)?;
    Some(format!("{}{PARITY_EXT}", &caps[1]))
}

/// Base name of the set `name` belongs to among the files in `dir`.
///
/// When the two readings of a volume disagree and the pattern reading names
/// a base that exists, the volume is that set's, as with the volumes of a
/// protected file itself called `movie.par2`.
fn owning_base_name(dir: &Path, name: &str) -> String {
    let canonical = parity_base_name(name);
    match volume_base_name(name) {
        Some(base) if base != canonical && dir.join(&base).is_file() => base,
        _ => canonical,
    }
}

pub fn is_parity_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.ends_with(PARITY_EXT))
}

/// `<database>/<relative>.par2`
pub fn parity_base_for(database: &Path, relative: &Path) -> PathBuf {
    let mut name = database.join(relative).into_os_string();
    name.push(PARITY_EXT);
    PathBuf::from(name)
}

/// Relative path of the protected file a parity base belongs to, or `None`
/// when `base` is not under `database` or lacks the parity extension.
pub fn protected_relative(database: &Path, base: &Path) -> Option<PathBuf> {
    let rel = base.strip_prefix(database).ok()?;
    let rel = rel.to_str()?;
    rel.strip_suffix(PARITY_EXT)
        .filter(|s| !s.is_empty())
        .map(PathBuf::from)
}

/// All existing files of the set rooted at `base`, sorted.
pub fn parity_family(base: &Path) -> Result<Vec<PathBuf>, ScrubError> {
    let (Some(dir), Some(base_name)) = (base.parent(), base.file_name().and_then(|n| n.to_str()))
    else {
        return Ok(Vec::new());
    };
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(io_err(dir, e)),
    };

    let mut family = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|e| io_err(dir, e))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        if !name.ends_with(PARITY_EXT) {
            continue;
        }
        if volume_base_name(name).as_deref() == Some(base_name)
            || owning_base_name(dir, name) == base_name
        {
            family.push(entry.path());
        }
    }
    family.sort();
    Ok(family)
}

/// Group parity files by the base path of the set they belong to.
pub fn group_by_base(files: impl IntoIterator<Item = PathBuf>) -> BTreeMap<PathBuf, Vec<PathBuf>> {
    let mut groups: BTreeMap<PathBuf, Vec<PathBuf>> = BTreeMap::new();
    for file in files {
        let (Some(dir), Some(name)) = (file.parent(), file.file_name().and_then(|n| n.to_str()))
        else {
            continue;
        };
        let base = dir.join(owning_base_name(dir, name));
        groups.entry(base).or_default().push(file);
    }
    groups
}

/// Remove every file of the set rooted at `base`. Returns how many were removed.
pub fn remove_family(base: &Path) -> Result<usize, ScrubError> {
    let family = parity_family(base)?;
    for file in &family {
        match std::fs::remove_file(file) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(io_err(file, e)),
        }
    }
    Ok(family.len())
}

// ─── Tests ───────────────────────────────────────────────────────────────────
