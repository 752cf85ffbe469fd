// Filesystem helpers for clip output and offsite copies

use std::io;
use std::path::{Path, PathBuf};

/// Join a directory and a leaf name.
///
/// Trailing separators on `dir` are handled by `Path::join`; an empty `dir`
/// yields `file` unchanged.
pub fn join_path(dir: &Path, file: &str) -> PathBuf {
    if dir.as_os_str().is_empty() {
        PathBuf::from(file)
    } else {
        dir.join(file)
    }
}

/// Last component of a path, splitting on both '/' and '\\' so names coming
/// from either platform resolve the same way
pub fn base_name(path: &Path) -> String {
    let text = path.to_string_lossy();
    let trimmed = text.trim_end_matches(['/', '\\']);
    trimmed
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(trimmed)
        .to_string()
}

/// Create `dir` and its parents unless it already exists.
///
/// A directory that appears between the check and the create (another
/// process, or the scheduler racing us) counts as success.
pub fn create_directory_if_absent(dir: &Path) -> io::Result<()> {
    if directory_exists(dir) {
        return Ok(());
    }
    match std::fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(_) if directory_exists(dir) => Ok(()),
        Err(e) => Err(e),
    }
}

pub fn is_absolute_path(path: &Path) -> bool {
    path.is_absolute()
}

pub fn directory_exists(path: &Path) -> bool {
    path.is_dir()
}

/// Remove a file if present; a missing file is not an error
pub fn remove_if_exists(path: &Path) -> io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Copy `source` over `target`, replacing any existing file.
///
/// Returns a description of the failure instead of an error value; callers
/// log it and move on.
pub fn copy_overwrite(source: &Path, target: &Path) -> Option<String> {
    match std::fs::copy(source, target) {
        Ok(_) => None,
        Err(e) => Some(format!(
            "copy {} -> {} failed: {}",
            source.display(),
            target.display(),
            e
        )),
    }
}
