//! Small filesystem helpers shared by the stages.

use crate::errors::Result;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::info;

/// Creates each directory (and parents), logging the path.
pub fn create_directories<P: AsRef<Path>>(dirs: &[P]) -> Result<()> {
    for dir in dirs {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        info!(path = %dir.display(), "created directory");
    }
    Ok(())
}

/// Size of a file rounded to kilobytes, formatted for logs (`~ 12 KB`).
pub fn get_size(path: &Path) -> Result<String> {
    let bytes = std::fs::metadata(path)?.len();
    Ok(format!("~ {} KB", (bytes + 512) / 1024))
}

/// Names of the entries directly inside `dir`, sorted.
pub fn list_entry_names(dir: &Path) -> Result<BTreeSet<String>> {
    let mut names = BTreeSet::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        names.insert(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

/// All regular files under `dir`, recursively, sorted by path.
pub fn list_files_recursive(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in walkdir::WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::Other, e.to_string())
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Returns true if `dir` is missing or has no entries.
#[must_use]
pub fn is_missing_or_empty(dir: &Path) -> bool {
    std::fs::read_dir(dir).map_or(true, |mut entries| entries.next().is_none())
}
