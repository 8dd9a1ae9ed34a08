//! Dataset tree scanner
//!
//! Sequential walk of one layout root with symlink loop detection. Returns
//! root-relative file paths in sorted order so every downstream pass is
//! deterministic.

use crate::models::Identifier;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::{DirEntry, WalkDir};

/// Scanner errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Specified path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Cannot access a file or directory
    #[error("File access error {0}: {1}")]
    FileAccessError(PathBuf, String),
}

impl From<ScanError> for rdqa_common::Error {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::PathNotFound(_) | ScanError::NotADirectory(_) => {
                rdqa_common::Error::Config(err.to_string())
            }
            ScanError::FileAccessError(..) => rdqa_common::Error::Io(std::io::Error::other(err.to_string())),
        }
    }
}

/// Layout root scanner
pub struct DatasetScanner {
    ignore_names: Vec<String>,
}

impl Default for DatasetScanner {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetScanner {
    /// Scanner ignoring OS and VCS clutter (.DS_Store, Thumbs.db, .git, ...)
    pub fn new() -> Self {
        Self {
            ignore_names: vec![
                ".DS_Store".to_string(),
                "Thumbs.db".to_string(),
                "desktop.ini".to_string(),
                ".git".to_string(),
                ".svn".to_string(),
            ],
        }
    }

    /// Every regular file under `root`, relative to `root`, sorted
    pub fn scan(&self, root: &Path) -> Result<Vec<PathBuf>, ScanError> {
        if !root.exists() {
            return Err(ScanError::PathNotFound(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(ScanError::NotADirectory(root.to_path_buf()));
        }

        let mut files = Vec::new();
        let mut symlink_visited = HashSet::new();

        let walker = WalkDir::new(root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|e| self.should_process_entry(e, &mut symlink_visited));

        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_file() {
                        if let Ok(relative) = entry.path().strip_prefix(root) {
                            files.push(relative.to_path_buf());
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Error accessing entry: {}", e);
                }
            }
        }

        files.sort();
        tracing::debug!(root = %root.display(), count = files.len(), "Scan complete");
        Ok(files)
    }

    fn should_process_entry(&self, entry: &DirEntry, symlink_visited: &mut HashSet<PathBuf>) -> bool {
        let file_name = entry.file_name().to_string_lossy();
        if self.ignore_names.iter().any(|n| file_name == n.as_str()) {
            return false;
        }

        if entry.file_type().is_symlink() {
            if let Ok(canonical) = entry.path().canonicalize() {
                if !symlink_visited.insert(canonical) {
                    tracing::warn!("Symlink loop detected: {}", entry.path().display());
                    return false;
                }
            }
        }

        true
    }
}

/// True if `basename` belongs to `identifier` (`<id>.` or `<id>_` prefix)
pub fn belongs_to(basename: &str, identifier: &Identifier) -> bool {
    let id = identifier.to_string();
    basename
        .strip_prefix(id.as_str())
        .map_or(false, |rest| rest.starts_with('.') || rest.starts_with('_'))
}

/// Files of `identifier` directly inside `dir`, sorted; empty if `dir` is absent
pub fn identifier_files(dir: &Path, identifier: &Identifier) -> Result<Vec<PathBuf>, ScanError> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }

    let access = |e: std::io::Error| ScanError::FileAccessError(dir.to_path_buf(), e.to_string());
    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(access)? {
        let entry = entry.map_err(access)?;
        if !entry.file_type().map_err(access)?.is_file() {
            continue;
        }
        if belongs_to(&entry.file_name().to_string_lossy(), identifier) {
            files.push(entry.path());
        }
    }
    files.sort();
    Ok(files)
}

/// Remove empty directories below `root` (never `root` itself)
pub fn prune_empty_dirs(root: &Path) -> Result<usize, ScanError> {
    if !root.is_dir() {
        return Ok(0);
    }

    let mut removed = 0;
    for entry in WalkDir::new(root).min_depth(1).contents_first(true) {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!("Error accessing entry: {}", e);
                continue;
            }
        };
        if !entry.file_type().is_dir() {
            continue;
        }

        let path = entry.path();
        let access = |e: std::io::Error| ScanError::FileAccessError(path.to_path_buf(), e.to_string());
        let is_empty = fs::read_dir(path).map_err(access)?.next().is_none();
        if is_empty {
            fs::remove_dir(path).map_err(access)?;
            tracing::debug!("Removed empty directory {}", path.display());
            removed += 1;
        }
    }
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, relative: &str) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_scan_returns_sorted_relative_paths() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "s1_r1/psychopy/sub-002/b.csv");
        touch(dir.path(), "s1_r1/psychopy/sub-001/a.csv");
        touch(dir.path(), "s1_r1/psychopy/sub-001/.DS_Store");
        touch(dir.path(), ".git/config");

        let files = DatasetScanner::new().scan(dir.path()).unwrap();
        assert_eq!(
            files,
            vec![
                PathBuf::from("s1_r1/psychopy/sub-001/a.csv"),
                PathBuf::from("s1_r1/psychopy/sub-002/b.csv"),
            ]
        );
    }

    #[test]
    fn test_scan_missing_root() {
        let dir = TempDir::new().unwrap();
        let result = DatasetScanner::new().scan(&dir.path().join("absent"));
        assert!(matches!(result, Err(ScanError::PathNotFound(_))));
    }

    #[test]
    fn test_identifier_files_requires_separator() {
        let dir = TempDir::new().unwrap();
        for name in [
            "sub-001_flanker_s1_r1_e1.csv",
            "sub-001_flanker_s1_r1_e1_deviation.txt",
            "sub-001_flankerB_s1_r1_e1.csv",
        ] {
            touch(dir.path(), name);
        }
        let id = Identifier::new("001", "flanker", "s1", "r1", "e1");
        let names: Vec<String> = identifier_files(dir.path(), &id)
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(
            names,
            vec!["sub-001_flanker_s1_r1_e1.csv", "sub-001_flanker_s1_r1_e1_deviation.txt"]
        );
    }

    #[test]
    fn test_prune_keeps_root_and_non_empty_dirs() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("a/b/c")).unwrap();
        touch(dir.path(), "d/keep.txt");

        assert_eq!(prune_empty_dirs(dir.path()).unwrap(), 3);
        assert!(dir.path().is_dir());
        assert!(!dir.path().join("a").exists());
        assert!(dir.path().join("d/keep.txt").exists());
    }
}
