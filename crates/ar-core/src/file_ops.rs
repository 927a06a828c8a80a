//! Filesystem helpers used by the pipeline: whole-file reads and writes,
//! timestamped backups, restore, and recursive listing.
//!
//! Backups live beside the original as `<path>.backup_<YYYYmmdd_HHMMSS>`.
//! There is no index of backups; discovery is by directory listing.

use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use thiserror::Error;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Directory names skipped by default when listing a directory target.
pub const DEFAULT_EXCLUDED_DIRS: &[&str] = &[
    ".git",
    "__pycache__",
    "node_modules",
    ".gemini",
    ".venv",
    "venv",
    "target",
];

#[derive(Debug, Error)]
pub enum FileOpError {
    #[error("Error reading file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Error writing file {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Error restoring from backup {}: {source}", backup.display())]
    Restore {
        backup: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Read a whole file as UTF-8 text.
pub fn read_file(path: &Path) -> Result<String, FileOpError> {
    std::fs::read_to_string(path).map_err(|source| FileOpError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Replace `path` with `content` in a single whole-file write, creating
/// parent directories as needed. Returns a human-readable status line.
pub fn write_file(path: &Path, content: &str) -> Result<String, FileOpError> {
    let to_err = |source| FileOpError::Write {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(to_err)?;
    }
    std::fs::write(path, content).map_err(to_err)?;
    Ok(format!("Successfully wrote to {}", path.display()))
}

/// Path a backup of `path` taken at `at` would be written to.
pub fn backup_path_for(path: &Path, at: DateTime<Local>) -> PathBuf {
    let mut name: OsString = path.as_os_str().to_os_string();
    name.push(format!(".backup_{}", at.format("%Y%m%d_%H%M%S")));
    PathBuf::from(name)
}

/// First backup path for `path` at `at` that does not exist yet. Later
/// backups in the same second get `_1`, `_2`, ... appended.
fn free_backup_path(path: &Path, at: DateTime<Local>) -> PathBuf {
    let first = backup_path_for(path, at);
    if !first.exists() {
        return first;
    }
    (1u32..)
        .map(|n| {
            let mut name = first.clone().into_os_string();
            name.push(format!("_{n}"));
            PathBuf::from(name)
        })
        .find(|candidate| !candidate.exists())
        .unwrap_or(first)
}

/// Copy `path` to a timestamped sibling, never replacing an earlier backup.
/// Returns `None` when the file does not exist or the copy fails; failures
/// are logged, never raised.
pub fn create_backup(path: &Path) -> Option<PathBuf> {
    create_backup_at(path, Local::now())
}

fn create_backup_at(path: &Path, at: DateTime<Local>) -> Option<PathBuf> {
    if !path.exists() {
        return None;
    }
    let backup = free_backup_path(path, at);
    match std::fs::copy(path, &backup) {
        Ok(_) => {
            debug!(original = %path.display(), backup = %backup.display(), "backup created");
            Some(backup)
        }
        Err(e) => {
            warn!(original = %path.display(), error = %e, "could not create backup");
            None
        }
    }
}

/// Outcome of [`write_file_safely`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteReport {
    pub path: PathBuf,
    pub backup: Option<PathBuf>,
}

impl fmt::Display for WriteReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Successfully wrote to {}", self.path.display())?;
        if let Some(ref backup) = self.backup {
            write!(f, "\nBackup created: {}", backup.display())?;
        }
        Ok(())
    }
}

/// Write with an optional best-effort backup of the existing file first.
pub fn write_file_safely(
    path: &Path,
    content: &str,
    create_backup_flag: bool,
) -> Result<WriteReport, FileOpError> {
    let backup = if create_backup_flag && path.exists() {
        create_backup(path)
    } else {
        None
    };
    write_file(path, content)?;
    Ok(WriteReport {
        path: path.to_path_buf(),
        backup,
    })
}

/// Copy a backup over the original path.
pub fn restore_from_backup(backup: &Path, original: &Path) -> Result<String, FileOpError> {
    std::fs::copy(backup, original).map_err(|source| FileOpError::Restore {
        backup: backup.to_path_buf(),
        source,
    })?;
    Ok(format!(
        "Successfully restored {} from backup",
        original.display()
    ))
}

/// Recursively list files under `root`, skipping directories whose name is
/// in `ignore_dirs`. When `extensions` is given, only file names ending in
/// one of them are kept. Output is sorted by path for stable ordering.
pub fn list_files<S: AsRef<str>>(
    root: &Path,
    ignore_dirs: &[S],
    extensions: Option<&[&str]>,
) -> Vec<PathBuf> {
    WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            if entry.depth() == 0 || !entry.file_type().is_dir() {
                return true;
            }
            let name = entry.file_name().to_string_lossy();
            !ignore_dirs.iter().any(|d| d.as_ref() == name)
        })
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .filter(|entry| match extensions {
            None => true,
            Some(exts) => {
                let name = entry.file_name().to_string_lossy();
                exts.iter().any(|ext| name.ends_with(ext))
            }
        })
        .map(|entry| entry.into_path())
        .collect()
}

/// Metadata snapshot for a path.
#[derive(Debug, Clone)]
pub struct FileInfo {
    pub path: PathBuf,
    pub size: u64,
    pub modified: Option<DateTime<Local>>,
    pub is_file: bool,
    pub is_dir: bool,
}

pub fn file_info(path: &Path) -> Option<FileInfo> {
    let meta = std::fs::metadata(path).ok()?;
    Some(FileInfo {
        path: path.to_path_buf(),
        size: meta.len(),
        modified: meta.modified().ok().map(DateTime::<Local>::from),
        is_file: meta.is_file(),
        is_dir: meta.is_dir(),
    })
}
