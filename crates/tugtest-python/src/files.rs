//! Source file discovery.
//!
//! Only files directly inside the source folder are considered; package
//! initializers (`__init__*`) are skipped.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

// ============================================================================
// Error Types
// ============================================================================

/// Error type for file operations.
#[derive(Debug, Error)]
pub enum FileError {
    #[error("source folder not found: {path}")]
    NotFound { path: String },

    #[error("not a directory: {path}")]
    NotADirectory { path: String },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Result type for file operations.
pub type FileResult<T> = Result<T, FileError>;

// ============================================================================
// File Collection
// ============================================================================

/// Whether a file name names a Python module we generate tests for.
pub fn is_eligible_file(name: &str) -> bool {
    name.ends_with(".py") && name.len() > 3 && !name.starts_with("__init__")
}

/// Collect eligible `.py` files directly inside `folder`, sorted by name.
///
/// Subdirectories are not descended into.
pub fn collect_source_files(folder: &Path) -> FileResult<Vec<PathBuf>> {
    if !folder.exists() {
        return Err(FileError::NotFound {
            path: folder.display().to_string(),
        });
    }
    if !folder.is_dir() {
        return Err(FileError::NotADirectory {
            path: folder.display().to_string(),
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(folder)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|e| FileError::Io(io::Error::other(e)))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if is_eligible_file(&name) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

// ============================================================================
// Tests
// ============================================================================
