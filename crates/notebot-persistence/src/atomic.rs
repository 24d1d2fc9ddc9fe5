//! Atomic file operations for crash-safe persistence.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use crate::error::{PersistenceError, Result};

/// Prefix for in-flight temp files. Hidden and without the note extension,
/// so readers never pick them up.
const TEMP_PREFIX: &str = ".notebot-";

/// Creates `dir` and any missing parents. Safe to race with another writer
/// creating the same directory.
pub fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir).map_err(|source| PersistenceError::DirectoryError {
        path: dir.to_path_buf(),
        source,
    })
}

/// Writes data to a file atomically.
///
/// This function writes to a temporary file first, then renames it to the
/// target path. This ensures that the file is never in a partially written
/// state, even if the process crashes. An existing file at `path` is
/// replaced.
pub fn atomic_write(path: &Path, data: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or(Path::new("."));
    ensure_dir(dir)?;

    let temp_file = write_temp(dir, path, data)?;

    temp_file
        .persist(path)
        .map_err(|e| PersistenceError::WriteError {
            path: path.to_path_buf(),
            source: e.error,
        })?;

    Ok(())
}

/// Writes data under the first free name in `candidates`, atomically.
///
/// The content is written once to a temp file in `dir`, then linked into
/// place with a no-clobber rename. A name that already exists (including
/// one claimed concurrently by another writer) is skipped, so no existing
/// file is ever overwritten. Returns the path that was claimed.
pub fn atomic_create<I>(dir: &Path, candidates: I, data: &[u8]) -> Result<PathBuf>
where
    I: IntoIterator<Item = String>,
{
    ensure_dir(dir)?;

    let mut candidates = candidates.into_iter().peekable();
    let base = candidates.peek().cloned().unwrap_or_default();
    let mut temp_file = write_temp(dir, &dir.join(&base), data)?;

    for name in candidates {
        let target = dir.join(&name);
        match temp_file.persist_noclobber(&target) {
            Ok(_) => return Ok(target),
            Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
                temp_file = e.file;
            }
            Err(e) => {
                return Err(PersistenceError::WriteError {
                    path: target,
                    source: e.error,
                });
            }
        }
    }

    Err(PersistenceError::NameExhausted {
        dir: dir.to_path_buf(),
        base,
    })
}

/// Reads a file to a string.
pub fn read_to_string(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| PersistenceError::ReadError {
        path: path.to_path_buf(),
        source,
    })
}

fn write_temp(dir: &Path, target: &Path, data: &[u8]) -> Result<NamedTempFile> {
    let write_err = |source| PersistenceError::WriteError {
        path: target.to_path_buf(),
        source,
    };

    // Create temp file in same directory (for same-filesystem rename)
    let mut temp_file = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(write_err)?;

    temp_file.write_all(data).map_err(write_err)?;
    temp_file.as_file().sync_all().map_err(write_err)?;

    Ok(temp_file)
}
