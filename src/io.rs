//! Blocking filesystem primitives
//!
//! Every multi-file mutation in the store is built from these single-file
//! steps. Each one is atomic on its own: files are written to a temporary
//! sibling and renamed into place, directories are created with a single
//! `mkdir`.

use crate::error::{JbofError, Result};
use bytes::Bytes;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use tempfile::NamedTempFile;

/// Prefix of in-flight temporary files
pub const TEMP_PREFIX: &str = ".tmp-";

/// A directory listing entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// Read a whole file
pub fn read(path: &Path) -> Result<Bytes> {
    let data = fs::read(path).map_err(JbofError::Io)?;
    Ok(Bytes::from(data))
}

/// Check if a path exists
pub fn exists(path: &Path) -> bool {
    path.exists()
}

/// Size of a file in bytes
pub fn size(path: &Path) -> Result<u64> {
    Ok(fs::metadata(path).map_err(JbofError::Io)?.len())
}

fn write_temp(path: &Path, data: &[u8]) -> Result<NamedTempFile> {
    let dir = path.parent().ok_or_else(|| {
        JbofError::Configuration(format!("{} has no parent directory", path.display()))
    })?;
    let mut file = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .tempfile_in(dir)
        .map_err(JbofError::Io)?;
    file.write_all(data).map_err(JbofError::Io)?;
    file.as_file().sync_all().map_err(JbofError::Io)?;
    Ok(file)
}

/// Write a file through a temporary sibling and rename it into place
///
/// Readers observe either the previous content or the complete new content.
pub fn write_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let file = write_temp(path, data)?;
    file.persist(path).map_err(|e| JbofError::Io(e.error))?;
    Ok(())
}

/// Like [`write_atomic`], but fails with `AlreadyExists` instead of replacing a file
pub fn create_atomic(path: &Path, data: &[u8]) -> Result<()> {
    let file = write_temp(path, data)?;
    match file.persist_noclobber(path) {
        Ok(_) => Ok(()),
        Err(e) if e.error.kind() == ErrorKind::AlreadyExists => {
            Err(JbofError::AlreadyExists(path.display().to_string()))
        }
        Err(e) => Err(JbofError::Io(e.error)),
    }
}

/// Create a single directory; its parent must exist
pub fn create_dir(path: &Path) -> Result<()> {
    match fs::create_dir(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::AlreadyExists => {
            Err(JbofError::AlreadyExists(path.display().to_string()))
        }
        Err(e) => Err(JbofError::Io(e)),
    }
}

/// Remove a file, returning whether it existed
pub fn remove_file(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(JbofError::Io(e)),
    }
}

/// Remove a directory tree, returning whether it existed
pub fn remove_dir_all(path: &Path) -> Result<bool> {
    match fs::remove_dir_all(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
        Err(e) => Err(JbofError::Io(e)),
    }
}

/// List a directory, sorted by name
///
/// Entries whose names are not valid UTF-8 are skipped.
pub fn list(path: &Path) -> Result<Vec<DirEntry>> {
    let mut entries = Vec::new();
    for entry in fs::read_dir(path).map_err(JbofError::Io)? {
        let entry = entry.map_err(JbofError::Io)?;
        let Ok(name) = entry.file_name().into_string() else {
            continue;
        };
        let is_dir = entry.file_type().map_err(JbofError::Io)?.is_dir();
        entries.push(DirEntry { name, is_dir });
    }
    entries.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(entries)
}

/// True if the error is an I/O "not found"
pub(crate) fn is_not_found(err: &JbofError) -> bool {
    matches!(err, JbofError::Io(e) if e.kind() == ErrorKind::NotFound)
}
