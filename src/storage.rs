//! Filesystem helpers shared by the mail and group repositories.
//!
//! Each persisted record lives in its own JSON file:
//! ```text
//! {storage.path}/
//! ├── mail/
//! │   ├── 00000001.json
//! │   └── 00000002.json
//! └── group/
//!     └── builders.json
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::Result;

const RECORD_EXTENSION: &str = "json";

/// Create a record directory if it does not exist yet.
pub(crate) fn ensure_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    Ok(())
}

/// Path of the record file for `stem` inside `dir`.
pub(crate) fn record_path(dir: &Path, stem: &str) -> PathBuf {
    dir.join(format!("{stem}.{RECORD_EXTENSION}"))
}

/// Write a record by writing a temporary sibling and renaming it into place.
///
/// Readers never observe a half-written record.
pub(crate) fn write_atomic(path: &Path, content: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension(format!("{RECORD_EXTENSION}.tmp"));
    fs::write(&tmp, content)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

/// Read a record file, mapping a missing file to `None`.
pub(crate) fn read_record(path: &Path) -> Result<Option<Vec<u8>>> {
    match fs::read(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Remove a record file. Returns `false` if it did not exist.
pub(crate) fn remove_record(path: &Path) -> Result<bool> {
    match fs::remove_file(path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// List record files in a directory, sorted by file name.
///
/// Leftover temporary files are ignored.
pub(crate) fn list_records(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|e| e.to_str()) == Some(RECORD_EXTENSION)
        {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}
