//! On-disk representation of the alias table.
//!
//! The table is a single JSON object rewritten in full on every change.
//! Writes go to a temporary file in the same directory which is fsynced and
//! renamed over the target, so a reader (or a restart after a crash) sees
//! either the old table or the new one, never a partial file.

use crate::error::{StorageError, StorageResult};
use std::ffi::OsString;
use std::io::Write;
use std::path::{Path, PathBuf};
use tagbridge_core::AliasTable;
use tempfile::NamedTempFile;
use tracing::{info, warn};

/// Load the table at `path`.
///
/// A missing file yields an empty table and, when `create_if_missing` is
/// set, an empty `{}` file is written. A file that does not decode is moved
/// aside to `<name>.corrupt` and an empty table is returned.
pub(crate) fn load(path: &Path, create_if_missing: bool) -> StorageResult<AliasTable> {
    if !path.exists() {
        let table = AliasTable::new();
        if create_if_missing {
            write_atomic(path, &table)?;
            info!(path = %path.display(), "Created empty alias file");
        }
        return Ok(table);
    }

    let contents = std::fs::read_to_string(path)?;
    match serde_json::from_str::<AliasTable>(&contents) {
        Ok(table) => Ok(table),
        Err(e) => {
            let aside = corrupt_path(path);
            warn!(
                path = %path.display(),
                moved_to = %aside.display(),
                error = %e,
                "Alias file is not a valid table, starting empty"
            );
            std::fs::rename(path, &aside)?;
            Ok(AliasTable::new())
        }
    }
}

/// Replace the file at `path` with `table`.
pub(crate) fn write_atomic(path: &Path, table: &AliasTable) -> StorageResult<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };

    let mut tmp = NamedTempFile::new_in(dir)?;
    serde_json::to_writer_pretty(&mut tmp, table)?;
    tmp.write_all(b"\n")?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StorageError::Io(e.error))?;
    Ok(())
}

fn corrupt_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(OsString::from)
        .unwrap_or_else(|| OsString::from("aliases"));
    name.push(".corrupt");
    path.with_file_name(name)
}
