//! Byte-store (C1): atomic whole-document I/O, line-delimited I/O, and the
//! filesystem primitives both formats share.
//!
//! Grounded on the teacher's `storage::meta::write_meta` temp-then-rename
//! idiom and `table::table::Table::scan_partitions`'s directory walking.

mod document;
mod lines;

pub use document::{read_document, update_document, write_document, WriteOptions};
pub use lines::{
    append, append_many, count, read_all, read_all_strict, read_range, stream, write_all,
    LineChunks,
};

use std::fs;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::SystemTime;

use chrono::{DateTime, Utc};

use crate::error::{Error, Result};

/// Filesystem statistics for a single store file.
#[derive(Debug, Clone)]
pub struct FileStat {
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Number of records; `Some` for jsonl (line count) and for json
    /// (element count), `None` only when the caller asked for a raw
    /// stat without a format (e.g. the manifest file itself).
    pub item_count: Option<u64>,
    pub created: Option<DateTime<Utc>>,
    pub modified: Option<DateTime<Utc>>,
    pub accessed: Option<DateTime<Utc>>,
}

/// True if `path` exists (any file type).
pub fn exists(path: &Path) -> bool {
    path.exists()
}

/// Stat a file's size and timestamps. Does not attempt to count items;
/// callers that need `item_count` populate it themselves (`document`/`lines`
/// know their own format).
pub fn stat(path: &Path) -> Result<FileStat> {
    let meta = fs::metadata(path).map_err(|e| io_error(path, e))?;
    Ok(FileStat {
        path: path.to_path_buf(),
        size_bytes: meta.len(),
        item_count: None,
        created: meta.created().ok().and_then(system_time_to_utc),
        modified: meta.modified().ok().and_then(system_time_to_utc),
        accessed: meta.accessed().ok().and_then(system_time_to_utc),
    })
}

/// Delete a file. Missing file is treated as success (idempotent).
pub fn delete(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_error(path, e)),
    }
}

/// Copy `path` to `<path>.backup.<iso-ts-dashed>` and return the new path.
/// Fails if `path` does not exist.
pub fn backup(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(Error::NotFound(format!(
            "cannot back up missing file: {}",
            path.display()
        )));
    }
    let stamp = iso_timestamp_dashed(Utc::now());
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let backup_path = path.with_file_name(format!("{file_name}.backup.{stamp}"));
    fs::copy(path, &backup_path).map_err(|e| io_error(path, e))?;
    Ok(backup_path)
}

/// Render a UTC timestamp the way backup file names expect: ISO-8601 with
/// `:` and `.` replaced by `-` so the result is filesystem-safe on every
/// target platform.
pub(crate) fn iso_timestamp_dashed(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339().replace(':', "-").replace('.', "-")
}

static TMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Write `bytes` to `path` atomically: serialize to a uniquified
/// `<path>.tmp.<pid>.<counter>` file, `sync_all`, then `rename` over the
/// target. On any error the temp file is removed so a crash never leaves
/// a stray partial file next to the target.
///
/// `create_parents` creates the target's parent directory tree first.
pub(crate) fn atomic_write(path: &Path, bytes: &[u8], create_parents: bool) -> Result<()> {
    if create_parents {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
    }
    let counter = TMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    let tmp_path = path.with_extension(format!(
        "tmp.{}.{}",
        process::id(),
        counter
    ));
    let write_result = (|| -> Result<()> {
        fs::write(&tmp_path, bytes).map_err(|e| io_error(&tmp_path, e))?;
        let file = fs::File::open(&tmp_path).map_err(|e| io_error(&tmp_path, e))?;
        file.sync_all().map_err(|e| io_error(&tmp_path, e))?;
        fs::rename(&tmp_path, path).map_err(|e| io_error(path, e))?;
        Ok(())
    })();
    if write_result.is_err() {
        let _ = fs::remove_file(&tmp_path);
    }
    write_result
}

pub(crate) fn io_error(path: &Path, err: std::io::Error) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound(format!("{}: {err}", path.display()))
    } else {
        Error::Io(err)
    }
}

fn system_time_to_utc(t: SystemTime) -> Option<DateTime<Utc>> {
    Some(DateTime::<Utc>::from(t))
}
