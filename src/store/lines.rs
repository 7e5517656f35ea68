//! Line-delimited JSON storage (the `jsonl` data format).

use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::Result;
use crate::store::document::WriteOptions;
use crate::store::{atomic_write, backup, io_error};

/// Read every record in `path`. Returns `[]` if the file does not exist.
/// Malformed lines are skipped silently (use [`read_all_strict`] to reject
/// them instead).
pub fn read_all(path: &Path) -> Result<Vec<Value>> {
    read_all_strict(path, false)
}

/// Like [`read_all`], but a malformed line fails the whole read when
/// `strict` is `true`.
pub fn read_all_strict(path: &Path, strict: bool) -> Result<Vec<Value>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    let mut rows = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(trimmed) {
            Ok(value) => rows.push(value),
            Err(e) => {
                if strict {
                    return Err(e.into());
                }
                log::debug!("skipping malformed jsonl line in {}: {e}", path.display());
            }
        }
    }
    Ok(rows)
}

/// Read records `offset..offset+limit` after applying the same
/// skip-malformed-lines policy as [`read_all`].
pub fn read_range(path: &Path, offset: usize, limit: usize) -> Result<Vec<Value>> {
    let rows = read_all(path)?;
    Ok(rows.into_iter().skip(offset).take(limit).collect())
}

/// Replace `path` with `rows`, atomically. Each record is round-tripped
/// through serialize then parse first, so an unserializable value is
/// rejected before any file is touched.
pub fn write_all(path: &Path, rows: &[Value], opts: &WriteOptions) -> Result<()> {
    let mut buf = Vec::new();
    for row in rows {
        let line = serde_json::to_string(row)?;
        serde_json::from_str::<Value>(&line)?;
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');
    }
    if opts.backup && path.exists() {
        backup(path)?;
    }
    atomic_write(path, &buf, opts.create_parents)
}

/// Append a single record, followed by a newline, in one write call.
pub fn append(path: &Path, row: &Value) -> Result<()> {
    append_many(path, std::slice::from_ref(row))
}

/// Append multiple records in one write call.
pub fn append_many(path: &Path, rows: &[Value]) -> Result<()> {
    use std::io::Write;
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }
    let mut buf = Vec::new();
    for row in rows {
        buf.extend_from_slice(serde_json::to_string(row)?.as_bytes());
        buf.push(b'\n');
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| io_error(path, e))?;
    file.write_all(&buf).map_err(|e| io_error(path, e))?;
    Ok(())
}

/// Count non-empty lines. Returns `0` for a missing file. Unlike
/// [`read_all`], this counts every non-blank line whether or not it parses.
pub fn count(path: &Path) -> Result<u64> {
    if !path.exists() {
        return Ok(0);
    }
    let file = File::open(path).map_err(|e| io_error(path, e))?;
    let reader = BufReader::new(file);
    let mut n = 0u64;
    for line in reader.lines() {
        let line = line.map_err(|e| io_error(path, e))?;
        if !line.trim().is_empty() {
            n += 1;
        }
    }
    Ok(n)
}

/// A finite, non-restartable iterator over `chunk_size`-sized batches of
/// records, parsed with the same skip-malformed policy as [`read_all`].
pub struct LineChunks {
    reader: BufReader<File>,
    chunk_size: usize,
    path: PathBuf,
    done: bool,
}

impl Iterator for LineChunks {
    type Item = Result<Vec<Value>>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let mut chunk = Vec::with_capacity(self.chunk_size);
        let mut line = String::new();
        loop {
            line.clear();
            let read = match self.reader.read_line(&mut line) {
                Ok(n) => n,
                Err(e) => return Some(Err(io_error(&self.path, e))),
            };
            if read == 0 {
                self.done = true;
                break;
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            match serde_json::from_str::<Value>(trimmed) {
                Ok(value) => chunk.push(value),
                Err(e) => log::debug!(
                    "skipping malformed jsonl line in {}: {e}",
                    self.path.display()
                ),
            }
            if chunk.len() >= self.chunk_size {
                break;
            }
        }
        if chunk.is_empty() {
            None
        } else {
            Some(Ok(chunk))
        }
    }
}

/// Produce a lazy sequence of `chunk_size`-sized batches of records.
pub fn stream(path: &Path, chunk_size: usize) -> Result<LineChunks> {
    let file = File::open(path).map_err(|e| io_error(path, e))?;
    Ok(LineChunks {
        reader: BufReader::new(file),
        chunk_size: chunk_size.max(1),
        path: path.to_path_buf(),
        done: false,
    })
}
