//! Whole-document JSON storage (the `json` data format).

use std::fs;
use std::path::Path;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::store::{atomic_write, backup, io_error};

/// Options governing a whole-document write.
#[derive(Debug, Clone)]
pub struct WriteOptions {
    /// Pretty-print with two-space indentation.
    pub pretty: bool,
    /// Create the parent directory tree if missing.
    pub create_parents: bool,
    /// Fail if the target already exists. Set `false` to overwrite.
    pub overwrite: bool,
    /// Copy the existing file to a timestamped backup before overwriting.
    pub backup: bool,
    /// Unix permission bits to apply to the written file. Ignored on
    /// non-Unix targets.
    pub mode: Option<u32>,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            pretty: true,
            create_parents: true,
            overwrite: true,
            backup: false,
            mode: None,
        }
    }
}

#[cfg(unix)]
fn apply_mode(path: &Path, mode: u32) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(mode)).map_err(|e| io_error(path, e))
}

#[cfg(not(unix))]
fn apply_mode(_path: &Path, _mode: u32) -> Result<()> {
    Ok(())
}

/// Read and parse a whole-document JSON file.
pub fn read_document(path: &Path) -> Result<Value> {
    let raw = fs::read_to_string(path).map_err(|e| io_error(path, e))?;
    serde_json::from_str(&raw).map_err(Error::BadJson)
}

/// Write `value` to `path` atomically, per `opts`.
pub fn write_document(path: &Path, value: &Value, opts: &WriteOptions) -> Result<()> {
    if !opts.overwrite && path.exists() {
        return Err(Error::AlreadyExists(path.display().to_string()));
    }
    if opts.backup && path.exists() {
        backup(path)?;
    }
    let bytes = if opts.pretty {
        serde_json::to_vec_pretty(value)?
    } else {
        serde_json::to_vec(value)?
    };
    atomic_write(path, &bytes, opts.create_parents)?;
    if let Some(mode) = opts.mode {
        apply_mode(path, mode)?;
    }
    Ok(())
}

/// Run the write-time document validator (spec.md §4.1/§4.2's
/// `validateWrite`) against `value` before writing it. The validator
/// itself never raises — it returns a pass/fail outcome — but a failing
/// outcome here is surfaced as [`Error::DocumentInvalid`] so a guarded
/// write can't silently drop an invalid document. `schema = None` always
/// passes, same as [`crate::validate::validate`].
pub fn write_document_checked(
    path: &Path,
    value: &Value,
    opts: &WriteOptions,
    schema: Option<&crate::validate::DocumentSchema>,
) -> Result<()> {
    let outcome = crate::validate::validate(value, schema);
    if !outcome.valid {
        return Err(Error::DocumentInvalid(outcome));
    }
    write_document(path, value, opts)
}

/// Read the document at `path`, shallow-merge `updates`'s top-level keys
/// over it (existing keys preserved, overlapping keys overwritten), write
/// the result back, and return it.
pub fn update_document(path: &Path, updates: &Value) -> Result<Value> {
    let mut current = read_document(path)?;
    match (&mut current, updates) {
        (Value::Object(existing), Value::Object(incoming)) => {
            for (key, value) in incoming {
                existing.insert(key.clone(), value.clone());
            }
        }
        _ => {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "update_document requires both the existing document and the update to be JSON objects",
            )));
        }
    }
    write_document(
        path,
        &current,
        &WriteOptions {
            overwrite: true,
            ..WriteOptions::default()
        },
    )?;
    Ok(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn write_then_read_round_trips() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        write_document(&path, &json!({"a": 1}), &WriteOptions::default()).unwrap();
        assert_eq!(read_document(&path).unwrap(), json!({"a": 1}));
    }

    #[test]
    fn write_document_checked_rejects_invalid_document() {
        use crate::validate::{DocumentSchema, RootType};
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        let schema = DocumentSchema {
            root_type: Some(RootType::Object),
            required: vec!["id".to_string()],
            ..Default::default()
        };
        let result = write_document_checked(&path, &json!({"other": 1}), &WriteOptions::default(), Some(&schema));
        assert!(matches!(result, Err(Error::DocumentInvalid(_))));
        assert!(!path.exists());
    }

    #[test]
    fn write_document_checked_passes_through_a_valid_document() {
        use crate::validate::{DocumentSchema, RootType};
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        let schema = DocumentSchema {
            root_type: Some(RootType::Object),
            required: vec!["id".to_string()],
            ..Default::default()
        };
        write_document_checked(&path, &json!({"id": 1}), &WriteOptions::default(), Some(&schema)).unwrap();
        assert_eq!(read_document(&path).unwrap(), json!({"id": 1}));
    }

    #[test]
    fn write_without_overwrite_fails_when_present() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        write_document(&path, &json!({"a": 1}), &WriteOptions::default()).unwrap();
        let opts = WriteOptions {
            overwrite: false,
            ..WriteOptions::default()
        };
        let result = write_document(&path, &json!({"a": 2}), &opts);
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn update_merges_top_level_keys_only() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        write_document(
            &path,
            &json!({"a": 1, "b": {"x": 1}}),
            &WriteOptions::default(),
        )
        .unwrap();
        let merged = update_document(&path, &json!({"b": {"y": 2}, "c": 3})).unwrap();
        assert_eq!(merged, json!({"a": 1, "b": {"y": 2}, "c": 3}));
    }

    #[test]
    fn update_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        write_document(&path, &json!({"a": 1}), &WriteOptions::default()).unwrap();
        let once = update_document(&path, &json!({"a": 2})).unwrap();
        let twice = update_document(&path, &json!({"a": 2})).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn read_missing_file_is_not_found() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("missing.json");
        assert!(matches!(read_document(&path), Err(Error::NotFound(_))));
    }

    #[test]
    #[cfg(unix)]
    fn mode_option_sets_unix_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        let opts = WriteOptions {
            mode: Some(0o640),
            ..WriteOptions::default()
        };
        write_document(&path, &json!({"a": 1}), &opts).unwrap();
        let perms = fs::metadata(&path).unwrap().permissions();
        assert_eq!(perms.mode() & 0o777, 0o640);
    }

    #[test]
    fn backup_is_created_before_overwrite() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("doc.json");
        write_document(&path, &json!({"a": 1}), &WriteOptions::default()).unwrap();
        let opts = WriteOptions {
            backup: true,
            ..WriteOptions::default()
        };
        write_document(&path, &json!({"a": 2}), &opts).unwrap();
        let backups: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".backup."))
            .collect();
        assert_eq!(backups.len(), 1);
    }
}
