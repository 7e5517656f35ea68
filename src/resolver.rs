//! RowId resolver (C7): per-RowId and batched direct lookup, create,
//! update, delete through the partition a RowId encodes.
//!
//! Grounded on the teacher's `table::table_reader::TableReader::next`
//! (resolve which partition(s) a query touches, then scan within them)
//! and `table::table::PartitionWriter::append` (a partition-scoped write
//! handle opened once per partition and reused) — generalized here from
//! append-only binary records to full CRUD over jsonl/json partition
//! files, since this store's records are individually addressable and
//! mutable rather than an immutable append log.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Instant;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::manifest::{DataFormat, Namespace};
use crate::router;
use crate::rowid::{ParsedRowId, RowIdCodec};
use crate::store::{self, WriteOptions};

pub const DEFAULT_ID_FIELD: &str = "rowId";

/// Outcome of a single-RowId lookup.
#[derive(Debug, Clone)]
pub struct LookupResult {
    pub found: bool,
    pub record: Option<Value>,
    pub parsed_rowid: Option<ParsedRowId>,
    pub file_path: String,
    pub elapsed_ms: u64,
}

fn partition_file(ns: &Namespace, path: &str) -> PathBuf {
    ns.data_dir().join(path).join(ns.manifest().data_format.file_name())
}

/// Read every record currently in a partition file. A `json` file may be
/// either a bare array or an object with an `items` array; both are
/// accepted, per spec.md §6. A missing file reads as empty in both formats.
pub(crate) fn read_partition(path: &std::path::Path, format: DataFormat) -> Result<Vec<Value>> {
    match format {
        DataFormat::Jsonl => store::read_all(path),
        DataFormat::Json => {
            if !path.exists() {
                return Ok(Vec::new());
            }
            let value = store::read_document(path)?;
            Ok(match value {
                Value::Array(items) => items,
                Value::Object(map) => match map.get("items") {
                    Some(Value::Array(items)) => items.clone(),
                    _ => Vec::new(),
                },
                _ => Vec::new(),
            })
        }
    }
}

pub(crate) fn write_partition(path: &std::path::Path, format: DataFormat, records: &[Value]) -> Result<()> {
    match format {
        DataFormat::Jsonl => store::write_all(path, records, &WriteOptions::default()),
        DataFormat::Json => store::write_document(path, &Value::Array(records.to_vec()), &WriteOptions::default()),
    }
}

/// Locate the record whose `[id_field]` equals `rowid`, per spec.md §4.7.
pub fn lookup(ns: &Namespace, codec: &RowIdCodec, rowid: &str, id_field: &str) -> Result<LookupResult> {
    let start = Instant::now();
    let parsed = codec.parse(rowid, &ns.manifest().partition_schema)?;
    let data_path = partition_file(ns, &parsed.path);
    let file_path = data_path.display().to_string();

    let records = read_partition(&data_path, ns.manifest().data_format)?;
    let record = records
        .into_iter()
        .find(|r| r.get(id_field).and_then(Value::as_str) == Some(rowid));
    let found = record.is_some();

    Ok(LookupResult {
        found,
        record,
        parsed_rowid: Some(parsed),
        file_path,
        elapsed_ms: start.elapsed().as_millis() as u64,
    })
}

pub fn exists(ns: &Namespace, codec: &RowIdCodec, rowid: &str, id_field: &str) -> Result<bool> {
    Ok(lookup(ns, codec, rowid, id_field)?.found)
}

/// Group RowIds by parsed partition path and read each partition file
/// exactly once. A partition read failure marks every RowId in that
/// group as not-found, sharing the group's file path.
pub fn lookup_many(
    ns: &Namespace,
    codec: &RowIdCodec,
    rowids: &[String],
    id_field: &str,
) -> HashMap<String, LookupResult> {
    let start = Instant::now();
    let schema = &ns.manifest().partition_schema;

    let mut groups: HashMap<String, Vec<String>> = HashMap::new();
    let mut parsed_by_rowid: HashMap<String, ParsedRowId> = HashMap::new();
    let mut unparseable: Vec<String> = Vec::new();

    for rowid in rowids {
        match codec.parse(rowid, schema) {
            Ok(parsed) => {
                groups.entry(parsed.path.clone()).or_default().push(rowid.clone());
                parsed_by_rowid.insert(rowid.clone(), parsed);
            }
            Err(_) => unparseable.push(rowid.clone()),
        }
    }

    let mut out = HashMap::new();
    for (path, ids) in groups {
        let data_path = partition_file(ns, &path);
        let file_path = data_path.display().to_string();

        match read_partition(&data_path, ns.manifest().data_format) {
            Ok(records) => {
                let mut by_id: HashMap<String, Value> = HashMap::new();
                for r in records {
                    if let Some(id) = r.get(id_field).and_then(Value::as_str) {
                        by_id.insert(id.to_string(), r);
                    }
                }
                for rowid in ids {
                    let record = by_id.get(&rowid).cloned();
                    let found = record.is_some();
                    out.insert(
                        rowid.clone(),
                        LookupResult {
                            found,
                            record,
                            parsed_rowid: parsed_by_rowid.get(&rowid).cloned(),
                            file_path: file_path.clone(),
                            elapsed_ms: start.elapsed().as_millis() as u64,
                        },
                    );
                }
            }
            Err(_) => {
                for rowid in ids {
                    out.insert(
                        rowid.clone(),
                        LookupResult {
                            found: false,
                            record: None,
                            parsed_rowid: parsed_by_rowid.get(&rowid).cloned(),
                            file_path: file_path.clone(),
                            elapsed_ms: start.elapsed().as_millis() as u64,
                        },
                    );
                }
            }
        }
    }

    for rowid in unparseable {
        out.insert(
            rowid.clone(),
            LookupResult {
                found: false,
                record: None,
                parsed_rowid: None,
                file_path: String::new(),
                elapsed_ms: start.elapsed().as_millis() as u64,
            },
        );
    }

    out
}

fn record_id<'a>(record: &'a Value, id_field: &str) -> Option<&'a str> {
    record.get(id_field).and_then(Value::as_str)
}

/// Run the write-time document validator (C2) against `record` using the
/// namespace's optional `item_schema`. Never runs the validator itself
/// twice for the same write — callers invoke this once per record right
/// before the write that would persist it.
fn check_item_schema(ns: &Namespace, record: &Value) -> Result<()> {
    let outcome = crate::validate::validate(record, ns.manifest().item_schema.as_ref());
    if outcome.valid {
        Ok(())
    } else {
        Err(Error::DocumentInvalid(outcome))
    }
}

/// Create a record keyed by `record[id_field]`. Fails with
/// [`Error::AlreadyExists`] if an item with the same id is already in
/// its partition, or [`Error::DocumentInvalid`] if the namespace carries
/// an `item_schema` and the record fails it — C2 guarding the write, per
/// spec.md §2's data flow.
pub fn create(ns: &mut Namespace, codec: &RowIdCodec, record: Value, id_field: &str) -> Result<Value> {
    check_item_schema(ns, &record)?;

    let rowid = record_id(&record, id_field)
        .ok_or_else(|| Error::RowIdInvalid(format!("record is missing required id field '{id_field}'")))?
        .to_string();
    let parsed = codec.parse(&rowid, &ns.manifest().partition_schema)?;
    router::ensure_exists(ns, &parsed.map)?;

    let format = ns.manifest().data_format;
    let data_path = partition_file(ns, &parsed.path);
    let existing = read_partition(&data_path, format)?;
    if existing.iter().any(|r| record_id(r, id_field) == Some(rowid.as_str())) {
        return Err(Error::AlreadyExists(format!("record '{rowid}' already exists")));
    }

    match format {
        DataFormat::Jsonl => store::append(&data_path, &record)?,
        DataFormat::Json => {
            let mut all = existing;
            all.push(record.clone());
            write_partition(&data_path, format, &all)?;
        }
    }
    Ok(record)
}

/// Create many records, grouped by partition. Rejects any id duplicated
/// within the batch or already present in its partition, or any record
/// that fails the namespace's `item_schema` (see [`create`]).
pub fn create_many(
    ns: &mut Namespace,
    codec: &RowIdCodec,
    records: Vec<Value>,
    id_field: &str,
) -> Result<Vec<Value>> {
    let schema = ns.manifest().partition_schema.clone();
    let mut groups: HashMap<String, (HashMap<String, String>, Vec<(String, Value)>)> = HashMap::new();
    let mut seen_in_batch: HashSet<String> = HashSet::new();

    for record in records {
        check_item_schema(ns, &record)?;
        let rowid = record_id(&record, id_field)
            .ok_or_else(|| Error::RowIdInvalid(format!("record is missing required id field '{id_field}'")))?
            .to_string();
        if !seen_in_batch.insert(rowid.clone()) {
            return Err(Error::AlreadyExists(format!("duplicate id '{rowid}' within batch")));
        }
        let parsed = codec.parse(&rowid, &schema)?;
        let entry = groups
            .entry(parsed.path.clone())
            .or_insert_with(|| (parsed.map.clone(), Vec::new()));
        entry.1.push((rowid, record));
    }

    let format = ns.manifest().data_format;
    let mut created = Vec::new();
    for (path, (values, group)) in groups {
        router::ensure_exists(ns, &values)?;
        let data_path = partition_file(ns, &path);
        let existing = read_partition(&data_path, format)?;
        let existing_ids: HashSet<&str> = existing.iter().filter_map(|r| record_id(r, id_field)).collect();
        for (rowid, _) in &group {
            if existing_ids.contains(rowid.as_str()) {
                return Err(Error::AlreadyExists(format!("record '{rowid}' already exists")));
            }
        }

        match format {
            DataFormat::Jsonl => {
                let rows: Vec<Value> = group.iter().map(|(_, r)| r.clone()).collect();
                store::append_many(&data_path, &rows)?;
            }
            DataFormat::Json => {
                let mut all = existing;
                all.extend(group.iter().map(|(_, r)| r.clone()));
                write_partition(&data_path, format, &all)?;
            }
        }
        created.extend(group.into_iter().map(|(_, r)| r));
    }
    Ok(created)
}

/// Shallow-merge `partial` into the stored record and rewrite its
/// partition file. Returns `None` if no record with `rowid` is found.
pub fn update(ns: &Namespace, codec: &RowIdCodec, rowid: &str, partial: &Value, id_field: &str) -> Result<Option<Value>> {
    let parsed = codec.parse(rowid, &ns.manifest().partition_schema)?;
    let format = ns.manifest().data_format;
    let data_path = partition_file(ns, &parsed.path);
    let mut records = read_partition(&data_path, format)?;

    let Some(pos) = records.iter().position(|r| record_id(r, id_field) == Some(rowid)) else {
        return Ok(None);
    };

    let Value::Object(incoming) = partial else {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidData,
            "update requires the partial to be a JSON object",
        )));
    };
    match &mut records[pos] {
        Value::Object(existing) => {
            for (k, v) in incoming {
                existing.insert(k.clone(), v.clone());
            }
        }
        _ => {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::InvalidData,
                "update requires the stored record to be a JSON object",
            )))
        }
    }

    let updated = records[pos].clone();
    check_item_schema(ns, &updated)?;
    write_partition(&data_path, format, &records)?;
    Ok(Some(updated))
}

/// Filter out the record matching `rowid`. Returns `false` if nothing
/// changed (record or partition not found); `true` after a rewrite.
pub fn delete(ns: &Namespace, codec: &RowIdCodec, rowid: &str, id_field: &str) -> Result<bool> {
    let parsed = codec.parse(rowid, &ns.manifest().partition_schema)?;
    let format = ns.manifest().data_format;
    let data_path = partition_file(ns, &parsed.path);
    let records = read_partition(&data_path, format)?;
    let original_len = records.len();

    let remaining: Vec<Value> = records
        .into_iter()
        .filter(|r| record_id(r, id_field) != Some(rowid))
        .collect();
    if remaining.len() == original_len {
        return Ok(false);
    }

    write_partition(&data_path, format, &remaining)?;
    Ok(true)
}

/// Parse `rowid` only to locate its partition, then return every record
/// currently in that partition's file.
pub fn get_partition_items(ns: &Namespace, codec: &RowIdCodec, rowid: &str) -> Result<Vec<Value>> {
    let parsed = codec.parse(rowid, &ns.manifest().partition_schema)?;
    read_partition(&partition_file(ns, &parsed.path), ns.manifest().data_format)
}
