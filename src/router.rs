//! Partition router (C6): derives a record's partition path, resolves a
//! query filter against discovered partitions, and ensures a partition's
//! directory/file exists.
//!
//! Grounded on the teacher's `table::table::Table::writer` (creates the
//! partition directory and a writer for it on first use, registering a
//! `PartitionInfo`) and `table::table_reader::PartitionFilter` (filter
//! entries match a scalar or any of a sequence of scalars, via `matches`).

use std::collections::HashMap;
use std::fs;

use chrono::Utc;
use serde_json::Value;

use crate::error::Result;
use crate::manifest::{DataFormat, Namespace, PartitionInfo};
use crate::schema::PartitionSchema;
use crate::store;

/// Build a partition path by walking `order`. A key is skipped when its
/// value is absent — per spec.md §9's resolved open question, the
/// engine does not special-case the literal string `"undefined"`.
pub fn build_path(schema: &PartitionSchema, values: &HashMap<String, String>) -> String {
    let mut segments = Vec::with_capacity(schema.order.len());
    for key in &schema.order {
        if let Some(value) = values.get(key) {
            segments.push(format!("{key}={value}"));
        }
    }
    segments.join("/")
}

/// A query filter value: a single value to match, or a set any of which
/// matches.
#[derive(Debug, Clone)]
pub enum FilterValue {
    Scalar(String),
    Many(Vec<String>),
}

impl FilterValue {
    fn matches(&self, actual: &str) -> bool {
        match self {
            FilterValue::Scalar(v) => v == actual,
            FilterValue::Many(vs) => vs.iter().any(|v| v == actual),
        }
    }
}

pub type PartitionFilter = HashMap<String, FilterValue>;

/// Ensure the partition directory and an (initially empty) data file
/// exist, registering a zero-item [`PartitionInfo`] on first creation.
/// Calling this twice with the same values never duplicates the entry.
pub fn ensure_exists(ns: &mut Namespace, values: &HashMap<String, String>) -> Result<PartitionInfo> {
    let path = build_path(&ns.manifest().partition_schema, values);

    if let Some(existing) = ns.manifest().discovered_partitions.iter().find(|p| p.path == path) {
        return Ok(existing.clone());
    }

    let format = ns.manifest().data_format;
    let dir = ns.data_dir().join(&path);
    fs::create_dir_all(&dir).map_err(|e| store::io_error(&dir, e))?;

    let data_path = dir.join(format.file_name());
    if !data_path.exists() {
        let initial: &[u8] = match format {
            DataFormat::Jsonl => b"",
            DataFormat::Json => b"[]",
        };
        fs::write(&data_path, initial).map_err(|e| store::io_error(&data_path, e))?;
    }

    let stat = store::stat(&data_path)?;
    let info = PartitionInfo {
        path,
        values: values.clone(),
        created: stat.created.unwrap_or_else(Utc::now),
        item_count: 0,
        last_updated: stat.modified.unwrap_or_else(Utc::now),
        size_bytes: stat.size_bytes,
    };
    ns.add_partition(info.clone())?;
    Ok(info)
}

/// Resolve the discovered partitions whose values pass `filter`: a
/// partition passes when, for every filter entry, the partition either
/// has no value for that key (a filter on a non-partition field is
/// ignored) or its value matches.
pub fn resolve_query<'a>(ns: &'a Namespace, filter: &PartitionFilter) -> Vec<&'a PartitionInfo> {
    ns.manifest()
        .discovered_partitions
        .iter()
        .filter(|p| {
            filter.iter().all(|(key, want)| match p.values.get(key) {
                None => true,
                Some(actual) => want.matches(actual),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DerivationRegistry, FieldSchema, FieldType};
    use crate::manifest::DataFormat;
    use tempfile::TempDir;

    fn year_country_schema() -> PartitionSchema {
        let mut fields = HashMap::new();
        fields.insert(
            "year".to_string(),
            FieldSchema {
                field_type: FieldType::String,
                pattern: None,
                required: true,
                default_value: None,
                derive_from_data: None,
                description: None,
            },
        );
        fields.insert(
            "country".to_string(),
            FieldSchema {
                field_type: FieldType::String,
                pattern: None,
                required: true,
                default_value: None,
                derive_from_data: None,
                description: None,
            },
        );
        PartitionSchema::new(vec!["year".to_string(), "country".to_string()], fields)
    }

    #[test]
    fn build_path_skips_absent_keys() {
        let schema = year_country_schema();
        let mut values = HashMap::new();
        values.insert("year".to_string(), "2025".to_string());
        assert_eq!(build_path(&schema, &values), "year=2025");
    }

    #[test]
    fn ensure_exists_twice_does_not_duplicate() {
        let dir = TempDir::new().unwrap();
        let registry = DerivationRegistry::new();
        let mut ns = Namespace::create(dir.path(), "ns", year_country_schema(), DataFormat::Jsonl, None, None, &registry).unwrap();
        let mut values = HashMap::new();
        values.insert("year".to_string(), "2025".to_string());
        values.insert("country".to_string(), "US".to_string());
        ensure_exists(&mut ns, &values).unwrap();
        ensure_exists(&mut ns, &values).unwrap();
        assert_eq!(ns.manifest().discovered_partitions.len(), 1);
        assert!(ns.data_dir().join("year=2025/country=US/data.jsonl").exists());
    }

    #[test]
    fn resolve_query_matches_scalar_and_sequence_and_ignores_unknown_keys() {
        let dir = TempDir::new().unwrap();
        let registry = DerivationRegistry::new();
        let mut ns = Namespace::create(dir.path(), "ns", year_country_schema(), DataFormat::Jsonl, None, None, &registry).unwrap();
        for (year, country) in [("2024", "US"), ("2025", "US"), ("2025", "FR")] {
            let mut values = HashMap::new();
            values.insert("year".to_string(), year.to_string());
            values.insert("country".to_string(), country.to_string());
            ensure_exists(&mut ns, &values).unwrap();
        }

        let mut filter = PartitionFilter::new();
        filter.insert("year".to_string(), FilterValue::Scalar("2025".to_string()));
        let matched = resolve_query(&ns, &filter);
        assert_eq!(matched.len(), 2);

        let mut seq_filter = PartitionFilter::new();
        seq_filter.insert(
            "country".to_string(),
            FilterValue::Many(vec!["US".to_string(), "FR".to_string()]),
        );
        assert_eq!(resolve_query(&ns, &seq_filter).len(), 3);

        let mut unknown_filter = PartitionFilter::new();
        unknown_filter.insert("region".to_string(), FilterValue::Scalar("NA".to_string()));
        assert_eq!(resolve_query(&ns, &unknown_filter).len(), 3);
    }
}
