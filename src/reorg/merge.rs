//! Merge: remove a partition level, concatenating every partition that
//! collapses onto the same path.

use std::collections::HashMap;
use std::fs;

use chrono::Utc;

use super::{ReorgIssue, ReorgOperation, ReorgReport, Timer};
use crate::error::{Error, Result};
use crate::manifest::{Namespace, PartitionInfo};
use crate::resolver::{read_partition, write_partition};
use crate::schema::DerivationRegistry;
use crate::store;

fn collapse_path(path: &str, position: usize) -> String {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    segments
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != position)
        .map(|(_, s)| *s)
        .collect::<Vec<_>>()
        .join("/")
}

/// Run the merge job: drop `key_to_remove` from the partition schema and
/// from every partition path, concatenating records that collapse onto
/// the same path.
pub fn run_merge(ns: &mut Namespace, registry: &DerivationRegistry, key_to_remove: &str, dry_run: bool) -> Result<ReorgReport> {
    let timer = Timer::start();

    let schema = ns.manifest().partition_schema.clone();
    let position = schema
        .order
        .iter()
        .position(|k| k == key_to_remove)
        .ok_or_else(|| Error::SchemaInvalid(format!("key '{key_to_remove}' is not in the partition schema")))?;

    let format = ns.manifest().data_format;
    let original_partitions = ns.manifest().discovered_partitions.clone();

    let mut errors = Vec::new();
    let mut items_processed: u64 = 0;
    // collapsed path -> (values without the removed key, member partitions)
    let mut groups: HashMap<String, (std::collections::HashMap<String, String>, Vec<PartitionInfo>)> = HashMap::new();

    for partition in &original_partitions {
        let collapsed = collapse_path(&partition.path, position);
        let entry = groups.entry(collapsed).or_insert_with(|| {
            let mut values = partition.values.clone();
            values.remove(key_to_remove);
            (values, Vec::new())
        });
        entry.1.push(partition.clone());
    }

    let partitions_created = groups.len() as u64;
    let partitions_deleted = if dry_run { 0 } else { original_partitions.len() as u64 };

    for (collapsed_path, (values, members)) in &groups {
        let mut combined = Vec::new();
        for member in members {
            let data_path = ns.data_dir().join(&member.path).join(format.file_name());
            match read_partition(&data_path, format) {
                Ok(records) => {
                    items_processed += records.len() as u64;
                    combined.extend(records);
                }
                Err(e) => {
                    errors.push(ReorgIssue {
                        partition: member.path.clone(),
                        message: format!("failed to read partition: {e}"),
                        recoverable: false,
                    });
                }
            }
        }

        if dry_run {
            continue;
        }

        let dir = ns.data_dir().join(collapsed_path);
        if let Err(e) = fs::create_dir_all(&dir) {
            errors.push(ReorgIssue {
                partition: collapsed_path.clone(),
                message: format!("failed to create collapsed partition directory: {e}"),
                recoverable: false,
            });
            continue;
        }
        let data_path = dir.join(format.file_name());
        if let Err(e) = write_partition(&data_path, format, &combined) {
            errors.push(ReorgIssue {
                partition: collapsed_path.clone(),
                message: format!("failed to write collapsed partition: {e}"),
                recoverable: false,
            });
            continue;
        }
        let stat = store::stat(&data_path)?;
        ns.add_partition(PartitionInfo {
            path: collapsed_path.clone(),
            values: values.clone(),
            created: stat.created.unwrap_or_else(Utc::now),
            item_count: combined.len() as u64,
            last_updated: stat.modified.unwrap_or_else(Utc::now),
            size_bytes: stat.size_bytes,
        })?;

        for member in members {
            if member.path == *collapsed_path {
                continue;
            }
            let member_dir = ns.data_dir().join(&member.path);
            let _ = fs::remove_dir_all(&member_dir);
            ns.remove_partition(&member.path)?;
        }
    }

    if !dry_run {
        let mut schema = ns.manifest().partition_schema.clone();
        schema.order.remove(position);
        schema.fields.remove(key_to_remove);
        ns.update_schema(schema, registry)?;
        ns.discover()?;
    }

    log::debug!(
        "merge '{key_to_remove}' processed {} partition(s) into {} group(s), {} error(s)",
        original_partitions.len(),
        partitions_created,
        errors.len()
    );

    let success = !errors.iter().any(|e| !e.recoverable);
    Ok(ReorgReport {
        success,
        operation: ReorgOperation::Merge,
        partitions_processed: original_partitions.len() as u64,
        items_processed,
        partitions_created,
        partitions_deleted,
        elapsed_ms: timer.elapsed_ms(),
        errors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::DataFormat;
    use crate::router;
    use crate::schema::{FieldSchema, FieldType, PartitionSchema};
    use serde_json::json;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn year_region_country_schema() -> PartitionSchema {
        let mut fields = HashMap::new();
        for key in ["year", "region", "country"] {
            fields.insert(
                key.to_string(),
                FieldSchema { field_type: FieldType::String, pattern: None, required: true, default_value: None, derive_from_data: None, description: None },
            );
        }
        PartitionSchema::new(vec!["year".to_string(), "region".to_string(), "country".to_string()], fields)
    }

    #[test]
    fn merge_removes_region_and_concatenates() {
        let dir = TempDir::new().unwrap();
        let registry = DerivationRegistry::new();
        let mut ns = Namespace::create(dir.path(), "ns", year_region_country_schema(), DataFormat::Jsonl, None, None, &registry).unwrap();

        for region in ["NA", "OTHER"] {
            let mut values = HashMap::new();
            values.insert("year".to_string(), "2025".to_string());
            values.insert("region".to_string(), region.to_string());
            values.insert("country".to_string(), "US".to_string());
            router::ensure_exists(&mut ns, &values).unwrap();
            let data_path = ns.data_dir().join(format!("year=2025/region={region}/country=US/data.jsonl"));
            std::fs::write(&data_path, format!("{{\"year\":\"2025\",\"region\":\"{region}\",\"country\":\"US\"}}\n")).unwrap();
        }
        ns.discover().unwrap();

        let report = run_merge(&mut ns, &registry, "region", false).unwrap();
        assert!(report.success);
        assert_eq!(report.partitions_processed, 2);
        assert_eq!(report.items_processed, 2);
        assert_eq!(report.partitions_created, 1);
        assert_eq!(report.partitions_deleted, 2);

        let collapsed = ns.data_dir().join("year=2025/country=US/data.jsonl");
        assert!(collapsed.exists());
        assert!(!ns.data_dir().join("year=2025/region=NA/country=US").exists());
        assert_eq!(ns.manifest().partition_schema.order, vec!["year", "country"]);
        let content = std::fs::read_to_string(&collapsed).unwrap();
        assert_eq!(content.lines().count(), 2);
    }

    #[test]
    fn merge_unknown_key_fails() {
        let dir = TempDir::new().unwrap();
        let registry = DerivationRegistry::new();
        let mut ns = Namespace::create(dir.path(), "ns", year_region_country_schema(), DataFormat::Jsonl, None, None, &registry).unwrap();
        assert!(run_merge(&mut ns, &registry, "nonexistent", false).is_err());
    }
}
