//! Split: insert a new partition level derived from each record.

use std::collections::HashMap;
use std::fs;

use chrono::Utc;
use serde_json::Value;

use super::{ReorgIssue, ReorgOperation, ReorgReport, Timer};
use crate::error::{Error, Result};
use crate::manifest::{Namespace, PartitionInfo};
use crate::resolver::{read_partition, write_partition};
use crate::schema::{DerivationRegistry, FieldSchema, FieldType};
use crate::store;

/// Declares the new partition key a split inserts. `derive_from_data` is
/// mandatory: every record must be able to compute a value for the new
/// key, since there is no source field for it yet.
#[derive(Debug, Clone)]
pub struct SplitConfig {
    pub new_key: String,
    pub position: usize,
    pub field_type: FieldType,
    pub pattern: Option<String>,
    pub required: bool,
    pub default_value: Option<Value>,
    pub description: Option<String>,
    pub derive_from_data: String,
}

fn insert_segment(path: &str, position: usize, new_key: &str, value: &str) -> String {
    let mut segments: Vec<String> = path.split('/').filter(|s| !s.is_empty()).map(str::to_string).collect();
    let at = position.min(segments.len());
    segments.insert(at, format!("{new_key}={value}"));
    segments.join("/")
}

/// Run the split job. On success (`dry_run = false`), every original
/// partition file is replaced by one or more reshaped partition files and
/// the manifest's `order`/`fields` gain the new key.
pub fn run_split(ns: &mut Namespace, registry: &DerivationRegistry, config: &SplitConfig, dry_run: bool) -> Result<ReorgReport> {
    let timer = Timer::start();

    let derive = registry
        .get(&config.derive_from_data)
        .ok_or_else(|| Error::SchemaInvalid(format!("unregistered derivation '{}'", config.derive_from_data)))?
        .clone();
    let pattern = config
        .pattern
        .as_ref()
        .map(|p| regex::Regex::new(p))
        .transpose()
        .map_err(|e| Error::SchemaInvalid(format!("invalid pattern for '{}': {e}", config.new_key)))?;

    let format = ns.manifest().data_format;
    let original_partitions = ns.manifest().discovered_partitions.clone();

    let mut errors = Vec::new();
    let mut items_processed: u64 = 0;
    // new path -> (values map, records)
    let mut groups: HashMap<String, (HashMap<String, String>, Vec<Value>)> = HashMap::new();

    for partition in &original_partitions {
        let data_path = ns.data_dir().join(&partition.path).join(format.file_name());
        let records = match read_partition(&data_path, format) {
            Ok(r) => r,
            Err(e) => {
                errors.push(ReorgIssue {
                    partition: partition.path.clone(),
                    message: format!("failed to read partition: {e}"),
                    recoverable: false,
                });
                continue;
            }
        };

        for record in records {
            items_processed += 1;

            let derived = match derive(&record) {
                Ok(v) => v,
                Err(e) => {
                    errors.push(ReorgIssue {
                        partition: partition.path.clone(),
                        message: format!("derivation failed: {e}"),
                        recoverable: true,
                    });
                    continue;
                }
            };
            let stringified = match &derived {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                other => {
                    errors.push(ReorgIssue {
                        partition: partition.path.clone(),
                        message: format!("derived value is not a scalar: {other}"),
                        recoverable: true,
                    });
                    continue;
                }
            };
            if let Some(re) = &pattern {
                if !re.is_match(&stringified) {
                    errors.push(ReorgIssue {
                        partition: partition.path.clone(),
                        message: format!("derived value '{stringified}' does not match pattern"),
                        recoverable: true,
                    });
                    continue;
                }
            }

            let new_path = insert_segment(&partition.path, config.position, &config.new_key, &stringified);
            let entry = groups.entry(new_path).or_insert_with(|| {
                let mut values = partition.values.clone();
                values.insert(config.new_key.clone(), stringified.clone());
                (values, Vec::new())
            });
            entry.1.push(record);
        }
    }

    let partitions_created = groups.len() as u64;
    let partitions_deleted = if dry_run { 0 } else { original_partitions.len() as u64 };

    if !dry_run {
        for (new_path, (values, records)) in &groups {
            let dir = ns.data_dir().join(new_path);
            if let Err(e) = fs::create_dir_all(&dir) {
                errors.push(ReorgIssue {
                    partition: new_path.clone(),
                    message: format!("failed to create partition directory: {e}"),
                    recoverable: false,
                });
                continue;
            }
            let data_path = dir.join(format.file_name());
            if let Err(e) = write_partition(&data_path, format, records) {
                errors.push(ReorgIssue {
                    partition: new_path.clone(),
                    message: format!("failed to write reshaped partition: {e}"),
                    recoverable: false,
                });
                continue;
            }
            let stat = store::stat(&data_path)?;
            let info = PartitionInfo {
                path: new_path.clone(),
                values: values.clone(),
                created: stat.created.unwrap_or_else(Utc::now),
                item_count: records.len() as u64,
                last_updated: stat.modified.unwrap_or_else(Utc::now),
                size_bytes: stat.size_bytes,
            };
            ns.add_partition(info)?;
        }

        for partition in &original_partitions {
            let old_path = ns.data_dir().join(&partition.path).join(format.file_name());
            store::delete(&old_path)?;
            ns.remove_partition(&partition.path)?;
        }

        let mut schema = ns.manifest().partition_schema.clone();
        let at = config.position.min(schema.order.len());
        schema.order.insert(at, config.new_key.clone());
        schema.fields.insert(
            config.new_key.clone(),
            FieldSchema {
                field_type: config.field_type,
                pattern: config.pattern.clone(),
                required: config.required,
                default_value: config.default_value.clone(),
                derive_from_data: Some(config.derive_from_data.clone()),
                description: config.description.clone(),
            },
        );
        ns.update_schema(schema, registry)?;
        ns.discover()?;
    }

    log::debug!(
        "split '{}' processed {} partition(s), {} item(s), {} error(s)",
        config.new_key,
        original_partitions.len(),
        items_processed,
        errors.len()
    );

    let success = !errors.iter().any(|e| !e.recoverable);
    Ok(ReorgReport {
        success,
        operation: ReorgOperation::Split,
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
    use crate::schema::PartitionSchema;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn year_country_schema() -> PartitionSchema {
        let mut fields = HashMap::new();
        fields.insert(
            "year".to_string(),
            FieldSchema { field_type: FieldType::String, pattern: None, required: true, default_value: None, derive_from_data: None, description: None },
        );
        fields.insert(
            "country".to_string(),
            FieldSchema { field_type: FieldType::String, pattern: None, required: true, default_value: None, derive_from_data: None, description: None },
        );
        PartitionSchema::new(vec!["year".to_string(), "country".to_string()], fields)
    }

    #[test]
    fn split_inserts_region_between_year_and_country() {
        let dir = TempDir::new().unwrap();
        let mut registry = DerivationRegistry::new();
        registry.register(
            "region_from_country",
            Arc::new(|record: &Value| {
                Ok(json!(if record.get("country") == Some(&json!("US")) { "NA" } else { "OTHER" }))
            }),
        );

        let mut ns = Namespace::create(dir.path(), "ns", year_country_schema(), DataFormat::Jsonl, None, None, &registry).unwrap();
        let mut values = HashMap::new();
        values.insert("year".to_string(), "2025".to_string());
        values.insert("country".to_string(), "US".to_string());
        router::ensure_exists(&mut ns, &values).unwrap();
        let data_path = ns.data_dir().join("year=2025/country=US/data.jsonl");
        std::fs::write(&data_path, "{\"year\":\"2025\",\"country\":\"US\",\"amount\":100}\n").unwrap();
        ns.discover().unwrap();

        let config = SplitConfig {
            new_key: "region".to_string(),
            position: 1,
            field_type: FieldType::String,
            pattern: None,
            required: true,
            default_value: None,
            description: None,
            derive_from_data: "region_from_country".to_string(),
        };
        let report = run_split(&mut ns, &registry, &config, false).unwrap();

        assert!(report.success);
        assert_eq!(report.partitions_processed, 1);
        assert_eq!(report.items_processed, 1);
        assert_eq!(report.partitions_created, 1);
        assert_eq!(report.partitions_deleted, 1);
        assert!(report.errors.is_empty());
        assert!(ns.data_dir().join("year=2025/region=NA/country=US/data.jsonl").exists());
        assert!(!ns.data_dir().join("year=2025/country=US/data.jsonl").exists());
        assert_eq!(ns.manifest().partition_schema.order, vec!["year", "region", "country"]);
    }

    #[test]
    fn dry_run_split_leaves_filesystem_untouched() {
        let dir = TempDir::new().unwrap();
        let mut registry = DerivationRegistry::new();
        registry.register("region_from_country", Arc::new(|_: &Value| Ok(json!("NA"))));

        let mut ns = Namespace::create(dir.path(), "ns", year_country_schema(), DataFormat::Jsonl, None, None, &registry).unwrap();
        let mut values = HashMap::new();
        values.insert("year".to_string(), "2025".to_string());
        values.insert("country".to_string(), "US".to_string());
        router::ensure_exists(&mut ns, &values).unwrap();
        let data_path = ns.data_dir().join("year=2025/country=US/data.jsonl");
        std::fs::write(&data_path, "{\"year\":\"2025\",\"country\":\"US\"}\n").unwrap();
        ns.discover().unwrap();

        let config = SplitConfig {
            new_key: "region".to_string(),
            position: 1,
            field_type: FieldType::String,
            pattern: None,
            required: true,
            default_value: None,
            description: None,
            derive_from_data: "region_from_country".to_string(),
        };
        let report = run_split(&mut ns, &registry, &config, true).unwrap();
        assert_eq!(report.partitions_deleted, 0);
        assert!(data_path.exists());
        assert_eq!(ns.manifest().partition_schema.order, vec!["year", "country"]);
    }
}
