//! Namespace-manifest manager (C4): creates namespaces, persists the
//! manifest document, and walks the on-disk tree to rediscover partitions.
//!
//! Grounded on the teacher's `core::timeseries::metadata::TableMetadata`
//! (save/load/exists over a `_table/metadata.json` sidecar) and
//! `table::table::Table::scan_partitions` (recursive `key=value` directory
//! walk accumulating a partition-value map as it descends).

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};
use crate::schema::{DerivationRegistry, PartitionSchema};
use crate::store::{self, WriteOptions};
use crate::validate::DocumentSchema;

const MANIFEST_FILENAME: &str = "namespace.meta.json";
const DATA_DIRNAME: &str = "data";
const MANIFEST_VERSION: &str = "1";

/// On-disk data format for partition files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataFormat {
    Jsonl,
    Json,
}

impl DataFormat {
    pub fn file_name(self) -> &'static str {
        match self {
            DataFormat::Jsonl => "data.jsonl",
            DataFormat::Json => "data.json",
        }
    }
}

/// A discovered partition and its cached statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionInfo {
    pub path: String,
    pub values: HashMap<String, String>,
    pub created: DateTime<Utc>,
    #[serde(rename = "itemCount")]
    pub item_count: u64,
    #[serde(rename = "lastUpdated")]
    pub last_updated: DateTime<Utc>,
    #[serde(rename = "sizeBytes")]
    pub size_bytes: u64,
}

/// The persisted namespace manifest: schema, format, and the cached list
/// of discovered partitions with statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceManifest {
    #[serde(rename = "namespace")]
    pub name: String,
    pub version: String,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
    #[serde(rename = "partitionSchema")]
    pub partition_schema: PartitionSchema,
    #[serde(rename = "discoveredPartitions")]
    pub discovered_partitions: Vec<PartitionInfo>,
    #[serde(rename = "dataFormat")]
    pub data_format: DataFormat,
    #[serde(rename = "itemSchema", skip_serializing_if = "Option::is_none")]
    pub item_schema: Option<DocumentSchema>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub custom: Option<Value>,
}

/// Owns one namespace: its manifest and the base directory it lives under.
pub struct Namespace {
    base: PathBuf,
    manifest: NamespaceManifest,
}

impl Namespace {
    /// Create a namespace. Fails if a manifest already exists at
    /// `<base>/<name>/namespace.meta.json`.
    pub fn create(
        base: impl Into<PathBuf>,
        name: impl Into<String>,
        schema: PartitionSchema,
        data_format: DataFormat,
        item_schema: Option<DocumentSchema>,
        custom: Option<Value>,
        registry: &DerivationRegistry,
    ) -> Result<Self> {
        let base = base.into();
        let name = name.into();
        schema.validate_schema(registry)?;

        let manifest_path = manifest_path(&base, &name);
        if manifest_path.exists() {
            return Err(Error::AlreadyExists(format!(
                "namespace '{name}' already exists at {}",
                manifest_path.display()
            )));
        }

        fs::create_dir_all(data_dir(&base, &name)).map_err(|e| store::io_error(&base, e))?;

        let now = Utc::now();
        let manifest = NamespaceManifest {
            name: name.clone(),
            version: MANIFEST_VERSION.to_string(),
            created: now,
            updated: now,
            partition_schema: schema,
            discovered_partitions: Vec::new(),
            data_format,
            item_schema,
            custom,
        };

        log::debug!("creating namespace '{name}' at {}", base.display());
        let mut ns = Self { base, manifest };
        ns.save()?;
        Ok(ns)
    }

    /// Load an existing namespace's manifest from disk.
    pub fn open(base: impl Into<PathBuf>, name: impl Into<String>) -> Result<Self> {
        let base = base.into();
        let name = name.into();
        let manifest = read_manifest(&manifest_path(&base, &name))?;
        Ok(Self { base, manifest })
    }

    /// Open a namespace, rediscovering partitions from disk immediately
    /// when `config.discover_on_open` is set.
    pub fn open_with_config(
        base: impl Into<PathBuf>,
        name: impl Into<String>,
        config: &crate::config::StoreConfig,
    ) -> Result<Self> {
        let mut ns = Self::open(base, name)?;
        if config.discover_on_open {
            ns.discover()?;
        }
        Ok(ns)
    }

    pub fn manifest(&self) -> &NamespaceManifest {
        &self.manifest
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    pub fn data_dir(&self) -> PathBuf {
        data_dir(&self.base, &self.manifest.name)
    }

    pub fn manifest_path(&self) -> PathBuf {
        manifest_path(&self.base, &self.manifest.name)
    }

    /// Persist the manifest: bump `updated`, write atomically with a
    /// backup copy, per spec.md §4.4.
    pub fn save(&mut self) -> Result<()> {
        self.manifest.updated = Utc::now();
        let value = serde_json::to_value(&self.manifest)?;
        store::write_document(
            &self.manifest_path(),
            &value,
            &WriteOptions {
                pretty: true,
                create_parents: true,
                overwrite: true,
                backup: true,
                ..WriteOptions::default()
            },
        )
    }

    /// Revalidate and replace the partition schema. Does not move data by
    /// itself — only [`crate::reorg`] relocates records; this should only
    /// be called from within a split/merge job.
    pub fn update_schema(&mut self, schema: PartitionSchema, registry: &DerivationRegistry) -> Result<()> {
        schema.validate_schema(registry)?;
        self.manifest.partition_schema = schema;
        self.save()
    }

    pub fn add_partition(&mut self, info: PartitionInfo) -> Result<()> {
        if self.manifest.discovered_partitions.iter().any(|p| p.path == info.path) {
            return Ok(());
        }
        self.manifest.discovered_partitions.push(info);
        self.save()
    }

    pub fn remove_partition(&mut self, path: &str) -> Result<()> {
        self.manifest.discovered_partitions.retain(|p| p.path != path);
        self.save()
    }

    /// Apply `update` to the partition at `path`, refreshing `last_updated`.
    pub fn update_partition(&mut self, path: &str, update: impl FnOnce(&mut PartitionInfo)) -> Result<()> {
        let Some(info) = self.manifest.discovered_partitions.iter_mut().find(|p| p.path == path) else {
            return Err(Error::NotFound(format!("partition '{path}' is not discovered")));
        };
        update(info);
        info.last_updated = Utc::now();
        self.save()
    }

    /// Recursively rediscover partitions from the on-disk tree, replacing
    /// `discovered_partitions`, and persist the refreshed manifest.
    pub fn discover(&mut self) -> Result<()> {
        log::debug!("rediscovering partitions for namespace '{}'", self.manifest.name);
        let mut found = Vec::new();
        let data_root = self.data_dir();
        if data_root.exists() {
            walk(
                &data_root,
                &self.manifest.partition_schema.order,
                self.manifest.data_format,
                &mut HashMap::new(),
                &mut Vec::new(),
                &mut found,
            )?;
        }
        self.manifest.discovered_partitions = found;
        self.save()
    }

    /// Keep only the `keep` most recent manifest backups, deleting older
    /// ones. Supplements spec.md §9's acknowledged backup-proliferation
    /// gap; grounded on the retention-by-age-and-count shape in the
    /// teacher's `lifecycle`/`retention` modules.
    pub fn prune_backups(&self, keep: usize) -> Result<()> {
        let dir = self.manifest_path().parent().map(Path::to_path_buf).unwrap_or_default();
        let prefix = format!("{MANIFEST_FILENAME}.backup.");
        let mut backups: Vec<PathBuf> = fs::read_dir(&dir)
            .map_err(|e| store::io_error(&dir, e))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.file_name().map(|n| n.to_string_lossy().starts_with(&prefix)).unwrap_or(false))
            .collect();
        backups.sort();
        if backups.len() > keep {
            for stale in &backups[..backups.len() - keep] {
                store::delete(stale)?;
            }
        }
        Ok(())
    }
}

fn manifest_path(base: &Path, name: &str) -> PathBuf {
    base.join(name).join(MANIFEST_FILENAME)
}

fn data_dir(base: &Path, name: &str) -> PathBuf {
    base.join(name).join(DATA_DIRNAME)
}

fn read_manifest(path: &Path) -> Result<NamespaceManifest> {
    let value = store::read_document(path)?;
    serde_json::from_value(value).map_err(Error::BadJson)
}

#[allow(clippy::too_many_arguments)]
fn walk(
    dir: &Path,
    order: &[String],
    format: DataFormat,
    current_values: &mut HashMap<String, String>,
    current_path: &mut Vec<String>,
    out: &mut Vec<PartitionInfo>,
) -> Result<()> {
    let depth = current_path.len();

    if depth == order.len() {
        let data_path = dir.join(format.file_name());
        if data_path.exists() {
            let stat = store::stat(&data_path)?;
            let item_count = count_items(&data_path, format)?;
            out.push(PartitionInfo {
                path: current_path.join("/"),
                values: current_values.clone(),
                created: stat.created.unwrap_or_else(Utc::now),
                item_count,
                last_updated: stat.modified.unwrap_or_else(Utc::now),
                size_bytes: stat.size_bytes,
            });
        }
        return Ok(());
    }

    let expected_key = &order[depth];
    let entries = fs::read_dir(dir).map_err(|e| store::io_error(dir, e))?;
    for entry in entries {
        let entry = entry.map_err(|e| store::io_error(dir, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
        let Some((key, value)) = name.split_once('=') else { continue };
        if key != expected_key {
            continue;
        }
        current_values.insert(key.to_string(), value.to_string());
        current_path.push(name.to_string());
        walk(&path, order, format, current_values, current_path, out)?;
        current_path.pop();
        current_values.remove(key);
    }
    Ok(())
}

/// Supplements spec.md §9's acknowledged gap: `data.json` item counts are
/// parsed rather than left at zero.
fn count_items(path: &Path, format: DataFormat) -> Result<u64> {
    match format {
        DataFormat::Jsonl => store::count(path),
        DataFormat::Json => {
            let value = store::read_document(path)?;
            let len = match value {
                Value::Array(items) => items.len(),
                Value::Object(map) => match map.get("items") {
                    Some(Value::Array(items)) => items.len(),
                    _ => 0,
                },
                _ => 0,
            };
            Ok(len as u64)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldSchema, FieldType};
    use serde_json::json;
    use tempfile::TempDir;

    fn channel_schema() -> PartitionSchema {
        let mut fields = HashMap::new();
        fields.insert(
            "channel".to_string(),
            FieldSchema {
                field_type: FieldType::String,
                pattern: None,
                required: true,
                default_value: None,
                derive_from_data: None,
                description: None,
            },
        );
        PartitionSchema::new(vec!["channel".to_string()], fields)
    }

    #[test]
    fn create_then_open_round_trips() {
        let dir = TempDir::new().unwrap();
        let registry = DerivationRegistry::new();
        Namespace::create(
            dir.path(),
            "transactions",
            channel_schema(),
            DataFormat::Jsonl,
            None,
            None,
            &registry,
        )
        .unwrap();

        let ns = Namespace::open(dir.path(), "transactions").unwrap();
        assert_eq!(ns.manifest().name, "transactions");
        assert_eq!(ns.manifest().discovered_partitions.len(), 0);
    }

    #[test]
    fn create_twice_fails_with_already_exists() {
        let dir = TempDir::new().unwrap();
        let registry = DerivationRegistry::new();
        Namespace::create(dir.path(), "ns", channel_schema(), DataFormat::Jsonl, None, None, &registry).unwrap();
        let result = Namespace::create(dir.path(), "ns", channel_schema(), DataFormat::Jsonl, None, None, &registry);
        assert!(matches!(result, Err(Error::AlreadyExists(_))));
    }

    #[test]
    fn discover_finds_partitions_written_directly_to_disk() {
        let dir = TempDir::new().unwrap();
        let registry = DerivationRegistry::new();
        let mut ns = Namespace::create(dir.path(), "ns", channel_schema(), DataFormat::Jsonl, None, None, &registry).unwrap();

        let partition_dir = ns.data_dir().join("channel=101");
        fs::create_dir_all(&partition_dir).unwrap();
        fs::write(partition_dir.join("data.jsonl"), "{\"id\":1}\n{\"id\":2}\n").unwrap();

        ns.discover().unwrap();
        assert_eq!(ns.manifest().discovered_partitions.len(), 1);
        let info = &ns.manifest().discovered_partitions[0];
        assert_eq!(info.path, "channel=101");
        assert_eq!(info.item_count, 2);
        assert_eq!(info.values.get("channel").unwrap(), "101");
    }

    #[test]
    fn discover_counts_json_array_items() {
        let dir = TempDir::new().unwrap();
        let registry = DerivationRegistry::new();
        let mut ns = Namespace::create(dir.path(), "ns", channel_schema(), DataFormat::Json, None, None, &registry).unwrap();

        let partition_dir = ns.data_dir().join("channel=101");
        fs::create_dir_all(&partition_dir).unwrap();
        fs::write(partition_dir.join("data.json"), serde_json::to_string(&json!([{"id": 1}, {"id": 2}, {"id": 3}])).unwrap()).unwrap();

        ns.discover().unwrap();
        assert_eq!(ns.manifest().discovered_partitions[0].item_count, 3);
    }

    #[test]
    fn ensure_exists_called_twice_does_not_duplicate_entry() {
        let dir = TempDir::new().unwrap();
        let registry = DerivationRegistry::new();
        let mut ns = Namespace::create(dir.path(), "ns", channel_schema(), DataFormat::Jsonl, None, None, &registry).unwrap();
        let info = PartitionInfo {
            path: "channel=101".to_string(),
            values: HashMap::from([("channel".to_string(), "101".to_string())]),
            created: Utc::now(),
            item_count: 0,
            last_updated: Utc::now(),
            size_bytes: 0,
        };
        ns.add_partition(info.clone()).unwrap();
        ns.add_partition(info).unwrap();
        assert_eq!(ns.manifest().discovered_partitions.len(), 1);
    }

    #[test]
    fn save_is_followed_by_a_backup_file() {
        let dir = TempDir::new().unwrap();
        let registry = DerivationRegistry::new();
        let mut ns = Namespace::create(dir.path(), "ns", channel_schema(), DataFormat::Jsonl, None, None, &registry).unwrap();
        ns.save().unwrap();
        let backups: Vec<_> = fs::read_dir(dir.path().join("ns"))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().contains(".backup."))
            .collect();
        assert!(!backups.is_empty());
    }
}
