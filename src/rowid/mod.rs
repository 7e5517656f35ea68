//! RowId codec (C5): generate and parse composite identifiers that embed
//! the full partition tuple plus a unique suffix.

mod suffix;

pub use suffix::{SuffixFormat, SuffixGenerator, SuffixGenerators};

use std::collections::HashMap;

use serde_json::Value;

use crate::error::{Error, Result};
use crate::schema::{DerivationRegistry, PartitionSchema};

/// The parsed form of a RowId: the partition tuple in schema order, the
/// `key=value/...` partition path it encodes, and the trailing suffix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRowId {
    pub rowid: String,
    pub values_in_order: Vec<String>,
    pub path: String,
    pub suffix: String,
    pub map: HashMap<String, String>,
}

/// Codec configuration: separator character, whether generated RowIds
/// carry `key=` prefixes, and the default suffix grammar.
pub struct RowIdCodec {
    separator: String,
    include_keys: bool,
    default_suffix_format: SuffixFormat,
    generators: SuffixGenerators,
}

impl Default for RowIdCodec {
    fn default() -> Self {
        Self {
            separator: ".".to_string(),
            include_keys: false,
            default_suffix_format: SuffixFormat::Uuid,
            generators: SuffixGenerators::default(),
        }
    }
}

impl RowIdCodec {
    pub fn new(separator: impl Into<String>, include_keys: bool, default_suffix_format: SuffixFormat) -> Self {
        Self {
            separator: separator.into(),
            include_keys,
            default_suffix_format,
            generators: SuffixGenerators::default(),
        }
    }

    pub fn with_generators(mut self, generators: SuffixGenerators) -> Self {
        self.generators = generators;
        self
    }

    pub fn separator(&self) -> &str {
        &self.separator
    }

    /// Generate a RowId from an already-validated partition value tuple.
    /// `suffix_format` overrides the codec's default for this call only.
    pub fn generate(
        &self,
        schema: &PartitionSchema,
        values: &HashMap<String, String>,
        suffix_format: Option<SuffixFormat>,
    ) -> Result<String> {
        let mut parts = Vec::with_capacity(schema.order.len() + 1);
        for key in &schema.order {
            let value = values
                .get(key)
                .ok_or_else(|| Error::RowIdInvalid(format!("missing value for partition key '{key}'")))?;
            if self.include_keys {
                parts.push(format!("{key}={value}"));
            } else {
                parts.push(value.clone());
            }
        }
        let suffix = self.generators.generate(suffix_format.unwrap_or(self.default_suffix_format));
        parts.push(suffix);
        Ok(parts.join(&self.separator))
    }

    /// Derive partition values from `record` (record field, then default,
    /// then `derive_from_data`, else error if required) and generate a
    /// RowId from them.
    pub fn generate_from_record(
        &self,
        schema: &PartitionSchema,
        record: &Value,
        registry: &DerivationRegistry,
        suffix_format: Option<SuffixFormat>,
    ) -> Result<String> {
        let validation = schema.validate_record(record, registry);
        if !validation.is_valid() {
            return Err(Error::ValidationFailed(validation));
        }
        self.generate(schema, &validation.partition_values, suffix_format)
    }

    /// Parse a RowId against `schema`. Requires exactly `order.len() + 1`
    /// separator-delimited parts; each partition segment's `key=` prefix
    /// (if present) must match the schema's key name at that position.
    pub fn parse(&self, rowid: &str, schema: &PartitionSchema) -> Result<ParsedRowId> {
        let parts: Vec<&str> = rowid.split(self.separator.as_str()).collect();
        let expected = schema.order.len() + 1;
        if parts.len() != expected {
            return Err(Error::RowIdInvalid(format!(
                "expected {expected} parts separated by '{}', found {}",
                self.separator,
                parts.len()
            )));
        }

        let mut values_in_order = Vec::with_capacity(schema.order.len());
        let mut map = HashMap::new();
        let mut path_segments = Vec::with_capacity(schema.order.len());

        for (i, key) in schema.order.iter().enumerate() {
            let part = parts[i];
            let value = match part.split_once('=') {
                Some((k, v)) => {
                    if k != key {
                        return Err(Error::RowIdInvalid(format!(
                            "expected key '{key}' at position {i}, found '{k}'"
                        )));
                    }
                    v
                }
                None => part,
            };
            values_in_order.push(value.to_string());
            map.insert(key.clone(), value.to_string());
            path_segments.push(format!("{key}={value}"));
        }

        let suffix = parts[schema.order.len()].to_string();

        Ok(ParsedRowId {
            rowid: rowid.to_string(),
            values_in_order,
            path: path_segments.join("/"),
            suffix,
            map,
        })
    }

    /// Parse `rowid` and additionally require every key whose schema
    /// declares a `pattern` to match the parsed value. Any parse or
    /// pattern failure yields `false`.
    pub fn validate(&self, rowid: &str, schema: &PartitionSchema) -> bool {
        let Ok(parsed) = self.parse(rowid, schema) else {
            return false;
        };
        for key in &schema.order {
            let Some(field) = schema.field(key) else { return false };
            if let Some(pattern) = &field.pattern {
                let Ok(re) = regex::Regex::new(pattern) else { return false };
                let Some(value) = parsed.map.get(key) else { return false };
                if !re.is_match(value) {
                    return false;
                }
            }
        }
        true
    }

    /// The `key=value/...` partition path a RowId encodes, without
    /// building the full [`ParsedRowId`].
    pub fn partition_path_from_rowid(&self, rowid: &str, schema: &PartitionSchema) -> Result<String> {
        self.parse(rowid, schema).map(|p| p.path)
    }

    /// Fast path: the trailing suffix, via a plain split (no schema needed).
    pub fn suffix_from_rowid(&self, rowid: &str) -> Option<String> {
        rowid.rsplit_once(self.separator.as_str()).map(|(_, suffix)| suffix.to_string())
    }

    /// Re-join a `key=value/key=value` partition path and a suffix into a
    /// RowId string, honoring this codec's separator and `include_keys`.
    pub fn rowid_from_path_and_suffix(&self, path: &str, suffix: &str) -> Result<String> {
        let mut parts = Vec::new();
        for segment in path.split('/') {
            if segment.is_empty() {
                continue;
            }
            let Some((key, value)) = segment.split_once('=') else {
                return Err(Error::RowIdInvalid(format!("invalid partition path segment: '{segment}'")));
            };
            if self.include_keys {
                parts.push(format!("{key}={value}"));
            } else {
                parts.push(value.to_string());
            }
        }
        parts.push(suffix.to_string());
        Ok(parts.join(&self.separator))
    }
}
