//! Partition schema and its validator (C3).
//!
//! Generalizes the teacher's `table::partition::{PartitionKey, PartitionScheme}`
//! (string/int/date/hour/minute key types, ordered scheme, structural
//! `validate`) to the field vocabulary spec.md's data model calls for
//! (`string`/`number`/`date`, pattern, required, default, derivation) and
//! adds the four record-level error categories spec.md §4.3 names.

mod derive;

pub use derive::{DerivationFn, DerivationRegistry};

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{Error, Result};

/// Declared type of a partition key's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Date,
}

/// Schema for a single partition key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldSchema {
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(rename = "regex", skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(default = "default_true")]
    pub required: bool,
    #[serde(skip_serializing_if = "Option::is_none", rename = "defaultValue")]
    pub default_value: Option<Value>,
    /// Name of a function registered in a [`DerivationRegistry`] the caller
    /// supplies at generate/ingest time. spec.md §9 offers three options
    /// for representing this; this crate takes option (b) — a pluggable
    /// named function — the same shape as the teacher's
    /// `table::rollers::PartitionRoller` trait object.
    #[serde(skip_serializing_if = "Option::is_none", rename = "deriveFromData")]
    pub derive_from_data: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

fn default_true() -> bool {
    true
}

/// Ordered partition schema: the sequence of partition keys plus the field
/// schema for each. Invariant (enforced by [`PartitionSchema::validate_schema`]):
/// every name in `order` has an entry in `fields` and vice versa.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionSchema {
    pub order: Vec<String>,
    #[serde(rename = "partitions")]
    pub fields: HashMap<String, FieldSchema>,
}

impl PartitionSchema {
    pub fn new(order: Vec<String>, fields: HashMap<String, FieldSchema>) -> Self {
        Self { order, fields }
    }

    /// Structural validation: non-empty order, 1:1 correspondence between
    /// `order` and `fields`, every pattern compiles, every
    /// `derive_from_data` name is registered.
    pub fn validate_schema(&self, registry: &DerivationRegistry) -> Result<()> {
        if self.order.is_empty() {
            return Err(Error::SchemaInvalid("order must not be empty".to_string()));
        }
        for key in &self.order {
            if !self.fields.contains_key(key) {
                return Err(Error::SchemaInvalid(format!(
                    "key '{key}' in order has no field schema"
                )));
            }
        }
        for key in self.fields.keys() {
            if !self.order.contains(key) {
                return Err(Error::SchemaInvalid(format!(
                    "field '{key}' is not listed in order"
                )));
            }
        }
        for (key, field) in &self.fields {
            if let Some(pattern) = &field.pattern {
                Regex::new(pattern).map_err(|e| {
                    Error::SchemaInvalid(format!("key '{key}' has invalid pattern '{pattern}': {e}"))
                })?;
            }
            if let Some(name) = &field.derive_from_data {
                if !registry.contains(name) {
                    return Err(Error::SchemaInvalid(format!(
                        "key '{key}' derives from unregistered function '{name}'"
                    )));
                }
            }
        }
        Ok(())
    }

    pub fn field(&self, key: &str) -> Option<&FieldSchema> {
        self.fields.get(key)
    }

    /// Validate `record` and produce the stringified partition-value tuple
    /// plus any record-level errors. Values are always stringified for
    /// partition-path construction, per spec.md §4.3.
    pub fn validate_record(&self, record: &Value, registry: &DerivationRegistry) -> PartitionValidation {
        let mut partition_values = HashMap::new();
        let mut errors = Vec::new();

        for key in &self.order {
            let field = match self.fields.get(key) {
                Some(f) => f,
                None => continue, // unreachable once validate_schema has passed
            };

            let raw = record.get(key).filter(|v| !v.is_null());

            let resolved = match raw {
                Some(v) => Some(v.clone()),
                None => field.default_value.clone().or_else(|| {
                    field
                        .derive_from_data
                        .as_ref()
                        .and_then(|name| registry.get(name).and_then(|f| f(record).ok()))
                }),
            };

            let Some(value) = resolved else {
                if field.required {
                    errors.push(PartitionError {
                        key: key.clone(),
                        kind: PartitionErrorKind::MissingRequired,
                        message: format!("required key '{key}' is missing and has no default or derivation"),
                    });
                }
                continue;
            };

            match check_type(&field.field_type, &value) {
                Ok(stringified) => {
                    if field.field_type == FieldType::Date && !parses_as_timestamp(&stringified) {
                        errors.push(PartitionError {
                            key: key.clone(),
                            kind: PartitionErrorKind::InvalidFormat,
                            message: format!("value '{stringified}' for key '{key}' does not parse as a date"),
                        });
                    } else if let Some(pattern) = &field.pattern {
                        match Regex::new(pattern) {
                            Ok(re) if re.is_match(&stringified) => {}
                            _ => errors.push(PartitionError {
                                key: key.clone(),
                                kind: PartitionErrorKind::RegexMismatch,
                                message: format!(
                                    "value '{stringified}' for key '{key}' does not match /{pattern}/"
                                ),
                            }),
                        }
                    }
                    partition_values.insert(key.clone(), stringified);
                }
                Err(actual_kind) => errors.push(PartitionError {
                    key: key.clone(),
                    kind: PartitionErrorKind::TypeMismatch,
                    message: format!(
                        "key '{key}' declared {:?} but value is {actual_kind}",
                        field.field_type
                    ),
                }),
            }
        }

        PartitionValidation {
            partition_values,
            errors,
        }
    }
}

/// The outcome of [`PartitionSchema::validate_record`].
#[derive(Debug, Clone, Default)]
pub struct PartitionValidation {
    pub partition_values: HashMap<String, String>,
    pub errors: Vec<PartitionError>,
}

impl PartitionValidation {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionError {
    pub key: String,
    pub kind: PartitionErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionErrorKind {
    MissingRequired,
    TypeMismatch,
    InvalidFormat,
    RegexMismatch,
}

/// Check `value` against `field_type`, returning the stringified form on
/// success or the JSON type name actually found on mismatch. `date` fields
/// are declared as strings on the wire; format validity is checked
/// separately by the caller via [`parses_as_timestamp`].
fn check_type(field_type: &FieldType, value: &Value) -> std::result::Result<String, &'static str> {
    match (field_type, value) {
        (FieldType::String, Value::String(s)) => Ok(s.clone()),
        (FieldType::Date, Value::String(s)) => Ok(s.clone()),
        (FieldType::Number, Value::Number(n)) => Ok(n.to_string()),
        _ => Err(json_type_name(value)),
    }
}

fn parses_as_timestamp(s: &str) -> bool {
    chrono::DateTime::parse_from_rfc3339(s).is_ok()
        || chrono::NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok()
        || chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S").is_ok()
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
