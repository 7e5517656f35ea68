//! Document validator (C2): a small declarative schema over a JSON value
//! tree. Grounded in the same error-accumulation shape as the partition
//! schema validator (`schema` module) but operating on arbitrary documents
//! rather than partition records.

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Root type a document schema may require.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RootType {
    Object,
    Array,
    String,
    Number,
    Boolean,
    Null,
}

impl RootType {
    fn matches(self, value: &Value) -> bool {
        match (self, value) {
            (RootType::Object, Value::Object(_)) => true,
            (RootType::Array, Value::Array(_)) => true,
            (RootType::String, Value::String(_)) => true,
            (RootType::Number, Value::Number(_)) => true,
            (RootType::Boolean, Value::Bool(_)) => true,
            (RootType::Null, Value::Null) => true,
            _ => false,
        }
    }
}

/// Schema for a single object field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub prop_type: RootType,
    /// Applies when `prop_type` is `Array`: schema for each item.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<f64>,
}

/// Declarative document schema.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentSchema {
    #[serde(rename = "type")]
    pub root_type: Option<RootType>,
    #[serde(default)]
    pub required: Vec<String>,
    #[serde(default)]
    pub properties: std::collections::HashMap<String, PropertySchema>,
    /// When `Some(false)`, any object field not named in `properties`
    /// emits an `ADDITIONAL_PROPERTY` warning (not an error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub additional_properties: Option<bool>,
}

/// Severity-tagged validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationError {
    pub path: String,
    pub code: ErrorCode,
    pub expected: String,
    pub actual: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    TypeMismatch,
    /// Distinct from `TypeMismatch` per spec.md §9's open issue: a string
    /// that has the right type but fails its regex. The document
    /// validator's message text stays compatible with `TypeMismatch`
    /// wording; only the code is split out.
    PatternMismatch,
    RequiredFieldMissing,
    BelowMinimum,
    AboveMaximum,
    NullData,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationWarning {
    pub code: WarningCode,
    pub path: String,
    pub suggestion: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WarningCode {
    AdditionalProperty,
}

/// Result of validating a document against a [`DocumentSchema`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

/// Validate `value` against `schema`. `schema = None` always succeeds.
pub fn validate(value: &Value, schema: Option<&DocumentSchema>) -> ValidationOutcome {
    let mut errors = Vec::new();
    let mut warnings = Vec::new();

    if value.is_null() {
        errors.push(ValidationError {
            path: "root".to_string(),
            code: ErrorCode::NullData,
            expected: "non-null".to_string(),
            actual: "null".to_string(),
        });
        return ValidationOutcome {
            valid: false,
            errors,
            warnings,
        };
    }

    let Some(schema) = schema else {
        return ValidationOutcome {
            valid: true,
            errors,
            warnings,
        };
    };

    if let Some(root_type) = schema.root_type {
        if !root_type.matches(value) {
            errors.push(ValidationError {
                path: "root".to_string(),
                code: ErrorCode::TypeMismatch,
                expected: format!("{root_type:?}"),
                actual: type_name(value).to_string(),
            });
            // Mismatch on root type halts further validation.
            return ValidationOutcome {
                valid: false,
                errors,
                warnings,
            };
        }
    }

    if let Value::Object(map) = value {
        for name in &schema.required {
            if !map.contains_key(name) {
                errors.push(ValidationError {
                    path: name.clone(),
                    code: ErrorCode::RequiredFieldMissing,
                    expected: "present".to_string(),
                    actual: "missing".to_string(),
                });
            }
        }

        for (name, field_schema) in &schema.properties {
            if let Some(field_value) = map.get(name) {
                validate_field(name, field_value, field_schema, &mut errors);
            }
        }

        if schema.additional_properties == Some(false) {
            for name in map.keys() {
                if !schema.properties.contains_key(name) {
                    warnings.push(ValidationWarning {
                        code: WarningCode::AdditionalProperty,
                        path: name.clone(),
                        suggestion: format!("remove unexpected field '{name}' or add it to the schema"),
                    });
                }
            }
        }
    }

    ValidationOutcome {
        valid: errors.is_empty(),
        errors,
        warnings,
    }
}

fn validate_field(
    path: &str,
    value: &Value,
    schema: &PropertySchema,
    errors: &mut Vec<ValidationError>,
) {
    if !schema.prop_type.matches(value) {
        errors.push(ValidationError {
            path: path.to_string(),
            code: ErrorCode::TypeMismatch,
            expected: format!("{:?}", schema.prop_type),
            actual: type_name(value).to_string(),
        });
        return;
    }

    match value {
        Value::String(s) => {
            if let Some(pattern) = &schema.pattern {
                match Regex::new(pattern) {
                    Ok(re) if !re.is_match(s) => errors.push(ValidationError {
                        path: path.to_string(),
                        code: ErrorCode::PatternMismatch,
                        expected: format!("match /{pattern}/"),
                        actual: s.clone(),
                    }),
                    Ok(_) => {}
                    Err(_) => errors.push(ValidationError {
                        path: path.to_string(),
                        code: ErrorCode::PatternMismatch,
                        expected: format!("valid pattern /{pattern}/"),
                        actual: s.clone(),
                    }),
                }
            }
        }
        Value::Number(n) => {
            let n = n.as_f64().unwrap_or(f64::NAN);
            if let Some(min) = schema.minimum {
                if n < min {
                    errors.push(ValidationError {
                        path: path.to_string(),
                        code: ErrorCode::BelowMinimum,
                        expected: format!(">= {min}"),
                        actual: n.to_string(),
                    });
                }
            }
            if let Some(max) = schema.maximum {
                if n > max {
                    errors.push(ValidationError {
                        path: path.to_string(),
                        code: ErrorCode::AboveMaximum,
                        expected: format!("<= {max}"),
                        actual: n.to_string(),
                    });
                }
            }
        }
        Value::Array(items) => {
            if let Some(item_schema) = &schema.items {
                for (i, item) in items.iter().enumerate() {
                    validate_field(&format!("{path}[{i}]"), item, item_schema, errors);
                }
            }
        }
        _ => {}
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema_with_required(required: &[&str]) -> DocumentSchema {
        DocumentSchema {
            root_type: Some(RootType::Object),
            required: required.iter().map(|s| s.to_string()).collect(),
            properties: Default::default(),
            additional_properties: None,
        }
    }

    #[test]
    fn null_root_is_null_data() {
        let outcome = validate(&Value::Null, None);
        assert!(!outcome.valid);
        assert_eq!(outcome.errors[0].code, ErrorCode::NullData);
    }

    #[test]
    fn missing_required_field_is_reported() {
        let schema = schema_with_required(&["id"]);
        let outcome = validate(&json!({"other": 1}), Some(&schema));
        assert!(!outcome.valid);
        assert_eq!(outcome.errors[0].code, ErrorCode::RequiredFieldMissing);
        assert_eq!(outcome.errors[0].path, "id");
    }

    #[test]
    fn root_type_mismatch_halts_validation() {
        let schema = DocumentSchema {
            root_type: Some(RootType::Object),
            required: vec!["id".to_string()],
            ..Default::default()
        };
        let outcome = validate(&json!("not an object"), Some(&schema));
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].code, ErrorCode::TypeMismatch);
    }

    #[test]
    fn additional_property_is_a_warning_not_an_error() {
        let mut schema = schema_with_required(&[]);
        schema.additional_properties = Some(false);
        let outcome = validate(&json!({"extra": 1}), Some(&schema));
        assert!(outcome.valid);
        assert_eq!(outcome.warnings[0].code, WarningCode::AdditionalProperty);
    }

    #[test]
    fn number_bounds_are_inclusive() {
        let mut schema = schema_with_required(&[]);
        schema.properties.insert(
            "age".to_string(),
            PropertySchema {
                prop_type: RootType::Number,
                items: None,
                pattern: None,
                minimum: Some(0.0),
                maximum: Some(120.0),
            },
        );
        let ok = validate(&json!({"age": 120}), Some(&schema));
        assert!(ok.valid);
        let too_high = validate(&json!({"age": 121}), Some(&schema));
        assert_eq!(too_high.errors[0].code, ErrorCode::AboveMaximum);
    }

    #[test]
    fn array_items_validated_positionally() {
        let mut schema = schema_with_required(&[]);
        schema.properties.insert(
            "tags".to_string(),
            PropertySchema {
                prop_type: RootType::Array,
                items: Some(Box::new(PropertySchema {
                    prop_type: RootType::String,
                    items: None,
                    pattern: None,
                    minimum: None,
                    maximum: None,
                })),
                pattern: None,
                minimum: None,
                maximum: None,
            },
        );
        let outcome = validate(&json!({"tags": ["a", 2]}), Some(&schema));
        assert_eq!(outcome.errors.len(), 1);
        assert_eq!(outcome.errors[0].path, "tags[1]");
    }
}
