//! JSON Schema validation for generated records.
//!
//! Records produced by output generation are checked against the target
//! schema using JSON Schema Draft 7. The schema is compiled once per run by
//! [`RecordValidator`]; [`validate`] / [`is_valid`] are one-shot helpers.
//!
//! When a mapping set is applied without a schema file,
//! [`schema_from_target_fields`] rebuilds one from the target fields'
//! types, `required` flags and validation fragments.
//!
//! # Example
//!
//! ```rust
//! use serde_json::json;
//! use fieldmap::validation::validate;
//!
//! let schema = json!({
//!     "type": "object",
//!     "required": ["name"],
//!     "properties": { "name": { "type": "string" } }
//! });
//!
//! assert!(validate(&schema, &json!({ "name": "test" })).is_ok());
//! assert!(validate(&schema, &json!({ "age": 42 })).is_err());
//! ```

use serde::Serialize;
use serde_json::{json, Map, Value};

use crate::error::ValidationError;
use crate::models::{TargetField, ValueType};

/// Maximum number of invalid records whose errors are kept in a report.
const MAX_REPORTED: usize = 10;

/// Target schema bundled with the crate, used by the example mapping set.
pub const INVOICE_SCHEMA: &str = include_str!("../../schemas/invoice.schema.json");

/// Validate a JSON value against a JSON schema.
///
/// # Returns
/// * `Ok(())` if valid
/// * `Err(Vec<String>)` with every error otherwise (including a schema that
///   does not compile)
pub fn validate(schema: &Value, data: &Value) -> Result<(), Vec<String>> {
    let validator = RecordValidator::new(schema).map_err(|e| vec![e.to_string()])?;
    validator.validate(data)
}

/// Simpler variant: just true/false.
pub fn is_valid(schema: &Value, data: &Value) -> bool {
    jsonschema::draft7::is_valid(schema, data)
}

/// Validation outcome for a batch of records
#[derive(Debug, Clone, Default, Serialize)]
pub struct ValidationReport {
    pub valid_count: usize,
    pub invalid_count: usize,
    /// (record index, errors), for the first invalid records only
    pub errors: Vec<(usize, Vec<String>)>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.invalid_count == 0
    }
}

/// A compiled target schema.
pub struct RecordValidator {
    validator: jsonschema::Validator,
}

impl RecordValidator {
    pub fn new(schema: &Value) -> Result<Self, ValidationError> {
        let validator =
            jsonschema::draft7::new(schema).map_err(|e| ValidationError::InvalidSchema(e.to_string()))?;
        Ok(Self { validator })
    }

    /// Compile the schema implied by a list of target fields.
    pub fn for_target_fields(fields: &[TargetField]) -> Result<Self, ValidationError> {
        Self::new(&schema_from_target_fields(fields))
    }

    pub fn validate(&self, data: &Value) -> Result<(), Vec<String>> {
        let errors: Vec<String> = self.validator.iter_errors(data).map(|e| e.to_string()).collect();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    pub fn is_valid(&self, data: &Value) -> bool {
        self.validator.is_valid(data)
    }

    /// Validate every record and collect statistics
    pub fn validate_records<'a>(&self, records: impl IntoIterator<Item = &'a Value>) -> ValidationReport {
        let mut report = ValidationReport::default();

        for (i, record) in records.into_iter().enumerate() {
            match self.validate(record) {
                Ok(()) => report.valid_count += 1,
                Err(errors) => {
                    report.invalid_count += 1;
                    if report.errors.len() < MAX_REPORTED {
                        report.errors.push((i, errors));
                    }
                }
            }
        }

        report
    }

    /// Same as [`validate_records`](Self::validate_records) for raw object maps.
    pub fn validate_maps(&self, records: &[Map<String, Value>]) -> ValidationReport {
        let values: Vec<Value> = records.iter().cloned().map(Value::Object).collect();
        self.validate_records(&values)
    }
}

/// Build a Draft 7 object schema from target fields.
///
/// A field's validation fragment wins over its type when present.
pub fn schema_from_target_fields(fields: &[TargetField]) -> Value {
    let properties: Map<String, Value> = fields
        .iter()
        .map(|field| {
            let property = field
                .validation
                .clone()
                .unwrap_or_else(|| type_fragment(field.value_type));
            (field.name.clone(), property)
        })
        .collect();

    let required: Vec<&str> = fields
        .iter()
        .filter(|f| f.required)
        .map(|f| f.name.as_str())
        .collect();

    json!({
        "$schema": "http://json-schema.org/draft-07/schema#",
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

fn type_fragment(value_type: ValueType) -> Value {
    match value_type {
        ValueType::Any => json!({}),
        ValueType::String | ValueType::DateTime => json!({ "type": "string" }),
        ValueType::Integer => json!({ "type": "integer" }),
        ValueType::Decimal => json!({ "type": "number" }),
        ValueType::Boolean => json!({ "type": "boolean" }),
        ValueType::StringArray => json!({ "type": "array", "items": { "type": "string" } }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice_schema() -> Value {
        serde_json::from_str(INVOICE_SCHEMA).unwrap()
    }

    #[test]
    fn test_valid_invoice() {
        let record = json!({
            "invoiceNumber": "INV-1001",
            "amount": 33.01,
            "issuedOn": "2024-03-15T00:00:00",
            "region": "domestic",
            "tags": ["#urgent"]
        });
        assert!(is_valid(&invoice_schema(), &record));
    }

    #[test]
    fn test_invalid_invoice() {
        let record = json!({
            "invoiceNumber": "1001",
            "amount": -4,
            "region": "moon"
        });
        let errors = validate(&invoice_schema(), &record).unwrap_err();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn test_missing_required() {
        let errors = validate(&invoice_schema(), &json!({ "customer": "Doe" })).unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_invalid_schema() {
        let result = RecordValidator::new(&json!({ "type": 12 }));
        assert!(matches!(result, Err(ValidationError::InvalidSchema(_))));
    }

    #[test]
    fn test_validate_records_report() {
        let validator = RecordValidator::new(&invoice_schema()).unwrap();
        let records = vec![
            json!({ "invoiceNumber": "INV-1", "amount": 1 }),
            json!({ "invoiceNumber": "INV-2" }),
            json!({ "invoiceNumber": "INV-3", "amount": 3.5 }),
        ];

        let report = validator.validate_records(&records);
        assert_eq!(report.valid_count, 2);
        assert_eq!(report.invalid_count, 1);
        assert_eq!(report.errors[0].0, 1);
        assert!(!report.is_valid());
    }

    #[test]
    fn test_schema_from_target_fields() {
        let fields = vec![
            TargetField::new("id", ValueType::Integer).required(),
            TargetField::new("tags", ValueType::StringArray),
            TargetField {
                validation: Some(json!({ "type": "string", "maxLength": 3 })),
                ..TargetField::new("code", ValueType::String)
            },
        ];
        let validator = RecordValidator::for_target_fields(&fields).unwrap();

        assert!(validator.is_valid(&json!({ "id": 1, "tags": ["a"], "code": "abc" })));
        assert!(!validator.is_valid(&json!({ "tags": ["a"] })));
        assert!(!validator.is_valid(&json!({ "id": 1, "code": "abcd" })));
        assert!(!validator.is_valid(&json!({ "id": "x" })));
    }
}
