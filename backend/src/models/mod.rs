//! Domain models for the mapping engine.
//!
//! This module contains the data structures the engine reads from and writes to:
//!
//! - [`ValueType`] - Type tag carried by cell values and target fields
//! - [`FieldDescriptor`] - A source column (name, inferred type, value set)
//! - [`TableDefinition`] / [`Table`] / [`Record`] / [`Dataset`] - Tabular input
//! - [`TargetField`] / [`TargetSchema`] - Output fields rules are mapped onto

pub mod value;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::HashSet;
use std::sync::Arc;

use crate::error::{MappingError, MappingResult};

// =============================================================================
// Value Type
// =============================================================================

/// Type tag for a cell value, a transformation result or a target field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueType {
    /// No specific type (passes values through untouched).
    #[default]
    Any,
    String,
    Integer,
    Decimal,
    Boolean,
    DateTime,
    /// Ordered list of strings, JSON-encoded on the wire.
    StringArray,
}

impl ValueType {
    /// Type tag of a concrete JSON value.
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null | Value::Object(_) => ValueType::Any,
            Value::String(_) => ValueType::String,
            Value::Number(n) if n.is_i64() || n.is_u64() => ValueType::Integer,
            Value::Number(_) => ValueType::Decimal,
            Value::Bool(_) => ValueType::Boolean,
            Value::Array(_) => ValueType::StringArray,
        }
    }

    /// Infer the narrowest type that fits every non-blank value of a column.
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        let texts: Vec<String> = values
            .into_iter()
            .filter(|v| !value::is_blank(v))
            .map(value::stringify)
            .collect();

        if texts.is_empty() {
            return ValueType::String;
        }
        if texts.iter().all(|t| t.trim().parse::<i64>().is_ok()) {
            ValueType::Integer
        } else if texts.iter().all(|t| value::parse_number(t).is_some()) {
            ValueType::Decimal
        } else if texts.iter().all(|t| value::parse_boolean(t).is_some()) {
            ValueType::Boolean
        } else if texts.iter().all(|t| value::parse_datetime(t).is_some()) {
            ValueType::DateTime
        } else {
            ValueType::String
        }
    }

    /// Convert a value to this type.
    ///
    /// Returns a human-readable reason when the value is not convertible.
    pub fn coerce(&self, input: &Value) -> Result<Value, String> {
        let text = value::stringify(input);
        match self {
            ValueType::Any => Ok(input.clone()),
            ValueType::String => Ok(Value::String(text)),
            ValueType::Integer => match input {
                Value::Number(n) if n.is_i64() || n.is_u64() => Ok(input.clone()),
                _ => value::parse_integer(&text)
                    .map(|n| Value::Number(n.into()))
                    .ok_or_else(|| format!("'{}' is not an integer", text)),
            },
            ValueType::Decimal => value::parse_number(&text)
                .and_then(Number::from_f64)
                .map(Value::Number)
                .ok_or_else(|| format!("'{}' is not a decimal number", text)),
            ValueType::Boolean => match input {
                Value::Bool(_) => Ok(input.clone()),
                _ => value::parse_boolean(&text)
                    .map(Value::Bool)
                    .ok_or_else(|| format!("'{}' is not a boolean", text)),
            },
            ValueType::DateTime => value::parse_datetime(&text)
                .map(|dt| Value::String(dt.format("%Y-%m-%dT%H:%M:%S").to_string()))
                .ok_or_else(|| format!("'{}' is not a date", text)),
            ValueType::StringArray => Ok(Value::Array(
                value::to_string_list(input, ValueType::of(input))
                    .into_iter()
                    .map(Value::String)
                    .collect(),
            )),
        }
    }
}

// =============================================================================
// Tabular input
// =============================================================================

/// A source column.
///
/// `value_set` holds the column's distinct values in first-seen order; field
/// transformations compute their preview cache against it. It is not part of
/// the persisted wire shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescriptor {
    pub name: String,
    #[serde(default)]
    pub value_type: ValueType,
    #[serde(skip)]
    pub value_set: Vec<Value>,
}

impl FieldDescriptor {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            value_set: Vec::new(),
        }
    }

    pub fn with_values(mut self, values: Vec<Value>) -> Self {
        self.value_set = values;
        self
    }
}

/// Schema of a source table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub name: String,
    pub fields: Vec<Arc<FieldDescriptor>>,
}

impl TableDefinition {
    pub fn field(&self, name: &str) -> Option<&Arc<FieldDescriptor>> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }
}

/// One source row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Record {
    /// Zero-based row index within its table.
    pub index: usize,
    pub values: Map<String, Value>,
}

impl Record {
    pub fn new(index: usize, values: Map<String, Value>) -> Self {
        Self { index, values }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }
}

/// A named table of rows.
#[derive(Debug, Clone)]
pub struct Table {
    pub definition: Arc<TableDefinition>,
    pub rows: Vec<Arc<Record>>,
}

impl Table {
    /// Build a table from header names and JSON-object rows.
    ///
    /// Each column gets an inferred [`ValueType`] and its distinct value set.
    pub fn from_rows(name: impl Into<String>, headers: &[String], rows: Vec<Map<String, Value>>) -> Self {
        let fields = headers
            .iter()
            .map(|header| {
                let column = rows.iter().filter_map(|row| row.get(header));
                let value_type = ValueType::infer(column.clone());
                let mut seen = HashSet::new();
                let distinct: Vec<Value> = column
                    .filter(|value| seen.insert(value.to_string()))
                    .cloned()
                    .collect();
                Arc::new(FieldDescriptor::new(header.clone(), value_type).with_values(distinct))
            })
            .collect();

        let rows = rows
            .into_iter()
            .enumerate()
            .map(|(i, values)| Arc::new(Record::new(i, values)))
            .collect();

        Self {
            definition: Arc::new(TableDefinition {
                name: name.into(),
                fields,
            }),
            rows,
        }
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn field(&self, name: &str) -> Option<&Arc<FieldDescriptor>> {
        self.definition.field(name)
    }

    /// Values of one column, in row order (missing cells become `null`).
    pub fn column(&self, name: &str) -> Vec<Value> {
        self.rows
            .iter()
            .map(|r| r.get(name).cloned().unwrap_or(Value::Null))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A set of named tables (one per CSV file or sheet).
#[derive(Debug, Clone, Default)]
pub struct Dataset {
    pub tables: Vec<Table>,
}

impl Dataset {
    pub fn new(tables: Vec<Table>) -> Self {
        Self { tables }
    }

    pub fn table(&self, name: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.name() == name)
    }

    /// Locate the table owning a field, searching tables in order.
    pub fn table_for_field(&self, field: &str) -> Option<&Table> {
        self.tables.iter().find(|t| t.field(field).is_some())
    }
}

// =============================================================================
// Target schema
// =============================================================================

/// An output field rules are mapped onto.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TargetField {
    pub name: String,
    #[serde(default)]
    pub value_type: ValueType,
    #[serde(default)]
    pub required: bool,
    /// JSON Schema fragment constraining this field.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation: Option<Value>,
}

impl TargetField {
    pub fn new(name: impl Into<String>, value_type: ValueType) -> Self {
        Self {
            name: name.into(),
            value_type,
            required: false,
            validation: None,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// Output record layout: the list of target fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TargetSchema {
    pub fields: Vec<TargetField>,
}

impl TargetSchema {
    /// Read target fields from a JSON Schema object (`properties` + `required`).
    pub fn from_json_schema(schema: &Value) -> MappingResult<Self> {
        let properties = schema
            .get("properties")
            .and_then(Value::as_object)
            .ok_or_else(|| MappingError::InvalidSchema("schema has no 'properties' object".into()))?;

        let required: Vec<&str> = schema
            .get("required")
            .and_then(Value::as_array)
            .map(|r| r.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        let fields = properties
            .iter()
            .map(|(name, property)| TargetField {
                name: name.clone(),
                value_type: json_schema_type(property),
                required: required.contains(&name.as_str()),
                validation: Some(property.clone()),
            })
            .collect();

        Ok(Self { fields })
    }

    pub fn field(&self, name: &str) -> Option<&TargetField> {
        self.fields.iter().find(|f| f.name == name)
    }
}

fn json_schema_type(property: &Value) -> ValueType {
    let declared = match property.get("type") {
        Some(Value::String(t)) => Some(t.as_str()),
        Some(Value::Array(types)) => types.iter().filter_map(Value::as_str).find(|t| *t != "null"),
        _ => None,
    };
    let format = property.get("format").and_then(Value::as_str);

    match (declared, format) {
        (Some("string"), Some("date" | "date-time")) => ValueType::DateTime,
        (Some("string"), _) => ValueType::String,
        (Some("integer"), _) => ValueType::Integer,
        (Some("number"), _) => ValueType::Decimal,
        (Some("boolean"), _) => ValueType::Boolean,
        (Some("array"), _) => ValueType::StringArray,
        _ => ValueType::Any,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(pairs: &[(&str, &str)]) -> Map<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), Value::String(v.to_string())))
            .collect()
    }

    #[test]
    fn test_infer_column_types() {
        assert_eq!(ValueType::infer(&[json!("1"), json!("42")]), ValueType::Integer);
        assert_eq!(ValueType::infer(&[json!("1"), json!("4.2")]), ValueType::Decimal);
        assert_eq!(ValueType::infer(&[json!("yes"), json!("no"), json!("")]), ValueType::Boolean);
        assert_eq!(ValueType::infer(&[json!("2024-01-02")]), ValueType::DateTime);
        assert_eq!(ValueType::infer(&[json!("abc"), json!("1")]), ValueType::String);
        assert_eq!(ValueType::infer(std::iter::empty::<&Value>()), ValueType::String);
    }

    #[test]
    fn test_coerce() {
        assert_eq!(ValueType::Integer.coerce(&json!("32")).unwrap(), json!(32));
        assert_eq!(ValueType::Decimal.coerce(&json!("33.01")).unwrap(), json!(33.01));
        assert_eq!(ValueType::Boolean.coerce(&json!("oui")).unwrap(), json!(true));
        assert_eq!(
            ValueType::DateTime.coerce(&json!("15/03/2024")).unwrap(),
            json!("2024-03-15T00:00:00")
        );
        assert_eq!(
            ValueType::StringArray.coerce(&json!(r#"["a","b"]"#)).unwrap(),
            json!(["a", "b"])
        );
        assert!(ValueType::Integer.coerce(&json!("abc")).is_err());
    }

    #[test]
    fn test_table_from_rows() {
        let headers = vec!["Code".to_string(), "Amount".to_string()];
        let table = Table::from_rows(
            "invoices",
            &headers,
            vec![
                row(&[("Code", "A"), ("Amount", "10")]),
                row(&[("Code", "B"), ("Amount", "12")]),
                row(&[("Code", "A"), ("Amount", "10")]),
            ],
        );

        assert_eq!(table.len(), 3);
        assert_eq!(table.rows[2].index, 2);
        let code = table.field("Code").unwrap();
        assert_eq!(code.value_set, vec![json!("A"), json!("B")]);
        assert_eq!(table.field("Amount").unwrap().value_type, ValueType::Integer);
        assert_eq!(table.column("Code"), vec![json!("A"), json!("B"), json!("A")]);
    }

    #[test]
    fn test_target_schema_from_json_schema() {
        let schema = json!({
            "type": "object",
            "required": ["invoiceNumber"],
            "properties": {
                "invoiceNumber": { "type": "string" },
                "amount": { "type": "number" },
                "issuedOn": { "type": "string", "format": "date" },
                "lines": { "type": ["integer", "null"] }
            }
        });

        let target = TargetSchema::from_json_schema(&schema).unwrap();
        assert_eq!(target.fields.len(), 4);
        assert!(target.field("invoiceNumber").unwrap().required);
        assert!(!target.field("amount").unwrap().required);
        assert_eq!(target.field("amount").unwrap().value_type, ValueType::Decimal);
        assert_eq!(target.field("issuedOn").unwrap().value_type, ValueType::DateTime);
        assert_eq!(target.field("lines").unwrap().value_type, ValueType::Integer);

        assert!(TargetSchema::from_json_schema(&json!({ "type": "object" })).is_err());
    }
}
