//! Output generation
//!
//! Runs a [`MappingSet`] over every row of a table to produce output records,
//! either as raw JSON objects or deserialized into a caller type.
//!
//! Per row, each active mapping resolves its target field. A failed, empty or
//! non-convertible value is recorded as a [`FieldIssue`] and the field left
//! out; when the field is required the first such occurrence (row order, then
//! mapping order) aborts generation with
//! [`MappingError::MissingFieldMapping`].

use futures::stream::{self, StreamExt, TryStreamExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;

use super::cancel::{Cancellation, CANCELLED_MESSAGE};
use super::mapping::{FieldMapping, MappingSet};
use super::result::ResultContext;
use crate::error::{MappingError, MappingResult};
use crate::models::{value, Record, Table};

/// Rows resolved concurrently when the caller does not say otherwise.
pub const DEFAULT_ROW_CONCURRENCY: usize = 16;

/// Result of running a mapping set over a table
#[derive(Debug, Clone, Serialize)]
pub struct OutputResult<T> {
    /// One record per source row, in row order
    pub records: Vec<T>,
    /// Optional fields left out, with the reason
    pub issues: Vec<FieldIssue>,
}

/// An optional field that could not be filled for one row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldIssue {
    pub row: usize,
    pub field: String,
    pub message: String,
}

impl<T> OutputResult<T> {
    /// True when every active field was filled for every row
    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    /// Get summary statistics
    pub fn summary(&self) -> String {
        format!("Generated: {} records, {} field issues", self.records.len(), self.issues.len())
    }
}

/// Generate raw value records.
pub async fn generate_values(
    set: &MappingSet,
    table: &Table,
    concurrency: usize,
    cancel: &Cancellation,
) -> MappingResult<OutputResult<Map<String, Value>>> {
    let pending: Vec<_> = table.rows.iter().map(|record| resolve_row(set, table, record, cancel)).collect();
    let rows: Vec<(Map<String, Value>, Vec<FieldIssue>)> = stream::iter(pending)
        .buffered(concurrency.max(1))
        .try_collect()
        .await?;

    let mut output = OutputResult {
        records: Vec::with_capacity(rows.len()),
        issues: Vec::new(),
    };
    for (record, issues) in rows {
        output.records.push(record);
        output.issues.extend(issues);
    }
    Ok(output)
}

/// Generate records deserialized into `T`.
pub async fn generate_typed<T: DeserializeOwned>(
    set: &MappingSet,
    table: &Table,
    concurrency: usize,
    cancel: &Cancellation,
) -> MappingResult<OutputResult<T>> {
    let raw = generate_values(set, table, concurrency, cancel).await?;

    let records = raw
        .records
        .into_iter()
        .zip(&table.rows)
        .map(|(record, row)| {
            serde_json::from_value(Value::Object(record)).map_err(|source| MappingError::TypedOutput {
                row: row.index,
                source,
            })
        })
        .collect::<MappingResult<Vec<T>>>()?;

    Ok(OutputResult {
        records,
        issues: raw.issues,
    })
}

async fn resolve_row(
    set: &MappingSet,
    table: &Table,
    record: &Arc<Record>,
    cancel: &Cancellation,
) -> MappingResult<(Map<String, Value>, Vec<FieldIssue>)> {
    let mut output = Map::new();
    let mut issues = Vec::new();

    for mapping in set.mappings.iter().filter(|m| !m.is_ignored()) {
        match resolve_field(mapping, table, record, cancel).await {
            Ok(value) => {
                output.insert(mapping.target.name.clone(), value);
            }
            Err(reason) if mapping.target.required => {
                return Err(MappingError::MissingFieldMapping {
                    field: mapping.target.name.clone(),
                    row: record.index,
                    reason,
                });
            }
            Err(reason) => issues.push(FieldIssue {
                row: record.index,
                field: mapping.target.name.clone(),
                message: reason,
            }),
        }
    }

    Ok((output, issues))
}

/// Resolve one target field, or explain why it has no value.
async fn resolve_field(
    mapping: &FieldMapping,
    table: &Table,
    record: &Arc<Record>,
    cancel: &Cancellation,
) -> Result<Value, String> {
    if cancel.is_cancelled() {
        return Err(CANCELLED_MESSAGE.to_string());
    }

    let target_type = mapping.target.value_type;
    let context = ResultContext::for_record(table, record).with_target_type(Some(target_type));
    let result = mapping
        .rule
        .resolve(&context, cancel)
        .await
        .ok_or_else(|| format!("Rule '{}' produced no value", mapping.rule.type_key()))?;

    if let Some(message) = result.error_message() {
        return Err(message.to_string());
    }
    if value::is_blank(&result.current_value) {
        return Err("value is empty".to_string());
    }
    target_type.coerce(&result.current_value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TargetField, ValueType};
    use crate::transform::mapping::example_mapping_set;
    use crate::transform::rules::CopyFieldRule;
    use serde::Deserialize;
    use serde_json::json;

    const HEADERS: [&str; 7] = ["Invoice", "First name", "Last name", "Amount", "Date", "Country", "Notes"];

    fn table(rows: &[[&str; 7]]) -> Table {
        let headers: Vec<String> = HEADERS.iter().map(|h| h.to_string()).collect();
        let rows = rows
            .iter()
            .map(|cells| {
                HEADERS
                    .iter()
                    .zip(cells.iter())
                    .map(|(h, c)| (h.to_string(), Value::String(c.to_string())))
                    .collect()
            })
            .collect();
        Table::from_rows("export", &headers, rows)
    }

    #[tokio::test]
    async fn test_generate_example_set() {
        let table = table(&[
            ["1001", "Jane", "Doe", "27.51", "15/03/2024", "FR", "#urgent and #paid"],
            ["1002", "", "Smith", "10", "not a date", "DE", ""],
        ]);
        let output = generate_values(&example_mapping_set(), &table, 4, &Cancellation::new())
            .await
            .unwrap();

        assert_eq!(output.records.len(), 2);
        let first = &output.records[0];
        assert_eq!(first["invoiceNumber"], json!("INV-1001"));
        assert_eq!(first["customer"], json!("Doe, Jane"));
        assert_eq!(first["amount"], json!(33.01));
        assert_eq!(first["issuedOn"], json!("2024-03-15T00:00:00"));
        assert_eq!(first["region"], json!("domestic"));
        assert_eq!(first["tags"], json!(["#urgent", "#paid"]));
        assert!(first["reference"].as_str().is_some());
        assert!(!first.contains_key("comment"));

        let second = &output.records[1];
        assert_eq!(second["amount"], json!(12.0));
        assert_eq!(second["region"], json!("export"));
        assert!(!second.contains_key("issuedOn"));
        assert!(!second.contains_key("tags"));

        let fields: Vec<&str> = output.issues.iter().map(|i| i.field.as_str()).collect();
        assert_eq!(fields, vec!["issuedOn", "tags"]);
        assert!(output.issues.iter().all(|i| i.row == 1));
        assert!(!output.is_clean());
    }

    #[tokio::test]
    async fn test_first_missing_required_field_raises() {
        let table = table(&[
            ["1001", "Jane", "Doe", "27.51", "", "FR", ""],
            ["1002", "Jane", "Doe", "", "", "FR", ""],
            ["1003", "Jane", "Doe", "", "", "FR", ""],
        ]);
        let err = generate_values(&example_mapping_set(), &table, 4, &Cancellation::new())
            .await
            .unwrap_err();

        match err {
            MappingError::MissingFieldMapping { field, row, .. } => {
                assert_eq!(field, "amount");
                assert_eq!(row, 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_mapping_order_decides_within_a_row() {
        let set = MappingSet::new("t")
            .with_mapping(
                TargetField::new("first", ValueType::String).required(),
                Box::new(CopyFieldRule::for_field("Missing A")),
            )
            .with_mapping(
                TargetField::new("second", ValueType::String).required(),
                Box::new(CopyFieldRule::for_field("Missing B")),
            );
        let table = table(&[["1", "", "", "", "", "", ""]]);

        let err = generate_values(&set, &table, 1, &Cancellation::new()).await.unwrap_err();
        assert!(matches!(err, MappingError::MissingFieldMapping { ref field, .. } if field == "first"));
    }

    #[tokio::test]
    async fn test_cancelled_generation_reports_required_field() {
        let cancel = Cancellation::new();
        cancel.cancel();
        let table = table(&[["1001", "Jane", "Doe", "1", "", "FR", ""]]);

        let err = generate_values(&example_mapping_set(), &table, 4, &cancel).await.unwrap_err();
        match err {
            MappingError::MissingFieldMapping { field, reason, .. } => {
                assert_eq!(field, "invoiceNumber");
                assert_eq!(reason, CANCELLED_MESSAGE);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Invoice {
        invoice_number: String,
        amount: f64,
        region: Option<String>,
    }

    #[derive(Debug, Deserialize)]
    struct WholeAmount {
        #[allow(dead_code)]
        amount: u32,
    }

    #[tokio::test]
    async fn test_generate_typed() {
        let table = table(&[["7", "A", "B", "5", "", "US", ""]]);
        let output: OutputResult<Invoice> = generate_typed(&example_mapping_set(), &table, 2, &Cancellation::new())
            .await
            .unwrap();

        assert_eq!(output.records[0].invoice_number, "INV-7");
        assert_eq!(output.records[0].amount, 6.0);
        assert_eq!(output.records[0].region.as_deref(), Some("export"));

        let err = generate_typed::<WholeAmount>(&example_mapping_set(), &table, 2, &Cancellation::new())
            .await
            .unwrap_err();
        assert!(matches!(err, MappingError::TypedOutput { row: 0, .. }));
    }
}
