//! REST API request and response types.
//!
//! Transformations inside requests use the same `typeId`-tagged JSON as saved
//! mapping sets, so a client can post back exactly what it stored.

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use crate::models::ValueType;
use crate::registry::{self, TypeDescriptor};
use crate::transform::output::FieldIssue;
use crate::transform::pipeline::TransformReport;
use crate::transform::{TransformationResult, ValueTransformation};

/// `GET /api/types`: every registered type, per family.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TypesResponse {
    pub transformations: Vec<TypeDescriptor>,
    pub rules: Vec<TypeDescriptor>,
    pub comparisons: Vec<TypeDescriptor>,
}

impl TypesResponse {
    pub fn collect() -> Self {
        Self {
            transformations: registry::transformations().descriptors(),
            rules: registry::rules().descriptors(),
            comparisons: registry::comparisons().descriptors(),
        }
    }
}

/// `POST /api/preview`: run a transformation list over sample values.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewRequest {
    #[serde(default)]
    pub transformations: Vec<Box<dyn ValueTransformation>>,
    pub values: Vec<Value>,
    #[serde(default)]
    pub target_type: Option<ValueType>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviewResponse {
    pub results: Vec<TransformationResult>,
    /// Number of results that failed
    pub failures: usize,
    /// Set when the request had more values than the preview limit
    pub truncated: bool,
}

impl PreviewResponse {
    pub fn new(results: Vec<TransformationResult>, truncated: bool) -> Self {
        let failures = results.iter().filter(|r| r.was_failure()).count();
        Self {
            results,
            failures,
            truncated,
        }
    }
}

/// `POST /api/apply`: records generated from an uploaded CSV.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApplyResponse {
    pub job_id: String,

    /// "ready" or "warning"
    pub status: String,

    pub records: Vec<Map<String, Value>>,

    pub issues: Vec<FieldIssue>,

    pub metadata: ResponseMetadata,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseMetadata {
    pub total_records: usize,

    /// Name of the mapping set used
    pub mapping_name: String,

    /// Store id, when a saved set was used or created
    pub mapping_id: Option<String>,

    pub csv_info: CsvMetadata,

    /// `None` when validation was skipped
    pub validation: Option<ValidationStats>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CsvMetadata {
    pub encoding: String,
    pub delimiter: String,
    pub row_count: usize,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationStats {
    pub valid: usize,
    pub invalid: usize,
    pub errors: Vec<RecordErrors>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordErrors {
    pub record_index: usize,
    pub errors: Vec<String>,
}

impl From<TransformReport> for ApplyResponse {
    fn from(report: TransformReport) -> Self {
        let clean = report.issues.is_empty() && report.validation.as_ref().map_or(true, |v| v.is_valid());

        ApplyResponse {
            job_id: Uuid::new_v4().to_string(),
            status: if clean { "ready" } else { "warning" }.to_string(),
            metadata: ResponseMetadata {
                total_records: report.records.len(),
                mapping_name: report.mapping.name.clone(),
                mapping_id: report.mapping_id,
                csv_info: CsvMetadata {
                    encoding: report.csv_info.encoding,
                    delimiter: report.csv_info.delimiter.to_string(),
                    row_count: report.csv_info.row_count,
                    columns: report.csv_info.headers,
                },
                validation: report.validation.map(|v| ValidationStats {
                    valid: v.valid_count,
                    invalid: v.invalid_count,
                    errors: v
                        .errors
                        .into_iter()
                        .map(|(record_index, errors)| RecordErrors { record_index, errors })
                        .collect(),
                }),
            },
            records: report.records,
            issues: report.issues,
        }
    }
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "jobId": Uuid::new_v4().to_string(),
        "status": "error",
        "error": error,
        "records": [],
    })
}
