//! High-level pipeline API: CSV file to validated output records.
//!
//! This module combines all steps: parsing, picking a mapping set,
//! output generation and validation.
//!
//! Mapping set selection order:
//! 1. an explicit mapping set (file or in-memory),
//! 2. saved sets compatible with the file's headers (best first, until one
//!    produces valid records),
//! 3. defaults seeded from the target schema (saved for next time).
//!
//! # Example
//!
//! ```rust,ignore
//! use fieldmap::transform::pipeline::{transform_file, TransformOptions};
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = TransformOptions {
//!         schema_path: Some("schemas/invoice.schema.json".into()),
//!         ..TransformOptions::default()
//!     };
//!     let report = transform_file(Path::new("export.csv"), options).await?;
//!
//!     println!("Generated {} records", report.records.len());
//!     Ok(())
//! }
//! ```

use serde::Serialize;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};

use super::cancel::Cancellation;
use super::mapping::MappingSet;
use super::output::{generate_values, FieldIssue, OutputResult};
use crate::api::logs::{log_error, log_info, log_info_indent, log_success, log_success_indent, log_warning};
use crate::config::EngineConfig;
use crate::error::{MappingError, PipelineError, PipelineResult};
use crate::models::{Table, TargetSchema};
use crate::parser::{parse_bytes_auto, parse_csv_file_auto, ParseResult};
use crate::store::MappingStore;
use crate::validation::{RecordValidator, ValidationReport};

/// Options for the transformation pipeline
#[derive(Debug, Clone)]
pub struct TransformOptions {
    /// Use a specific mapping file instead of the store
    pub mapping_path: Option<PathBuf>,

    /// Target JSON schema (validation + default mapping)
    pub schema_path: Option<PathBuf>,

    /// Directory of saved mapping sets
    pub store_dir: PathBuf,

    /// Rows resolved concurrently
    pub row_concurrency: usize,

    /// Skip validation step
    pub skip_validation: bool,

    /// Don't look for saved mapping sets
    pub no_cache: bool,

    /// Don't save a generated default mapping set
    pub no_save: bool,
}

impl TransformOptions {
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            mapping_path: None,
            schema_path: None,
            store_dir: config.store_dir.clone(),
            row_concurrency: config.row_concurrency,
            skip_validation: false,
            no_cache: false,
            no_save: false,
        }
    }
}

impl Default for TransformOptions {
    fn default() -> Self {
        Self::from_config(&EngineConfig::default())
    }
}

/// CSV file information
#[derive(Debug, Clone, Serialize)]
pub struct CsvInfo {
    pub encoding: String,
    pub delimiter: char,
    pub headers: Vec<String>,
    pub row_count: usize,
}

/// Result of a complete pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct TransformReport {
    /// One record per source row
    pub records: Vec<Map<String, Value>>,

    /// Optional fields left out
    pub issues: Vec<FieldIssue>,

    /// `None` when validation was skipped
    pub validation: Option<ValidationReport>,

    /// Mapping set used
    pub mapping: MappingSet,

    /// Store id if a saved set was used or created
    pub mapping_id: Option<String>,

    pub csv_info: CsvInfo,
}

/// Output of applying one mapping set to one table
#[derive(Debug, Clone, Serialize)]
pub struct AppliedMapping {
    pub output: OutputResult<Map<String, Value>>,
    pub validation: Option<ValidationReport>,
}

impl AppliedMapping {
    /// Usable means: at least one record, and at least one valid one when validated.
    pub fn is_usable(&self) -> bool {
        !self.output.records.is_empty() && self.validation.as_ref().map_or(true, |v| v.valid_count > 0)
    }
}

/// Transform a CSV file.
///
/// This is the main entry point for the pipeline. It:
/// 1. Parses the CSV with auto-detection
/// 2. Picks a mapping set
/// 3. Generates output records
/// 4. Validates them against the target schema
pub async fn transform_file(path: &Path, options: TransformOptions) -> PipelineResult<TransformReport> {
    log_info(format!("Reading {}", path.display()));
    let parsed = parse_csv_file_auto(path)?;
    let (mapping, schema) = load_inputs(&options)?;
    transform_parsed(parsed, mapping, schema, &options).await
}

/// Same as [`transform_file`] for raw bytes; `name` names the table.
pub async fn transform_bytes(bytes: &[u8], name: &str, options: TransformOptions) -> PipelineResult<TransformReport> {
    let parsed = parse_bytes_auto(bytes, name)?;
    let (mapping, schema) = load_inputs(&options)?;
    transform_parsed(parsed, mapping, schema, &options).await
}

/// Transform raw bytes with an in-memory mapping set and optional schema.
///
/// File paths in `options` are ignored.
pub async fn transform_bytes_with(
    bytes: &[u8],
    name: &str,
    mapping: Option<MappingSet>,
    schema: Option<Value>,
    options: TransformOptions,
) -> PipelineResult<TransformReport> {
    let parsed = parse_bytes_auto(bytes, name)?;
    transform_parsed(parsed, mapping, schema, &options).await
}

fn load_inputs(options: &TransformOptions) -> PipelineResult<(Option<MappingSet>, Option<Value>)> {
    let mapping = match &options.mapping_path {
        Some(path) => {
            log_info(format!("Using mapping file: {}", path.display()));
            Some(MappingSet::from_json(&std::fs::read_to_string(path)?)?)
        }
        None => None,
    };
    let schema = match &options.schema_path {
        Some(path) => Some(read_json(path)?),
        None => None,
    };
    Ok((mapping, schema))
}

async fn transform_parsed(
    parsed: ParseResult,
    mapping: Option<MappingSet>,
    schema: Option<Value>,
    options: &TransformOptions,
) -> PipelineResult<TransformReport> {
    log_success(format!("Detected encoding: {}", parsed.encoding));
    log_success(format!("Detected separator: '{}'", format_delimiter(parsed.delimiter)));
    log_success(format!("Read {} rows", parsed.row_count()));

    let csv_info = CsvInfo {
        encoding: parsed.encoding.clone(),
        delimiter: parsed.delimiter,
        headers: parsed.headers.clone(),
        row_count: parsed.row_count(),
    };

    if parsed.table.is_empty() {
        return Err(PipelineError::EmptyInput);
    }

    log_info(format!("CSV has {} columns:", parsed.headers.len()));
    for (i, col) in parsed.headers.iter().enumerate() {
        log_info_indent(format!("[{:2}] {}", i + 1, col), 1);
    }

    let (mapping, mapping_id, applied) = select_mapping(&parsed, mapping, schema.as_ref(), options).await?;

    Ok(TransformReport {
        records: applied.output.records,
        issues: applied.output.issues,
        validation: applied.validation,
        mapping,
        mapping_id,
        csv_info,
    })
}

/// Pick a mapping set and apply it.
async fn select_mapping(
    parsed: &ParseResult,
    explicit: Option<MappingSet>,
    schema: Option<&Value>,
    options: &TransformOptions,
) -> PipelineResult<(MappingSet, Option<String>, AppliedMapping)> {
    let cancel = Cancellation::new();

    // 1. Explicit mapping set
    if let Some(mapping) = explicit {
        let applied = run_mapping(&mapping, &parsed.table, schema, options, &cancel).await?;
        return Ok((mapping, None, applied));
    }

    let mut store = MappingStore::open(&options.store_dir);

    // 2. Saved sets, best first
    if !options.no_cache {
        log_info("Looking for compatible saved mapping sets...");
        let candidates: Vec<(String, String, MappingSet, f64, f64)> = store
            .find_compatible(&parsed.headers)
            .into_iter()
            .map(|(m, score)| (m.id.clone(), m.name.clone(), m.mapping.clone(), score, m.success_rate))
            .collect();

        if candidates.is_empty() {
            log_warning("No compatible mapping set found");
        }

        let total = candidates.len();
        for (i, (id, name, mapping, score, success_rate)) in candidates.into_iter().enumerate() {
            log_info(format!(
                "Trying mapping set {}/{}: {} (score: {:.0}%, success rate: {:.0}%)",
                i + 1,
                total,
                name,
                score * 100.0,
                success_rate * 100.0
            ));

            let outcome = run_mapping(&mapping, &parsed.table, schema, options, &cancel).await;
            let usable = matches!(&outcome, Ok(applied) if applied.is_usable());
            store.record_use(&id, usable)?;

            match outcome {
                Ok(applied) if usable => {
                    log_success(format!("Mapping set \"{}\" worked", name));
                    return Ok((mapping, Some(id), applied));
                }
                Ok(_) => log_warning(format!("Mapping set \"{}\" produced no valid records", name)),
                Err(e) => log_warning(format!("Mapping set \"{}\" failed: {}", name, e)),
            }
        }
        if total > 0 {
            log_warning(format!("All {} saved mapping sets failed", total));
        }
    }

    // 3. Defaults from the target schema
    let schema_value = schema.ok_or_else(|| {
        MappingError::InvalidMappingSet("no usable mapping set; pass a mapping file or a target schema".into())
    })?;
    let target = TargetSchema::from_json_schema(schema_value)?;
    log_info("Seeding default mapping from the target schema...");
    let mapping = MappingSet::from_schema(&target, &parsed.table.definition);

    let applied = run_mapping(&mapping, &parsed.table, schema, options, &cancel).await?;
    let mapping_id = if options.no_save {
        None
    } else {
        let id = store.save(mapping.clone(), &parsed.table.definition.name, mapping.source_columns())?;
        store.record_use(&id, applied.is_usable())?;
        Some(id)
    };

    Ok((mapping, mapping_id, applied))
}

async fn run_mapping(
    mapping: &MappingSet,
    table: &Table,
    schema: Option<&Value>,
    options: &TransformOptions,
    cancel: &Cancellation,
) -> PipelineResult<AppliedMapping> {
    let schema = if options.skip_validation { None } else { schema };
    apply_mapping_set(mapping, table, schema, !options.skip_validation, options.row_concurrency, cancel).await
}

/// Apply a mapping set to a table, then validate the records.
///
/// Validation uses `schema` when given, otherwise a schema rebuilt from the
/// mapping's target fields; `validate = false` skips it.
pub async fn apply_mapping_set(
    mapping: &MappingSet,
    table: &Table,
    schema: Option<&Value>,
    validate: bool,
    row_concurrency: usize,
    cancel: &Cancellation,
) -> PipelineResult<AppliedMapping> {
    print_mapping(mapping);

    if let Err(missing) = mapping.validate_headers(&table.definition.field_names()) {
        log_warning(format!("Columns not found in file: {}", missing.join(", ")));
    }

    log_info("Generating records...");
    let output = generate_values(mapping, table, row_concurrency, cancel).await?;
    print_output(&output);

    let validation = if validate {
        log_info("Validating records...");
        let validator = match schema {
            Some(schema) => RecordValidator::new(schema)?,
            None => RecordValidator::for_target_fields(
                &mapping.mappings.iter().map(|m| m.target.clone()).collect::<Vec<_>>(),
            )?,
        };
        let report = validator.validate_maps(&output.records);
        print_validation(&report);
        Some(report)
    } else {
        log_info("(validation skipped)");
        None
    };

    Ok(AppliedMapping { output, validation })
}

/// Format delimiter for display
fn format_delimiter(d: char) -> String {
    match d {
        '\t' => "TAB".to_string(),
        c => c.to_string(),
    }
}

fn read_json(path: &Path) -> PipelineResult<Value> {
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

fn print_mapping(mapping: &MappingSet) {
    log_info(format!("Mapping \"{}\":", mapping.name));
    for m in &mapping.mappings {
        if m.is_ignored() {
            continue;
        }
        let sources = m.rule.source_fields();
        let from = if sources.is_empty() {
            format!("({})", m.rule.display_name())
        } else {
            sources.join(" + ")
        };
        log_info_indent(format!("{} → {}", from, m.target.name), 1);
    }
}

fn print_output(output: &OutputResult<Map<String, Value>>) {
    log_success(output.summary());

    for issue in output.issues.iter().take(5) {
        log_warning(format!("Row {}, {}: {}", issue.row, issue.field, issue.message));
    }
    if output.issues.len() > 5 {
        log_warning(format!("... +{} more field issues", output.issues.len() - 5));
    }
}

fn print_validation(report: &ValidationReport) {
    if report.invalid_count == 0 {
        log_success(format!("All {} records valid!", report.valid_count));
    } else {
        log_warning(format!("{} of {} records invalid", report.invalid_count, report.valid_count + report.invalid_count));
        log_success_indent(format!("Valid: {}", report.valid_count), 1);
        for (i, errors) in report.errors.iter().take(3) {
            log_error(format!("Record {}: {}", i, errors.join(", ")));
        }
    }
}
