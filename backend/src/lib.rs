//! # fieldmap - rule and transformation engine for CSV imports
//!
//! fieldmap turns rows of an arbitrary CSV export into records of a target
//! schema. Each target field is resolved by a mapping rule (copy a column,
//! combine several, a constant, a branch on a condition...), whose value then
//! runs through a chain of value transformations (interpolate, calculate,
//! regex match, ...). Rules, transformations and comparison operators are
//! polymorphic families persisted as JSON tagged with a `typeId`.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌──────────────┐     ┌─────────────┐
//! │   CSV File  │────▶│   Parser    │────▶│ Mapping set  │────▶│ JSON records│
//! │  (ISO/UTF8) │     │  (auto-enc) │     │(rules+stages)│     │ (validated) │
//! └─────────────┘     └─────────────┘     └──────────────┘     └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fieldmap::{transform_file, TransformOptions};
//!
//! #[tokio::main]
//! async fn main() {
//!     let options = TransformOptions {
//!         mapping_path: Some("invoices.mapping.json".into()),
//!         ..TransformOptions::default()
//!     };
//!     let report = transform_file("export.csv".as_ref(), options).await.unwrap();
//!     println!("Generated {} records", report.records.len());
//! }
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`config`] - Environment configuration
//! - [`models`] - Tables, records, field descriptors, target schema
//! - [`registry`] - `typeId` registries for the polymorphic families
//! - [`parser`] - CSV parsing with auto-detection
//! - [`transform`] - Results, transformations, rules, mapping sets, pipeline
//! - [`validation`] - JSON Schema validation of generated records
//! - [`store`] - Saved mapping sets
//! - [`api`] - HTTP API server and logging

// Core modules
pub mod config;
pub mod error;
pub mod models;
pub mod registry;

// Parsing
pub mod parser;

// Transformation
pub mod transform;

// Validation
pub mod validation;

// Saved mapping sets
pub mod store;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{CsvError, MappingError, PipelineError, RegistryError, ServerError, StoreError, ValidationError};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{Dataset, FieldDescriptor, Record, Table, TableDefinition, TargetField, TargetSchema, ValueType};

// =============================================================================
// Re-exports - Registry
// =============================================================================

pub use registry::{Family, TypeDescriptor, TypeInfo, TypeRegistry};

// =============================================================================
// Re-exports - CSV Parsing
// =============================================================================

pub use parser::{
    decode_content, detect_delimiter, detect_encoding, parse_bytes_auto, parse_csv_file_auto, parse_str,
    ParseResult,
};

// =============================================================================
// Re-exports - Engine
// =============================================================================

pub use transform::{
    example_mapping_set, generate_typed, generate_values, Cancellation, ComparisonOperation, FieldIssue,
    FieldMapping, FieldTransformation, MappingRule, MappingSet, OutputResult, ResultContext,
    TransformationResult, ValueTransformation, CANCELLED_MESSAGE,
};

// =============================================================================
// Re-exports - Pipeline
// =============================================================================

pub use transform::pipeline::{
    apply_mapping_set, transform_bytes, transform_bytes_with, transform_file, AppliedMapping, CsvInfo,
    TransformOptions, TransformReport,
};

// =============================================================================
// Re-exports - Validation / Store / Config
// =============================================================================

pub use config::EngineConfig;
pub use store::{MappingStore, StoredMapping};
pub use validation::{is_valid, validate, RecordValidator, ValidationReport, INVOICE_SCHEMA};

// =============================================================================
// Re-exports - API
// =============================================================================

pub use api::types::{
    error_response, ApplyResponse, CsvMetadata, PreviewRequest, PreviewResponse, ResponseMetadata,
    TypesResponse, ValidationStats,
};

// Server
pub mod server {
    pub use crate::api::server::{router, start_server};
}
