//! Error types for the fieldmap engine.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`CsvError`] - CSV parsing errors (with line/column context)
//! - [`RegistryError`] - Type registry and polymorphic (de)serialization errors
//! - [`MappingError`] - Mapping configuration and output generation errors
//! - [`StoreError`] - Saved mapping store errors
//! - [`ValidationError`] - Target schema validation errors
//! - [`PipelineError`] - Top-level orchestration errors
//!
//! Value-level problems (a bad regex, an unparsable formula, a cancelled row)
//! are never errors here: they travel as failed
//! [`TransformationResult`](crate::transform::TransformationResult)s.
//! Error conversion is automatic via `From` implementations, allowing `?` to
//! work across error boundaries.

use thiserror::Error;

// =============================================================================
// CSV Parsing Errors
// =============================================================================

/// CSV parsing error with context
#[derive(Debug, Clone)]
pub struct CsvError {
    pub line: usize,
    pub column: Option<String>,
    pub value: Option<String>,
    pub message: String,
}

impl std::fmt::Display for CsvError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (&self.column, &self.value) {
            (Some(col), Some(val)) => {
                write!(f, "Line {}, column '{}' (value '{}'): {}", self.line, col, val, self.message)
            }
            (Some(col), None) => {
                write!(f, "Line {}, column '{}': {}", self.line, col, self.message)
            }
            _ => {
                write!(f, "Line {}: {}", self.line, self.message)
            }
        }
    }
}

impl std::error::Error for CsvError {}

impl CsvError {
    pub fn new(line: usize, message: impl Into<String>) -> Self {
        Self {
            line,
            column: None,
            value: None,
            message: message.into(),
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }

    pub fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }
}

// =============================================================================
// Registry Errors
// =============================================================================

/// Errors from the type registry and the TypeId-aware converters.
#[derive(Debug, Clone, Error)]
pub enum RegistryError {
    /// A different type is already registered under this TypeId.
    #[error("{family} typeId '{type_id}' is already registered to {existing}, cannot register {attempted}")]
    DuplicateTypeId {
        family: &'static str,
        type_id: String,
        existing: &'static str,
        attempted: &'static str,
    },

    /// No type is registered under this TypeId.
    #[error("Unknown {family} typeId '{type_id}'")]
    UnknownTypeId { family: &'static str, type_id: String },

    /// The JSON object carries no `typeId` discriminator.
    #[error("Missing 'typeId' discriminator for {family}")]
    MissingDiscriminator { family: &'static str },

    /// The discriminator resolved but the remaining properties did not decode.
    #[error("Invalid configuration for {family} '{type_id}': {message}")]
    InvalidConfiguration {
        family: &'static str,
        type_id: String,
        message: String,
    },
}

// =============================================================================
// Mapping Errors
// =============================================================================

/// Errors while configuring mappings or generating output.
#[derive(Debug, Error)]
pub enum MappingError {
    /// A required target field could not be resolved for a row.
    #[error("Missing field mapping for required field '{field}' (row {row}): {reason}")]
    MissingFieldMapping {
        field: String,
        row: usize,
        reason: String,
    },

    /// Target schema could not be read.
    #[error("Invalid target schema: {0}")]
    InvalidSchema(String),

    /// Mapping set is inconsistent.
    #[error("Invalid mapping set: {0}")]
    InvalidMappingSet(String),

    /// A generated record could not be converted to the requested output type.
    #[error("Row {row} could not be converted to the output type: {source}")]
    TypedOutput {
        row: usize,
        #[source]
        source: serde_json::Error,
    },

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

// =============================================================================
// Store Errors
// =============================================================================

/// Errors from the saved mapping store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Mapping set not found.
    #[error("Mapping set not found: {0}")]
    NotFound(String),

    /// IO error.
    #[error("Store IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON error.
    #[error("Store JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// The imported file is not a usable mapping set.
    #[error("Invalid mapping set: {0}")]
    InvalidMapping(#[from] MappingError),
}

// =============================================================================
// Validation Errors
// =============================================================================

/// Errors during target schema validation.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// The schema itself does not compile.
    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Schema validation failed.
    #[error("Validation failed: {errors:?}")]
    SchemaError { errors: Vec<String> },
}

// =============================================================================
// Pipeline Errors (top-level)
// =============================================================================

/// Top-level pipeline orchestration errors.
///
/// This is the main error type returned by
/// [`crate::transform::pipeline::transform_file`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// CSV parsing error.
    #[error("CSV error: {0}")]
    Csv(#[from] CsvError),

    /// Mapping error.
    #[error("Mapping error: {0}")]
    Mapping(#[from] MappingError),

    /// Store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Validation error.
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// No records to transform.
    #[error("No records to transform")]
    EmptyInput,
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Server IO error.
    #[error("Server IO error: {0}")]
    Io(#[from] std::io::Error),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for CSV operations.
pub type CsvResult<T> = Result<T, CsvError>;

/// Result type for registry operations.
pub type RegistryResult<T> = Result<T, RegistryError>;

/// Result type for mapping operations.
pub type MappingResult<T> = Result<T, MappingError>;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;
