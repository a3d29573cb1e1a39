//! Transformation module.
//!
//! This module holds the rule and transformation engine:
//! - Result: the value-plus-context record flowing through pipelines
//! - Value: chainable value transformations (the pipeline stages)
//! - Comparison: operators used by conditional branching
//! - Field: per-source-field pipeline executor with a reactive cache
//! - Rules: strategies resolving one target field
//! - Mapping / Output: mapping sets and record generation
//! - Pipeline: file to validated records

pub mod cancel;
pub mod comparison;
pub mod field;
pub mod mapping;
pub mod output;
pub mod pattern;
pub mod pipeline;
pub mod result;
pub mod rules;
pub mod value;

pub use cancel::{Cancellation, CANCELLED_MESSAGE};
pub use comparison::ComparisonOperation;
pub use field::FieldTransformation;
pub use mapping::{example_mapping_set, FieldMapping, MappingSet};
pub use output::{generate_typed, generate_values, FieldIssue, OutputResult};
pub use pipeline::{
    apply_mapping_set, transform_bytes, transform_bytes_with, transform_file, TransformOptions, TransformReport,
};
pub use result::{ResultContext, TransformationResult};
pub use rules::MappingRule;
pub use value::ValueTransformation;
