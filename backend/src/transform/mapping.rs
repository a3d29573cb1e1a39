//! Mapping set definition
//!
//! A mapping set pairs every target field with the rule that fills it. It is
//! the unit that gets saved, imported and applied to a parsed table.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

use super::comparison::Equals;
use super::field::FieldTransformation;
use super::rules::{
    CombineFieldsRule, ConditionalRule, ConstantKind, ConstantValueRule, CopyFieldRule, IgnoreRule, MappingRule,
    StaticValueRule,
};
use super::value::{Calculate, Conditional, Interpolate, RegexMatch};
use crate::error::{MappingError, MappingResult};
use crate::models::{TableDefinition, TargetField, TargetSchema, ValueType};

/// One target field and the rule resolving it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub target: TargetField,
    pub rule: Box<dyn MappingRule>,
}

impl FieldMapping {
    pub fn new(target: TargetField, rule: Box<dyn MappingRule>) -> Self {
        Self { target, rule }
    }

    /// Ignored mappings are skipped during output generation.
    pub fn is_ignored(&self) -> bool {
        self.rule.is_empty()
    }
}

/// A complete, named set of field mappings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MappingSet {
    /// Version of the mapping format
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub name: String,

    /// Human-readable description
    #[serde(default)]
    pub description: String,

    pub mappings: Vec<FieldMapping>,
}

fn default_version() -> String {
    "1.0".to_string()
}

impl MappingSet {
    /// Create an empty mapping set
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            version: default_version(),
            name: name.into(),
            description: String::new(),
            mappings: Vec::new(),
        }
    }

    /// Seed one rule per target field from a parsed table.
    ///
    /// A target field is copied from the source column with the same name
    /// (compared case-insensitively); fields without a match are ignored.
    pub fn from_schema(schema: &TargetSchema, table: &TableDefinition) -> Self {
        let mut set = Self::new(table.name.clone());
        set.description = format!("Default mapping for '{}'", table.name);

        for target in &schema.fields {
            let column = table
                .fields
                .iter()
                .find(|f| f.name.trim().eq_ignore_ascii_case(target.name.trim()));

            let rule: Box<dyn MappingRule> = match column {
                Some(field) => Box::new(CopyFieldRule::new(FieldTransformation::new(Arc::clone(field)))),
                None => Box::new(IgnoreRule::default()),
            };
            set.mappings.push(FieldMapping::new(target.clone(), rule));
        }

        set
    }

    /// Parse a mapping set from JSON string
    pub fn from_json(json: &str) -> MappingResult<Self> {
        let set: Self = serde_json::from_str(json)?;
        set.check()?;
        Ok(set)
    }

    /// Parse a mapping set from JSON value
    pub fn from_value(value: &Value) -> MappingResult<Self> {
        let set: Self = serde_json::from_value(value.clone())?;
        set.check()?;
        Ok(set)
    }

    /// Serialize to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Add a mapping (builder style)
    pub fn with_mapping(mut self, target: TargetField, rule: Box<dyn MappingRule>) -> Self {
        self.mappings.push(FieldMapping::new(target, rule));
        self
    }

    pub fn mapping(&self, target: &str) -> Option<&FieldMapping> {
        self.mappings.iter().find(|m| m.target.name == target)
    }

    pub fn mapping_mut(&mut self, target: &str) -> Option<&mut FieldMapping> {
        self.mappings.iter_mut().find(|m| m.target.name == target)
    }

    /// Reject sets mapping the same target field twice.
    pub fn check(&self) -> MappingResult<()> {
        let mut seen = HashSet::new();
        for mapping in &self.mappings {
            if mapping.target.name.trim().is_empty() {
                return Err(MappingError::InvalidMappingSet("a mapping has an empty target name".into()));
            }
            if !seen.insert(mapping.target.name.as_str()) {
                return Err(MappingError::InvalidMappingSet(format!(
                    "target field '{}' is mapped more than once",
                    mapping.target.name
                )));
            }
        }
        Ok(())
    }

    /// All source columns read by the active (non-ignored) mappings
    pub fn source_columns(&self) -> Vec<String> {
        let mut columns: Vec<String> = self
            .mappings
            .iter()
            .filter(|m| !m.is_ignored())
            .flat_map(|m| m.rule.source_fields())
            .collect();
        columns.sort();
        columns.dedup();
        columns
    }

    pub fn target_fields(&self) -> Vec<String> {
        self.mappings.iter().map(|m| m.target.name.clone()).collect()
    }

    /// Validate that all source columns exist in the CSV headers
    pub fn validate_headers(&self, headers: &[String]) -> Result<(), Vec<String>> {
        let missing: Vec<String> = self
            .source_columns()
            .into_iter()
            .filter(|col| !headers.iter().any(|h| h == col))
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(missing)
        }
    }

    /// Point every source pipeline at the descriptors of a parsed table.
    pub fn bind(&mut self, table: &TableDefinition) {
        for mapping in &mut self.mappings {
            mapping.rule.bind(table);
        }
    }
}

/// Generate an example mapping set for documentation
pub fn example_mapping_set() -> MappingSet {
    let mut set = MappingSet::new("invoices");
    set.description = "Example mapping from an accounting export to invoice records".to_string();

    set.with_mapping(
        TargetField::new("invoiceNumber", ValueType::String).required(),
        Box::new(CopyFieldRule::for_field("Invoice").then(Box::new(Interpolate::new("INV-${0}")))),
    )
    .with_mapping(
        TargetField::new("customer", ValueType::String),
        Box::new(CombineFieldsRule::for_fields(["First name", "Last name"], "${1}, ${0}")),
    )
    .with_mapping(
        TargetField::new("amount", ValueType::Decimal).required(),
        Box::new(CopyFieldRule::for_field("Amount").then(Box::new(Calculate::new("${0} * 1.2", 2)))),
    )
    .with_mapping(
        TargetField::new("issuedOn", ValueType::DateTime),
        Box::new(CopyFieldRule::for_field("Date")),
    )
    .with_mapping(
        TargetField::new("region", ValueType::String),
        Box::new(ConditionalRule::new(
            FieldTransformation::for_field_name("Country"),
            Conditional::new(
                Box::new(Equals::new("FR")),
                Box::new(StaticValueRule::new("domestic")),
                Box::new(StaticValueRule::new("export")),
            ),
        )),
    )
    .with_mapping(
        TargetField::new("tags", ValueType::StringArray),
        Box::new(CopyFieldRule::for_field("Notes").then(Box::new(RegexMatch::new("#[a-z]+")))),
    )
    .with_mapping(
        TargetField::new("reference", ValueType::String),
        Box::new(ConstantValueRule::new(ConstantKind::NewUuid)),
    )
    .with_mapping(TargetField::new("comment", ValueType::String), Box::new(IgnoreRule::default()))
}
