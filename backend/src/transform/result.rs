//! The value-plus-context record flowing through every pipeline stage.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::models::value::{self, as_string_list, to_string_list};
use crate::models::{FieldDescriptor, Record, Table, TableDefinition, ValueType};

/// Message used when a failure is built without one.
const DEFAULT_FAILURE_MESSAGE: &str = "Transformation failed";

/// Row context carried unchanged through a pipeline.
///
/// Lets a stage several steps downstream reach back to sibling-field values.
#[derive(Debug, Clone, Default)]
pub struct ResultContext {
    pub record: Option<Arc<Record>>,
    pub table_definition: Option<Arc<TableDefinition>>,
    pub source_record_context: Option<Arc<[Arc<FieldDescriptor>]>>,
    pub target_field_type: Option<ValueType>,
}

impl ResultContext {
    /// Context for one row of a table.
    pub fn for_record(table: &Table, record: &Arc<Record>) -> Self {
        Self {
            record: Some(Arc::clone(record)),
            table_definition: Some(Arc::clone(&table.definition)),
            source_record_context: Some(table.definition.fields.clone().into()),
            target_field_type: None,
        }
    }

    pub fn with_target_type(mut self, target: Option<ValueType>) -> Self {
        self.target_field_type = target;
        self
    }
}

/// Outcome of one pipeline stage.
///
/// A result is a failure exactly when it carries a non-empty error message;
/// the flag is never stored separately.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransformationResult {
    pub original_value: Value,
    pub original_value_type: ValueType,
    pub current_value: Value,
    pub current_value_type: ValueType,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
    /// Labels of the stages applied so far (informational).
    pub applied_transformations: Vec<String>,
    #[serde(skip)]
    pub context: ResultContext,
}

impl TransformationResult {
    pub fn success(
        original: Value,
        original_type: ValueType,
        current: Value,
        current_type: ValueType,
        context: ResultContext,
    ) -> Self {
        Self {
            original_value: original,
            original_value_type: original_type,
            current_value: current,
            current_value_type: current_type,
            error_message: None,
            applied_transformations: Vec::new(),
            context,
        }
    }

    pub fn failure(original: Value, target_type: ValueType, message: impl Into<String>, context: ResultContext) -> Self {
        let original_type = ValueType::of(&original);
        Self {
            original_value: original,
            original_value_type: original_type,
            current_value: Value::Null,
            current_value_type: target_type,
            error_message: Some(non_empty(message.into())),
            applied_transformations: Vec::new(),
            context,
        }
    }

    /// Fresh result at the start of a pipeline run: original and current agree.
    pub fn initial(value: Value, value_type: ValueType, context: ResultContext) -> Self {
        Self::success(value.clone(), value_type, value, value_type, context)
    }

    pub fn was_failure(&self) -> bool {
        self.error_message.as_deref().is_some_and(|m| !m.is_empty())
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref().filter(|m| !m.is_empty())
    }

    /// Successor result carrying a new current value.
    ///
    /// Original value, applied labels and context are kept. A failed result is
    /// returned untouched.
    pub fn with_value(self, current: Value, current_type: ValueType) -> Self {
        if self.was_failure() {
            return self;
        }
        Self {
            current_value: current,
            current_value_type: current_type,
            ..self
        }
    }

    /// Failed successor keeping original value, labels and context.
    ///
    /// An already failed result keeps its first message.
    pub fn into_failure(self, message: impl Into<String>) -> Self {
        if self.was_failure() {
            return self;
        }
        let target_type = self.context.target_field_type.unwrap_or(self.current_value_type);
        Self {
            current_value: Value::Null,
            current_value_type: target_type,
            error_message: Some(non_empty(message.into())),
            ..self
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.applied_transformations.push(label.into());
        self
    }

    /// Current value rendered as text.
    pub fn current_text(&self) -> String {
        value::stringify(&self.current_value)
    }

    /// Whether the current value is a collection of strings.
    pub fn is_collection(&self) -> bool {
        as_string_list(&self.current_value, self.current_value_type).is_some()
    }

    /// Current value as an ordered list of strings (scalar → one element).
    pub fn current_values(&self) -> Vec<String> {
        to_string_list(&self.current_value, self.current_value_type)
    }

    pub fn record(&self) -> Option<&Arc<Record>> {
        self.context.record.as_ref()
    }

    pub fn table_definition(&self) -> Option<&Arc<TableDefinition>> {
        self.context.table_definition.as_ref()
    }

    pub fn source_record_context(&self) -> Option<&[Arc<FieldDescriptor>]> {
        self.context.source_record_context.as_deref()
    }

    pub fn target_field_type(&self) -> Option<ValueType> {
        self.context.target_field_type
    }
}

fn non_empty(message: String) -> String {
    if message.trim().is_empty() {
        DEFAULT_FAILURE_MESSAGE.to_string()
    } else {
        message
    }
}
