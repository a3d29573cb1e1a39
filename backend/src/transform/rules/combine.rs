use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::MappingRule;
use crate::models::value::encode_string_list;
use crate::models::ValueType;
use crate::registry::TypeInfo;
use crate::transform::cancel::Cancellation;
use crate::transform::field::FieldTransformation;
use crate::transform::result::{ResultContext, TransformationResult};
use crate::transform::value::{CombineFields, ValueTransformation};

/// Combine several source fields of the same row.
///
/// Each source pipeline runs first; their results are gathered in order into
/// a string array which then goes through the [`CombineFields`] stage. The
/// first failing source fails the whole rule.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombineFieldsRule {
    #[serde(default)]
    pub source_field_transformations: Vec<FieldTransformation>,
    #[serde(flatten)]
    pub combine: CombineFields,
}

impl CombineFieldsRule {
    pub fn new(sources: Vec<FieldTransformation>, pattern: impl Into<String>) -> Self {
        Self {
            source_field_transformations: sources,
            combine: CombineFields::new(pattern),
        }
    }

    pub fn for_fields<S: Into<String>>(names: impl IntoIterator<Item = S>, pattern: impl Into<String>) -> Self {
        let sources = names.into_iter().map(FieldTransformation::for_field_name).collect();
        Self::new(sources, pattern)
    }
}

impl TypeInfo for CombineFieldsRule {
    const TYPE_ID: &'static str = "combineFields";
    const DISPLAY_NAME: &'static str = "Combine fields";
    const SHORT_NAME: &'static str = "Combine";
    const DESCRIPTION: &'static str = "Build the value from several source fields";
}

#[async_trait]
impl MappingRule for CombineFieldsRule {
    fn type_key(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn source_field_transformations(&self) -> &[FieldTransformation] {
        &self.source_field_transformations
    }

    fn source_field_transformations_mut(&mut self) -> &mut [FieldTransformation] {
        &mut self.source_field_transformations
    }

    fn is_empty(&self) -> bool {
        self.source_field_transformations.is_empty()
    }

    async fn resolve(&self, context: &ResultContext, cancel: &Cancellation) -> Option<TransformationResult> {
        if self.source_field_transformations.is_empty() {
            return None;
        }

        let mut originals = Vec::with_capacity(self.source_field_transformations.len());
        let mut values = Vec::with_capacity(self.source_field_transformations.len());
        for source in &self.source_field_transformations {
            let result = source.apply_record(context, cancel).await;
            if result.was_failure() {
                return Some(result);
            }
            values.push(result.current_text());
            originals.push(result.original_value);
        }

        let gathered = TransformationResult::success(
            Value::Array(originals),
            ValueType::StringArray,
            Value::String(encode_string_list(&values)),
            ValueType::StringArray,
            context.clone(),
        );
        Some(self.combine.apply_transformation(gathered, cancel).await)
    }
}
