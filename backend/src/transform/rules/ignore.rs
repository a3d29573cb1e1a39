use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::MappingRule;
use crate::models::ValueType;
use crate::registry::TypeInfo;
use crate::transform::cancel::Cancellation;
use crate::transform::field::FieldTransformation;
use crate::transform::result::{ResultContext, TransformationResult};

/// Leave the target field unset.
///
/// Output generation skips ignored fields entirely; resolving one directly
/// (e.g. as a conditional branch) yields a successful `null`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IgnoreRule {}

impl TypeInfo for IgnoreRule {
    const TYPE_ID: &'static str = "ignore";
    const DISPLAY_NAME: &'static str = "Ignore";
    const SHORT_NAME: &'static str = "Skip";
    const DESCRIPTION: &'static str = "Do not fill this field";
}

#[async_trait]
impl MappingRule for IgnoreRule {
    fn type_key(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn source_field_transformations(&self) -> &[FieldTransformation] {
        &[]
    }

    fn source_field_transformations_mut(&mut self) -> &mut [FieldTransformation] {
        &mut []
    }

    fn requires_record(&self) -> bool {
        false
    }

    fn is_empty(&self) -> bool {
        true
    }

    async fn resolve(&self, context: &ResultContext, _cancel: &Cancellation) -> Option<TransformationResult> {
        let value_type = context.target_field_type.unwrap_or(ValueType::Any);
        Some(TransformationResult::initial(Value::Null, value_type, context.clone()))
    }
}
