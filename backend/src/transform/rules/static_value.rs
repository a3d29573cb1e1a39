use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::MappingRule;
use crate::models::ValueType;
use crate::registry::TypeInfo;
use crate::transform::cancel::Cancellation;
use crate::transform::field::FieldTransformation;
use crate::transform::result::{ResultContext, TransformationResult};

/// Use the same literal value for every row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StaticValueRule {
    #[serde(default)]
    pub value: Value,
}

impl StaticValueRule {
    pub fn new(value: impl Into<Value>) -> Self {
        Self { value: value.into() }
    }
}

impl TypeInfo for StaticValueRule {
    const TYPE_ID: &'static str = "staticValue";
    const DISPLAY_NAME: &'static str = "Static value";
    const SHORT_NAME: &'static str = "Static";
    const DESCRIPTION: &'static str = "Use a fixed value for every row";
}

#[async_trait]
impl MappingRule for StaticValueRule {
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
        self.value.is_null()
    }

    async fn resolve(&self, context: &ResultContext, _cancel: &Cancellation) -> Option<TransformationResult> {
        let value_type = ValueType::of(&self.value);
        Some(TransformationResult::initial(self.value.clone(), value_type, context.clone()))
    }
}
