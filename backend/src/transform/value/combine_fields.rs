use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{substitute, ValueTransformation};
use crate::models::ValueType;
use crate::registry::TypeInfo;
use crate::transform::cancel::Cancellation;
use crate::transform::result::TransformationResult;

/// Join per-source values gathered for one row into a single text.
///
/// The input is the ordered list built by
/// [`CombineFieldsRule`](crate::transform::rules::CombineFieldsRule): `${0}` is
/// the first source field's value, `${1}` the second, and so on. Without a
/// pattern the values are joined with a single space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombineFields {
    #[serde(default)]
    pub pattern: String,
}

impl CombineFields {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self { pattern: pattern.into() }
    }
}

impl TypeInfo for CombineFields {
    const TYPE_ID: &'static str = "combineFields";
    const DISPLAY_NAME: &'static str = "Combine fields";
    const SHORT_NAME: &'static str = "Combine";
    const DESCRIPTION: &'static str = "Combine the values of several source fields with a ${0} ${1} pattern";
}

#[async_trait]
impl ValueTransformation for CombineFields {
    fn type_key(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn transformation_detail(&self) -> String {
        self.pattern.clone()
    }

    fn is_empty(&self) -> bool {
        self.pattern.is_empty()
    }

    async fn execute(&self, previous: TransformationResult, _cancel: &Cancellation) -> TransformationResult {
        let values = previous.current_values();
        let output = if self.pattern.is_empty() {
            values
                .iter()
                .filter(|v| !v.is_empty())
                .cloned()
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            substitute(&self.pattern, &values, None)
        };
        previous.with_value(Value::String(output), ValueType::String)
    }
}
