use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

use super::{reject_collection, ValueTransformation};
use crate::models::ValueType;
use crate::registry::TypeInfo;
use crate::transform::cancel::Cancellation;
use crate::transform::result::TransformationResult;

/// Replace a value using a lookup table.
///
/// Lookup is exact on the value's text; a miss passes the value through.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapValues {
    #[serde(default)]
    pub mappings: BTreeMap<String, String>,
}

impl MapValues {
    pub fn from_pairs<K, V>(pairs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            mappings: pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }
}

impl TypeInfo for MapValues {
    const TYPE_ID: &'static str = "map";
    const DISPLAY_NAME: &'static str = "Map values";
    const SHORT_NAME: &'static str = "Map";
    const DESCRIPTION: &'static str = "Replace values found in a lookup table";
}

#[async_trait]
impl ValueTransformation for MapValues {
    fn type_key(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn transformation_detail(&self) -> String {
        format!("{} entries", self.mappings.len())
    }

    fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    async fn execute(&self, previous: TransformationResult, _cancel: &Cancellation) -> TransformationResult {
        let previous = match reject_collection(previous) {
            Ok(result) => result,
            Err(failure) => return failure,
        };

        match self.mappings.get(&previous.current_text()) {
            Some(mapped) => previous.with_value(Value::String(mapped.clone()), ValueType::String),
            None => previous,
        }
    }
}
