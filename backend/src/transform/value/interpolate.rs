use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{substitute, ValueTransformation};
use crate::models::ValueType;
use crate::registry::TypeInfo;
use crate::transform::cancel::Cancellation;
use crate::transform::result::TransformationResult;

/// Fill a `${i}` pattern with the current value(s).
///
/// A scalar is `${0}`; a string-array value fills `${0}`, `${1}`, ... in
/// order. Placeholders without a matching value are kept as written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Interpolate {
    #[serde(default)]
    pub pattern: String,
}

impl Interpolate {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self { pattern: pattern.into() }
    }
}

impl TypeInfo for Interpolate {
    const TYPE_ID: &'static str = "interpolate";
    const DISPLAY_NAME: &'static str = "Interpolate";
    const SHORT_NAME: &'static str = "Interp";
    const DESCRIPTION: &'static str = "Insert the value into a text pattern using ${0}, ${1}, ... placeholders";
}

#[async_trait]
impl ValueTransformation for Interpolate {
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
        if self.pattern.is_empty() {
            let text = previous.current_text();
            return previous.with_value(Value::String(text), ValueType::String);
        }

        let values = previous.current_values();
        let output = substitute(&self.pattern, &values, None);
        previous.with_value(Value::String(output), ValueType::String)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn run(pattern: &str, value: Value) -> TransformationResult {
        Interpolate::new(pattern)
            .transform(value, None, &Cancellation::new())
            .await
    }

    #[tokio::test]
    async fn test_scalar_value() {
        let result = run("INV-${0}", json!("42")).await;
        assert_eq!(result.current_value, json!("INV-42"));
        assert_eq!(result.original_value, json!("42"));
    }

    #[tokio::test]
    async fn test_collection_value_fills_in_order() {
        let result = run("${1}, ${0}", json!(r#"["John","Doe"]"#)).await;
        assert_eq!(result.current_value, json!("Doe, John"));
    }

    #[tokio::test]
    async fn test_out_of_range_placeholders_are_kept() {
        for n in 1..4 {
            let values: Vec<String> = (0..n).map(|i| format!("v{}", i)).collect();
            let input = json!(serde_json::to_string(&values).unwrap());
            let result = Interpolate::new("${0}|${1}|${2}|${3}")
                .transform(input, Some(ValueType::String), &Cancellation::new())
                .await;

            let text = result.current_text();
            for i in 0..4 {
                let placeholder = format!("${{{}}}", i);
                assert_eq!(text.contains(&placeholder), i >= n, "n={} i={} text={}", n, i, text);
            }
        }
    }

    #[tokio::test]
    async fn test_empty_pattern_passes_text_through() {
        let result = run("", json!(12)).await;
        assert_eq!(result.current_value, json!("12"));
        assert!(Interpolate::default().is_empty());
    }
}
