use async_trait::async_trait;
use chrono::{Local, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::MappingRule;
use crate::models::ValueType;
use crate::registry::TypeInfo;
use crate::transform::cancel::Cancellation;
use crate::transform::field::FieldTransformation;
use crate::transform::result::{ResultContext, TransformationResult};

/// Value generated at resolution time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConstantKind {
    /// Random UUID (v4), different for every row.
    NewUuid,
    /// Current local date, `YYYY-MM-DD`.
    #[default]
    Today,
    /// Current UTC timestamp, RFC 3339.
    Now,
}

impl ConstantKind {
    pub fn generate(&self) -> (Value, ValueType) {
        match self {
            ConstantKind::NewUuid => (Value::String(uuid::Uuid::new_v4().to_string()), ValueType::String),
            ConstantKind::Today => (
                Value::String(Local::now().date_naive().format("%Y-%m-%d").to_string()),
                ValueType::DateTime,
            ),
            ConstantKind::Now => (Value::String(Utc::now().to_rfc3339()), ValueType::DateTime),
        }
    }
}

/// Use a generated constant (new id, today, now).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstantValueRule {
    #[serde(default)]
    pub constant: ConstantKind,
}

impl ConstantValueRule {
    pub fn new(constant: ConstantKind) -> Self {
        Self { constant }
    }
}

impl TypeInfo for ConstantValueRule {
    const TYPE_ID: &'static str = "constantValue";
    const DISPLAY_NAME: &'static str = "Generated value";
    const SHORT_NAME: &'static str = "Const";
    const DESCRIPTION: &'static str = "Generate a value: a new unique id, today's date or the current time";
}

#[async_trait]
impl MappingRule for ConstantValueRule {
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
        false
    }

    async fn resolve(&self, context: &ResultContext, _cancel: &Cancellation) -> Option<TransformationResult> {
        let (value, value_type) = self.constant.generate();
        Some(TransformationResult::initial(value, value_type, context.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::value::parse_datetime;

    async fn generate(kind: ConstantKind) -> String {
        ConstantValueRule::new(kind)
            .resolve(&ResultContext::default(), &Cancellation::new())
            .await
            .unwrap()
            .current_text()
    }

    #[tokio::test]
    async fn test_uuid_is_fresh_per_call() {
        let a = generate(ConstantKind::NewUuid).await;
        let b = generate(ConstantKind::NewUuid).await;
        assert_ne!(a, b);
        assert!(uuid::Uuid::parse_str(&a).is_ok());
    }

    #[tokio::test]
    async fn test_dates_parse_back() {
        assert!(parse_datetime(&generate(ConstantKind::Today).await).is_some());
        assert!(parse_datetime(&generate(ConstantKind::Now).await).is_some());
    }

    #[test]
    fn test_wire_names() {
        let rule: ConstantValueRule = serde_json::from_value(serde_json::json!({ "constant": "newUuid" })).unwrap();
        assert_eq!(rule.constant, ConstantKind::NewUuid);
    }
}
