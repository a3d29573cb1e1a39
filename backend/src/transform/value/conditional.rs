use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::ValueTransformation;
use crate::registry::TypeInfo;
use crate::transform::cancel::{Cancellation, CANCELLED_MESSAGE};
use crate::transform::comparison::ComparisonOperation;
use crate::transform::result::TransformationResult;
use crate::transform::rules::MappingRule;

pub const MISSING_COMPARISON: &str = "Conditional is missing its comparison operation";
pub const MISSING_TRUE_RULE: &str = "Conditional is missing its true mapping rule";
pub const MISSING_FALSE_RULE: &str = "Conditional is missing its false mapping rule";
pub const MISSING_RECORD: &str = "Conditional branch needs the source record, but none is available";

/// Branch to one of two mapping rules depending on a comparison.
///
/// The comparison runs once against the current result; the chosen rule's
/// result replaces it as-is.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Conditional {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comparison_operation: Option<Box<dyn ComparisonOperation>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub true_mapping_rule: Option<Box<dyn MappingRule>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub false_mapping_rule: Option<Box<dyn MappingRule>>,
}

impl Conditional {
    pub fn new(
        comparison: Box<dyn ComparisonOperation>,
        when_true: Box<dyn MappingRule>,
        when_false: Box<dyn MappingRule>,
    ) -> Self {
        Self {
            comparison_operation: Some(comparison),
            true_mapping_rule: Some(when_true),
            false_mapping_rule: Some(when_false),
        }
    }
}

impl TypeInfo for Conditional {
    const TYPE_ID: &'static str = "conditional";
    const DISPLAY_NAME: &'static str = "Conditional";
    const SHORT_NAME: &'static str = "If";
    const DESCRIPTION: &'static str = "Choose between two rules depending on a comparison of the value";
}

#[async_trait]
impl ValueTransformation for Conditional {
    fn type_key(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn transformation_detail(&self) -> String {
        match &self.comparison_operation {
            Some(comparison) => comparison.describe(),
            None => String::new(),
        }
    }

    fn is_empty(&self) -> bool {
        self.comparison_operation.is_none()
            && self.true_mapping_rule.is_none()
            && self.false_mapping_rule.is_none()
    }

    async fn execute(&self, previous: TransformationResult, cancel: &Cancellation) -> TransformationResult {
        let Some(comparison) = &self.comparison_operation else {
            return previous.into_failure(MISSING_COMPARISON);
        };
        let Some(when_true) = &self.true_mapping_rule else {
            return previous.into_failure(MISSING_TRUE_RULE);
        };
        let Some(when_false) = &self.false_mapping_rule else {
            return previous.into_failure(MISSING_FALSE_RULE);
        };

        let matched = comparison.evaluate(&previous, cancel).await;
        if cancel.is_cancelled() {
            return previous.into_failure(CANCELLED_MESSAGE);
        }
        let branch = if matched { when_true } else { when_false };

        if branch.requires_record() && previous.record().is_none() {
            return previous.into_failure(MISSING_RECORD);
        }

        match branch.resolve(&previous.context, cancel).await {
            Some(result) => result,
            None => previous.into_failure(format!(
                "Conditional branch '{}' produced no value",
                branch.type_key()
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Record, Table, ValueType};
    use crate::transform::comparison::{Equals, GreaterThan, IsNotNull};
    use crate::transform::result::ResultContext;
    use crate::transform::rules::{CopyFieldRule, IgnoreRule, StaticValueRule};
    use serde_json::{json, Map, Value};
    use std::sync::Arc;

    fn complete() -> Conditional {
        Conditional::new(
            Box::new(Equals::new("FR")),
            Box::new(StaticValueRule::new("France")),
            Box::new(StaticValueRule::new("Elsewhere")),
        )
    }

    async fn run(stage: &Conditional, value: Value) -> TransformationResult {
        stage.transform(value, None, &Cancellation::new()).await
    }

    #[tokio::test]
    async fn test_branch_selection() {
        let stage = complete();
        assert_eq!(run(&stage, json!("FR")).await.current_value, json!("France"));
        assert_eq!(run(&stage, json!("DE")).await.current_value, json!("Elsewhere"));
    }

    #[tokio::test]
    async fn test_missing_components_are_named() {
        let mut stage = complete();
        stage.comparison_operation = None;
        assert_eq!(run(&stage, json!("FR")).await.error_message(), Some(MISSING_COMPARISON));

        let mut stage = complete();
        stage.true_mapping_rule = None;
        assert_eq!(run(&stage, json!("FR")).await.error_message(), Some(MISSING_TRUE_RULE));

        let mut stage = complete();
        stage.false_mapping_rule = None;
        assert_eq!(run(&stage, json!("FR")).await.error_message(), Some(MISSING_FALSE_RULE));

        // Missing comparison is reported first
        let stage = Conditional::default();
        assert_eq!(run(&stage, json!("FR")).await.error_message(), Some(MISSING_COMPARISON));
    }

    #[tokio::test]
    async fn test_cancelled_comparison_fails_instead_of_branching() {
        let stage = Conditional::new(
            Box::new(IsNotNull::default()),
            Box::new(StaticValueRule::new("T")),
            Box::new(StaticValueRule::new("F")),
        );
        let cancel = Cancellation::new();
        cancel.cancel();
        let initial = TransformationResult::initial(json!("x"), ValueType::String, ResultContext::default());

        let result = stage.execute(initial, &cancel).await;
        assert_eq!(result.error_message(), Some(CANCELLED_MESSAGE));
        assert_eq!(result.original_value, json!("x"));
    }

    #[tokio::test]
    async fn test_record_required_for_field_branches() {
        let stage = Conditional::new(
            Box::new(GreaterThan::new("10")),
            Box::new(CopyFieldRule::for_field("Label")),
            Box::new(IgnoreRule::default()),
        );

        let without_record = run(&stage, json!("25")).await;
        assert_eq!(without_record.error_message(), Some(MISSING_RECORD));

        // The context-free branch does not need one
        let ignored = run(&stage, json!("5")).await;
        assert!(!ignored.was_failure());
        assert_eq!(ignored.current_value, Value::Null);
    }

    #[tokio::test]
    async fn test_branch_reads_sibling_field() {
        let mut values = Map::new();
        values.insert("Amount".into(), json!("25"));
        values.insert("Label".into(), json!("big order"));
        let table = Table::from_rows("orders", &["Amount".to_string(), "Label".to_string()], vec![values]);
        let record: Arc<Record> = Arc::clone(&table.rows[0]);

        let stage = Conditional::new(
            Box::new(GreaterThan::new("10")),
            Box::new(CopyFieldRule::for_field("Label")),
            Box::new(StaticValueRule::new("small")),
        );
        let context = ResultContext::for_record(&table, &record);
        let initial = TransformationResult::initial(json!("25"), ValueType::Integer, context);

        let result = stage.apply_transformation(initial, &Cancellation::new()).await;
        assert_eq!(result.current_value, json!("big order"));
    }

    #[test]
    fn test_round_trip_nested_configuration() {
        let stage: Box<dyn ValueTransformation> = Box::new(complete());
        let value = serde_json::to_value(&stage).unwrap();
        assert_eq!(value["comparisonOperation"]["typeId"], json!("equals"));
        assert_eq!(value["trueMappingRule"]["typeId"], json!("staticValue"));

        let back: Box<dyn ValueTransformation> = serde_json::from_value(value.clone()).unwrap();
        assert!(back.as_any().downcast_ref::<Conditional>().is_some());
        assert_eq!(serde_json::to_value(&back).unwrap(), value);
    }
}
