use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{bind_sources, MappingRule};
use crate::models::{TableDefinition, ValueType};
use crate::registry::TypeInfo;
use crate::transform::cancel::Cancellation;
use crate::transform::field::FieldTransformation;
use crate::transform::result::{ResultContext, TransformationResult};
use crate::transform::value::{Conditional, ValueTransformation};

/// Pick between two rules by testing a source field.
///
/// The source pipeline's result feeds the comparison; the chosen rule then
/// resolves the target value. Without a source the comparison sees `null`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConditionalRule {
    #[serde(default)]
    pub source_field_transformations: Vec<FieldTransformation>,
    #[serde(flatten)]
    pub condition: Conditional,
}

impl ConditionalRule {
    pub fn new(source: FieldTransformation, condition: Conditional) -> Self {
        Self {
            source_field_transformations: vec![source],
            condition,
        }
    }

    fn branches(&self) -> impl Iterator<Item = &Box<dyn MappingRule>> {
        self.condition
            .true_mapping_rule
            .iter()
            .chain(self.condition.false_mapping_rule.iter())
    }
}

impl TypeInfo for ConditionalRule {
    const TYPE_ID: &'static str = "conditionalRule";
    const DISPLAY_NAME: &'static str = "Conditional rule";
    const SHORT_NAME: &'static str = "If";
    const DESCRIPTION: &'static str = "Test a source field and apply one of two rules";
}

#[async_trait]
impl MappingRule for ConditionalRule {
    fn type_key(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn source_field_transformations(&self) -> &[FieldTransformation] {
        &self.source_field_transformations
    }

    fn source_field_transformations_mut(&mut self) -> &mut [FieldTransformation] {
        &mut self.source_field_transformations
    }

    fn requires_record(&self) -> bool {
        !self.source_field_transformations.is_empty() || self.branches().any(|rule| rule.requires_record())
    }

    fn is_empty(&self) -> bool {
        self.source_field_transformations.is_empty() && self.condition.is_empty()
    }

    fn source_fields(&self) -> Vec<String> {
        let mut fields: Vec<String> = self
            .source_field_transformations
            .iter()
            .map(|f| f.field_name().to_string())
            .collect();
        for rule in self.branches() {
            for field in rule.source_fields() {
                if !fields.contains(&field) {
                    fields.push(field);
                }
            }
        }
        fields
    }

    fn bind(&mut self, table: &TableDefinition) {
        bind_sources(&mut self.source_field_transformations, table);
        for rule in [
            self.condition.true_mapping_rule.as_mut(),
            self.condition.false_mapping_rule.as_mut(),
        ]
        .into_iter()
        .flatten()
        {
            rule.bind(table);
        }
    }

    async fn resolve(&self, context: &ResultContext, cancel: &Cancellation) -> Option<TransformationResult> {
        let tested = match self.source_field_transformations.first() {
            Some(source) => source.apply_record(context, cancel).await,
            None => TransformationResult::initial(Value::Null, ValueType::Any, context.clone()),
        };
        Some(self.condition.apply_transformation(tested, cancel).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Table;
    use crate::transform::comparison::{IsEmpty, StartsWith};
    use crate::transform::rules::{CopyFieldRule, StaticValueRule};
    use crate::transform::value::MISSING_TRUE_RULE;
    use serde_json::{json, Map};

    fn table() -> Table {
        let rows = [("FR-75", "Paris", ""), ("DE-10", "Berlin", "Mitte")]
            .iter()
            .map(|(code, city, district)| {
                let mut row = Map::new();
                row.insert("Code".into(), json!(code));
                row.insert("City".into(), json!(city));
                row.insert("District".into(), json!(district));
                row
            })
            .collect();
        Table::from_rows(
            "addresses",
            &["Code".to_string(), "City".to_string(), "District".to_string()],
            rows,
        )
    }

    fn rule() -> ConditionalRule {
        ConditionalRule::new(
            FieldTransformation::for_field_name("Code"),
            Conditional::new(
                Box::new(StartsWith::new("FR")),
                Box::new(StaticValueRule::new("domestic")),
                Box::new(CopyFieldRule::for_field("City")),
            ),
        )
    }

    #[tokio::test]
    async fn test_branches_per_row() {
        let table = table();
        let rule = rule();
        let cancel = Cancellation::new();

        let first = ResultContext::for_record(&table, &table.rows[0]);
        let second = ResultContext::for_record(&table, &table.rows[1]);
        assert_eq!(rule.resolve(&first, &cancel).await.unwrap().current_value, json!("domestic"));
        assert_eq!(rule.resolve(&second, &cancel).await.unwrap().current_value, json!("Berlin"));
    }

    #[tokio::test]
    async fn test_missing_branch_is_reported() {
        let table = table();
        let mut rule = rule();
        rule.condition.true_mapping_rule = None;

        let context = ResultContext::for_record(&table, &table.rows[0]);
        let result = rule.resolve(&context, &Cancellation::new()).await.unwrap();
        assert_eq!(result.error_message(), Some(MISSING_TRUE_RULE));
    }

    #[tokio::test]
    async fn test_nested_conditional_branch() {
        let table = table();
        let inner = ConditionalRule::new(
            FieldTransformation::for_field_name("District"),
            Conditional::new(
                Box::new(IsEmpty::default()),
                Box::new(CopyFieldRule::for_field("City")),
                Box::new(CopyFieldRule::for_field("District")),
            ),
        );
        let outer = ConditionalRule::new(
            FieldTransformation::for_field_name("Code"),
            Conditional::new(
                Box::new(StartsWith::new("DE")),
                Box::new(inner),
                Box::new(StaticValueRule::new("n/a")),
            ),
        );

        let cancel = Cancellation::new();
        let de = ResultContext::for_record(&table, &table.rows[1]);
        assert_eq!(outer.resolve(&de, &cancel).await.unwrap().current_value, json!("Mitte"));
        let fr = ResultContext::for_record(&table, &table.rows[0]);
        assert_eq!(outer.resolve(&fr, &cancel).await.unwrap().current_value, json!("n/a"));

        assert_eq!(outer.source_fields(), vec!["Code", "District", "City"]);
    }

    #[test]
    fn test_wire_shape_round_trip() {
        let boxed: Box<dyn MappingRule> = Box::new(rule());
        let value = serde_json::to_value(&boxed).unwrap();
        assert_eq!(value["typeId"], json!("conditionalRule"));
        assert_eq!(value["comparisonOperation"]["typeId"], json!("startsWith"));
        assert_eq!(value["falseMappingRule"]["typeId"], json!("copyField"));

        let back: Box<dyn MappingRule> = serde_json::from_value(value.clone()).unwrap();
        assert_eq!(serde_json::to_value(&back).unwrap(), value);
        assert!(back.requires_record());
    }
}
