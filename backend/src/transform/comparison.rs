//! Comparison operations - predicates used by conditional branches
//!
//! Operands are literals (`comparisonValue`, plus `secondaryComparisonValue`
//! for [`Between`]). Values compare numerically when both sides are numbers,
//! as dates when both sides are dates, and as ordinal strings otherwise.
//!
//! A `null` current value never satisfies a value operator (not even
//! `notEquals`); only [`IsNull`] and [`IsEmpty`] match it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt::Debug;

use super::cancel::Cancellation;
use super::pattern::CompiledPattern;
use super::result::TransformationResult;
use crate::models::value::{is_blank, parse_datetime, parse_number};
use crate::registry::{self, polymorphic::polymorphic_family, TypeInfo};

/// A predicate over a [`TransformationResult`].
#[async_trait]
pub trait ComparisonOperation: ComparisonErased + Debug {
    fn type_key(&self) -> &'static str;

    /// Literal operands, in order.
    fn operands(&self) -> Vec<&str>;

    /// Synchronous test of the current value.
    fn matches(&self, result: &TransformationResult) -> bool;

    /// Evaluate against a result. A cancelled call never matches.
    async fn evaluate(&self, result: &TransformationResult, cancel: &Cancellation) -> bool {
        if cancel.is_cancelled() {
            return false;
        }
        self.matches(result)
    }

    /// Short human-readable form, e.g. `greaterThan 10`.
    fn describe(&self) -> String {
        let operands = self.operands();
        if operands.is_empty() {
            self.type_key().to_string()
        } else {
            format!("{} {}", self.type_key(), operands.join(" and "))
        }
    }

    fn display_name(&self) -> String {
        registry::comparisons()
            .descriptor(self.type_key())
            .map(|d| d.display_name.to_string())
            .unwrap_or_else(|| self.type_key().to_string())
    }
}

polymorphic_family!(ComparisonOperation, ComparisonErased, registry::comparisons());

/// Order two texts: numbers, then dates, then ordinal.
pub fn compare_text(left: &str, right: &str) -> Ordering {
    if let (Some(a), Some(b)) = (parse_number(left), parse_number(right)) {
        return a.partial_cmp(&b).unwrap_or(Ordering::Equal);
    }
    if let (Some(a), Some(b)) = (parse_datetime(left), parse_datetime(right)) {
        return a.cmp(&b);
    }
    left.cmp(right)
}

// =============================================================================
// Single-operand operators
// =============================================================================

macro_rules! single_operand {
    (
        $(#[$doc:meta])*
        $name:ident, $id:literal, $display:literal, $short:literal, $description:literal,
        |$result:ident, $operand:ident| $test:expr
    ) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        #[serde(rename_all = "camelCase")]
        pub struct $name {
            #[serde(default)]
            pub comparison_value: String,
        }

        impl $name {
            pub fn new(comparison_value: impl Into<String>) -> Self {
                Self {
                    comparison_value: comparison_value.into(),
                }
            }
        }

        impl TypeInfo for $name {
            const TYPE_ID: &'static str = $id;
            const DISPLAY_NAME: &'static str = $display;
            const SHORT_NAME: &'static str = $short;
            const DESCRIPTION: &'static str = $description;
        }

        #[async_trait]
        impl ComparisonOperation for $name {
            fn type_key(&self) -> &'static str {
                Self::TYPE_ID
            }

            fn operands(&self) -> Vec<&str> {
                vec![self.comparison_value.as_str()]
            }

            fn matches(&self, $result: &TransformationResult) -> bool {
                if $result.current_value.is_null() {
                    return false;
                }
                let $operand = self.comparison_value.as_str();
                $test
            }
        }
    };
}

single_operand!(
    /// Current value equals the operand.
    Equals, "equals", "Equals", "=", "The value equals the comparison value",
    |result, operand| compare_text(&result.current_text(), operand) == Ordering::Equal
);

single_operand!(
    NotEquals, "notEquals", "Not equals", "≠", "The value differs from the comparison value",
    |result, operand| compare_text(&result.current_text(), operand) != Ordering::Equal
);

single_operand!(
    GreaterThan, "greaterThan", "Greater than", ">", "The value is greater than the comparison value",
    |result, operand| compare_text(&result.current_text(), operand) == Ordering::Greater
);

single_operand!(
    GreaterThanOrEqual, "greaterThanOrEqual", "Greater than or equal", ">=",
    "The value is greater than or equal to the comparison value",
    |result, operand| compare_text(&result.current_text(), operand) != Ordering::Less
);

single_operand!(
    LessThan, "lessThan", "Less than", "<", "The value is less than the comparison value",
    |result, operand| compare_text(&result.current_text(), operand) == Ordering::Less
);

single_operand!(
    LessThanOrEqual, "lessThanOrEqual", "Less than or equal", "<=",
    "The value is less than or equal to the comparison value",
    |result, operand| compare_text(&result.current_text(), operand) != Ordering::Greater
);

single_operand!(
    /// Substring test on text; membership test on a collection.
    Contains, "contains", "Contains", "∋", "The value contains the comparison value",
    |result, operand| if result.is_collection() {
        result.current_values().iter().any(|v| v == operand)
    } else {
        result.current_text().contains(operand)
    }
);

single_operand!(
    StartsWith, "startsWith", "Starts with", "^=", "The value starts with the comparison value",
    |result, operand| result.current_text().starts_with(operand)
);

single_operand!(
    EndsWith, "endsWith", "Ends with", "$=", "The value ends with the comparison value",
    |result, operand| result.current_text().ends_with(operand)
);

// =============================================================================
// Range
// =============================================================================

/// Inclusive range check: `comparisonValue <= value <= secondaryComparisonValue`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Between {
    #[serde(default)]
    pub comparison_value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secondary_comparison_value: Option<String>,
}

impl Between {
    pub fn new(lower: impl Into<String>, upper: impl Into<String>) -> Self {
        Self {
            comparison_value: lower.into(),
            secondary_comparison_value: Some(upper.into()),
        }
    }
}

impl TypeInfo for Between {
    const TYPE_ID: &'static str = "between";
    const DISPLAY_NAME: &'static str = "Between";
    const SHORT_NAME: &'static str = "[..]";
    const DESCRIPTION: &'static str = "The value lies between the two comparison values (inclusive)";
}

#[async_trait]
impl ComparisonOperation for Between {
    fn type_key(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn operands(&self) -> Vec<&str> {
        let mut operands = vec![self.comparison_value.as_str()];
        operands.extend(self.secondary_comparison_value.as_deref());
        operands
    }

    fn matches(&self, result: &TransformationResult) -> bool {
        let Some(upper) = &self.secondary_comparison_value else {
            return false;
        };
        if result.current_value.is_null() {
            return false;
        }
        let text = result.current_text();
        compare_text(&text, &self.comparison_value) != Ordering::Less
            && compare_text(&text, upper) != Ordering::Greater
    }
}

// =============================================================================
// Regex
// =============================================================================

/// The value's text matches a regular expression. An invalid pattern never
/// matches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchesRegex {
    #[serde(default)]
    pub comparison_value: String,
    #[serde(skip)]
    compiled: CompiledPattern,
}

impl PartialEq for MatchesRegex {
    fn eq(&self, other: &Self) -> bool {
        self.comparison_value == other.comparison_value
    }
}

impl MatchesRegex {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            comparison_value: pattern.into(),
            compiled: CompiledPattern::new(),
        }
    }
}

impl TypeInfo for MatchesRegex {
    const TYPE_ID: &'static str = "matchesRegex";
    const DISPLAY_NAME: &'static str = "Matches regex";
    const SHORT_NAME: &'static str = "~";
    const DESCRIPTION: &'static str = "The value matches a regular expression";
}

#[async_trait]
impl ComparisonOperation for MatchesRegex {
    fn type_key(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn operands(&self) -> Vec<&str> {
        vec![self.comparison_value.as_str()]
    }

    fn matches(&self, result: &TransformationResult) -> bool {
        if result.current_value.is_null() {
            return false;
        }
        self.compiled
            .get(&self.comparison_value)
            .is_ok_and(|regex| regex.is_match(&result.current_text()))
    }
}

// =============================================================================
// Null / empty checks
// =============================================================================

macro_rules! no_operand {
    ($name:ident, $id:literal, $display:literal, $short:literal, $description:literal, |$result:ident| $test:expr) => {
        #[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
        pub struct $name {}

        impl TypeInfo for $name {
            const TYPE_ID: &'static str = $id;
            const DISPLAY_NAME: &'static str = $display;
            const SHORT_NAME: &'static str = $short;
            const DESCRIPTION: &'static str = $description;
        }

        #[async_trait]
        impl ComparisonOperation for $name {
            fn type_key(&self) -> &'static str {
                Self::TYPE_ID
            }

            fn operands(&self) -> Vec<&str> {
                Vec::new()
            }

            fn matches(&self, $result: &TransformationResult) -> bool {
                $test
            }
        }
    };
}

no_operand!(IsNull, "isNull", "Is null", "∅", "The value is absent",
    |result| result.current_value.is_null());

no_operand!(IsNotNull, "isNotNull", "Is not null", "!∅", "The value is present",
    |result| !result.current_value.is_null());

no_operand!(IsEmpty, "isEmpty", "Is empty", "\"\"", "The value is absent, blank or an empty list",
    |result| is_blank(&result.current_value) || (result.is_collection() && result.current_values().is_empty()));

no_operand!(IsNotEmpty, "isNotEmpty", "Is not empty", "!\"\"", "The value has content",
    |result| !is_blank(&result.current_value) && !(result.is_collection() && result.current_values().is_empty()));

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ValueType;
    use crate::transform::result::ResultContext;
    use serde_json::{json, Value};

    fn result(value: Value) -> TransformationResult {
        let value_type = ValueType::of(&value);
        TransformationResult::initial(value, value_type, ResultContext::default())
    }

    #[test]
    fn test_numeric_before_ordinal() {
        assert!(GreaterThan::new("9").matches(&result(json!("10"))));
        assert!(!GreaterThan::new("9").matches(&result(json!("10 items"))));
        assert!(Equals::new("32").matches(&result(json!("32.0"))));
        assert!(Equals::new("32").matches(&result(json!(32))));
        assert!(LessThanOrEqual::new("5").matches(&result(json!("5"))));
        assert!(GreaterThanOrEqual::new("5").matches(&result(json!(5.5))));
    }

    #[test]
    fn test_dates_compare_chronologically() {
        assert!(LessThan::new("2024-02-01").matches(&result(json!("15/01/2024"))));
        assert!(!LessThan::new("2024-01-01").matches(&result(json!("15/01/2024"))));
    }

    #[test]
    fn test_string_operators() {
        assert!(Contains::new("190533").matches(&result(json!("280-190533-1"))));
        assert!(StartsWith::new("280").matches(&result(json!("280-190533-1"))));
        assert!(EndsWith::new("-1").matches(&result(json!("280-190533-1"))));
        assert!(!Equals::new("abc").matches(&result(json!("ABC"))));
        assert!(NotEquals::new("abc").matches(&result(json!("ABC"))));
        assert!(MatchesRegex::new(r"^\d{3}-").matches(&result(json!("280-190533-1"))));
        assert!(!MatchesRegex::new(r"(").matches(&result(json!("("))));
    }

    #[test]
    fn test_contains_on_collection_checks_membership() {
        let list = TransformationResult::initial(
            json!(r#"["280","190533"]"#),
            ValueType::StringArray,
            ResultContext::default(),
        );
        assert!(Contains::new("280").matches(&list));
        assert!(!Contains::new("28").matches(&list));
    }

    #[test]
    fn test_between_is_inclusive() {
        let range = Between::new("10", "20");
        assert!(range.matches(&result(json!("10"))));
        assert!(range.matches(&result(json!("15"))));
        assert!(range.matches(&result(json!("20"))));
        assert!(!range.matches(&result(json!("21"))));

        let open = Between {
            comparison_value: "1".into(),
            secondary_comparison_value: None,
        };
        assert!(!open.matches(&result(json!("5"))));
    }

    #[test]
    fn test_null_is_distinct_from_unequal() {
        let null = result(Value::Null);
        assert!(IsNull::default().matches(&null));
        assert!(IsEmpty::default().matches(&null));
        assert!(!IsNotNull::default().matches(&null));
        assert!(!IsNotEmpty::default().matches(&null));
        assert!(!Equals::new("").matches(&null));
        assert!(!NotEquals::new("x").matches(&null));
        assert!(!Between::new("0", "9").matches(&null));

        let blank = result(json!("  "));
        assert!(!IsNull::default().matches(&blank));
        assert!(IsEmpty::default().matches(&blank));
        assert!(IsNotNull::default().matches(&blank));
    }

    #[tokio::test]
    async fn test_cancelled_evaluation_never_matches() {
        let cancel = Cancellation::new();
        cancel.cancel();
        assert!(!IsNotNull::default().evaluate(&result(json!("x")), &cancel).await);
    }

    #[test]
    fn test_describe() {
        assert_eq!(GreaterThan::new("10").describe(), "greaterThan 10");
        assert_eq!(Between::new("1", "5").describe(), "between 1 and 5");
        assert_eq!(IsNull::default().describe(), "isNull");
    }

    #[test]
    fn test_no_operand_serializes_as_tagged_object() {
        let op: Box<dyn ComparisonOperation> = Box::new(IsEmpty::default());
        assert_eq!(serde_json::to_value(&op).unwrap(), json!({ "typeId": "isEmpty" }));
    }
}
