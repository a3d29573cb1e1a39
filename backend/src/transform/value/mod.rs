//! Value transformations - chainable pipeline stages
//!
//! Every stage implements [`ValueTransformation`]. The provided
//! [`apply_transformation`](ValueTransformation::apply_transformation) enforces
//! the short-circuit contract (a failed input passes through unchanged) and
//! cancellation checks; concrete stages only implement
//! [`execute`](ValueTransformation::execute), which always receives a
//! successful result.
//!
//! Available stages:
//!
//! | TypeId | Stage |
//! |---|---|
//! | `interpolate` | [`Interpolate`] |
//! | `calculate` | [`Calculate`] |
//! | `map` | [`MapValues`] |
//! | `regexMatch` | [`RegexMatch`] |
//! | `substring` | [`Substring`] |
//! | `combineFields` | [`CombineFields`] |
//! | `conditional` | [`Conditional`] |

mod calculate;
mod combine_fields;
mod conditional;
pub mod formula;
mod interpolate;
mod map;
mod regex_match;
mod substring;

pub use calculate::{Calculate, INVALID_FORMULA};
pub use combine_fields::CombineFields;
pub use conditional::{Conditional, MISSING_COMPARISON, MISSING_FALSE_RULE, MISSING_RECORD, MISSING_TRUE_RULE};
pub use interpolate::Interpolate;
pub use map::MapValues;
pub use regex_match::RegexMatch;
pub use substring::{Substring, UNBOUNDED};

use async_trait::async_trait;
use serde_json::Value;
use std::fmt::Debug;

use super::cancel::{Cancellation, CANCELLED_MESSAGE};
use super::result::{ResultContext, TransformationResult};
use crate::models::ValueType;
use crate::registry::{self, polymorphic::polymorphic_family};

/// Message for stages that refuse collection input.
pub const COLLECTION_NOT_SUPPORTED: &str = "This operation is invalid for collections";

// =============================================================================
// Stage contract
// =============================================================================

/// One pipeline stage.
#[async_trait]
pub trait ValueTransformation: TransformationErased + Debug {
    /// Stable discriminator persisted with the configuration.
    fn type_key(&self) -> &'static str;

    /// The user-configured parameter (pattern, formula, ...).
    fn transformation_detail(&self) -> String;

    /// True when the stage has no effective configuration.
    fn is_empty(&self) -> bool;

    /// Stage body. Only called with a successful `previous`.
    async fn execute(&self, previous: TransformationResult, cancel: &Cancellation) -> TransformationResult;

    fn display_name(&self) -> String {
        registry::transformations()
            .descriptor(self.type_key())
            .map(|d| d.display_name.to_string())
            .unwrap_or_else(|| self.type_key().to_string())
    }

    /// Label appended to `applied_transformations` on success.
    fn label(&self) -> String {
        format!("{}({})", self.type_key(), self.transformation_detail())
    }

    /// Run this stage on the result of the previous one.
    async fn apply_transformation(
        &self,
        previous: TransformationResult,
        cancel: &Cancellation,
    ) -> TransformationResult {
        if previous.was_failure() {
            return previous;
        }
        if cancel.is_cancelled() {
            return previous.into_failure(CANCELLED_MESSAGE);
        }

        let label = self.label();
        let result = self.execute(previous, cancel).await;
        if result.was_failure() {
            result
        } else {
            result.with_label(label)
        }
    }

    /// Run this stage on a raw value with no prior context.
    async fn transform(
        &self,
        value: Value,
        target_type: Option<ValueType>,
        cancel: &Cancellation,
    ) -> TransformationResult {
        let value_type = ValueType::of(&value);
        let context = ResultContext::default().with_target_type(target_type);
        let initial = TransformationResult::initial(value, value_type, context);
        self.apply_transformation(initial, cancel).await
    }
}

polymorphic_family!(ValueTransformation, TransformationErased, registry::transformations());

// =============================================================================
// Shared helpers
// =============================================================================

/// Fail `previous` if its current value is a collection.
pub(crate) fn reject_collection(previous: TransformationResult) -> Result<TransformationResult, TransformationResult> {
    if previous.is_collection() {
        Err(previous.into_failure(COLLECTION_NOT_SUPPORTED))
    } else {
        Ok(previous)
    }
}

/// Replace `${i}` placeholders positionally.
///
/// A placeholder whose index is out of range is replaced by `fallback` when
/// given, otherwise left verbatim.
pub(crate) fn substitute(pattern: &str, values: &[String], fallback: Option<&str>) -> String {
    let mut output = String::with_capacity(pattern.len());
    let mut rest = pattern;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let digits = after.bytes().take_while(u8::is_ascii_digit).count();

        if digits > 0 && after[digits..].starts_with('}') {
            let placeholder = &rest[start..start + 2 + digits + 1];
            let replacement = after[..digits]
                .parse::<usize>()
                .ok()
                .and_then(|i| values.get(i).map(String::as_str))
                .or(fallback)
                .unwrap_or(placeholder);
            output.push_str(replacement);
            rest = &after[digits + 1..];
        } else {
            output.push_str("${");
            rest = after;
        }
    }

    output.push_str(rest);
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_substitute_in_and_out_of_range() {
        let values = strings(&["a", "b"]);
        assert_eq!(substitute("${0}-${1}-${2}", &values, None), "a-b-${2}");
        assert_eq!(substitute("${0}+${5}", &values, Some("0")), "a+0");
        assert_eq!(substitute("${1}${1}${0}", &values, None), "bba");
    }

    #[test]
    fn test_substitute_ignores_malformed_placeholders() {
        let values = strings(&["x"]);
        assert_eq!(substitute("${} ${a} ${0", &values, None), "${} ${a} ${0");
        assert_eq!(substitute("$${0}}", &values, None), "$x}");
        assert_eq!(substitute("no placeholders", &values, None), "no placeholders");
    }

    #[tokio::test]
    async fn test_failed_input_short_circuits() {
        let stage = Substring::new(0, 2);
        let failed = TransformationResult::initial(json!("abcdef"), ValueType::String, ResultContext::default())
            .into_failure("upstream broke");

        let result = stage.apply_transformation(failed, &Cancellation::new()).await;
        assert_eq!(result.error_message(), Some("upstream broke"));
        assert!(result.applied_transformations.is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_before_stage() {
        let cancel = Cancellation::new();
        cancel.cancel();
        let result = Substring::new(0, 2).transform(json!("abc"), None, &cancel).await;
        assert_eq!(result.error_message(), Some(CANCELLED_MESSAGE));
    }

    #[tokio::test]
    async fn test_success_appends_label() {
        let result = Substring::new(0, 2)
            .transform(json!("abc"), None, &Cancellation::new())
            .await;
        assert_eq!(result.current_value, json!("ab"));
        assert_eq!(result.applied_transformations, vec!["substring(0, 2)"]);
    }

    #[test]
    fn test_display_name_from_registry() {
        assert_eq!(Substring::default().display_name(), "Substring");
    }
}
