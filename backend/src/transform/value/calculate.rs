use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::formula::{self, round_half_even};
use super::{substitute, ValueTransformation};
use crate::models::ValueType;
use crate::registry::TypeInfo;
use crate::transform::cancel::Cancellation;
use crate::transform::result::TransformationResult;

/// Message for any formula that does not parse or evaluate.
pub const INVALID_FORMULA: &str = "The formula has an invalid format";

const MIN_DECIMAL_PLACES: i32 = -1;
const MAX_DECIMAL_PLACES: i32 = 15;

/// Evaluate an arithmetic formula over the current value(s).
///
/// Placeholders are filled like [`Interpolate`](super::Interpolate); any left
/// unmatched become `0`. The result is rounded half-to-even to
/// `decimal_places` (clamped to `-1..=15`, `-1` meaning no rounding).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Calculate {
    #[serde(default)]
    pub formula: String,
    #[serde(default = "default_decimal_places")]
    pub decimal_places: i32,
}

fn default_decimal_places() -> i32 {
    -1
}

impl Default for Calculate {
    fn default() -> Self {
        Self {
            formula: String::new(),
            decimal_places: default_decimal_places(),
        }
    }
}

impl Calculate {
    pub fn new(formula: impl Into<String>, decimal_places: i32) -> Self {
        Self {
            formula: formula.into(),
            decimal_places,
        }
    }

    pub fn effective_decimal_places(&self) -> i32 {
        self.decimal_places.clamp(MIN_DECIMAL_PLACES, MAX_DECIMAL_PLACES)
    }
}

impl TypeInfo for Calculate {
    const TYPE_ID: &'static str = "calculate";
    const DISPLAY_NAME: &'static str = "Calculate";
    const SHORT_NAME: &'static str = "Calc";
    const DESCRIPTION: &'static str = "Evaluate an arithmetic formula; ${0}, ${1}, ... stand for the values";
}

#[async_trait]
impl ValueTransformation for Calculate {
    fn type_key(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn transformation_detail(&self) -> String {
        self.formula.clone()
    }

    fn is_empty(&self) -> bool {
        self.formula.trim().is_empty()
    }

    async fn execute(&self, previous: TransformationResult, _cancel: &Cancellation) -> TransformationResult {
        let values = previous.current_values();
        let expression = substitute(&self.formula, &values, Some("0"));

        let computed = match formula::evaluate(&expression) {
            Ok(n) => n,
            Err(_) => return previous.into_failure(INVALID_FORMULA),
        };
        if !computed.is_finite() {
            return previous.into_failure(format!(
                "NumericOverflow: '{}' does not evaluate to a finite number",
                expression
            ));
        }

        let mut rounded = round_half_even(computed, self.effective_decimal_places());
        if rounded == 0.0 {
            // No "-0" in output
            rounded = 0.0;
        }
        previous.with_value(Value::String(rounded.to_string()), ValueType::Decimal)
    }
}
