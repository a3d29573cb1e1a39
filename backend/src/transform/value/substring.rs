use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{reject_collection, ValueTransformation};
use crate::models::ValueType;
use crate::registry::TypeInfo;
use crate::transform::cancel::Cancellation;
use crate::transform::result::TransformationResult;

/// Sentinel for "up to the end of the text".
pub const UNBOUNDED: i32 = i32::MAX;

/// Take part of the value's text, counted in characters.
///
/// A negative `start_index` counts from the end. A negative `max_length`
/// stops `|max_length|` characters before the end. Out-of-range bounds are
/// clamped, so the stage never fails on indices.
///
/// Collections are refused like in [`MapValues`](super::MapValues): a
/// multi-match [`RegexMatch`](super::RegexMatch) upstream fails here, since
/// cutting the encoded array text would not yield a meaningful value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Substring {
    #[serde(default)]
    pub start_index: i32,
    #[serde(default = "default_max_length")]
    pub max_length: i32,
}

fn default_max_length() -> i32 {
    UNBOUNDED
}

impl Default for Substring {
    fn default() -> Self {
        Self {
            start_index: 0,
            max_length: UNBOUNDED,
        }
    }
}

impl Substring {
    pub fn new(start_index: i32, max_length: i32) -> Self {
        Self {
            start_index,
            max_length,
        }
    }

    /// Character range `[start, end)` selected in a text of `len` characters.
    pub fn bounds(&self, len: usize) -> (usize, usize) {
        let len = len as i64;
        let start = if self.start_index < 0 {
            len + self.start_index as i64
        } else {
            self.start_index as i64
        };
        let start = start.clamp(0, len);

        let end = if self.max_length < 0 {
            len + self.max_length as i64
        } else {
            start.saturating_add(self.max_length as i64)
        };
        let end = end.clamp(0, len);

        if end <= start {
            (start as usize, start as usize)
        } else {
            (start as usize, end as usize)
        }
    }

    pub fn extract(&self, text: &str) -> String {
        let len = text.chars().count();
        let (start, end) = self.bounds(len);
        text.chars().skip(start).take(end - start).collect()
    }
}

impl TypeInfo for Substring {
    const TYPE_ID: &'static str = "substring";
    const DISPLAY_NAME: &'static str = "Substring";
    const SHORT_NAME: &'static str = "Sub";
    const DESCRIPTION: &'static str = "Keep part of the text; negative positions count from the end";
}

#[async_trait]
impl ValueTransformation for Substring {
    fn type_key(&self) -> &'static str {
        Self::TYPE_ID
    }

    fn transformation_detail(&self) -> String {
        if self.max_length == UNBOUNDED {
            format!("{}", self.start_index)
        } else {
            format!("{}, {}", self.start_index, self.max_length)
        }
    }

    fn is_empty(&self) -> bool {
        self.start_index == 0 && self.max_length == UNBOUNDED
    }

    async fn execute(&self, previous: TransformationResult, _cancel: &Cancellation) -> TransformationResult {
        let previous = match reject_collection(previous) {
            Ok(result) => result,
            Err(failure) => return failure,
        };
        let output = self.extract(&previous.current_text());
        previous.with_value(Value::String(output), ValueType::String)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_last_character() {
        let result = Substring::new(-1, UNBOUNDED)
            .transform(json!("280-190533-1"), None, &Cancellation::new())
            .await;
        assert_eq!(result.current_value, json!("1"));
    }

    #[test]
    fn test_positive_bounds() {
        assert_eq!(Substring::new(0, 3).extract("280-190533-1"), "280");
        assert_eq!(Substring::new(4, 6).extract("280-190533-1"), "190533");
        assert_eq!(Substring::new(4, UNBOUNDED).extract("280-190533-1"), "190533-1");
    }

    #[test]
    fn test_negative_bounds() {
        assert_eq!(Substring::new(-8, 6).extract("280-190533-1"), "190533");
        assert_eq!(Substring::new(0, -2).extract("280-190533-1"), "280-190533");
        assert_eq!(Substring::new(-3, -1).extract("abcdef"), "de");
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        assert_eq!(Substring::new(1, 2).extract("éàü!"), "àü");
        assert_eq!(Substring::new(-1, UNBOUNDED).extract("naïve"), "e");
    }

    #[test]
    fn test_never_panics_and_respects_length() {
        let text = "abcdef";
        let len = text.chars().count() as i64;
        let edges = [i32::MIN, -100, -7, -6, -1, 0, 1, 3, 6, 7, 100, i32::MAX];
        for start in edges {
            for max in edges {
                let output = Substring::new(start, max).extract(text);
                let effective_start = if start < 0 { len + start as i64 } else { start as i64 }.clamp(0, len);
                assert!(output.chars().count() as i64 <= (len - effective_start).max(0));
                assert!(text.contains(&output));
            }
        }
    }

    #[tokio::test]
    async fn test_collection_input_is_refused() {
        use crate::transform::value::{RegexMatch, COLLECTION_NOT_SUPPORTED};

        let cancel = Cancellation::new();
        let many = RegexMatch::new(r"\d+").transform(json!("280-190533-1"), None, &cancel).await;
        let result = Substring::new(0, 3).apply_transformation(many, &cancel).await;
        assert_eq!(result.error_message(), Some(COLLECTION_NOT_SUPPORTED));

        let single = RegexMatch::new(r"\d{6}").transform(json!("280-190533-1"), None, &cancel).await;
        let result = Substring::new(0, 3).apply_transformation(single, &cancel).await;
        assert_eq!(result.current_value, json!("190"));
    }

    #[test]
    fn test_empty_text() {
        assert_eq!(Substring::new(-1, 1).extract(""), "");
        assert_eq!(Substring::new(5, 1).extract(""), "");
    }
}
