use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{reject_collection, ValueTransformation};
use crate::models::value::encode_string_list;
use crate::models::ValueType;
use crate::registry::TypeInfo;
use crate::transform::cancel::Cancellation;
use crate::transform::pattern::CompiledPattern;
use crate::transform::result::TransformationResult;

/// Extract the matches of a regular expression.
///
/// No match gives `""`, one match gives the match, several give a JSON string
/// array typed [`ValueType::StringArray`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegexMatch {
    #[serde(default)]
    pub pattern: String,
    #[serde(skip)]
    compiled: CompiledPattern,
}

impl PartialEq for RegexMatch {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl RegexMatch {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            compiled: CompiledPattern::new(),
        }
    }

    fn regex(&self) -> Result<regex::Regex, String> {
        self.compiled.get(&self.pattern)
    }
}

impl TypeInfo for RegexMatch {
    const TYPE_ID: &'static str = "regexMatch";
    const DISPLAY_NAME: &'static str = "Regex match";
    const SHORT_NAME: &'static str = "Regex";
    const DESCRIPTION: &'static str = "Keep only the parts of the value matching a regular expression";
}

#[async_trait]
impl ValueTransformation for RegexMatch {
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
        let previous = match reject_collection(previous) {
            Ok(result) => result,
            Err(failure) => return failure,
        };
        let regex = match self.regex() {
            Ok(regex) => regex,
            Err(e) => return previous.into_failure(format!("Invalid regex pattern: {}", e)),
        };

        let text = previous.current_text();
        let matches: Vec<String> = regex.find_iter(&text).map(|m| m.as_str().to_string()).collect();

        match matches.len() {
            0 => previous.with_value(Value::String(String::new()), ValueType::String),
            1 => {
                let single = matches.into_iter().next().unwrap_or_default();
                previous.with_value(Value::String(single), ValueType::String)
            }
            _ => previous.with_value(Value::String(encode_string_list(&matches)), ValueType::StringArray),
        }
    }
}
