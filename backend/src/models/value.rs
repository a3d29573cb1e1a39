//! Value helpers shared by transformations, comparisons and output generation.
//!
//! Cell values travel as [`serde_json::Value`]. Lists of strings (produced by
//! regex extraction or field combination) travel as a JSON-encoded string array
//! inside a `Value::String`, tagged with [`ValueType::StringArray`].

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use super::ValueType;

/// Date formats accepted when reading text as a date or timestamp.
const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d", "%d.%m.%Y"];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%d/%m/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M",
];

const TRUE_VALUES: &[&str] = &["true", "1", "yes", "y", "oui", "o", "x"];
const FALSE_VALUES: &[&str] = &["false", "0", "no", "n", "non"];

/// Render a value as plain text.
///
/// Strings are returned without quotes, `null` becomes the empty string and
/// arrays/objects are rendered as compact JSON.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Check if a value is "empty" (null, blank string, empty collection).
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

pub fn parse_number(text: &str) -> Option<f64> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|n| n.is_finite())
}

pub fn parse_integer(text: &str) -> Option<i64> {
    let trimmed = text.trim();
    if let Ok(n) = trimmed.parse::<i64>() {
        return Some(n);
    }
    // "32.0" is still an integer
    parse_number(trimmed)
        .filter(|n| n.fract() == 0.0 && n.abs() < i64::MAX as f64)
        .map(|n| n as i64)
}

pub fn parse_boolean(text: &str) -> Option<bool> {
    let lower = text.trim().to_lowercase();
    if TRUE_VALUES.contains(&lower.as_str()) {
        Some(true)
    } else if FALSE_VALUES.contains(&lower.as_str()) {
        Some(false)
    } else {
        None
    }
}

/// Parse a date or timestamp in one of the accepted formats.
pub fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }
    for format in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(dt);
        }
    }
    DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(trimmed, format).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Encode a list of strings with the JSON string-array wire encoding.
pub fn encode_string_list(items: &[String]) -> String {
    serde_json::to_string(items).unwrap_or_else(|_| String::from("[]"))
}

/// Return the elements of a value if it represents a collection of strings.
///
/// A value is a collection when it is a JSON array, or when it is text tagged
/// as [`ValueType::StringArray`] (or shaped like one) that decodes to a
/// string array.
pub fn as_string_list(value: &Value, value_type: ValueType) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => Some(items.iter().map(stringify).collect()),
        Value::String(s) => {
            let looks_like_array = s.trim_start().starts_with('[');
            if value_type != ValueType::StringArray && !looks_like_array {
                return None;
            }
            serde_json::from_str::<Vec<String>>(s).ok()
        }
        _ => None,
    }
}

/// Normalize a value to an ordered list of strings.
///
/// A scalar becomes a one-element list; a collection is expanded element-wise.
pub fn to_string_list(value: &Value, value_type: ValueType) -> Vec<String> {
    as_string_list(value, value_type).unwrap_or_else(|| vec![stringify(value)])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_stringify() {
        assert_eq!(stringify(&json!("abc")), "abc");
        assert_eq!(stringify(&json!(12)), "12");
        assert_eq!(stringify(&json!(1.5)), "1.5");
        assert_eq!(stringify(&json!(true)), "true");
        assert_eq!(stringify(&Value::Null), "");
        assert_eq!(stringify(&json!(["a", "b"])), r#"["a","b"]"#);
    }

    #[test]
    fn test_string_list_normalization() {
        assert_eq!(to_string_list(&json!("single"), ValueType::String), vec!["single"]);
        assert_eq!(
            to_string_list(&json!(r#"["a","b"]"#), ValueType::StringArray),
            vec!["a", "b"]
        );
        assert_eq!(to_string_list(&json!(["x", 1]), ValueType::Any), vec!["x", "1"]);
        // Bracketed text that is not a string array stays a scalar
        assert_eq!(to_string_list(&json!("[not json"), ValueType::String), vec!["[not json"]);
    }

    #[test]
    fn test_parse_helpers() {
        assert_eq!(parse_integer("32"), Some(32));
        assert_eq!(parse_integer("32.0"), Some(32));
        assert_eq!(parse_integer("32.5"), None);
        assert_eq!(parse_boolean("Oui"), Some(true));
        assert_eq!(parse_boolean("no"), Some(false));
        assert_eq!(parse_boolean("maybe"), None);
        assert!(parse_datetime("2024-03-15").is_some());
        assert!(parse_datetime("15/03/2024 10:30").is_some());
        assert!(parse_datetime("2024-03-15T10:30:00Z").is_some());
        assert!(parse_datetime("not a date").is_none());
    }
}
