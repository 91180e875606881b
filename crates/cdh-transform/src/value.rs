//! Shared raw-value helpers used by matching, coercion and evaluation.

use serde_json::Value;

/// Render a raw JSON value as text the way source cells are compared:
/// strings verbatim, everything else via JSON serialization.
pub fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// True when the value is absent-equivalent: null or a blank string.
pub fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

/// True when the text parses as a number (integer or float).
pub fn is_number(text: &str) -> bool {
    text.trim().parse::<f64>().is_ok()
}
