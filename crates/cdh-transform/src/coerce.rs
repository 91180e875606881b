//! Type coercion of raw/derived values to the schema-declared type of an
//! output property.

use serde_json::{Number, Value};
use tracing::warn;

use cdh_model::MULTIPLE_VALUE_DELIMITER;
use cdh_schema::{JsonType, SchemaCatalog, SchemaError};

use crate::error::Result;
use crate::value::{is_number, value_text};

/// Convert a value to the JSON schema type declared for `output_field`
/// (`node_type.property`).
///
/// Array properties split a delimiter-joined string into sub-values; enum
/// arrays case-match each sub-value against the permissible values and drop
/// non-matches with a warning. Numeric properties that fail to parse yield
/// `None` with a warning; integers are rounded, not truncated, to tolerate
/// floating-point artifacts in numeric source cells. Enum string properties
/// are case-matched, with zero matches yielding `None`.
pub fn convert_value(
    catalog: &SchemaCatalog,
    output_field: &str,
    value: &Value,
) -> Result<Option<Value>> {
    if value.is_null() {
        return Ok(None);
    }

    // collate into a delimited string if a collection was supplied
    let text = match value {
        Value::Array(items) => items
            .iter()
            .map(value_text)
            .collect::<Vec<_>>()
            .join(&MULTIPLE_VALUE_DELIMITER.to_string()),
        other => value_text(other),
    };

    let Some(json_type) = catalog.property_type(output_field)? else {
        return Err(SchemaError::UnsupportedType {
            property: output_field.to_string(),
            json_type: "unknown".to_string(),
        }
        .into());
    };

    if json_type.is_numeric() && !is_number(&text) {
        warn!(
            "Unable to convert source value \"{text}\" to type \"{}\" for property \
             \"{output_field}\"",
            json_type.as_str()
        );
        return Ok(None);
    }

    match json_type {
        JsonType::Array => {
            let sub_values = text.split(MULTIPLE_VALUE_DELIMITER).map(str::trim);
            if catalog.enum_values(output_field).is_none() {
                // values not constrained, split on delimiter
                return Ok(Some(Value::Array(
                    sub_values.map(|s| Value::String(s.to_string())).collect(),
                )));
            }
            let mut matched: Vec<Value> = Vec::new();
            let mut seen: Vec<String> = Vec::new();
            for sub_value in sub_values {
                if seen.iter().any(|s| s == sub_value) {
                    continue;
                }
                seen.push(sub_value.to_string());
                match catalog.case_match_enum_value(output_field, sub_value)? {
                    Some(case_matched) => matched.push(Value::String(case_matched)),
                    None => warn!(
                        "Unable to case match source sub-value \"{sub_value}\" for enum \
                         property \"{output_field}\", omitting"
                    ),
                }
            }
            Ok(Some(Value::Array(matched)))
        }
        JsonType::Number => Ok(parse_f64(&text).and_then(Number::from_f64).map(Value::Number)),
        JsonType::Integer => Ok(parse_f64(&text)
            .map(|n| Value::Number(Number::from(n.round() as i64)))),
        JsonType::String => {
            if catalog.enum_values(output_field).is_none() {
                return Ok(Some(Value::String(text)));
            }
            let case_matched = catalog.case_match_enum_value(output_field, &text)?;
            if case_matched.is_none() {
                warn!(
                    "Unable to case match source value \"{text}\" for enum property \
                     \"{output_field}\", omitting"
                );
            }
            Ok(case_matched.map(Value::String))
        }
    }
}

fn parse_f64(text: &str) -> Option<f64> {
    text.trim().parse().ok()
}
