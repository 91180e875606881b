//! Replacement-rule matching: decides whether a replacement entry's
//! `old_value` applies to the current source record.

use std::collections::BTreeSet;

use serde_json::Value;

use cdh_config::{FieldMapping, parse_delimited_list};
use cdh_model::{MULTIPLE_VALUE_DELIMITER, SourceRecord};

use crate::error::{Result, TransformError};
use crate::value::value_text;

/// Determine whether the record's source value(s) match the replacement
/// entry's old value.
///
/// For a single source field: `*` always matches, `+` matches a non-blank
/// value, anything else compares case-insensitively. For a compound source
/// field the old value must be a wildcard or a delimiter-separated list of
/// exactly N values compared positionally under the same rules; a length
/// mismatch is a configuration error.
///
/// `[string_literal]` is bracketed and therefore takes the compound path
/// with the synthetic field name `string_literal`, which no source record
/// carries: `*` matches, `+` never does.
pub fn is_replacement_match(
    mapping: &FieldMapping,
    record: &SourceRecord,
    old_value: &str,
) -> Result<bool> {
    if !mapping.is_compound() {
        let old = normalize(old_value);
        let source = record
            .text(mapping.source_field_trimmed())
            .map(|s| s.to_lowercase())
            .unwrap_or_default();
        return Ok(old == "*"
            || (old == "+" && !source.is_empty())
            || (!source.is_empty() && !old.is_empty() && source == old));
    }

    let field_names = mapping.compound_fields();
    let old_values: Vec<String> = if matches!(old_value, "*" | "+") {
        vec![old_value.to_string(); field_names.len()]
    } else {
        parse_delimited_list(
            old_value.trim_matches(['[', ']', ' ']),
            MULTIPLE_VALUE_DELIMITER as u8,
        )
    };
    if old_values.len() != field_names.len() {
        return Err(TransformError::ReplacementArity {
            old_value: old_value.to_string(),
            source_field: mapping.source_field.clone(),
        });
    }

    for (field_name, old) in field_names.iter().zip(&old_values) {
        let old = normalize(old);
        let source = record
            .text(field_name)
            .map(|s| s.to_lowercase())
            .unwrap_or_default();
        if !(old == "*" || (old == "+" && !source.is_empty()) || source == old) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Determine whether a value (scalar or list) is contained in or a subset of
/// the allowed values. An empty allow-list permits nothing; the builder only
/// consults non-empty lists.
pub fn is_allowed_value(value: Option<&Value>, allowed: &BTreeSet<String>) -> bool {
    if allowed.is_empty() {
        return false;
    }
    match value {
        None | Some(Value::Null) => allowed.contains(""),
        Some(Value::Array(items)) => {
            !items.is_empty() && items.iter().all(|v| allowed.contains(&value_text(v)))
        }
        Some(other) => allowed.contains(&value_text(other)),
    }
}

fn normalize(old_value: &str) -> String {
    old_value.trim().to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::{is_allowed_value, is_replacement_match};
    use cdh_config::FieldMapping;
    use cdh_model::SourceRecord;
    use serde_json::{Value, json};
    use std::collections::BTreeMap;
    use std::collections::BTreeSet;

    fn mapping(source_field: &str) -> FieldMapping {
        serde_json::from_value(json!({
            "source_field": source_field,
            "output_field": "participant.race",
        }))
        .expect("mapping")
    }

    fn record(pairs: &[(&str, &str)]) -> SourceRecord {
        let values: BTreeMap<String, Value> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), json!(v)))
            .collect();
        SourceRecord::new(values, 2)
    }

    #[test]
    fn single_field_wildcards() {
        let m = mapping("Sex");
        let rec = record(&[("Sex", "Female")]);
        let blank = record(&[("Sex", "")]);
        assert!(is_replacement_match(&m, &rec, "*").unwrap());
        assert!(is_replacement_match(&m, &blank, "*").unwrap());
        assert!(is_replacement_match(&m, &rec, "+").unwrap());
        assert!(!is_replacement_match(&m, &blank, "+").unwrap());
    }

    #[test]
    fn single_field_case_insensitive_equality() {
        let m = mapping("Sex");
        let rec = record(&[("Sex", " FEMALE ")]);
        assert!(is_replacement_match(&m, &rec, "female").unwrap());
        assert!(!is_replacement_match(&m, &rec, "male").unwrap());
    }

    #[test]
    fn string_literal_matches_wildcard_only() {
        let m = mapping("[string_literal]");
        let rec = record(&[("Sex", "Female")]);
        assert!(is_replacement_match(&m, &rec, "*").unwrap());
        // the synthetic string_literal field is absent from every record,
        // so the non-blank wildcard and literal comparisons never hold
        assert!(!is_replacement_match(&m, &rec, "+").unwrap());
        assert!(!is_replacement_match(&m, &rec, "female").unwrap());
    }

    #[test]
    fn compound_positional_match() {
        let m = mapping("[a, b]");
        let rec = record(&[("a", "X"), ("b", "Y")]);
        assert!(is_replacement_match(&m, &rec, "x;y").unwrap());
        assert!(!is_replacement_match(&m, &rec, "x;z").unwrap());
        assert!(is_replacement_match(&m, &rec, "*").unwrap());
        assert!(is_replacement_match(&m, &rec, "x;*").unwrap());
        assert!(is_replacement_match(&m, &rec, "+;+").unwrap());
    }

    #[test]
    fn compound_arity_mismatch_is_error() {
        let m = mapping("[a, b]");
        let rec = record(&[("a", "X"), ("b", "Y")]);
        assert!(is_replacement_match(&m, &rec, "x").is_err());
    }

    #[test]
    fn allowed_value_scalars_and_lists() {
        let allowed: BTreeSet<String> = ["Yes".to_string(), "No".to_string()].into();
        assert!(is_allowed_value(Some(&json!("Yes")), &allowed));
        assert!(!is_allowed_value(Some(&json!("Maybe")), &allowed));
        assert!(is_allowed_value(Some(&json!(["Yes", "No"])), &allowed));
        assert!(!is_allowed_value(Some(&json!(["Yes", "Maybe"])), &allowed));
        assert!(!is_allowed_value(Some(&json!([])), &allowed));
        assert!(!is_allowed_value(None, &allowed));

        let with_blank: BTreeSet<String> = ["".to_string(), "Yes".to_string()].into();
        assert!(is_allowed_value(None, &with_blank));
        assert!(is_allowed_value(Some(&Value::Null), &with_blank));
    }
}
