//! Eager startup validation of study configurations.
//!
//! Every configuration problem across all studies and transformations is
//! collected, logged exhaustively, and raised as a single fatal error; the
//! system never starts transforming data with a known-bad mapping.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::error;

use cdh_model::MULTIPLE_VALUE_DELIMITER;
use cdh_schema::{SchemaCatalog, split_output_field};

use crate::error::{ConfigError, Result};
use crate::macros::MacroExpr;
use crate::types::{AppConfig, FieldMapping, StudyConfig, TransformationConfig, parse_delimited_list};

/// Verify the presence of required top-level configuration variables before
/// any remote resolution happens.
pub fn verify_app_config(config: &AppConfig) -> Result<()> {
    let mut missing: Vec<String> = Vec::new();
    if config.json_schema_url.is_empty() {
        missing.push("json_schema_url".to_string());
    }
    if config.study_configurations.is_empty() {
        missing.push("study_configurations".to_string());
    }
    for study in &config.study_configurations {
        for (key, present) in [
            ("study", !study.study.is_empty()),
            ("transformations", !study.transformations.is_empty()),
            ("transformations_url", !study.transformations_url.is_empty()),
        ] {
            if !present {
                missing.push(format!("study_configurations => {key}"));
            }
        }
        for xform in &study.transformations {
            for (key, present) in [
                ("name", !xform.name.is_empty()),
                ("source_file_path", !xform.source_file_path.is_empty()),
                ("output_file_path", !xform.output_file_path.is_empty()),
            ] {
                if !present {
                    missing.push(format!("study_configurations => transformations => {key}"));
                }
            }
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::MissingVariables(missing))
    }
}

/// Validate all resolved study configurations against the schema and the
/// loaded source headers (keyed by transformation name). Logs every error
/// and fails if any were found.
pub fn assert_valid_study_configurations(
    catalog: &SchemaCatalog,
    studies: &[StudyConfig],
    headers: &BTreeMap<String, Vec<String>>,
) -> Result<()> {
    if studies.is_empty() {
        return Err(ConfigError::NoStudyConfigurations);
    }
    let distinct_ids: BTreeSet<&str> = studies.iter().map(|s| s.study.as_str()).collect();
    if distinct_ids.len() != studies.len() {
        return Err(ConfigError::DuplicateStudyIds);
    }

    let mut errors: Vec<String> = Vec::new();
    for study in studies {
        for (index, xform) in study.transformations.iter().enumerate() {
            errors.extend(transformation_errors(
                catalog,
                &study.study,
                index,
                xform,
                headers.get(&xform.name).map(Vec::as_slice),
            ));
        }
    }
    for err in &errors {
        error!("{err}");
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::InvalidTransformations { errors })
    }
}

/// Collect errors for one transformation. `header` is `None` when the
/// source file could not be loaded.
pub fn transformation_errors(
    catalog: &SchemaCatalog,
    study_id: &str,
    index: usize,
    xform: &TransformationConfig,
    header: Option<&[String]>,
) -> Vec<String> {
    let mut errors = Vec::new();
    if xform.name.is_empty()
        || xform.source_file_path.is_empty()
        || xform.output_file_path.is_empty()
        || xform.mappings.is_empty()
    {
        errors.push(format!(
            "study {study_id}, transformation {}: one or more of \
             \"name\"/\"source_file_path\"/\"output_file_path\"/\"mappings\" missing or empty",
            index + 1
        ));
    }
    let Some(header) = header else {
        errors.push(format!("{} ({study_id}): unable to load source data", xform.name));
        return errors;
    };
    if !errors.is_empty() {
        return errors;
    }
    for mapping in &xform.mappings {
        errors.extend(mapping_errors(catalog, study_id, &xform.name, header, mapping));
    }
    errors
}

fn mapping_errors(
    catalog: &SchemaCatalog,
    study_id: &str,
    xform_name: &str,
    header: &[String],
    mapping: &FieldMapping,
) -> Vec<String> {
    let mut errors = Vec::new();

    let source_field = mapping.source_field.trim();
    let compound_fields = if mapping.is_compound() {
        mapping.compound_fields()
    } else {
        Vec::new()
    };
    if source_field.is_empty() {
        errors.push(format!(
            "{xform_name} ({study_id}): mapping source field not specified for output field \
             \"{}\"",
            mapping.output_field
        ));
    } else if mapping.is_compound() {
        let missing: Vec<&String> = compound_fields
            .iter()
            .filter(|f| *f != "string_literal" && !header.contains(f))
            .collect();
        if !missing.is_empty() {
            errors.push(format!(
                "{xform_name} ({study_id}): compound source field in mapping (\"{source_field}\") \
                 not present in source data header: {missing:?}"
            ));
        }
    } else if !header.iter().any(|h| h == source_field) {
        errors.push(format!(
            "{xform_name} ({study_id}): source field in mapping (\"{source_field}\") \
             not present in source data header"
        ));
    }

    let output_field = mapping.output_field.trim();
    if output_field.is_empty() {
        errors.push(format!(
            "{xform_name} ({study_id}): mapping output field not specified for source field \
             \"{source_field}\""
        ));
    } else {
        match split_output_field(output_field) {
            Ok((Some(node_type), property)) if catalog.has_property(node_type, property) => {}
            _ => errors.push(format!(
                "{xform_name} ({study_id}): mapping output field invalid: \"{output_field}\""
            )),
        }
    }

    for index in mapping.type_group_indices() {
        if !(index.is_empty() || index == "*" || index.parse::<i64>().is_ok()) {
            errors.push(format!(
                "{xform_name} ({study_id}): invalid type group index \"{index}\" for output \
                 field \"{output_field}\""
            ));
        }
    }

    for entry in &mapping.replacement_values {
        let old_value = entry.old_value_text();

        if mapping.is_string_literal() && !matches!(old_value.as_str(), "*" | "+") {
            errors.push(format!(
                "{xform_name} ({study_id}): replacement entry has invalid old value \
                 \"{old_value}\" for string literal source"
            ));
        }

        // compound old values match positionally, so arity must line up
        if !compound_fields.is_empty() && !matches!(old_value.as_str(), "*" | "+") {
            let old_values =
                parse_delimited_list(old_value.trim_matches(['[', ']', ' ']), MULTIPLE_VALUE_DELIMITER as u8);
            if old_values.len() != compound_fields.len() {
                errors.push(format!(
                    "{xform_name} ({study_id}): replacement old value \"{old_value}\" must be \
                     \"*\" or contain {} \"{MULTIPLE_VALUE_DELIMITER}\"-delimited values to match \
                     compound source field \"{source_field}\"",
                    compound_fields.len()
                ));
            }
        }

        let new_values: Vec<&Value> = match &entry.new_value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for new_value in new_values {
            let Some(text) = new_value.as_str() else {
                continue;
            };
            if !text.contains('{') && !text.contains('}') {
                continue;
            }
            match MacroExpr::parse(text) {
                Ok(Some(MacroExpr::Field(field))) if !header.contains(&field) => {
                    errors.push(format!(
                        "{xform_name} ({study_id}): macro source field \"{field}\" not present \
                         in source data header"
                    ));
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => {
                    errors.push(format!(
                        "{xform_name} ({study_id}): invalid replacement macro: {text}"
                    ));
                }
            }
        }
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::{assert_valid_study_configurations, transformation_errors, verify_app_config};
    use crate::error::ConfigError;
    use crate::types::{AppConfig, StudyConfig, TransformationConfig};
    use cdh_schema::SchemaCatalog;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::from_document(json!({
            "$defs": {
                "participant": {
                    "properties": {
                        "participant_id": {"type": "string"},
                        "race": {
                            "type": "array",
                            "items": {"type": "string", "enum": ["White"]},
                        },
                    },
                    "required": ["participant_id"],
                },
            },
        }))
        .expect("catalog")
    }

    fn transformation(mappings: serde_json::Value) -> TransformationConfig {
        serde_json::from_value(json!({
            "name": "t1",
            "source_file_path": "s.csv",
            "output_file_path": "o.json",
            "mappings": mappings,
        }))
        .expect("transformation")
    }

    fn header() -> Vec<String> {
        vec!["USI".to_string(), "Race".to_string(), "Ethnicity".to_string()]
    }

    #[test]
    fn missing_top_level_variables() {
        let err = verify_app_config(&AppConfig::default()).unwrap_err();
        match err {
            ConfigError::MissingVariables(missing) => {
                assert!(missing.contains(&"json_schema_url".to_string()));
                assert!(missing.contains(&"study_configurations".to_string()));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn valid_transformation_has_no_errors() {
        let xform = transformation(json!([
            {"source_field": "USI", "output_field": "participant.participant_id"},
            {
                "source_field": "[Race, Ethnicity]",
                "output_field": "participant.race",
                "replacement_values": [{"old_value": "*", "new_value": "{race}"}],
            },
        ]));
        let errors = transformation_errors(&catalog(), "phs1", 0, &xform, Some(&header()));
        assert!(errors.is_empty(), "unexpected errors: {errors:?}");
    }

    #[test]
    fn unknown_source_and_output_fields_flagged() {
        let xform = transformation(json!([
            {"source_field": "Nope", "output_field": "participant.participant_id"},
            {"source_field": "USI", "output_field": "participant.unknown_prop"},
            {"source_field": "USI", "output_field": "sample.sample_id"},
        ]));
        let errors = transformation_errors(&catalog(), "phs1", 0, &xform, Some(&header()));
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn invalid_macro_and_macro_field_flagged() {
        let xform = transformation(json!([
            {
                "source_field": "USI",
                "output_field": "participant.participant_id",
                "replacement_values": [
                    {"old_value": "*", "new_value": "{bogus}"},
                    {"old_value": "*", "new_value": "{field:Missing Col}"},
                    {"old_value": "*", "new_value": "prefix-{uuid}"},
                ],
            },
        ]));
        let errors = transformation_errors(&catalog(), "phs1", 0, &xform, Some(&header()));
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn compound_old_value_arity_checked() {
        let xform = transformation(json!([
            {
                "source_field": "[Race, Ethnicity]",
                "output_field": "participant.race",
                "replacement_values": [{"old_value": "White", "new_value": "White"}],
            },
        ]));
        let errors = transformation_errors(&catalog(), "phs1", 0, &xform, Some(&header()));
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("compound source field"));
    }

    #[test]
    fn duplicate_study_ids_fatal() {
        let studies: Vec<StudyConfig> = vec![
            serde_json::from_value(json!({"study": "phs1", "transformations_url": "u"})).unwrap(),
            serde_json::from_value(json!({"study": "phs1", "transformations_url": "u"})).unwrap(),
        ];
        let err =
            assert_valid_study_configurations(&catalog(), &studies, &BTreeMap::new()).unwrap_err();
        assert!(matches!(err, ConfigError::DuplicateStudyIds));
    }

    #[test]
    fn missing_source_data_reported() {
        let xform = transformation(json!([
            {"source_field": "USI", "output_field": "participant.participant_id"},
        ]));
        let errors = transformation_errors(&catalog(), "phs1", 0, &xform, None);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("unable to load source data"));
    }
}
