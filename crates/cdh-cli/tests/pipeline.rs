//! Full pipeline integration test: configuration, remote mapping document
//! and source files on disk, harmonized/merged/report outputs verified.

use std::fs;

use serde_json::json;

use cdh_cli::pipeline::run_pipeline;

fn schema_document() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "participants": {"type": "array", "items": {"$ref": "#/$defs/participant"}},
            "diagnoses": {"type": "array", "items": {"$ref": "#/$defs/diagnosis"}},
            "studies": {"type": "array", "items": {"$ref": "#/$defs/study"}},
        },
        "$defs": {
            "study": {
                "properties": {
                    "study_id": {"type": "string"},
                },
                "required": ["study_id"],
            },
            "consent_group": {
                "properties": {
                    "consent_group_id": {"type": "string"},
                },
                "required": ["consent_group_id"],
            },
            "reference_file": {
                "properties": {
                    "reference_file_id": {"type": "string"},
                    "file_name": {"type": "string"},
                },
                "required": ["reference_file_id"],
            },
            "participant": {
                "properties": {
                    "participant_id": {"type": "string"},
                    "sex_at_birth": {"type": "string", "enum": ["Female", "Male", "Unknown"]},
                },
                "required": ["participant_id"],
            },
            "diagnosis": {
                "properties": {
                    "diagnosis_id": {"type": "string"},
                    "diagnosis": {
                        "type": "string",
                        "enum": ["8000/0 : Neoplasm, benign", "9500/3 : Neuroblastoma, NOS"],
                    },
                },
                "required": ["diagnosis_id"],
            },
        },
    })
}

fn mappings_entry(name: &str) -> serde_json::Value {
    json!({
        "name": name,
        "mappings": [
            {
                "source_field": "[string_literal]",
                "output_field": "study.study_id",
                "replacement_values": [{"old_value": "*", "new_value": "phs000001"}],
            },
            {
                "source_field": "[string_literal]",
                "output_field": "consent_group.consent_group_id",
                "replacement_values": [{"old_value": "*", "new_value": "phs000001-cg"}],
            },
            {
                "source_field": "[string_literal]",
                "output_field": "reference_file.reference_file_id",
                "replacement_values": [{"old_value": "*", "new_value": "{uuid}"}],
            },
            {
                "source_field": "[string_literal]",
                "output_field": "reference_file.file_name",
                "replacement_values": [{"old_value": "*", "new_value": "mapping.json"}],
            },
            {"source_field": "USI", "output_field": "participant.participant_id"},
            {
                "source_field": "Sex",
                "output_field": "participant.sex_at_birth",
                "replacement_values": [
                    {"old_value": "F", "new_value": "Female"},
                    {"old_value": "M", "new_value": "Male"},
                    {"old_value": "*", "new_value": "Unknown"},
                ],
            },
            {
                "source_field": "[string_literal]",
                "output_field": "diagnosis.diagnosis_id",
                "replacement_values": [{"old_value": "*", "new_value": "{uuid}"}],
            },
            {"source_field": "Diagnosis", "output_field": "diagnosis.diagnosis"},
        ],
    })
}

#[test]
fn pipeline_produces_harmonized_merged_and_report_files() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = |name: &str| dir.path().join(name).to_string_lossy().into_owned();

    let source = "USI,Sex,Diagnosis\n\
                  PARAAA,F,\"8000/0 : Neoplasm, benign\"\n\
                  PARBBB,M,\"9500/3 : Neuroblastoma, NOS\"\n";
    fs::write(dir.path().join("t1.csv"), source).expect("write t1.csv");
    fs::write(dir.path().join("t2.csv"), source).expect("write t2.csv");
    fs::write(dir.path().join("schema.json"), schema_document().to_string())
        .expect("write schema");
    fs::write(
        dir.path().join("mappings.json"),
        json!({"transformations": [mappings_entry("t1"), mappings_entry("t2")]}).to_string(),
    )
    .expect("write mappings");

    let config = json!({
        "json_schema_url": path("schema.json"),
        "study_configurations": [{
            "study": "phs000001",
            "transformations_url": path("mappings.json"),
            "transformations": [
                {
                    "name": "t1",
                    "source_file_path": path("t1.csv"),
                    "output_file_path": path("t1.harmonized.json"),
                    "uuid_seed": 7,
                },
                {
                    "name": "t2",
                    "source_file_path": path("t2.csv"),
                    "output_file_path": path("t2.harmonized.json"),
                    "uuid_seed": 11,
                },
            ],
            "merged_output_file_path": path("merged.json"),
            "duplicate_record_report_path": path("duplicates.csv"),
        }],
    });
    let config_path = dir.path().join("harmonizer.json");
    fs::write(&config_path, config.to_string()).expect("write config");

    let outcomes = run_pipeline(&config_path).expect("pipeline");
    assert_eq!(outcomes.len(), 1);
    let outcome = &outcomes[0];
    assert_eq!(outcome.study_id, "phs000001");
    assert_eq!(outcome.transformations, 2);
    assert_eq!(outcome.participants, 2);
    assert_eq!(outcome.observations, 2);
    // every second-file diagnosis is content-identical to the first file's
    assert_eq!(outcome.duplicates_suppressed, 2);
    assert!(outcome.schema_valid);

    let harmonized: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.path().join("t1.harmonized.json")).expect("read"))
            .expect("parse harmonized output");
    assert_eq!(harmonized["participants"].as_array().map(Vec::len), Some(2));
    assert_eq!(harmonized["diagnoses"].as_array().map(Vec::len), Some(2));

    let merged: serde_json::Value =
        serde_json::from_slice(&fs::read(dir.path().join("merged.json")).expect("read"))
            .expect("parse merged output");
    assert_eq!(merged["diagnoses"].as_array().map(Vec::len), Some(2));
    assert_eq!(merged["reference_files"].as_array().map(Vec::len), Some(1));

    let report = fs::read_to_string(dir.path().join("duplicates.csv")).expect("read report");
    assert!(report.starts_with("participant_id,"));
    assert!(report.contains("PARAAA"));
    assert!(report.contains("t1, t2"));
}

#[test]
fn invalid_mapping_fails_before_any_transformation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = |name: &str| dir.path().join(name).to_string_lossy().into_owned();

    fs::write(dir.path().join("t1.csv"), "USI\nPARAAA\n").expect("write csv");
    fs::write(dir.path().join("schema.json"), schema_document().to_string())
        .expect("write schema");
    // mapped source field absent from the source header
    fs::write(
        dir.path().join("mappings.json"),
        json!({"transformations": [{
            "name": "t1",
            "mappings": [
                {"source_field": "Missing", "output_field": "participant.participant_id"},
            ],
        }]})
        .to_string(),
    )
    .expect("write mappings");

    let config = json!({
        "json_schema_url": path("schema.json"),
        "study_configurations": [{
            "study": "phs000001",
            "transformations_url": path("mappings.json"),
            "transformations": [{
                "name": "t1",
                "source_file_path": path("t1.csv"),
                "output_file_path": path("t1.harmonized.json"),
            }],
        }],
    });
    let config_path = dir.path().join("harmonizer.json");
    fs::write(&config_path, config.to_string()).expect("write config");

    let error = run_pipeline(&config_path).unwrap_err();
    assert!(format!("{error:#}").contains("validate study configurations"));
    assert!(!dir.path().join("t1.harmonized.json").exists());
}

#[test]
fn missing_configuration_file_is_a_clear_error() {
    let dir = tempfile::tempdir().expect("tempdir");
    let error = run_pipeline(&dir.path().join("no-such-config.json")).unwrap_err();
    assert!(format!("{error:#}").contains("not found"));
}
