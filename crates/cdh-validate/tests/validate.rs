//! Relational and structural validation tests over hand-built graphs.

use serde_json::{Value, json};

use cdh_model::{Graph, NodeRecord, NodeType};
use cdh_schema::SchemaCatalog;
use cdh_validate::{ValidateError, validate_relationships, validate_structure};

fn record(body: serde_json::Value) -> NodeRecord {
    serde_json::from_value(body).expect("record")
}

fn wired_graph() -> Graph {
    let mut graph = Graph::new();
    graph.push(
        NodeType::Study,
        record(json!({
            "study_id": "phs000001",
            "consent_group.consent_group_id": ["phs000001-cg"],
            "reference_file.reference_file_id": ["rf-1"],
        })),
    );
    graph.push(
        NodeType::ConsentGroup,
        record(json!({
            "consent_group_id": "phs000001-cg",
            "study.study_id": "phs000001",
            "participant.participant_id": ["P1", "P2"],
        })),
    );
    graph.push(
        NodeType::ReferenceFile,
        record(json!({
            "reference_file_id": "rf-1",
            "study.study_id": "phs000001",
            "file_name": "mapping.json",
        })),
    );
    for (pid, diagnosis_id) in [("P1", "d-1"), ("P2", "d-2")] {
        graph.push(
            NodeType::Participant,
            record(json!({
                "participant_id": pid,
                "consent_group.consent_group_id": "phs000001-cg",
                "diagnosis.diagnosis_id": [diagnosis_id],
            })),
        );
        graph.push(
            NodeType::Diagnosis,
            record(json!({
                "diagnosis_id": diagnosis_id,
                "participant.participant_id": pid,
                "diagnosis": "8000/0 : Neoplasm, benign",
            })),
        );
    }
    graph
}

#[test]
fn fully_wired_graph_passes() {
    validate_relationships(&wired_graph()).expect("valid graph");
}

#[test]
fn missing_consent_group_member_fails() {
    let mut graph = wired_graph();
    let consent_group = graph
        .find_mut(NodeType::ConsentGroup, "phs000001-cg")
        .expect("consent group");
    consent_group.insert("participant.participant_id".to_string(), json!(["P1"]));
    let err = validate_relationships(&graph).unwrap_err();
    assert!(matches!(
        err,
        ValidateError::IdListMismatch {
            owner: NodeType::ConsentGroup,
            node_type: NodeType::Participant,
        }
    ));
}

#[test]
fn dangling_observation_reference_fails() {
    let mut graph = wired_graph();
    let participant = graph
        .find_mut(NodeType::Participant, "P1")
        .expect("participant");
    participant.insert("diagnosis.diagnosis_id".to_string(), json!(["d-1", "d-missing"]));
    let err = validate_relationships(&graph).unwrap_err();
    assert!(matches!(
        err,
        ValidateError::ObservationNotFound {
            node_type: NodeType::Diagnosis,
            ..
        }
    ));
}

#[test]
fn observation_with_unknown_participant_fails() {
    let mut graph = wired_graph();
    let diagnosis = graph.find_mut(NodeType::Diagnosis, "d-1").expect("diagnosis");
    diagnosis.insert(
        "participant.participant_id".to_string(),
        Value::String("P-unknown".to_string()),
    );
    let err = validate_relationships(&graph).unwrap_err();
    assert!(matches!(err, ValidateError::ParticipantNotFound(_)));
}

#[test]
fn duplicate_list_entry_fails() {
    let mut graph = wired_graph();
    let study = graph.find_mut(NodeType::Study, "phs000001").expect("study");
    study.insert(
        "reference_file.reference_file_id".to_string(),
        json!(["rf-1", "rf-1"]),
    );
    let err = validate_relationships(&graph).unwrap_err();
    assert!(matches!(
        err,
        ValidateError::DuplicateListEntries {
            owner: NodeType::Study,
            node_type: NodeType::ReferenceFile,
            ..
        }
    ));
}

#[test]
fn multiple_studies_fail() {
    let mut graph = wired_graph();
    graph.push(NodeType::Study, record(json!({"study_id": "phs999999"})));
    let err = validate_relationships(&graph).unwrap_err();
    assert!(matches!(
        err,
        ValidateError::SingletonNode {
            node_type: NodeType::Study,
            count: 2,
        }
    ));
}

#[test]
fn schema_validation_reports_violations_without_failing() {
    let catalog = SchemaCatalog::from_document(json!({
        "type": "object",
        "properties": {
            "participants": {
                "type": "array",
                "items": {"$ref": "#/$defs/participant"},
            },
        },
        "$defs": {
            "participant": {
                "type": "object",
                "properties": {
                    "participant_id": {"type": "string"},
                    "sex_at_birth": {"type": "string", "enum": ["Female", "Male"]},
                },
                "required": ["participant_id"],
            },
        },
    }))
    .expect("catalog");

    let mut good = Graph::new();
    good.push(
        NodeType::Participant,
        record(json!({"participant_id": "P1", "sex_at_birth": "Female"})),
    );
    assert!(validate_structure(&catalog, &good, "good").expect("validate"));

    let mut bad = Graph::new();
    bad.push(
        NodeType::Participant,
        record(json!({"sex_at_birth": "Intersex"})),
    );
    assert!(!validate_structure(&catalog, &bad, "bad").expect("validate"));
}
