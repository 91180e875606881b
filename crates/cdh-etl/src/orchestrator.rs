//! Per-transformation harmonization: drive the record transformer over a
//! loaded source table and wire up the relational id fields.

use serde_json::Value;
use tracing::{info, warn};

use cdh_config::TransformationConfig;
use cdh_ingest::SourceTable;
use cdh_model::{Graph, NodeRecord, NodeType, record_id};
use cdh_schema::SchemaCatalog;
use cdh_transform::{BuilderRegistry, RecordTransformer, sub_source_records};

use crate::error::{EtlError, Result};

/// Harmonize one transformation's source table into a graph.
///
/// The study, consent group and reference file nodes are built once per
/// transformation; participant and observation nodes are built per source
/// row, with delimited multi-value enum fields expanded into one observation
/// per value. Relationship id fields are populated as records are built and
/// id uniqueness is enforced before the graph is returned.
pub fn harmonize_transformation(
    catalog: &SchemaCatalog,
    transformation: &TransformationConfig,
    registry: &BuilderRegistry,
    table: &SourceTable,
    study_id: &str,
) -> Result<Graph> {
    info!(
        transformation = %transformation.name,
        study = study_id,
        rows = table.records.len(),
        "transforming source data"
    );
    if table.is_empty() {
        return Err(EtlError::NoSourceData(transformation.name.clone()));
    }

    let participant_id_field = NodeType::Participant.qualified_id_field();
    let subject_id_field = transformation
        .find_source_field(&participant_id_field, None)
        .ok_or_else(|| EtlError::ParticipantIdMapping(participant_id_field.clone()))?;

    let mut transformer = RecordTransformer::new(catalog, transformation, registry);
    for node_type in NodeType::ALL {
        if !transformer.has_mappings(node_type) {
            warn!(node = %node_type, "no mappings found for type, will be omitted from output");
        }
    }

    let mut graph = Graph::new();
    for node_type in NodeType::ALL {
        graph.ensure_collection(node_type);
    }

    let mut study = single_node(&mut transformer, NodeType::Study)?;
    study.insert(NodeType::ConsentGroup.qualified_id_field(), Value::Array(vec![]));
    study.insert(NodeType::ReferenceFile.qualified_id_field(), Value::Array(vec![]));
    let study_node_id = required_id(&study, NodeType::Study)?;

    let mut consent_group = single_node(&mut transformer, NodeType::ConsentGroup)?;
    consent_group.insert(NodeType::Participant.qualified_id_field(), Value::Array(vec![]));
    consent_group.insert(
        NodeType::Study.qualified_id_field(),
        Value::String(study_node_id.clone()),
    );
    let consent_group_id = required_id(&consent_group, NodeType::ConsentGroup)?;
    push_id(&mut study, &NodeType::ConsentGroup.qualified_id_field(), &consent_group_id);

    for mut reference_file in transformer.build_node(NodeType::ReferenceFile, None)? {
        reference_file.insert(
            NodeType::Study.qualified_id_field(),
            Value::String(study_node_id.clone()),
        );
        let reference_file_id = required_id(&reference_file, NodeType::ReferenceFile)?;
        push_id(&mut study, &NodeType::ReferenceFile.qualified_id_field(), &reference_file_id);
        graph.push(NodeType::ReferenceFile, reference_file);
    }

    for record in &table.records {
        if record.is_blank() {
            warn!(row = record.row(), "skipping empty source record");
            continue;
        }

        let mut participants = transformer.build_node(NodeType::Participant, Some(record))?;
        if participants.len() != 1 {
            warn!(
                transformation = %transformation.name,
                study = study_id,
                row = record.row(),
                count = participants.len(),
                "unexpected number of participant nodes built for source record, excluding"
            );
            continue;
        }
        let mut participant = participants.remove(0);
        let participant_id = required_id(&participant, NodeType::Participant)?;

        for node_type in NodeType::OBSERVATIONS {
            let relation_field = node_type.qualified_id_field();
            participant.insert(relation_field.clone(), Value::Array(vec![]));

            let mut expanded =
                sub_source_records(catalog, transformation, node_type, record, &subject_id_field);
            if expanded.is_empty() {
                expanded.push(record.clone());
            }
            for sub_record in &expanded {
                let observations = transformer.build_node(node_type, Some(sub_record))?;
                if observations.is_empty() && transformer.has_mappings(node_type) {
                    warn!(
                        transformation = %transformation.name,
                        study = study_id,
                        node = %node_type,
                        row = sub_record.row(),
                        "unable to build node for source record"
                    );
                }
                for mut observation in observations {
                    observation.insert(
                        participant_id_field.clone(),
                        Value::String(participant_id.clone()),
                    );
                    let observation_id = required_id(&observation, node_type)?;
                    push_id(&mut participant, &relation_field, &observation_id);
                    graph.push(node_type, observation);
                }
            }
        }

        participant.insert(
            NodeType::ConsentGroup.qualified_id_field(),
            Value::String(consent_group_id.clone()),
        );
        push_id(
            &mut consent_group,
            &NodeType::Participant.qualified_id_field(),
            &participant_id,
        );
        graph.push(NodeType::Participant, participant);
    }

    graph.push(NodeType::ConsentGroup, consent_group);
    graph.push(NodeType::Study, study);
    graph.assert_unique_ids()?;

    info!(
        transformation = %transformation.name,
        counts = %record_count_summary(&graph),
        "records built"
    );
    Ok(graph)
}

fn single_node(transformer: &mut RecordTransformer<'_>, node_type: NodeType) -> Result<NodeRecord> {
    let mut nodes = transformer.build_node(node_type, None)?;
    if nodes.len() != 1 {
        return Err(EtlError::NodeCount {
            node_type,
            count: nodes.len(),
        });
    }
    Ok(nodes.remove(0))
}

fn required_id(record: &NodeRecord, node_type: NodeType) -> Result<String> {
    record_id(record, node_type)
        .map(str::to_string)
        .ok_or(EtlError::MissingRecordId(node_type))
}

fn push_id(record: &mut NodeRecord, field: &str, id: &str) {
    match record.get_mut(field).and_then(Value::as_array_mut) {
        Some(ids) => ids.push(Value::String(id.to_string())),
        None => {
            record.insert(field.to_string(), Value::Array(vec![Value::String(id.to_string())]));
        }
    }
}

fn record_count_summary(graph: &Graph) -> String {
    NodeType::ALL
        .iter()
        .map(|&node_type| format!("{} {node_type}", graph.count(node_type)))
        .collect::<Vec<_>>()
        .join(", ")
}
