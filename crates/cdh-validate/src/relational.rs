//! Referential-integrity validation of a merged harmonized graph.

use std::collections::BTreeMap;

use serde_json::Value;
use tracing::info;

use cdh_model::{Graph, NodeRecord, NodeType, record_id};

use crate::error::{Result, ValidateError};

/// Verify the linked relationships of a merged harmonized graph: study <=>
/// consent group and reference files, consent group <=> participants, and
/// participant <=> observations must all agree in both directions.
///
/// Any violation is fatal; a merged data set with dangling or mismatched
/// relationship ids must not be published.
pub fn validate_relationships(graph: &Graph) -> Result<()> {
    let study = singleton(graph, NodeType::Study)?;
    let consent_group = singleton(graph, NodeType::ConsentGroup)?;
    let study_id = record_id(study, NodeType::Study).unwrap_or_default().to_string();
    let consent_group_id = record_id(consent_group, NodeType::ConsentGroup)
        .unwrap_or_default()
        .to_string();

    let participant_ids = graph.ids(NodeType::Participant);
    let consent_group_ids = graph.ids(NodeType::ConsentGroup);
    let reference_file_ids = graph.ids(NodeType::ReferenceFile);

    for node_type in NodeType::ALL {
        for record in graph.records(node_type) {
            let own_id = record_id(record, node_type).unwrap_or_default().to_string();

            if node_type == NodeType::ConsentGroup {
                check_id_list(record, node_type, NodeType::Participant, &participant_ids)?;
            }

            if matches!(node_type, NodeType::ConsentGroup | NodeType::ReferenceFile) {
                let record_study_id =
                    string_field(record, &NodeType::Study.qualified_id_field());
                if record_study_id != study_id {
                    return Err(ValidateError::StudyIdMismatch {
                        node_type,
                        actual: record_study_id,
                        expected: study_id,
                    });
                }
                let study_list = id_list(study, &node_type.qualified_id_field());
                if !study_list.contains(&own_id) {
                    return Err(ValidateError::NotInIdList {
                        node_type,
                        owner: NodeType::Study,
                        id: own_id,
                    });
                }
            }

            if node_type == NodeType::Participant {
                let record_consent_group_id =
                    string_field(record, &NodeType::ConsentGroup.qualified_id_field());
                if record_consent_group_id != consent_group_id {
                    return Err(ValidateError::ConsentGroupIdMismatch {
                        node_type,
                        actual: record_consent_group_id,
                        expected: consent_group_id,
                    });
                }
                let member_ids =
                    id_list(consent_group, &NodeType::Participant.qualified_id_field());
                if !member_ids.contains(&own_id) {
                    return Err(ValidateError::NotInIdList {
                        node_type,
                        owner: NodeType::ConsentGroup,
                        id: own_id,
                    });
                }
                check_observation_lists(graph, record, &own_id)?;
            }

            if node_type == NodeType::Study {
                check_id_list(record, node_type, NodeType::ConsentGroup, &consent_group_ids)?;
                check_id_list(record, node_type, NodeType::ReferenceFile, &reference_file_ids)?;
            }

            // observation records carry a scalar back-reference to their
            // participant
            if let Some(Value::String(record_participant_id)) =
                record.get(&NodeType::Participant.qualified_id_field())
            {
                if node_type.is_observation()
                    && !participant_ids.contains(record_participant_id)
                {
                    return Err(ValidateError::ParticipantNotFound(
                        record_participant_id.clone(),
                    ));
                }
            }
        }
        info!(node = %node_type, "relational validation found no issues");
    }
    Ok(())
}

fn singleton(graph: &Graph, node_type: NodeType) -> Result<&NodeRecord> {
    let records = graph.records(node_type);
    let [record] = records else {
        return Err(ValidateError::SingletonNode {
            node_type,
            count: records.len(),
        });
    };
    Ok(record)
}

/// The owner's relationship id list must contain exactly the ids of the
/// target node type's records, with no duplicate entries.
fn check_id_list(
    owner_record: &NodeRecord,
    owner: NodeType,
    node_type: NodeType,
    expected_ids: &[String],
) -> Result<()> {
    let listed = id_list(owner_record, &node_type.qualified_id_field());

    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for id in &listed {
        *counts.entry(id).or_default() += 1;
    }
    let dupes: Vec<String> = counts
        .iter()
        .filter(|&(_, &count)| count > 1)
        .map(|(&id, _)| id.to_string())
        .collect();
    if !dupes.is_empty() {
        return Err(ValidateError::DuplicateListEntries {
            owner,
            node_type,
            ids: dupes,
        });
    }

    let mut listed_sorted = listed;
    listed_sorted.sort_unstable();
    let mut expected_sorted = expected_ids.to_vec();
    expected_sorted.sort_unstable();
    if listed_sorted != expected_sorted {
        return Err(ValidateError::IdListMismatch { owner, node_type });
    }
    Ok(())
}

/// Every id in a participant's per-node observation lists must resolve to a
/// record in the corresponding collection.
fn check_observation_lists(graph: &Graph, participant: &NodeRecord, participant_id: &str) -> Result<()> {
    for node_type in NodeType::OBSERVATIONS {
        let Some(Value::Array(ids)) = participant.get(&node_type.qualified_id_field()) else {
            continue;
        };
        for id in ids.iter().filter_map(Value::as_str) {
            if graph.find(node_type, id).is_none() {
                return Err(ValidateError::ObservationNotFound {
                    node_type,
                    id: id.to_string(),
                    participant_id: participant_id.to_string(),
                });
            }
        }
    }
    Ok(())
}

fn string_field(record: &NodeRecord, field: &str) -> String {
    record
        .get(field)
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string()
}

fn id_list(record: &NodeRecord, field: &str) -> Vec<String> {
    record
        .get(field)
        .and_then(Value::as_array)
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
