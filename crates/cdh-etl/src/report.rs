//! CSV report of the duplicate harmonized records suppressed during merge.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{info, warn};

use cdh_model::NodeType;

use crate::error::{EtlError, Result};
use crate::merge::StudyMerge;

/// Render the duplicate record report for a merged study as CSV bytes, or
/// `None` when no duplicates were suppressed.
///
/// One row per affected participant, sorted by participant id; per node type
/// the row carries the names of the transformations that produced a
/// duplicate plus the suppressed record bodies themselves.
pub fn duplicate_record_report(merge: &StudyMerge) -> Result<Option<Vec<u8>>> {
    let study_id = merge.study_id();
    let duplicate_keys: Vec<_> = merge
        .record_cache()
        .iter()
        .filter(|(_, names)| names.len() > 1)
        .map(|(key, names)| (key, names))
        .collect();
    if duplicate_keys.is_empty() {
        info!(study = study_id, "no duplicate harmonized records found/suppressed");
        return Ok(None);
    }

    let affected_participants: BTreeSet<&str> = duplicate_keys
        .iter()
        .map(|(key, _)| key.participant_id.as_str())
        .collect();
    warn!(
        study = study_id,
        duplicates = duplicate_keys.len(),
        participants = affected_participants.len(),
        "duplicate harmonized records found and suppressed"
    );
    if merge.duplicates().is_empty() {
        return Err(EtlError::DuplicateReportEmpty(study_id.to_string()));
    }

    // participant => node type => transformation names
    let mut by_participant: BTreeMap<&str, BTreeMap<NodeType, BTreeSet<&str>>> = BTreeMap::new();
    for (key, names) in &duplicate_keys {
        by_participant
            .entry(&key.participant_id)
            .or_default()
            .entry(key.node_type)
            .or_default()
            .extend(names.iter().map(String::as_str));
    }

    let mut header: Vec<String> = vec![NodeType::Participant.id_field()];
    for node_type in NodeType::ALL {
        header.push(node_type.to_string());
        header.push(format!("{node_type}_dupe_recs"));
    }

    let mut writer = csv::Writer::from_writer(Vec::new());
    writer.write_record(&header)?;
    for (participant_id, nodes) in &by_participant {
        let mut row: Vec<String> = vec![(*participant_id).to_string()];
        for node_type in NodeType::ALL {
            let names: Vec<&str> = nodes
                .get(&node_type)
                .map(|set| set.iter().copied().collect())
                .unwrap_or_default();
            row.push(names.join(", "));
            let bodies = merge
                .duplicates()
                .get(&((*participant_id).to_string(), node_type))
                .map(|set| set.iter().cloned().collect::<Vec<_>>().join("\n"))
                .unwrap_or_default();
            row.push(bodies);
        }
        writer.write_record(&row)?;
    }
    let bytes = writer.into_inner().map_err(|e| csv::Error::from(e.into_error()))?;
    Ok(Some(bytes))
}
