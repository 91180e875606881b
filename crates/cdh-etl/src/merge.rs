//! Cross-transformation merge of harmonized graphs with duplicate
//! suppression.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::{info, warn};

use cdh_model::{Graph, NodeRecord, NodeType, record_id};

use crate::cache::{CacheKey, cache_key, cacheable_record};
use crate::error::{EtlError, Result};

/// Accumulates per-transformation harmonized graphs into a single merged
/// study graph, suppressing records already seen under an identical cache
/// key and tracking which transformations produced each record.
#[derive(Debug)]
pub struct StudyMerge {
    study_id: String,
    graph: Graph,
    record_cache: BTreeMap<CacheKey, Vec<String>>,
    duplicates: BTreeMap<(String, NodeType), BTreeSet<String>>,
    merged_participant_ids: BTreeSet<String>,
}

impl StudyMerge {
    pub fn new(study_id: &str) -> Self {
        Self {
            study_id: study_id.to_string(),
            graph: Graph::new(),
            record_cache: BTreeMap::new(),
            duplicates: BTreeMap::new(),
            merged_participant_ids: BTreeSet::new(),
        }
    }

    pub fn study_id(&self) -> &str {
        &self.study_id
    }

    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    pub fn into_graph(self) -> Graph {
        self.graph
    }

    /// Cache entries accumulated during merge: key => names of the
    /// transformations that produced a matching record. Entries with more
    /// than one name are the suppressed duplicates.
    pub fn record_cache(&self) -> &BTreeMap<CacheKey, Vec<String>> {
        &self.record_cache
    }

    /// Suppressed duplicate record bodies keyed by owning participant and
    /// node type, serialized in cacheable (id-blanked) form.
    pub fn duplicates(&self) -> &BTreeMap<(String, NodeType), BTreeSet<String>> {
        &self.duplicates
    }

    /// Fold one transformation's harmonized graph into the merged data set.
    ///
    /// The first call seeds the merged study and consent group with their
    /// relationship id lists reset; every call adds new participants, updates
    /// already-merged ones with any not-yet-seen observations, and appends
    /// reference files not already cached.
    pub fn merge_transformation(&mut self, transformation_name: &str, source: &Graph) -> Result<()> {
        info!(
            transformation = transformation_name,
            study = %self.study_id,
            "merging harmonized data set"
        );
        for node_type in source.node_types() {
            self.graph.ensure_collection(node_type);
        }

        if self.graph.records(NodeType::Study).is_empty() {
            self.seed_study(source)?;
        }

        for participant in source.records(NodeType::Participant).to_vec() {
            let participant_id = record_id(&participant, NodeType::Participant)
                .ok_or(EtlError::MissingRecordId(NodeType::Participant))?
                .to_string();
            if self.merged_participant_ids.contains(&participant_id) {
                self.update_participant(&participant, source, transformation_name)?;
            } else {
                self.add_participant(&participant, source, transformation_name)?;
                self.merged_participant_ids.insert(participant_id);
            }
        }

        self.merge_reference_files(source, transformation_name)?;
        Ok(())
    }

    /// First transformation establishes the study and consent group records;
    /// their reference file / participant id lists restart empty and are
    /// rebuilt as records survive dedup.
    fn seed_study(&mut self, source: &Graph) -> Result<()> {
        let study_id = self.study_id.clone();
        self.graph
            .extend(NodeType::Study, source.records(NodeType::Study).iter().cloned());
        let study = self
            .graph
            .find_mut(NodeType::Study, &study_id)
            .ok_or_else(|| EtlError::MergeAudit(format!("merged study \"{study_id}\" not found")))?;
        study.insert(NodeType::ReferenceFile.qualified_id_field(), Value::Array(vec![]));

        self.graph.extend(
            NodeType::ConsentGroup,
            source.records(NodeType::ConsentGroup).iter().cloned(),
        );
        let consent_group_ids = self.graph.ids(NodeType::ConsentGroup);
        let [consent_group_id] = consent_group_ids.as_slice() else {
            return Err(EtlError::NodeCount {
                node_type: NodeType::ConsentGroup,
                count: consent_group_ids.len(),
            });
        };
        let consent_group_id = consent_group_id.clone();
        if let Some(consent_group) = self.graph.find_mut(NodeType::ConsentGroup, &consent_group_id)
        {
            consent_group.insert(NodeType::Participant.qualified_id_field(), Value::Array(vec![]));
        }
        Ok(())
    }

    /// Consent group the participant references; a missing reference means
    /// the transformation graph was wired incorrectly upstream.
    fn consent_group_id_of(&self, participant: &NodeRecord) -> Result<String> {
        participant
            .get(&NodeType::ConsentGroup.qualified_id_field())
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
            .ok_or_else(|| {
                EtlError::MergeAudit(format!(
                    "participant \"{}\" has no consent group reference",
                    record_id(participant, NodeType::Participant).unwrap_or_default()
                ))
            })
    }

    fn add_participant(
        &mut self,
        participant: &NodeRecord,
        source: &Graph,
        transformation_name: &str,
    ) -> Result<()> {
        let participant_id = record_id(participant, NodeType::Participant)
            .ok_or(EtlError::MissingRecordId(NodeType::Participant))?
            .to_string();
        if self.graph.find(NodeType::Participant, &participant_id).is_some() {
            return Err(EtlError::ParticipantExists(participant_id));
        }
        let consent_group_id = self.consent_group_id_of(participant)?;

        let mut merged_participant = participant.clone();
        for node_type in NodeType::OBSERVATIONS {
            let field = node_type.qualified_id_field();
            if !merged_participant.contains_key(&field) {
                continue;
            }
            let observation_ids = id_list(&merged_participant, &field);
            let kept =
                self.merge_observations(node_type, &observation_ids, &participant_id, source, transformation_name)?;
            merged_participant.insert(
                field,
                Value::Array(kept.into_iter().map(Value::String).collect()),
            );
        }
        self.graph.push(NodeType::Participant, merged_participant);

        let participant_field = NodeType::Participant.qualified_id_field();
        let consent_group = self
            .graph
            .find_mut(NodeType::ConsentGroup, &consent_group_id)
            .ok_or(EtlError::ConsentGroupNotFound(consent_group_id))?;
        match consent_group.get_mut(&participant_field).and_then(Value::as_array_mut) {
            Some(ids) => ids.push(Value::String(participant_id)),
            None => {
                consent_group
                    .insert(participant_field, Value::Array(vec![Value::String(participant_id)]));
            }
        }
        Ok(())
    }

    /// A participant seen in an earlier transformation keeps its merged
    /// record; only observations not already cached are appended to the
    /// merged collections.
    fn update_participant(
        &mut self,
        participant: &NodeRecord,
        source: &Graph,
        transformation_name: &str,
    ) -> Result<()> {
        let participant_id = record_id(participant, NodeType::Participant)
            .ok_or(EtlError::MissingRecordId(NodeType::Participant))?
            .to_string();
        if self.graph.find(NodeType::Participant, &participant_id).is_none() {
            return Err(EtlError::ParticipantNotFound(participant_id));
        }
        let consent_group_id = self.consent_group_id_of(participant)?;
        let consent_group = self
            .graph
            .find(NodeType::ConsentGroup, &consent_group_id)
            .ok_or(EtlError::ConsentGroupNotFound(consent_group_id))?;
        let member_ids = id_list(consent_group, &NodeType::Participant.qualified_id_field());
        if !member_ids.contains(&participant_id) {
            return Err(EtlError::ParticipantNotInConsentGroup(participant_id));
        }

        for node_type in NodeType::OBSERVATIONS {
            let observation_ids = id_list(participant, &node_type.qualified_id_field());
            self.merge_observations(node_type, &observation_ids, &participant_id, source, transformation_name)?;
        }
        Ok(())
    }

    /// Merge the identified observations, returning the ids that survived
    /// dedup. Suppressed duplicates are logged and recorded for the
    /// duplicate report.
    fn merge_observations(
        &mut self,
        node_type: NodeType,
        observation_ids: &[String],
        participant_id: &str,
        source: &Graph,
        transformation_name: &str,
    ) -> Result<Vec<String>> {
        let mut kept = Vec::new();
        for observation_id in observation_ids {
            let observation =
                source
                    .find(node_type, observation_id)
                    .ok_or_else(|| EtlError::ObservationNotFound {
                        node_type,
                        id: observation_id.clone(),
                    })?;
            let key = cache_key(observation, participant_id, node_type);
            if self.record_cache.contains_key(&key) {
                warn!(
                    node = %node_type,
                    participant = participant_id,
                    "duplicate harmonized record found and suppressed"
                );
                let body = serde_json::to_string(&cacheable_record(observation, node_type))?;
                self.duplicates
                    .entry((participant_id.to_string(), node_type))
                    .or_default()
                    .insert(body);
            } else {
                self.graph.push(node_type, observation.clone());
                kept.push(observation_id.clone());
            }
            self.record_cache
                .entry(key)
                .or_default()
                .push(transformation_name.to_string());
        }
        Ok(kept)
    }

    /// Reference files are study-scoped; dedup keys use an empty participant
    /// id and surviving ids are appended to the merged study's list.
    fn merge_reference_files(&mut self, source: &Graph, transformation_name: &str) -> Result<()> {
        let study_id = self.study_id.clone();
        let reference_file_field = NodeType::ReferenceFile.qualified_id_field();
        for reference_file in source.records(NodeType::ReferenceFile).to_vec() {
            let reference_file_id = record_id(&reference_file, NodeType::ReferenceFile)
                .ok_or(EtlError::MissingRecordId(NodeType::ReferenceFile))?
                .to_string();
            let key = cache_key(&reference_file, "", NodeType::ReferenceFile);
            if self.record_cache.contains_key(&key) {
                continue;
            }
            self.graph.push(NodeType::ReferenceFile, reference_file);
            let study = self
                .graph
                .find_mut(NodeType::Study, &study_id)
                .ok_or_else(|| {
                    EtlError::MergeAudit(format!("merged study \"{study_id}\" not found"))
                })?;
            match study.get_mut(&reference_file_field).and_then(Value::as_array_mut) {
                Some(ids) => ids.push(Value::String(reference_file_id)),
                None => {
                    study.insert(
                        reference_file_field.clone(),
                        Value::Array(vec![Value::String(reference_file_id)]),
                    );
                }
            }
            self.record_cache
                .entry(key)
                .or_default()
                .push(transformation_name.to_string());
        }
        Ok(())
    }

    /// Audit the merged data set against the unmerged per-transformation
    /// graphs: the merged study id must match, merged participant ids must be
    /// unique and equal the unmerged set, and the count of distinct cache
    /// keys per node type must be unchanged by the merge.
    pub fn assert_consistent_with_sources(&self, sources: &BTreeMap<String, Graph>) -> Result<()> {
        info!(study = %self.study_id, "validating merged harmonized data against unmerged data");

        let merged_study = self
            .graph
            .records(NodeType::Study)
            .first()
            .ok_or_else(|| EtlError::MergeAudit("no merged study record".to_string()))?;
        let merged_study_id = record_id(merged_study, NodeType::Study).unwrap_or_default();
        if merged_study_id != self.study_id {
            return Err(EtlError::MergeAudit(format!(
                "merged study id \"{merged_study_id}\" != \"{}\"",
                self.study_id
            )));
        }

        let mut unmerged_keys: BTreeMap<NodeType, BTreeSet<CacheKey>> = BTreeMap::new();
        for graph in sources.values() {
            collect_cache_keys(graph, &mut unmerged_keys);
        }
        info!(
            study = %self.study_id,
            counts = %key_count_summary(&unmerged_keys),
            "distinct unmerged records"
        );
        let mut merged_keys: BTreeMap<NodeType, BTreeSet<CacheKey>> = BTreeMap::new();
        collect_cache_keys(&self.graph, &mut merged_keys);
        info!(
            study = %self.study_id,
            counts = %key_count_summary(&merged_keys),
            "merged harmonized records"
        );

        let mut unmerged_participant_ids: BTreeSet<&str> = BTreeSet::new();
        for graph in sources.values() {
            for participant in graph.records(NodeType::Participant) {
                if let Some(id) = record_id(participant, NodeType::Participant) {
                    unmerged_participant_ids.insert(id);
                }
            }
        }
        let mut merged_counts: BTreeMap<&str, usize> = BTreeMap::new();
        for participant in self.graph.records(NodeType::Participant) {
            if let Some(id) = record_id(participant, NodeType::Participant) {
                *merged_counts.entry(id).or_default() += 1;
            }
        }
        let dupes: Vec<&str> = merged_counts
            .iter()
            .filter(|&(_, &count)| count > 1)
            .map(|(&id, _)| id)
            .collect();
        if !dupes.is_empty() {
            return Err(EtlError::MergeAudit(format!(
                "duplicate merged participant records found: {dupes:?}"
            )));
        }
        let merged_participant_ids: BTreeSet<&str> = merged_counts.into_keys().collect();
        if unmerged_participant_ids != merged_participant_ids {
            return Err(EtlError::MergeAudit(
                "mismatch between participant ids in unmerged and merged data sets".to_string(),
            ));
        }

        for (node_type, keys) in &unmerged_keys {
            let merged_count = merged_keys.get(node_type).map(BTreeSet::len).unwrap_or(0);
            if merged_count != keys.len() {
                return Err(EtlError::MergeAudit(format!(
                    "mismatch in distinct {node_type} record counts between merged \
                     and unmerged data sets: {merged_count} != {}",
                    keys.len()
                )));
            }
        }
        Ok(())
    }
}

/// Participant id a record's cache key is scoped to: the record's own id for
/// participants, the qualified relationship field for observations, empty for
/// study-scoped records.
fn participant_scope(record: &NodeRecord) -> &str {
    record
        .get("participant_id")
        .or_else(|| record.get(&NodeType::Participant.qualified_id_field()))
        .and_then(Value::as_str)
        .unwrap_or_default()
}

fn collect_cache_keys(graph: &Graph, keys: &mut BTreeMap<NodeType, BTreeSet<CacheKey>>) {
    for node_type in graph.node_types() {
        let entry = keys.entry(node_type).or_default();
        for record in graph.records(node_type) {
            entry.insert(cache_key(record, participant_scope(record), node_type));
        }
    }
}

fn key_count_summary(keys: &BTreeMap<NodeType, BTreeSet<CacheKey>>) -> String {
    keys.iter()
        .map(|(node_type, set)| format!("{} {node_type}", set.len()))
        .collect::<Vec<_>>()
        .join(", ")
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
