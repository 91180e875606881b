use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::error::{ModelError, Result};
use crate::node::NodeType;

/// One harmonized node: a flat property map plus relationship fields holding
/// a related node's id or list of ids.
pub type NodeRecord = Map<String, Value>;

/// A record's own id, e.g. the value of `participant_id` on a participant.
pub fn record_id(record: &NodeRecord, node_type: NodeType) -> Option<&str> {
    record.get(&node_type.id_field()).and_then(Value::as_str)
}

/// Harmonized output graph: per-node-type ordered record collections.
///
/// Within a graph every node's own id is unique per type and relationship id
/// lists reference ids present in the corresponding collection; the former is
/// enforced by [`Graph::assert_unique_ids`], the latter by relational
/// validation after merge.
#[derive(Debug, Clone, Default)]
pub struct Graph {
    collections: BTreeMap<NodeType, Vec<NodeRecord>>,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ensure an (empty) collection exists for the node type.
    pub fn ensure_collection(&mut self, node_type: NodeType) {
        self.collections.entry(node_type).or_default();
    }

    pub fn push(&mut self, node_type: NodeType, record: NodeRecord) {
        self.collections.entry(node_type).or_default().push(record);
    }

    pub fn extend(&mut self, node_type: NodeType, records: impl IntoIterator<Item = NodeRecord>) {
        self.collections
            .entry(node_type)
            .or_default()
            .extend(records);
    }

    pub fn records(&self, node_type: NodeType) -> &[NodeRecord] {
        self.collections
            .get(&node_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    pub fn records_mut(&mut self, node_type: NodeType) -> &mut Vec<NodeRecord> {
        self.collections.entry(node_type).or_default()
    }

    pub fn node_types(&self) -> impl Iterator<Item = NodeType> + '_ {
        self.collections.keys().copied()
    }

    pub fn count(&self, node_type: NodeType) -> usize {
        self.records(node_type).len()
    }

    /// Own ids of every record in the node type's collection, in order.
    pub fn ids(&self, node_type: NodeType) -> Vec<String> {
        self.records(node_type)
            .iter()
            .filter_map(|r| record_id(r, node_type).map(str::to_string))
            .collect()
    }

    pub fn find(&self, node_type: NodeType, id: &str) -> Option<&NodeRecord> {
        self.records(node_type)
            .iter()
            .find(|r| record_id(r, node_type) == Some(id))
    }

    pub fn find_mut(&mut self, node_type: NodeType, id: &str) -> Option<&mut NodeRecord> {
        self.records_mut(node_type)
            .iter_mut()
            .find(|r| record_id(r, node_type) == Some(id))
    }

    /// Fail if any node type's collection contains duplicate own ids.
    ///
    /// A violation indicates an internal correctness defect, not bad input.
    pub fn assert_unique_ids(&self) -> Result<()> {
        for (&node_type, records) in &self.collections {
            let mut seen: BTreeSet<&str> = BTreeSet::new();
            let mut dupes: BTreeSet<&str> = BTreeSet::new();
            for record in records {
                if let Some(id) = record_id(record, node_type) {
                    if !seen.insert(id) {
                        dupes.insert(id);
                    }
                }
            }
            if !dupes.is_empty() {
                return Err(ModelError::DuplicateIds {
                    node_type: node_type.to_string(),
                    ids: dupes.into_iter().map(str::to_string).collect(),
                });
            }
        }
        Ok(())
    }

    /// Serialize as the harmonized output object: pluralized node-type name
    /// => list of node objects, in stable [`NodeType::ALL`] order.
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        for (&node_type, records) in &self.collections {
            out.insert(
                node_type.plural(),
                Value::Array(records.iter().cloned().map(Value::Object).collect()),
            );
        }
        Value::Object(out)
    }
}

#[cfg(test)]
mod tests {
    use super::{Graph, NodeRecord};
    use crate::node::NodeType;
    use serde_json::json;

    fn record(id_field: &str, id: &str) -> NodeRecord {
        let mut rec = NodeRecord::new();
        rec.insert(id_field.to_string(), json!(id));
        rec
    }

    #[test]
    fn ids_and_lookup() {
        let mut graph = Graph::new();
        graph.push(NodeType::Participant, record("participant_id", "p1"));
        graph.push(NodeType::Participant, record("participant_id", "p2"));
        assert_eq!(graph.ids(NodeType::Participant), vec!["p1", "p2"]);
        assert!(graph.find(NodeType::Participant, "p2").is_some());
        assert!(graph.find(NodeType::Participant, "p3").is_none());
    }

    #[test]
    fn duplicate_ids_rejected() {
        let mut graph = Graph::new();
        graph.push(NodeType::Diagnosis, record("diagnosis_id", "d1"));
        graph.push(NodeType::Diagnosis, record("diagnosis_id", "d1"));
        assert!(graph.assert_unique_ids().is_err());
    }

    #[test]
    fn json_uses_plural_names() {
        let mut graph = Graph::new();
        graph.push(NodeType::Study, record("study_id", "s1"));
        graph.ensure_collection(NodeType::Diagnosis);
        let json = graph.to_json();
        assert!(json.get("studies").is_some());
        assert_eq!(json["diagnoses"], json!([]));
    }
}
