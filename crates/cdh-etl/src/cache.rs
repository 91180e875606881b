//! Content-hash normalization of harmonized records for deduplication.

use serde_json::{Map, Value};
use sha1::{Digest, Sha1};

use cdh_model::{NodeRecord, NodeType};

/// Identity of a harmonized record for dedup purposes: a content hash over
/// the normalized record plus the owning participant (empty for study-scoped
/// records) and the node type.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct CacheKey {
    pub hash: String,
    pub participant_id: String,
    pub node_type: NodeType,
}

/// Normalized copy of a record with run-variable identifier fields blanked,
/// so structurally identical records produced in different runs hash
/// identically even though generated ids differ.
///
/// Beyond the record's own id: a participant's observation id lists, a
/// study's consent-group/reference-file id lists, a consent group's
/// participant id list and a reference file's external GUID all regenerate
/// per source file and are blanked. Consent group ids are expected to be
/// deterministic across files and are left intact.
pub fn cacheable_record(record: &NodeRecord, node_type: NodeType) -> NodeRecord {
    let mut cacheable = record.clone();
    match node_type {
        NodeType::ConsentGroup => {
            cacheable.insert(NodeType::Participant.qualified_id_field(), Value::Array(vec![]));
        }
        NodeType::Participant => {
            for observation in NodeType::OBSERVATIONS {
                let field = observation.qualified_id_field();
                if cacheable.get(&field).is_some_and(Value::is_array) {
                    cacheable.insert(field, Value::Array(vec![]));
                }
            }
        }
        NodeType::Study => {
            cacheable.insert(NodeType::ConsentGroup.qualified_id_field(), Value::Array(vec![]));
            cacheable.insert(NodeType::ReferenceFile.qualified_id_field(), Value::Array(vec![]));
        }
        NodeType::ReferenceFile => {
            if cacheable.contains_key("dcf_indexd_guid") {
                cacheable.insert("dcf_indexd_guid".to_string(), Value::String(String::new()));
            }
        }
        _ => {}
    }
    cacheable.insert(node_type.id_field(), Value::String(String::new()));
    cacheable
}

/// Cache key for the record: SHA-1 over the deterministically sorted JSON
/// serialization of its cacheable form.
pub fn cache_key(record: &NodeRecord, participant_id: &str, node_type: NodeType) -> CacheKey {
    let normalized = Value::Object(sort_record(cacheable_record(record, node_type)));
    let mut hasher = Sha1::new();
    hasher.update(normalized.to_string().as_bytes());
    CacheKey {
        hash: hex::encode(hasher.finalize()),
        participant_id: participant_id.to_string(),
        node_type,
    }
}

/// Sort nested values for hashing: object keys ascending (the map type is
/// already ordered) and list elements by serialized form.
fn sort_record(record: NodeRecord) -> NodeRecord {
    record
        .into_iter()
        .map(|(key, value)| (key, sort_value(value)))
        .collect::<Map<String, Value>>()
}

fn sort_value(value: Value) -> Value {
    match value {
        Value::Array(items) => {
            let mut sorted: Vec<Value> = items.into_iter().map(sort_value).collect();
            sorted.sort_by(|a, b| a.to_string().cmp(&b.to_string()));
            Value::Array(sorted)
        }
        Value::Object(map) => Value::Object(sort_record(map)),
        other => other,
    }
}
