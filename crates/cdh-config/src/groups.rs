//! Type-group-index partitioning of field mappings.
//!
//! Multiple records of one node type can be built from a single source row
//! (e.g. an initial diagnosis plus relapse diagnoses); the type group index
//! labels which record each mapping feeds. The wildcard group `*` seeds
//! every numbered group and is dropped once numbered groups exist.

use std::collections::BTreeMap;

use cdh_model::NodeType;

use crate::types::{FieldMapping, TransformationConfig, WILDCARD_GROUP};

/// One mapping group: all field mappings contributing to one record of a
/// node type.
#[derive(Debug, Clone)]
pub struct MappingGroup {
    pub index: String,
    pub mappings: Vec<FieldMapping>,
}

impl MappingGroup {
    /// True for the group whose index is numerically zero; its output seeds
    /// the base record reused by subsequent groups.
    pub fn is_base_seed(&self) -> bool {
        self.index.trim().parse::<i64>() == Ok(0)
    }
}

/// Per-node-type mapping groups for one transformation, computed once and
/// reused (the only permitted memoization over the read-only mapping list).
#[derive(Debug, Clone, Default)]
pub struct GroupedMappings {
    by_node_type: BTreeMap<NodeType, Vec<MappingGroup>>,
}

impl GroupedMappings {
    pub fn build(transformation: &TransformationConfig) -> GroupedMappings {
        let mut by_node_type = BTreeMap::new();
        for node_type in NodeType::ALL {
            let groups = group_mappings(transformation, node_type);
            if !groups.is_empty() {
                by_node_type.insert(node_type, groups);
            }
        }
        GroupedMappings { by_node_type }
    }

    /// Groups for the node type, wildcard first then numeric ascending.
    /// Empty when the transformation has no mappings for the type.
    pub fn for_node(&self, node_type: NodeType) -> &[MappingGroup] {
        self.by_node_type
            .get(&node_type)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

}

fn group_mappings(transformation: &TransformationConfig, node_type: NodeType) -> Vec<MappingGroup> {
    let prefix = format!("{node_type}.");

    // partition by index; a mapping may fan into several groups
    let mut indexed: Vec<(String, Vec<FieldMapping>)> = Vec::new();
    for mapping in &transformation.mappings {
        if !mapping.output_field.starts_with(&prefix) {
            continue;
        }
        for index in mapping.type_group_indices() {
            match indexed.iter_mut().find(|(i, _)| *i == index) {
                Some((_, mappings)) => mappings.push(mapping.clone()),
                None => indexed.push((index, vec![mapping.clone()])),
            }
        }
    }
    if indexed.is_empty() {
        return Vec::new();
    }

    // wildcard group first, then numeric ascending
    indexed.sort_by_key(|(index, _)| group_sort_key(index));

    let base: Vec<FieldMapping> = indexed
        .iter()
        .find(|(index, _)| is_wildcard(index))
        .map(|(_, mappings)| mappings.clone())
        .unwrap_or_default();
    let mut numbered: Vec<(String, Vec<FieldMapping>)> = indexed
        .iter()
        .filter(|(index, _)| !is_wildcard(index))
        .cloned()
        .collect();

    // seed each numbered group with the base mappings it does not override
    if !base.is_empty() && !numbered.is_empty() {
        for (_, mappings) in &mut numbered {
            for base_mapping in base.iter().rev() {
                if !mappings
                    .iter()
                    .any(|m| m.output_field == base_mapping.output_field)
                {
                    mappings.insert(0, base_mapping.clone());
                }
            }
        }
    }

    // the wildcard group only survives when it is the only group
    let result = if numbered.is_empty() { indexed } else { numbered };
    result
        .into_iter()
        .map(|(index, mappings)| MappingGroup { index, mappings })
        .collect()
}

fn is_wildcard(index: &str) -> bool {
    index.is_empty() || index == WILDCARD_GROUP
}

fn group_sort_key(index: &str) -> i64 {
    if is_wildcard(index) {
        return i64::MIN;
    }
    // non-numeric indices are flagged by startup validation; sort them last
    index.trim().parse().unwrap_or(i64::MAX)
}
