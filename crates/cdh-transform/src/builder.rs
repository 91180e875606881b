//! Node construction: applies one node type's mapping groups to one source
//! record, enforcing allowed-value and required-property constraints.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::warn;

use cdh_config::{FieldMapping, GroupedMappings, TransformationConfig};
use cdh_model::{NodeRecord, NodeType, SourceRecord};
use cdh_schema::{JsonType, SchemaCatalog};

use crate::coerce::convert_value;
use crate::error::Result;
use crate::eval::{EvalContext, mapped_output_value};
use crate::matching::is_allowed_value;
use crate::value::{is_blank, is_number, value_text};

/// Node-type-specific builder strategy. Registered implementations replace
/// the default builder for their node type; they may delegate back to
/// [`RecordTransformer::build_default`].
pub trait NodeBuilder {
    fn build(
        &self,
        transformer: &mut RecordTransformer<'_>,
        node_type: NodeType,
        record: Option<&SourceRecord>,
    ) -> Result<Vec<NodeRecord>>;
}

/// Registry of per-node-type builder overrides; empty by default, in which
/// case every node type uses the default builder.
#[derive(Default)]
pub struct BuilderRegistry {
    builders: BTreeMap<NodeType, Box<dyn NodeBuilder>>,
}

impl BuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, node_type: NodeType, builder: Box<dyn NodeBuilder>) {
        self.builders.insert(node_type, builder);
    }

    pub fn builder(&self, node_type: NodeType) -> Option<&dyn NodeBuilder> {
        self.builders.get(&node_type).map(Box::as_ref)
    }
}

/// Builds harmonized node records for one transformation; owns the
/// transformation-scoped evaluation context (RNG) and the memoized mapping
/// groups.
pub struct RecordTransformer<'a> {
    transformation: &'a TransformationConfig,
    groups: GroupedMappings,
    registry: &'a BuilderRegistry,
    ctx: EvalContext<'a>,
}

impl<'a> RecordTransformer<'a> {
    pub fn new(
        catalog: &'a SchemaCatalog,
        transformation: &'a TransformationConfig,
        registry: &'a BuilderRegistry,
    ) -> Self {
        Self {
            transformation,
            groups: GroupedMappings::build(transformation),
            registry,
            ctx: EvalContext::new(catalog, transformation.uuid_seed),
        }
    }

    pub fn catalog(&self) -> &'a SchemaCatalog {
        self.ctx.catalog()
    }

    /// True when the transformation maps at least one field of the node type.
    pub fn has_mappings(&self, node_type: NodeType) -> bool {
        !self.groups.for_node(node_type).is_empty()
    }

    /// Build records of the node type from the source record (absent for
    /// row-independent nodes such as study). Dispatches to a registered
    /// builder strategy when one exists.
    pub fn build_node(
        &mut self,
        node_type: NodeType,
        record: Option<&SourceRecord>,
    ) -> Result<Vec<NodeRecord>> {
        let registry = self.registry;
        if let Some(builder) = registry.builder(node_type) {
            return builder.build(self, node_type, record);
        }
        self.build_default(node_type, record)
    }

    /// Default builder: applies each type-group's mappings in order, seeding
    /// group output from the base (group 0) record, and drops any group
    /// whose record fails the schema's required-property check.
    pub fn build_default(
        &mut self,
        node_type: NodeType,
        record: Option<&SourceRecord>,
    ) -> Result<Vec<NodeRecord>> {
        let blank = SourceRecord::new(BTreeMap::new(), 0);
        let record = record.unwrap_or(&blank);
        let prefix = format!("{node_type}.");

        let groups = self.groups.for_node(node_type);
        if groups.is_empty() {
            return Ok(Vec::new());
        }

        // a single source field can feed multiple output fields, e.g.
        // 'First Event' => survival.first_event and
        // survival.event_free_survival_status, so union each field's allowed
        // values across mappings to flag source values no mapping handles
        let mut field_allowed: BTreeMap<&str, BTreeSet<String>> = BTreeMap::new();
        for group in groups {
            for mapping in &group.mappings {
                if mapping.is_compound() {
                    // string substitution and compound mappings are not
                    // constrained by per-field allow-lists
                    continue;
                }
                field_allowed
                    .entry(mapping.source_field.as_str())
                    .or_default()
                    .extend(allowed_values(self.catalog(), mapping));
            }
        }

        let mut output_records: Vec<NodeRecord> = Vec::new();
        let mut base_record = NodeRecord::new();
        for group in groups {
            let mut output = base_record.clone();
            for mapping in &group.mappings {
                let output_field = mapping.output_field.trim();
                let Some(property) = output_field.strip_prefix(&prefix) else {
                    continue;
                };
                let json_type = self.catalog().property_type(output_field)?;

                let mut source_value: Option<Value> =
                    record.value(mapping.source_field_trimmed()).cloned();
                // the default kicks in only for a strictly empty cell; a
                // whitespace-only value passes through untouched
                let unset = match &source_value {
                    None | Some(Value::Null) => true,
                    Some(Value::String(s)) => s.is_empty(),
                    Some(_) => false,
                };
                if unset && mapping.default_value.is_some() {
                    source_value = mapping.default_value.clone();
                }

                if let Some(allowed) = field_allowed.get(mapping.source_field.as_str()) {
                    if !allowed.is_empty() && !is_allowed_value(source_value.as_ref(), allowed) {
                        warn!(
                            "\"{}\" not specified as allowed value (old_value) in \
                             transformation(s) for source field \"{}\" (output field \"{}\"), \
                             source record {}: {allowed:?}",
                            source_value.as_ref().map(value_text).unwrap_or_default(),
                            mapping.source_field,
                            output_field,
                            record.row()
                        );
                    }
                }

                let mapping_allowed = allowed_values(self.catalog(), mapping);
                if !mapping_allowed.is_empty()
                    && !is_allowed_value(source_value.as_ref(), &mapping_allowed)
                    && !mapping.is_macro_mapping()
                {
                    warn!(
                        "value \"{}\" not allowed for source field \"{}\" (type group \"{}\")",
                        source_value.as_ref().map(value_text).unwrap_or_default(),
                        mapping.source_field,
                        group.index
                    );
                    continue;
                }

                let mapped =
                    mapped_output_value(&mut self.ctx, mapping, record)?.filter(|v| !v.is_null());
                let mut value = match mapped {
                    Some(value) => Some(value),
                    None => convert_value(
                        self.catalog(),
                        output_field,
                        source_value.as_ref().unwrap_or(&Value::Null),
                    )?,
                };

                if json_type.is_some_and(JsonType::is_numeric) {
                    if let Some(v) = &value {
                        if !is_value_empty(v) && !is_number(&value_text(v)) {
                            warn!(
                                "Unable to set output property \"{output_field}\" (source \
                                 field \"{}\") having type \"{}\" to value \"{}\"",
                                mapping.source_field,
                                json_type.map(JsonType::as_str).unwrap_or_default(),
                                value_text(v)
                            );
                            value = None;
                        }
                    }
                }
                if json_type == Some(JsonType::Integer) {
                    if let Some(v) = &value {
                        if let Ok(numeric) = value_text(v).trim().parse::<f64>() {
                            value = Some(Value::Number((numeric.round() as i64).into()));
                        }
                    }
                }

                output.insert(property.to_string(), value.unwrap_or(Value::Null));
            }

            let mut record_valid = true;
            for required in self.catalog().required_properties(node_type) {
                if output.get(required).is_none_or(is_required_value_missing) {
                    record_valid = false;
                    let schema_field = format!("{node_type}.{required}");
                    warn!(
                        "Required output field \"{schema_field}\" (source field \"{}\") is \
                         null/empty for source record {}",
                        self.transformation
                            .find_source_field(&schema_field, Some(&group.index))
                            .unwrap_or_else(|| "*not mapped*".to_string()),
                        record.row()
                    );
                }
            }
            if !record_valid {
                // record failed validation, move on to the next type group
                continue;
            }

            if !output.is_empty() {
                output_records.push(output.clone());
            }
            if group.is_base_seed() {
                for (key, value) in output {
                    base_record.insert(key, value);
                }
            }
        }

        Ok(output_records)
    }
}

/// Union of the mapping's explicit old values, its default (for enum output
/// properties), and — when a wildcard entry maps through `{find_enum_value}`
/// — every permissible enum code for the output field.
fn allowed_values(catalog: &SchemaCatalog, mapping: &FieldMapping) -> BTreeSet<String> {
    let mut allowed: BTreeSet<String> = mapping
        .replacement_values
        .iter()
        .filter(|entry| {
            !matches!(entry.old_value_text().as_str(), "*" | "+")
                && entry.old_value.is_some()
                && !is_value_empty(&entry.new_value)
        })
        .map(|entry| entry.old_value_text())
        .collect();

    let output_field = mapping.output_field.trim();
    if catalog.enum_values(output_field).is_some() {
        match &mapping.default_value {
            Some(Value::Array(items)) => allowed.extend(items.iter().map(value_text)),
            Some(value) if !value.is_null() => {
                allowed.insert(value_text(value));
            }
            _ => {}
        }
    }

    let wildcard_enum_lookup = mapping.replacement_values.iter().any(|entry| {
        matches!(entry.old_value_text().as_str(), "*" | "+")
            && entry.new_value.as_str().map(str::trim) == Some("{find_enum_value}")
    });
    if wildcard_enum_lookup {
        if let Some(codes) = catalog.enum_codes(output_field) {
            allowed.extend(codes.keys().cloned());
        }
    }

    allowed
}

/// A required property is missing when null, blank, an empty list, or a list
/// whose elements are all blank.
fn is_required_value_missing(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty() || items.iter().all(is_blank),
        _ => false,
    }
}

/// Falsy check guarding the numeric-coercion warning: empty-equivalent
/// values never trigger it.
fn is_value_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Number(n) => n.as_f64() == Some(0.0),
    }
}
