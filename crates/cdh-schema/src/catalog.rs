use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;
use tracing::warn;

use cdh_model::{MULTIPLE_VALUE_DELIMITER, NodeType};

use crate::error::{Result, SchemaError};

/// Separator between an enum code and its label in coded permissible values,
/// e.g. `8000/0 : Neoplasm, benign`.
const ENUM_CODE_SEPARATOR: &str = " : ";

/// JSON Schema types the harmonizer knows how to coerce to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonType {
    Array,
    Integer,
    Number,
    String,
}

impl JsonType {
    pub fn parse(name: &str) -> Option<JsonType> {
        match name {
            "array" => Some(JsonType::Array),
            "integer" => Some(JsonType::Integer),
            "number" => Some(JsonType::Number),
            "string" => Some(JsonType::String),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JsonType::Array => "array",
            JsonType::Integer => "integer",
            JsonType::Number => "number",
            JsonType::String => "string",
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, JsonType::Integer | JsonType::Number)
    }
}

/// One node-type property as declared in the schema.
#[derive(Debug, Clone)]
pub struct PropertySpec {
    /// Declared type; `None` when the schema uses a type this system does
    /// not coerce to (surfaced as an error at coercion time, not load time).
    pub json_type: Option<JsonType>,
    /// Permissible values for enum properties; for `array` properties these
    /// are the `items.enum` values.
    pub enum_values: Option<Vec<String>>,
}

/// Per-node-type property and required maps. Immutable after load.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    pub properties: BTreeMap<String, PropertySpec>,
    pub required: BTreeSet<String>,
}

/// Parsed view of the JSON Schema document: per-node-type properties,
/// required sets, permissible enum values and derived enum-code lookups.
#[derive(Debug, Clone)]
pub struct SchemaCatalog {
    document: Value,
    nodes: BTreeMap<NodeType, SchemaNode>,
    /// `node_type.property` => permissible values.
    enum_values: BTreeMap<String, Vec<String>>,
    /// `node_type.property` => enum code => full permissible value.
    enum_code_values: BTreeMap<String, BTreeMap<String, String>>,
    /// Scalar enum properties whose permissible values never contain the
    /// multi-value delimiter; delimited source values for these fan out into
    /// sub-records.
    sub_record_enum_properties: BTreeSet<String>,
}

impl SchemaCatalog {
    pub fn from_slice(bytes: &[u8]) -> Result<SchemaCatalog> {
        let document: Value = serde_json::from_slice(bytes)?;
        SchemaCatalog::from_document(document)
    }

    pub fn from_document(document: Value) -> Result<SchemaCatalog> {
        let defs = document
            .get("$defs")
            .and_then(Value::as_object)
            .ok_or(SchemaError::MissingDefs)?;

        let mut nodes: BTreeMap<NodeType, SchemaNode> = BTreeMap::new();
        for (name, definition) in defs {
            let Ok(node_type) = NodeType::parse(name) else {
                if name != "nodes" {
                    warn!("schema \"$defs\" entry \"{name}\" is not a known node type");
                }
                continue;
            };
            nodes.insert(node_type, parse_schema_node(name, definition)?);
        }

        let mut enum_values: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut sub_record_enum_properties: BTreeSet<String> = BTreeSet::new();
        for (&node_type, node) in &nodes {
            for (prop_name, spec) in &node.properties {
                let Some(values) = &spec.enum_values else {
                    continue;
                };
                let key = format!("{node_type}.{prop_name}");
                // Scalar enum properties whose permissible values never
                // contain the delimiter cannot legally hold a delimited
                // source value; those are the sub-record expansion
                // candidates.
                if spec.json_type == Some(JsonType::String)
                    && !values.iter().any(|v| v.contains(MULTIPLE_VALUE_DELIMITER))
                {
                    sub_record_enum_properties.insert(key.clone());
                }
                enum_values.insert(key, values.clone());
            }
        }

        let enum_code_values = enum_values
            .iter()
            .map(|(key, values)| {
                let codes = values
                    .iter()
                    .map(|v| {
                        let code = v.split(ENUM_CODE_SEPARATOR).next().unwrap_or(v);
                        (code.to_string(), v.clone())
                    })
                    .collect();
                (key.clone(), codes)
            })
            .collect();

        Ok(SchemaCatalog {
            document,
            nodes,
            enum_values,
            enum_code_values,
            sub_record_enum_properties,
        })
    }

    /// The raw schema document, retained for structural validation.
    pub fn document(&self) -> &Value {
        &self.document
    }

    pub fn node(&self, node_type: NodeType) -> Option<&SchemaNode> {
        self.nodes.get(&node_type)
    }

    pub fn has_property(&self, node_type: NodeType, property: &str) -> bool {
        self.nodes
            .get(&node_type)
            .is_some_and(|n| n.properties.contains_key(property))
    }

    /// Declared type of `node_type.property`; `None` when the node type or
    /// property is unknown or carries an unsupported type.
    pub fn property_type(&self, output_field: &str) -> Result<Option<JsonType>> {
        let (node_type, property) = split_output_field(output_field)?;
        Ok(node_type
            .and_then(|n| self.nodes.get(&n))
            .and_then(|n| n.properties.get(property))
            .and_then(|p| p.json_type))
    }

    /// Required property names for the node type, sorted.
    pub fn required_properties(&self, node_type: NodeType) -> Vec<&str> {
        self.nodes
            .get(&node_type)
            .map(|n| n.required.iter().map(String::as_str).collect())
            .unwrap_or_default()
    }

    pub fn enum_values(&self, output_field: &str) -> Option<&[String]> {
        self.enum_values.get(output_field).map(Vec::as_slice)
    }

    pub fn enum_codes(&self, output_field: &str) -> Option<&BTreeMap<String, String>> {
        self.enum_code_values.get(output_field)
    }

    /// Full permissible value for an enum code, e.g. `8000/0` =>
    /// `8000/0 : Neoplasm, benign`.
    pub fn enum_value_for_code(&self, output_field: &str, code: &str) -> Option<&str> {
        self.enum_code_values
            .get(output_field)?
            .get(code)
            .map(String::as_str)
    }

    /// Align the case of a source value with the schema's permissible
    /// values, e.g. `unknown` => `Unknown`. Zero matches yields `None`;
    /// multiple matches indicate a broken schema and are fatal.
    pub fn case_match_enum_value(&self, output_field: &str, value: &str) -> Result<Option<String>> {
        let Some(enum_values) = self.enum_values.get(output_field) else {
            return Ok(Some(value.to_string()));
        };
        let mut matches = enum_values
            .iter()
            .filter(|v| v.eq_ignore_ascii_case(value));
        match (matches.next(), matches.next()) {
            (Some(matched), None) => Ok(Some(matched.clone())),
            (Some(_), Some(_)) => Err(SchemaError::AmbiguousEnumMatch {
                property: output_field.to_string(),
                value: value.to_string(),
            }),
            _ => Ok(None),
        }
    }

    /// `node_type.property` keys eligible for sub-record expansion on the
    /// given node type.
    pub fn sub_record_enum_properties(&self, node_type: NodeType) -> Vec<&str> {
        let prefix = format!("{node_type}.");
        self.sub_record_enum_properties
            .iter()
            .filter(|p| p.starts_with(&prefix))
            .map(String::as_str)
            .collect()
    }
}

fn parse_schema_node(name: &str, definition: &Value) -> Result<SchemaNode> {
    let properties_map = definition
        .get("properties")
        .and_then(Value::as_object)
        .ok_or_else(|| SchemaError::MissingProperties(name.to_string()))?;

    let mut properties = BTreeMap::new();
    for (prop_name, prop) in properties_map {
        let json_type = prop
            .get("type")
            .and_then(Value::as_str)
            .and_then(JsonType::parse);
        let enum_values = prop
            .get("enum")
            .or_else(|| prop.get("items").and_then(|i| i.get("enum")))
            .and_then(Value::as_array)
            .map(|values| {
                values
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            });
        properties.insert(
            prop_name.clone(),
            PropertySpec {
                json_type,
                enum_values,
            },
        );
    }

    let required = definition
        .get("required")
        .and_then(Value::as_array)
        .map(|names| {
            names
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    Ok(SchemaNode {
        properties,
        required,
    })
}

/// Split `node_type.property`; the node-type half may be unknown (caller
/// treats that as "not in schema"), but a missing `.` is a config error.
pub fn split_output_field(output_field: &str) -> Result<(Option<NodeType>, &str)> {
    let (node_name, property) = output_field
        .split_once('.')
        .ok_or_else(|| SchemaError::InvalidPropertyRef(output_field.to_string()))?;
    Ok((NodeType::parse(node_name).ok(), property))
}
