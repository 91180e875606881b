//! Sub-record expansion for delimited multi-value scalar enum fields.

use serde_json::Value;
use tracing::info;

use cdh_config::TransformationConfig;
use cdh_model::{MULTIPLE_VALUE_DELIMITER, NodeType, SourceRecord};
use cdh_schema::SchemaCatalog;

/// Clone the source record once per distinct delimited sub-value of any
/// scalar enum field of the node type whose permissible values cannot
/// contain the delimiter. Each clone gets a deterministic derived id
/// (`{original_id}_{n}`, n from 1 over the sorted distinct values) and the
/// single sub-value in place of the delimited one. Empty when no field
/// needs expansion.
pub fn sub_source_records(
    catalog: &SchemaCatalog,
    transformation: &TransformationConfig,
    node_type: NodeType,
    record: &SourceRecord,
    source_id_field: &str,
) -> Vec<SourceRecord> {
    let mut sub_records: Vec<SourceRecord> = Vec::new();
    for property in catalog.sub_record_enum_properties(node_type) {
        let Some(source_field) = transformation.find_source_field(property, None) else {
            continue;
        };
        let Some(raw_value) = record.text(&source_field) else {
            continue;
        };
        if !raw_value.contains(MULTIPLE_VALUE_DELIMITER) {
            continue;
        }
        let Some(original_id) = record.text(source_id_field) else {
            continue;
        };

        let mut distinct_values: Vec<&str> = raw_value
            .split(MULTIPLE_VALUE_DELIMITER)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .collect();
        distinct_values.sort_unstable();
        distinct_values.dedup();

        info!(
            "\"{node_type}\" \"{original_id}\" has {} distinct delimited value(s) for \
             \"{property}\" (\"{source_field}\"), creating separate record per value",
            distinct_values.len()
        );

        for (n, sub_value) in distinct_values.iter().enumerate() {
            let mut clone = record.clone();
            clone.set_value(
                source_id_field,
                Value::String(format!("{original_id}_{}", n + 1)),
            );
            clone.set_value(&source_field, Value::String((*sub_value).to_string()));
            sub_records.push(clone);
        }
    }
    sub_records
}
