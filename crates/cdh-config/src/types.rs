use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Type group index naming the base/default mapping group.
pub const WILDCARD_GROUP: &str = "*";

/// Sentinel source field whose mappings always match (replacement values
/// supply literal output).
pub const STRING_LITERAL_FIELD: &str = "[string_literal]";

/// One ordered replacement rule: replace `old_value` matches with
/// `new_value`. `old_value` may be `*` (always), `+` (non-empty) or a
/// literal; `new_value` may be a scalar, a list, or a `{...}` macro.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReplacementEntry {
    #[serde(default)]
    pub old_value: Option<Value>,
    #[serde(default)]
    pub new_value: Value,
}

impl ReplacementEntry {
    /// Old value rendered as text; absent defaults to the `*` wildcard.
    pub fn old_value_text(&self) -> String {
        match &self.old_value {
            None | Some(Value::Null) => WILDCARD_GROUP.to_string(),
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
        }
    }

    /// True when the new value is (or contains) a `{...}` macro token.
    pub fn is_macro(&self) -> bool {
        let values: Vec<&Value> = match &self.new_value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        values.iter().any(|v| {
            v.as_str()
                .map(str::trim)
                .is_some_and(|s| s.starts_with('{') && s.ends_with('}'))
        })
    }
}

/// Declarative mapping from one source field (or compound field list, or
/// string-literal sentinel) to one `node_type.property` output field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source_field: String,
    pub output_field: String,
    #[serde(
        default = "default_type_group_index",
        deserialize_with = "string_or_number"
    )]
    pub type_group_index: String,
    #[serde(default)]
    pub default_value: Option<Value>,
    #[serde(default)]
    pub replacement_values: Vec<ReplacementEntry>,
}

impl FieldMapping {
    pub fn source_field_trimmed(&self) -> &str {
        self.source_field.trim().trim_matches(['\'', '"'])
    }

    /// True for bracketed compound source fields like `[race, ethnicity]`.
    pub fn is_compound(&self) -> bool {
        let field = self.source_field.trim();
        field.starts_with('[') && field.ends_with(']')
    }

    pub fn is_string_literal(&self) -> bool {
        self.source_field.trim() == STRING_LITERAL_FIELD
    }

    /// Component field names of a compound source field. Parsed as a CSV
    /// line so quoted names containing commas survive.
    pub fn compound_fields(&self) -> Vec<String> {
        parse_delimited_list(self.source_field.trim().trim_matches(['[', ']', ' ']), b',')
    }

    /// A mapping may fan into several type groups via a comma-separated
    /// index list, e.g. `"1,2"`.
    pub fn type_group_indices(&self) -> Vec<String> {
        self.type_group_index
            .split(',')
            .map(|i| i.trim().to_string())
            .collect()
    }

    /// True when any replacement entry's new value is macro-driven.
    pub fn is_macro_mapping(&self) -> bool {
        self.replacement_values.iter().any(ReplacementEntry::is_macro)
    }
}

/// Split a delimited list with CSV quoting rules, trimming each item.
pub fn parse_delimited_list(text: &str, delimiter: u8) -> Vec<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .delimiter(delimiter)
        .from_reader(text.as_bytes());
    match reader.records().next() {
        Some(Ok(record)) => record.iter().map(|s| s.trim().to_string()).collect(),
        _ => Vec::new(),
    }
}

/// One transformation: one source file mapped into one harmonized output
/// file. Mappings come from the remote document; paths and seed are local.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformationConfig {
    pub name: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub source_file_path: String,
    #[serde(default)]
    pub output_file_path: String,
    #[serde(default)]
    pub uuid_seed: Option<u64>,
    #[serde(default)]
    pub mappings: Vec<FieldMapping>,
}

impl TransformationConfig {
    /// Source field of the single mapping targeting `output_field`,
    /// optionally constrained to one type group. Zero or multiple matches
    /// yield `None`.
    pub fn find_source_field(
        &self,
        output_field: &str,
        type_group_index: Option<&str>,
    ) -> Option<String> {
        let mut matches = self.mappings.iter().filter(|m| {
            m.output_field.trim() == output_field
                && type_group_index.is_none_or(|tgi| m.type_group_index.trim() == tgi)
        });
        match (matches.next(), matches.next()) {
            (Some(mapping), None) => Some(mapping.source_field.trim().to_string()),
            _ => None,
        }
    }
}

/// Per-study configuration: remote mapping source plus local environment
/// specifics (paths, report locations).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StudyConfig {
    #[serde(default)]
    pub study: String,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default)]
    pub transformations_url: String,
    #[serde(default)]
    pub transformations: Vec<TransformationConfig>,
    #[serde(default)]
    pub merged_output_file_path: Option<String>,
    #[serde(default)]
    pub duplicate_record_report_path: Option<String>,
}

/// Remote, study-agnostic mapping document.
#[derive(Debug, Clone, Deserialize)]
pub struct MappingDocument {
    #[serde(default)]
    pub transformations: Vec<TransformationConfig>,
}

/// Top-level application configuration file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub json_schema_url: String,
    #[serde(default)]
    pub study_configurations: Vec<StudyConfig>,
}

fn default_type_group_index() -> String {
    WILDCARD_GROUP.to_string()
}

fn default_true() -> bool {
    true
}

/// Accept both `"1"` and `1` for type group indices.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        Value::Null => default_type_group_index(),
        other => other.to_string(),
    })
}
