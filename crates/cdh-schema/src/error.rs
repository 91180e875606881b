use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("JSON schema document is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("JSON schema does not contain root-level \"$defs\" object")]
    MissingDefs,
    #[error("\"properties\" not found in schema definition for node type \"{0}\"")]
    MissingProperties(String),
    #[error("invalid node.property reference (\".\" not present): \"{0}\"")]
    InvalidPropertyRef(String),
    #[error("schema property \"{property}\" has unsupported type \"{json_type}\"")]
    UnsupportedType { property: String, json_type: String },
    #[error("multiple permissible value matches for \"{value}\" in schema property \"{property}\"")]
    AmbiguousEnumMatch { property: String, value: String },
}

pub type Result<T> = std::result::Result<T, SchemaError>;
