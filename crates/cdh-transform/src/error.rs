use thiserror::Error;

use cdh_schema::SchemaError;

#[derive(Debug, Error)]
pub enum TransformError {
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error("macro source field not found in source record: \"{0}\"")]
    MacroFieldMissing(String),
    #[error(
        "invalid source field \"{source_field}\" for \"{macro_name}\" macro: {requirement}"
    )]
    MacroSourceField {
        macro_name: &'static str,
        source_field: String,
        requirement: &'static str,
    },
    #[error(
        "number of old values to be replaced must match number of compound source fields: \
         old value => \"{old_value}\", source field => \"{source_field}\""
    )]
    ReplacementArity {
        old_value: String,
        source_field: String,
    },
}

pub type Result<T> = std::result::Result<T, TransformError>;
