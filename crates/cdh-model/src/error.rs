use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown node type: {0}")]
    UnknownNodeType(String),
    #[error("duplicate {node_type} id(s) found: {ids:?}")]
    DuplicateIds { node_type: String, ids: Vec<String> },
}

pub type Result<T> = std::result::Result<T, ModelError>;
