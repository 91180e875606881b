use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error(transparent)]
    Fetch(#[from] cdh_fetch::FetchError),
    #[error("one or more required variables not specified in configuration: {0:?}")]
    MissingVariables(Vec<String>),
    #[error("duplicate study ids found in study configurations")]
    DuplicateStudyIds,
    #[error("no study configurations to validate")]
    NoStudyConfigurations,
    #[error("invalid transformation(s) found ({} error(s), see log)", errors.len())]
    InvalidTransformations { errors: Vec<String> },
}

pub type Result<T> = std::result::Result<T, ConfigError>;
