use thiserror::Error;

use cdh_model::{ModelError, NodeType};
use cdh_transform::TransformError;

#[derive(Debug, Error)]
pub enum EtlError {
    #[error(transparent)]
    Transform(#[from] TransformError),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("failed to serialize harmonized records: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("failed to write duplicate record report: {0}")]
    Report(#[from] csv::Error),
    #[error("no source data loaded to transform for transformation \"{0}\"")]
    NoSourceData(String),
    #[error(
        "unable to find single source mapping for \"{0}\" in transformation mappings; \
         \"{0}\" is either not mapped or is mapped multiple times"
    )]
    ParticipantIdMapping(String),
    #[error("unexpected number of {node_type} nodes built ({count}), check mapping")]
    NodeCount { node_type: NodeType, count: usize },
    #[error("harmonized {0} record has no id")]
    MissingRecordId(NodeType),
    #[error("error adding participant \"{0}\" to merged data, record already exists")]
    ParticipantExists(String),
    #[error("unable to update participant \"{0}\" in merged data, participant not found")]
    ParticipantNotFound(String),
    #[error("consent group \"{0}\" not found in merged data")]
    ConsentGroupNotFound(String),
    #[error(
        "unable to update participant \"{0}\" in merged data, id not in consent group \
         participant id list"
    )]
    ParticipantNotInConsentGroup(String),
    #[error("observation \"{id}\" of type {node_type} not found in transformation graph")]
    ObservationNotFound { node_type: NodeType, id: String },
    #[error("merged data set inconsistent with unmerged transformation data: {0}")]
    MergeAudit(String),
    #[error("duplicate harmonized record report cache is empty for study \"{0}\"")]
    DuplicateReportEmpty(String),
}

pub type Result<T> = std::result::Result<T, EtlError>;
