use thiserror::Error;

use cdh_model::NodeType;

#[derive(Debug, Error)]
pub enum ValidateError {
    #[error("failed to compile harmonized data schema: {0}")]
    SchemaCompile(String),
    #[error("unexpected number of {node_type} records in data set: {count} != 1")]
    SingletonNode { node_type: NodeType, count: usize },
    #[error("mismatch between {owner} {node_type} id list and {node_type} record ids")]
    IdListMismatch { owner: NodeType, node_type: NodeType },
    #[error("duplicate entries in {owner} {node_type} id list: {ids:?}")]
    DuplicateListEntries {
        owner: NodeType,
        node_type: NodeType,
        ids: Vec<String>,
    },
    #[error("{node_type} study id \"{actual}\" != \"{expected}\"")]
    StudyIdMismatch {
        node_type: NodeType,
        actual: String,
        expected: String,
    },
    #[error("{node_type} consent group id \"{actual}\" != \"{expected}\"")]
    ConsentGroupIdMismatch {
        node_type: NodeType,
        actual: String,
        expected: String,
    },
    #[error("\"{node_type}\" id \"{id}\" not in {owner} \"{node_type}\" id list")]
    NotInIdList {
        node_type: NodeType,
        owner: NodeType,
        id: String,
    },
    #[error("\"{node_type}\" \"{id}\" not found for participant \"{participant_id}\"")]
    ObservationNotFound {
        node_type: NodeType,
        id: String,
        participant_id: String,
    },
    #[error("participant \"{0}\" not found in harmonized participant records")]
    ParticipantNotFound(String),
}

pub type Result<T> = std::result::Result<T, ValidateError>;
