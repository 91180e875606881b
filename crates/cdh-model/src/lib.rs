//! Core data model for the clinical data harmonizer: node types, source
//! records with provenance, and the harmonized node graph.

pub mod error;
pub mod graph;
pub mod node;
pub mod record;

pub use error::{ModelError, Result};
pub use graph::{Graph, NodeRecord, record_id};
pub use node::NodeType;
pub use record::SourceRecord;

/// Delimiter separating multiple values within a single source cell.
pub const MULTIPLE_VALUE_DELIMITER: char = ';';
