//! Schema catalog: parses the shared data model's JSON Schema document into
//! per-node-type property, required and permissible-value maps.

pub mod catalog;
pub mod error;

pub use catalog::{JsonType, PropertySpec, SchemaCatalog, SchemaNode, split_output_field};
pub use error::{Result, SchemaError};
