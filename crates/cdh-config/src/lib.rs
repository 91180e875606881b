//! Harmonizer configuration: the top-level application config, per-study
//! mapping documents resolved against a remote source of truth, macro
//! parsing, type-group partitioning, and eager startup validation.

mod error;
mod groups;
mod macros;
mod resolver;
mod types;
mod validate;

pub use error::{ConfigError, Result};
pub use groups::{GroupedMappings, MappingGroup};
pub use macros::{MacroExpr, MacroParseError};
pub use resolver::{load_app_config, resolve_study_mappings};
pub use types::{
    AppConfig, FieldMapping, MappingDocument, ReplacementEntry, STRING_LITERAL_FIELD, StudyConfig,
    TransformationConfig, WILDCARD_GROUP, parse_delimited_list,
};
pub use validate::{assert_valid_study_configurations, transformation_errors, verify_app_config};
