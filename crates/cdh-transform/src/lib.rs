//! Value transformation and node construction: replacement-rule matching,
//! macro expansion, schema type coercion, the default node builder with its
//! per-node-type strategy registry, and sub-record expansion.

mod builder;
mod coerce;
mod error;
mod eval;
mod expand;
mod matching;
mod race;
mod value;

pub use builder::{BuilderRegistry, NodeBuilder, RecordTransformer};
pub use coerce::convert_value;
pub use error::{Result, TransformError};
pub use eval::{EvalContext, mapped_output_value};
pub use expand::sub_source_records;
pub use matching::{is_allowed_value, is_replacement_match};
pub use race::{ETHNICITY_ALLOWED_VALUES, derive_race};
pub use value::{is_blank, is_number, value_text};
