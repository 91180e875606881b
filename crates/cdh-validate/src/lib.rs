//! Validation of harmonized data sets: JSON Schema conformance and
//! referential integrity of the relationship id fields.

mod error;
mod relational;
mod structural;

pub use error::{Result, ValidateError};
pub use relational::validate_relationships;
pub use structural::validate_structure;
