//! CLI library components for the clinical data harmonizer.

pub mod logging;
pub mod pipeline;
pub mod types;
