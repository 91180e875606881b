//! Harmonization pipeline: per-transformation graph construction, the
//! cross-transformation merge with duplicate suppression, and the duplicate
//! record report.

mod cache;
mod error;
mod merge;
mod orchestrator;
mod report;

pub use cache::{CacheKey, cache_key, cacheable_record};
pub use error::{EtlError, Result};
pub use merge::StudyMerge;
pub use orchestrator::harmonize_transformation;
pub use report::duplicate_record_report;
