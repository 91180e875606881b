//! Result types carried from the pipeline to the run summary.

/// Outcome of harmonizing one study configuration.
#[derive(Debug)]
pub struct StudyOutcome {
    pub study_id: String,
    pub transformations: usize,
    pub participants: usize,
    pub observations: usize,
    /// Count of distinct records suppressed as duplicates during merge.
    pub duplicates_suppressed: usize,
    pub merged_output_path: Option<String>,
    pub schema_valid: bool,
}
