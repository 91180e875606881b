//! Remote/local study configuration resolution.
//!
//! The remote mapping document is study-agnostic (mappings, active flags);
//! the local study configuration carries environment specifics (file paths,
//! uuid seeds). Entries are matched by `name` and merged with the remote
//! side winning on shared keys while local-only keys survive.

use tracing::{info, warn};

use cdh_fetch::Fetch;

use crate::error::Result;
use crate::types::{AppConfig, MappingDocument, StudyConfig};

/// Parse the application configuration, dropping inactive studies.
pub fn load_app_config(bytes: &[u8]) -> Result<AppConfig> {
    let mut config: AppConfig = serde_json::from_slice(bytes)?;
    config.study_configurations.retain(|s| s.active);
    Ok(config)
}

/// Download the study's remote mapping document and merge it into the local
/// transformation entries. A fetch or parse failure is fatal to the run.
pub fn resolve_study_mappings(fetcher: &dyn Fetch, study: &mut StudyConfig) -> Result<()> {
    let bytes = fetcher.fetch(&study.transformations_url)?;
    let document: MappingDocument = serde_json::from_slice(&bytes)?;
    let remote: Vec<_> = document
        .transformations
        .into_iter()
        .filter(|t| t.active)
        .collect();

    for local in &mut study.transformations {
        match remote.iter().find(|r| !r.name.is_empty() && r.name == local.name) {
            Some(matched) => {
                info!(
                    transformation = %local.name,
                    study = %study.study,
                    "updating transformation from remote mapping document"
                );
                local.mappings = matched.mappings.clone();
                local.active = matched.active;
            }
            None => {
                warn!(
                    transformation = %local.name,
                    study = %study.study,
                    "local transformations config entry not found in remote mapping document"
                );
            }
        }
    }
    Ok(())
}
