//! The end-to-end harmonization pipeline.
//!
//! Configuration is loaded and verified, study mappings are resolved from
//! their remote documents, source tables are loaded up front so mapping
//! validation can check against real headers, then each study is harmonized
//! per transformation, merged with duplicate suppression, audited and
//! validated.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result, bail};
use tracing::{info, info_span, warn};

use cdh_config::{
    StudyConfig, assert_valid_study_configurations, load_app_config, resolve_study_mappings,
    verify_app_config,
};
use cdh_etl::{StudyMerge, duplicate_record_report, harmonize_transformation};
use cdh_fetch::{Fetch, StandardFetcher, local_file_exists, write_bytes};
use cdh_ingest::{SourceFormat, SourceTable, load_source_table};
use cdh_model::{Graph, NodeType};
use cdh_schema::SchemaCatalog;
use cdh_transform::BuilderRegistry;
use cdh_validate::{validate_relationships, validate_structure};

use crate::types::StudyOutcome;

pub fn run_pipeline(config_path: &Path) -> Result<Vec<StudyOutcome>> {
    let fetcher = StandardFetcher::default();

    let config_location = config_path.to_string_lossy();
    if !local_file_exists(&config_location) {
        bail!("configuration file \"{config_location}\" not found");
    }
    let bytes = fetcher
        .fetch(&config_location)
        .with_context(|| format!("load configuration {config_location}"))?;
    let mut config = load_app_config(&bytes).context("parse configuration")?;
    verify_app_config(&config).context("verify configuration")?;

    let schema_bytes = fetcher
        .fetch(&config.json_schema_url)
        .with_context(|| format!("fetch JSON schema {}", config.json_schema_url))?;
    let catalog = SchemaCatalog::from_slice(&schema_bytes).context("parse JSON schema")?;

    for study in &mut config.study_configurations {
        resolve_study_mappings(&fetcher, study)
            .with_context(|| format!("resolve mappings for study {}", study.study))?;
        study.transformations.retain(|t| t.active);
    }
    let studies = config.study_configurations;

    // load every source table up front so configuration validation can check
    // mapped source fields against the actual headers
    let mut tables: BTreeMap<(String, String), SourceTable> = BTreeMap::new();
    let mut headers: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for study in &studies {
        for transformation in &study.transformations {
            match load_table(&fetcher, &transformation.source_file_path) {
                Ok(table) => {
                    headers.insert(transformation.name.clone(), table.header.clone());
                    tables.insert((study.study.clone(), transformation.name.clone()), table);
                }
                Err(error) => {
                    warn!(
                        transformation = %transformation.name,
                        study = %study.study,
                        %error,
                        "unable to load source data"
                    );
                }
            }
        }
    }

    assert_valid_study_configurations(&catalog, &studies, &headers)
        .context("validate study configurations")?;

    let registry = BuilderRegistry::new();
    let mut outcomes = Vec::new();
    for study in &studies {
        let outcome = run_study(&catalog, &registry, study, &tables)?;
        outcomes.push(outcome);
    }
    Ok(outcomes)
}

fn run_study(
    catalog: &SchemaCatalog,
    registry: &BuilderRegistry,
    study: &StudyConfig,
    tables: &BTreeMap<(String, String), SourceTable>,
) -> Result<StudyOutcome> {
    let study_span = info_span!("study", study_id = %study.study);
    let _study_guard = study_span.enter();

    let mut merge = StudyMerge::new(&study.study);
    let mut sources: BTreeMap<String, Graph> = BTreeMap::new();
    let mut schema_valid = true;
    for transformation in &study.transformations {
        let Some(table) = tables.get(&(study.study.clone(), transformation.name.clone())) else {
            bail!(
                "no source data loaded for transformation {} (study {})",
                transformation.name,
                study.study
            );
        };
        let graph = harmonize_transformation(catalog, transformation, registry, table, &study.study)
            .with_context(|| format!("harmonize transformation {}", transformation.name))?;

        schema_valid &= validate_structure(catalog, &graph, &transformation.name)?;

        info!(path = %transformation.output_file_path, "saving harmonized data");
        write_bytes(
            &transformation.output_file_path,
            &serde_json::to_vec_pretty(&graph.to_json())?,
        )?;

        merge
            .merge_transformation(&transformation.name, &graph)
            .with_context(|| format!("merge transformation {}", transformation.name))?;
        sources.insert(transformation.name.clone(), graph);
    }

    if let Some(path) = &study.merged_output_file_path {
        info!(path = %path, "saving merged harmonized data");
        write_bytes(path, &serde_json::to_vec_pretty(&merge.graph().to_json())?)?;
    }

    let duplicates_suppressed = merge
        .record_cache()
        .values()
        .filter(|names| names.len() > 1)
        .count();
    if let Some(report) = duplicate_record_report(&merge)? {
        match &study.duplicate_record_report_path {
            Some(path) => {
                write_bytes(path, &report)?;
            }
            None => warn!(
                "duplicate report output path not specified in study config, \
                 duplicate report CSV file not written"
            ),
        }
    }

    merge
        .assert_consistent_with_sources(&sources)
        .context("audit merged data set")?;
    validate_relationships(merge.graph()).context("validate merged relationships")?;
    schema_valid &= validate_structure(catalog, merge.graph(), "merged")?;

    let graph = merge.graph();
    Ok(StudyOutcome {
        study_id: study.study.clone(),
        transformations: study.transformations.len(),
        participants: graph.count(NodeType::Participant),
        observations: NodeType::OBSERVATIONS
            .iter()
            .map(|&n| graph.count(n))
            .sum(),
        duplicates_suppressed,
        merged_output_path: study.merged_output_file_path.clone(),
        schema_valid,
    })
}

fn load_table(fetcher: &dyn Fetch, location: &str) -> Result<SourceTable> {
    let format = SourceFormat::from_path(location)?;
    let bytes = fetcher.fetch(location)?;
    Ok(load_source_table(&bytes, format)?)
}
