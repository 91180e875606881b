//! JSON Schema validation of harmonized data sets.

use tracing::{error, info};

use cdh_model::Graph;
use cdh_schema::SchemaCatalog;

use crate::error::{Result, ValidateError};

/// Validate a harmonized graph against the data model's JSON schema.
///
/// Non-conformance is reported per offending instance path and yields
/// `Ok(false)`; only a schema that cannot be compiled is an error. Callers
/// treat an invalid data set as a degraded-but-written outcome.
pub fn validate_structure(catalog: &SchemaCatalog, graph: &Graph, label: &str) -> Result<bool> {
    info!(data_set = label, "validating harmonized data against JSON schema");
    let validator = jsonschema::validator_for(catalog.document())
        .map_err(|e| ValidateError::SchemaCompile(e.to_string()))?;

    let instance = graph.to_json();
    let mut valid = true;
    for violation in validator.iter_errors(&instance) {
        valid = false;
        error!(
            data_set = label,
            path = %violation.instance_path,
            "{}",
            violation
        );
    }
    if valid {
        info!(data_set = label, "schema validation succeeded");
    } else {
        error!(data_set = label, "harmonized data failed schema validation");
    }
    Ok(valid)
}
