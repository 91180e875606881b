//! Replacement-value evaluation: walks a mapping's replacement entries in
//! order, expands macro directives against the current source record, and
//! returns the first matching entry's value.

use rand::{Rng, SeedableRng, rngs::StdRng};
use serde_json::{Number, Value};
use tracing::warn;
use uuid::Uuid;

use cdh_config::{FieldMapping, MacroExpr};
use cdh_model::SourceRecord;
use cdh_schema::SchemaCatalog;

use crate::coerce::convert_value;
use crate::error::{Result, TransformError};
use crate::matching::is_replacement_match;
use crate::race::derive_race;
use crate::value::is_number;

/// Evaluation context threaded through macro expansion: the schema catalog
/// plus a transformation-scoped random source so a configured seed yields
/// reproducible generated ids.
pub struct EvalContext<'a> {
    catalog: &'a SchemaCatalog,
    rng: StdRng,
}

impl<'a> EvalContext<'a> {
    pub fn new(catalog: &'a SchemaCatalog, uuid_seed: Option<u64>) -> Self {
        let rng = match uuid_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self { catalog, rng }
    }

    pub fn catalog(&self) -> &'a SchemaCatalog {
        self.catalog
    }

    /// Generate a UUID with the v4 bit pattern from the scoped RNG.
    pub fn next_uuid(&mut self) -> Uuid {
        uuid::Builder::from_random_bytes(self.rng.random()).into_uuid()
    }
}

/// Result of evaluating one macro directive. `Skip` aborts the whole mapping
/// evaluation with no value (a `{sum}` over a blank addend yields nothing,
/// never a partial sum).
enum MacroOutcome {
    Value(Value),
    Skip,
}

/// Get the mapped output value for the mapping and source record, or `None`
/// when no replacement entry matches (caller falls back to passthrough
/// coercion of the raw source value).
pub fn mapped_output_value(
    ctx: &mut EvalContext<'_>,
    mapping: &FieldMapping,
    record: &SourceRecord,
) -> Result<Option<Value>> {
    for entry in &mapping.replacement_values {
        let old_value = entry.old_value_text();

        let raw_values: Vec<Value> = match &entry.new_value {
            Value::Array(items) => items.clone(),
            other => vec![other.clone()],
        };
        let mut expanded: Vec<Value> = Vec::with_capacity(raw_values.len());
        for raw in raw_values {
            let value = match raw.as_str().map(MacroExpr::parse) {
                Some(Ok(Some(expr))) => match eval_macro(ctx, mapping, record, &expr)? {
                    MacroOutcome::Value(value) => value,
                    MacroOutcome::Skip => return Ok(None),
                },
                // plain replacement text, or malformed macro text caught by
                // startup validation
                _ => raw,
            };
            expanded.push(value);
        }

        // an enum-code lookup miss falls through to the next entry so a
        // manual replacement can follow the {find_enum_value} directive
        if entry.new_value.as_str().map(str::trim) == Some("{find_enum_value}")
            && expanded.first().is_none_or(Value::is_null)
        {
            continue;
        }

        if is_replacement_match(mapping, record, &old_value)? {
            let value = if entry.new_value.is_array() {
                Value::Array(expanded)
            } else {
                expanded.into_iter().next().unwrap_or(Value::Null)
            };
            return Ok(Some(value));
        }
    }
    Ok(None)
}

fn eval_macro(
    ctx: &mut EvalContext<'_>,
    mapping: &FieldMapping,
    record: &SourceRecord,
    expr: &MacroExpr,
) -> Result<MacroOutcome> {
    let outcome = match expr {
        MacroExpr::Uuid => MacroOutcome::Value(Value::String(ctx.next_uuid().to_string())),
        MacroExpr::StringLiteral(text) => MacroOutcome::Value(Value::String(text.clone())),
        MacroExpr::Field(field) => {
            if !record.contains_field(field) {
                return Err(TransformError::MacroFieldMissing(field.clone()));
            }
            MacroOutcome::Value(record.value(field).cloned().unwrap_or(Value::Null))
        }
        MacroExpr::FindEnumValue => eval_find_enum_value(ctx, mapping, record)?,
        MacroExpr::Sum => eval_sum(mapping, record)?,
        MacroExpr::Race => eval_race(ctx, mapping, record)?,
    };
    Ok(outcome)
}

/// Look up the source value as an enum code (e.g. `8000/0` or `C71.9`) and
/// substitute the corresponding permissible value.
fn eval_find_enum_value(
    ctx: &EvalContext<'_>,
    mapping: &FieldMapping,
    record: &SourceRecord,
) -> Result<MacroOutcome> {
    let output_field = mapping.output_field.trim();
    let source_value = record.text(mapping.source_field_trimmed());
    let label = source_value
        .as_deref()
        .and_then(|code| ctx.catalog.enum_value_for_code(output_field, code))
        .map(str::to_string);
    let enum_value = match label {
        Some(label) => convert_value(ctx.catalog, output_field, &Value::String(label))?,
        None => None,
    };
    if let (Some(code), None) = (&source_value, &enum_value) {
        warn!(
            "No enum value found for \"{}\" value code \"{code}\"",
            mapping.source_field_trimmed()
        );
    }
    Ok(MacroOutcome::Value(enum_value.unwrap_or(Value::Null)))
}

/// Sum the compound source field's sub-values. Any blank addend yields no
/// value at all; a non-numeric addend falls back to the mapping default.
fn eval_sum(mapping: &FieldMapping, record: &SourceRecord) -> Result<MacroOutcome> {
    if !mapping.is_compound() || mapping.is_string_literal() {
        return Err(TransformError::MacroSourceField {
            macro_name: "sum",
            source_field: mapping.source_field.clone(),
            requirement: "must be comma-delimited list of fields within square brackets",
        });
    }
    let mut total = 0f64;
    let mut all_numeric = true;
    for field_name in mapping.compound_fields() {
        let Some(addend) = record.text(&field_name) else {
            return Ok(MacroOutcome::Skip);
        };
        if !is_number(&addend) {
            warn!(
                "Invalid \"{field_name}\" value \"{addend}\" for \"sum\" macro in row {}, \
                 must be a number",
                record.row()
            );
            all_numeric = false;
        } else if let Ok(parsed) = addend.trim().parse::<f64>() {
            total += parsed;
        }
    }
    let value = if all_numeric {
        Number::from_f64(total).map(Value::Number).unwrap_or(Value::Null)
    } else {
        mapping.default_value.clone().unwrap_or(Value::Null)
    };
    Ok(MacroOutcome::Value(value))
}

/// Derive the race output from the compound `[race, ethnicity]` source
/// fields (ethnicity optional), case-matching each derived value against the
/// output property's permissible values.
fn eval_race(
    ctx: &EvalContext<'_>,
    mapping: &FieldMapping,
    record: &SourceRecord,
) -> Result<MacroOutcome> {
    let field_names = if mapping.is_compound() && !mapping.is_string_literal() {
        mapping.compound_fields()
    } else {
        vec![mapping.source_field_trimmed().to_string()]
    };
    if field_names.is_empty() || field_names.len() > 2 {
        return Err(TransformError::MacroSourceField {
            macro_name: "race",
            source_field: mapping.source_field.clone(),
            requirement: "must be a single field or bracketed [race, ethnicity] field pair",
        });
    }

    let output_field = mapping.output_field.trim();
    let source_race = record.text(&field_names[0]);
    let source_ethnicity = field_names.get(1).and_then(|f| record.text(f));

    let mut valid_races: Vec<String> = Vec::new();
    for race in derive_race(source_race.as_deref(), source_ethnicity.as_deref()) {
        match ctx.catalog.case_match_enum_value(output_field, &race)? {
            Some(case_matched) => valid_races.push(case_matched),
            None => warn!(
                "Invalid source value \"{race}\" in \"{}\" for \"race\" macro in source row \
                 {}, not found in data dictionary",
                mapping.source_field,
                record.row()
            ),
        }
    }
    valid_races.sort();
    let value = if valid_races.is_empty() {
        mapping.default_value.clone().unwrap_or(Value::Null)
    } else {
        Value::Array(valid_races.into_iter().map(Value::String).collect())
    };
    Ok(MacroOutcome::Value(value))
}

#[cfg(test)]
mod tests {
    use super::{EvalContext, mapped_output_value};
    use cdh_config::FieldMapping;
    use cdh_model::SourceRecord;
    use cdh_schema::SchemaCatalog;
    use serde_json::{Value, json};
    use std::collections::BTreeMap;

    fn catalog() -> SchemaCatalog {
        SchemaCatalog::from_document(json!({
            "$defs": {
                "diagnosis": {
                    "properties": {
                        "diagnosis_id": {"type": "string"},
                        "diagnosis": {
                            "type": "string",
                            "enum": ["8000/0 : Neoplasm, benign", "9500/3 : Neuroblastoma, NOS"],
                        },
                        "age_at_diagnosis": {"type": "integer"},
                    },
                    "required": ["diagnosis_id"],
                },
                "participant": {
                    "properties": {
                        "participant_id": {"type": "string"},
                        "race": {
                            "type": "array",
                            "items": {
                                "type": "string",
                                "enum": [
                                    "Black or African American",
                                    "Hispanic or Latino",
                                    "White",
                                    "Unknown",
                                ],
                            },
                        },
                    },
                    "required": ["participant_id"],
                },
            },
        }))
        .expect("catalog")
    }

    fn record(pairs: &[(&str, &str)]) -> SourceRecord {
        let values: BTreeMap<String, Value> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), json!(v)))
            .collect();
        SourceRecord::new(values, 2)
    }

    fn mapping(body: serde_json::Value) -> FieldMapping {
        serde_json::from_value(body).expect("mapping")
    }

    #[test]
    fn first_matching_entry_wins() {
        let catalog = catalog();
        let mut ctx = EvalContext::new(&catalog, None);
        let m = mapping(json!({
            "source_field": "Vital Status",
            "output_field": "participant.participant_id",
            "replacement_values": [
                {"old_value": "dead", "new_value": "Deceased"},
                {"old_value": "*", "new_value": "Unknown"},
            ],
        }));
        let rec = record(&[("Vital Status", "Dead")]);
        assert_eq!(
            mapped_output_value(&mut ctx, &m, &rec).unwrap(),
            Some(json!("Deceased"))
        );
        let other = record(&[("Vital Status", "Alive")]);
        assert_eq!(
            mapped_output_value(&mut ctx, &m, &other).unwrap(),
            Some(json!("Unknown"))
        );
    }

    #[test]
    fn no_matching_entry_yields_none() {
        let catalog = catalog();
        let mut ctx = EvalContext::new(&catalog, None);
        let m = mapping(json!({
            "source_field": "Vital Status",
            "output_field": "participant.participant_id",
            "replacement_values": [{"old_value": "dead", "new_value": "Deceased"}],
        }));
        let rec = record(&[("Vital Status", "Alive")]);
        assert_eq!(mapped_output_value(&mut ctx, &m, &rec).unwrap(), None);
    }

    #[test]
    fn seeded_uuid_is_reproducible() {
        let catalog = catalog();
        let m = mapping(json!({
            "source_field": "USI",
            "output_field": "diagnosis.diagnosis_id",
            "replacement_values": [{"old_value": "*", "new_value": "{uuid}"}],
        }));
        let rec = record(&[("USI", "P1")]);
        let mut ctx_a = EvalContext::new(&catalog, Some(42));
        let mut ctx_b = EvalContext::new(&catalog, Some(42));
        let first_a = mapped_output_value(&mut ctx_a, &m, &rec).unwrap();
        let first_b = mapped_output_value(&mut ctx_b, &m, &rec).unwrap();
        assert!(first_a.is_some());
        assert_eq!(first_a, first_b);
        // successive draws from one context differ
        let second_a = mapped_output_value(&mut ctx_a, &m, &rec).unwrap();
        assert_ne!(first_a, second_a);
    }

    #[test]
    fn field_macro_substitutes_raw_value() {
        let catalog = catalog();
        let mut ctx = EvalContext::new(&catalog, None);
        let m = mapping(json!({
            "source_field": "USI",
            "output_field": "participant.participant_id",
            "replacement_values": [{"old_value": "*", "new_value": "{field:TARGET USI}"}],
        }));
        let rec = record(&[("USI", "x"), ("TARGET USI", "PARUDL")]);
        assert_eq!(
            mapped_output_value(&mut ctx, &m, &rec).unwrap(),
            Some(json!("PARUDL"))
        );
        let missing = record(&[("USI", "x")]);
        assert!(mapped_output_value(&mut ctx, &m, &missing).is_err());
    }

    #[test]
    fn sum_macro_adds_and_aborts_on_blank() {
        let catalog = catalog();
        let mut ctx = EvalContext::new(&catalog, None);
        let m = mapping(json!({
            "source_field": "[score_a, score_b]",
            "output_field": "diagnosis.age_at_diagnosis",
            "replacement_values": [{"old_value": "*", "new_value": "{sum}"}],
        }));
        let rec = record(&[("score_a", "3"), ("score_b", "4")]);
        assert_eq!(mapped_output_value(&mut ctx, &m, &rec).unwrap(), Some(json!(7.0)));

        let blank = record(&[("score_a", "3"), ("score_b", "")]);
        assert_eq!(mapped_output_value(&mut ctx, &m, &blank).unwrap(), None);
    }

    #[test]
    fn sum_macro_non_numeric_falls_back_to_default() {
        let catalog = catalog();
        let mut ctx = EvalContext::new(&catalog, None);
        let m = mapping(json!({
            "source_field": "[score_a, score_b]",
            "output_field": "diagnosis.age_at_diagnosis",
            "default_value": -999,
            "replacement_values": [{"old_value": "*", "new_value": "{sum}"}],
        }));
        let rec = record(&[("score_a", "3"), ("score_b", "n/a")]);
        assert_eq!(mapped_output_value(&mut ctx, &m, &rec).unwrap(), Some(json!(-999)));
    }

    #[test]
    fn find_enum_value_resolves_code_or_falls_through() {
        let catalog = catalog();
        let mut ctx = EvalContext::new(&catalog, None);
        let m = mapping(json!({
            "source_field": "Morphology",
            "output_field": "diagnosis.diagnosis",
            "replacement_values": [
                {"old_value": "*", "new_value": "{find_enum_value}"},
                {"old_value": "0001/0", "new_value": "8000/0 : Neoplasm, benign"},
            ],
        }));
        let hit = record(&[("Morphology", "9500/3")]);
        assert_eq!(
            mapped_output_value(&mut ctx, &m, &hit).unwrap(),
            Some(json!("9500/3 : Neuroblastoma, NOS"))
        );
        // code miss falls through to the manual replacement entry
        let miss = record(&[("Morphology", "0001/0")]);
        assert_eq!(
            mapped_output_value(&mut ctx, &m, &miss).unwrap(),
            Some(json!("8000/0 : Neoplasm, benign"))
        );
    }

    #[test]
    fn race_macro_derives_and_case_matches() {
        let catalog = catalog();
        let mut ctx = EvalContext::new(&catalog, None);
        let m = mapping(json!({
            "source_field": "[Race, Ethnicity]",
            "output_field": "participant.race",
            "replacement_values": [{"old_value": "*", "new_value": "{race}"}],
        }));
        let rec = record(&[
            ("Race", "white;black or african american"),
            ("Ethnicity", "Not Hispanic or Latino"),
        ]);
        assert_eq!(
            mapped_output_value(&mut ctx, &m, &rec).unwrap(),
            Some(json!(["Black or African American", "White"]))
        );
        let hispanic = record(&[("Race", "White"), ("Ethnicity", "Hispanic or Latino")]);
        assert_eq!(
            mapped_output_value(&mut ctx, &m, &hispanic).unwrap(),
            Some(json!(["Hispanic or Latino"]))
        );
    }

    #[test]
    fn string_literal_macro_and_list_values() {
        let catalog = catalog();
        let mut ctx = EvalContext::new(&catalog, None);
        let m = mapping(json!({
            "source_field": "[string_literal]",
            "output_field": "participant.participant_id",
            "replacement_values": [
                {"old_value": "*", "new_value": ["{'phs000467'}", "literal"]},
            ],
        }));
        let rec = record(&[("USI", "x")]);
        assert_eq!(
            mapped_output_value(&mut ctx, &m, &rec).unwrap(),
            Some(json!(["phs000467", "literal"]))
        );
    }
}
