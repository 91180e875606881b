//! Race derivation from paired race + ethnicity source fields.

use cdh_model::MULTIPLE_VALUE_DELIMITER;

/// Ethnicity values that carry a determinate race meaning; when present they
/// supersede the race field entirely.
pub const ETHNICITY_ALLOWED_VALUES: [&str; 1] = ["Hispanic or Latino"];

/// Derive the race value list from delimited race and ethnicity source
/// values ("White;Other", "Not Reported;Unknown").
///
/// A determinate ethnicity such as `Hispanic or Latino` wins outright and the
/// race field is discarded; otherwise all race values pass through for
/// downstream case-matching against the schema's permissible values. The
/// result is deduplicated and sorted.
pub fn derive_race(source_race: Option<&str>, source_ethnicity: Option<&str>) -> Vec<String> {
    let allowed_ethnicities: Vec<String> = source_ethnicity
        .unwrap_or_default()
        .split(MULTIPLE_VALUE_DELIMITER)
        .map(str::trim)
        .filter(|e| {
            ETHNICITY_ALLOWED_VALUES
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(e))
        })
        .map(str::to_string)
        .collect();

    let mut races: Vec<String> = if allowed_ethnicities.is_empty() {
        source_race
            .unwrap_or_default()
            .split(MULTIPLE_VALUE_DELIMITER)
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(str::to_string)
            .collect()
    } else {
        allowed_ethnicities
    };
    races.sort();
    races.dedup();
    races
}

#[cfg(test)]
mod tests {
    use super::derive_race;

    #[test]
    fn indeterminate_ethnicity_passes_races_through() {
        assert_eq!(
            derive_race(
                Some("White;Black or African American"),
                Some("Not Hispanic or Latino")
            ),
            vec!["Black or African American", "White"]
        );
    }

    #[test]
    fn determinate_ethnicity_wins_outright() {
        assert_eq!(
            derive_race(Some("White"), Some("Hispanic or Latino")),
            vec!["Hispanic or Latino"]
        );
        assert_eq!(
            derive_race(Some("Unknown"), Some("hispanic or latino")),
            vec!["hispanic or latino"]
        );
    }

    #[test]
    fn missing_ethnicity_keeps_indeterminate_races() {
        assert_eq!(derive_race(Some("Unknown"), None), vec!["Unknown"]);
        assert_eq!(derive_race(Some("White;White"), None), vec!["White"]);
    }

    #[test]
    fn blank_inputs_yield_empty() {
        assert!(derive_race(None, None).is_empty());
        assert!(derive_race(Some(""), Some("")).is_empty());
    }
}
