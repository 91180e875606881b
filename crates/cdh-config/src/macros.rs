//! The `{...}` macro mini-language embedded in replacement values.
//!
//! A replacement `new_value` that is a single brace-wrapped token is parsed
//! into a [`MacroExpr`] up front; evaluation happens downstream against the
//! current source record, schema catalog and per-transformation RNG. Partial
//! or embedded macros (`"id-{uuid}"`) are rejected at startup validation so
//! a macro result can never be re-read as another macro token.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid replacement macro: {text}")]
pub struct MacroParseError {
    pub text: String,
}

/// A parsed macro directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroExpr {
    /// `{uuid}` — fresh v4 UUID from the transformation-scoped RNG.
    Uuid,
    /// `{field:NAME}` — the named source field's raw value.
    Field(String),
    /// `{sum}` — numeric sum of the compound source field's sub-values.
    Sum,
    /// `{race}` — race derivation from race + optional ethnicity fields.
    Race,
    /// `{find_enum_value}` — enum-code lookup against the output property.
    FindEnumValue,
    /// `{'text'}` / `{"text"}` — quoted literal.
    StringLiteral(String),
}

impl MacroExpr {
    /// Parse a replacement value. `Ok(None)` when the value is not
    /// macro-shaped (plain replacement text); `Err` when it is brace-wrapped
    /// but not a recognized directive.
    pub fn parse(new_value: &str) -> Result<Option<MacroExpr>, MacroParseError> {
        let trimmed = new_value.trim();
        if !(trimmed.starts_with('{') && trimmed.ends_with('}')) {
            return Ok(None);
        }
        let text = trimmed[1..trimmed.len() - 1].trim();
        if (text.starts_with('\'') && text.ends_with('\'') && text.len() >= 2)
            || (text.starts_with('"') && text.ends_with('"') && text.len() >= 2)
        {
            return Ok(Some(MacroExpr::StringLiteral(
                text[1..text.len() - 1].to_string(),
            )));
        }
        let lower = text.to_lowercase();
        if let Some(field) = lower.strip_prefix("field:") {
            // preserve source-field case; only the directive name is
            // case-insensitive
            let original = &text[text.len() - field.len()..];
            let name = original.trim();
            if name.is_empty() {
                return Err(MacroParseError {
                    text: new_value.to_string(),
                });
            }
            return Ok(Some(MacroExpr::Field(name.to_string())));
        }
        match lower.as_str() {
            "uuid" => Ok(Some(MacroExpr::Uuid)),
            "sum" => Ok(Some(MacroExpr::Sum)),
            "race" => Ok(Some(MacroExpr::Race)),
            "find_enum_value" => Ok(Some(MacroExpr::FindEnumValue)),
            _ => Err(MacroParseError {
                text: new_value.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::MacroExpr;

    #[test]
    fn known_directives() {
        assert_eq!(MacroExpr::parse("{uuid}").unwrap(), Some(MacroExpr::Uuid));
        assert_eq!(MacroExpr::parse(" {SUM} ").unwrap(), Some(MacroExpr::Sum));
        assert_eq!(MacroExpr::parse("{race}").unwrap(), Some(MacroExpr::Race));
        assert_eq!(
            MacroExpr::parse("{find_enum_value}").unwrap(),
            Some(MacroExpr::FindEnumValue)
        );
    }

    #[test]
    fn field_directive_preserves_case() {
        assert_eq!(
            MacroExpr::parse("{field:TARGET USI}").unwrap(),
            Some(MacroExpr::Field("TARGET USI".to_string()))
        );
        assert_eq!(
            MacroExpr::parse("{FIELD: Subject ID }").unwrap(),
            Some(MacroExpr::Field("Subject ID".to_string()))
        );
    }

    #[test]
    fn quoted_literals() {
        assert_eq!(
            MacroExpr::parse("{'phs000467'}").unwrap(),
            Some(MacroExpr::StringLiteral("phs000467".to_string()))
        );
    }

    #[test]
    fn plain_text_is_not_a_macro() {
        assert_eq!(MacroExpr::parse("Alive").unwrap(), None);
        assert_eq!(MacroExpr::parse("").unwrap(), None);
    }

    #[test]
    fn unknown_directives_rejected() {
        assert!(MacroExpr::parse("{lookup}").is_err());
        assert!(MacroExpr::parse("{field:}").is_err());
    }
}
