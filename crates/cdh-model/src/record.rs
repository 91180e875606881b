use std::collections::BTreeMap;

use serde_json::Value;

/// One raw source row: field name => raw value, plus the source row number
/// used for diagnostics (header row is 1, data rows start at 2).
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    values: BTreeMap<String, Value>,
    row: u64,
}

impl SourceRecord {
    pub fn new(values: BTreeMap<String, Value>, row: u64) -> Self {
        Self { values, row }
    }

    pub fn row(&self) -> u64 {
        self.row
    }

    pub fn value(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    pub fn contains_field(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    /// Raw value rendered as trimmed text; `None` when the field is absent,
    /// null, or blank.
    pub fn text(&self, field: &str) -> Option<String> {
        let text = match self.values.get(field)? {
            Value::Null => return None,
            Value::String(s) => s.trim().to_string(),
            other => other.to_string(),
        };
        if text.is_empty() { None } else { Some(text) }
    }

    pub fn set_value(&mut self, field: &str, value: Value) {
        self.values.insert(field.to_string(), value);
    }

    /// True when every field is null or blank (skipped by the orchestrator).
    pub fn is_blank(&self) -> bool {
        self.values.values().all(|v| match v {
            Value::Null => true,
            Value::String(s) => s.trim().is_empty(),
            _ => false,
        })
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::SourceRecord;
    use serde_json::{Value, json};
    use std::collections::BTreeMap;

    fn record(pairs: &[(&str, Value)]) -> SourceRecord {
        let values: BTreeMap<String, Value> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), v.clone()))
            .collect();
        SourceRecord::new(values, 2)
    }

    #[test]
    fn text_trims_and_drops_blank() {
        let rec = record(&[("a", json!("  x ")), ("b", json!("")), ("c", Value::Null)]);
        assert_eq!(rec.text("a").as_deref(), Some("x"));
        assert_eq!(rec.text("b"), None);
        assert_eq!(rec.text("c"), None);
        assert_eq!(rec.text("missing"), None);
    }

    #[test]
    fn numeric_values_render_as_text() {
        let rec = record(&[("score", json!(7))]);
        assert_eq!(rec.text("score").as_deref(), Some("7"));
    }

    #[test]
    fn blank_detection() {
        assert!(record(&[("a", json!("")), ("b", Value::Null)]).is_blank());
        assert!(!record(&[("a", json!("x"))]).is_blank());
        assert!(!record(&[("a", json!(0))]).is_blank());
    }
}
