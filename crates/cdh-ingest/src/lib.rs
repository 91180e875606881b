//! Delimited source-file loading: CSV/TSV bytes in, ordered
//! [`SourceRecord`]s with stable row provenance out.

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use cdh_model::SourceRecord;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("unsupported source file type/extension: {0}")]
    UnsupportedFormat(String),
    #[error("source data is not valid UTF-8: {0}")]
    Encoding(#[from] std::str::Utf8Error),
    #[error("failed to parse delimited source data: {0}")]
    Csv(#[from] csv::Error),
    #[error("source data has no header row")]
    MissingHeader,
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Csv,
    Tsv,
}

impl SourceFormat {
    pub fn from_path(path: &str) -> Result<SourceFormat> {
        let extension = Path::new(path)
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase());
        match extension.as_deref() {
            Some("csv") => Ok(SourceFormat::Csv),
            Some("tsv") => Ok(SourceFormat::Tsv),
            _ => Err(IngestError::UnsupportedFormat(path.to_string())),
        }
    }

    fn delimiter(self) -> u8 {
        match self {
            SourceFormat::Csv => b',',
            SourceFormat::Tsv => b'\t',
        }
    }
}

/// A loaded source file: the trimmed header plus one record per data row.
#[derive(Debug, Clone)]
pub struct SourceTable {
    pub header: Vec<String>,
    pub records: Vec<SourceRecord>,
}

impl SourceTable {
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Parse delimited bytes into source records.
///
/// Header fields are whitespace-trimmed and unnamed columns are dropped.
/// Row numbers count from 2 so they line up with spreadsheet-style viewing
/// of the source file (header row is 1).
pub fn load_source_table(bytes: &[u8], format: SourceFormat) -> Result<SourceTable> {
    let text = std::str::from_utf8(bytes)?;
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(format.delimiter())
        .flexible(true)
        .from_reader(text.as_bytes());

    let raw_header = reader.headers().map_err(|e| match e.kind() {
        csv::ErrorKind::Io(_) => IngestError::MissingHeader,
        _ => IngestError::Csv(e),
    })?;
    // keep positions of named columns only
    let mut columns: Vec<(usize, String)> = Vec::new();
    for (index, field) in raw_header.iter().enumerate() {
        let name = field.trim();
        if !name.is_empty() {
            columns.push((index, name.to_string()));
        }
    }
    if columns.is_empty() {
        return Err(IngestError::MissingHeader);
    }

    let mut records = Vec::new();
    for (offset, row) in reader.records().enumerate() {
        let row = row?;
        let mut values: BTreeMap<String, Value> = BTreeMap::new();
        for (index, name) in &columns {
            let cell = row.get(*index).unwrap_or_default();
            values.insert(name.clone(), Value::String(cell.to_string()));
        }
        records.push(SourceRecord::new(values, offset as u64 + 2));
    }
    debug!(rows = records.len(), columns = columns.len(), "loaded source table");

    Ok(SourceTable {
        header: columns.into_iter().map(|(_, name)| name).collect(),
        records,
    })
}
