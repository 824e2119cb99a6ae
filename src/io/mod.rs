//! CSV dataset loaders for yield, coordinate and soil reference data.

pub mod coordinate_loader;
pub mod soil_loader;
pub mod yield_loader;

use csv::StringRecord;
use std::collections::HashMap;
use std::fs::File;
use std::path::Path;

use crate::error::{PipelineError, Result};

/// A data row that could not be used, with its 1-based file line
#[derive(Debug, Clone, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

pub(crate) fn open_reader(path: &Path) -> Result<csv::Reader<File>> {
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|source| PipelineError::Dataset {
            path: path.display().to_string(),
            source,
        })
}

/// Case-insensitive header lookup
pub(crate) struct HeaderMap {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl HeaderMap {
    pub(crate) fn new(headers: &StringRecord) -> Self {
        let names: Vec<String> = headers.iter().map(clean_header).collect();
        let mut positions = HashMap::new();
        for (idx, name) in names.iter().enumerate() {
            positions.entry(name.to_lowercase()).or_insert(idx);
        }
        Self { names, positions }
    }

    pub(crate) fn names(&self) -> &[String] {
        &self.names
    }

    pub(crate) fn find(&self, name: &str) -> Option<usize> {
        self.positions.get(&name.trim().to_lowercase()).copied()
    }

    pub(crate) fn find_any(&self, names: &[&str]) -> Option<usize> {
        names.iter().find_map(|n| self.find(n))
    }

    pub(crate) fn require(&self, name: &str, dataset: &Path) -> Result<usize> {
        self.find(name).ok_or_else(|| PipelineError::MissingColumn {
            dataset: dataset.display().to_string(),
            column: name.to_string(),
        })
    }
}

fn clean_header(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a BOM
    name.trim().trim_start_matches('\u{feff}').trim().to_string()
}

pub(crate) fn cell<'a>(record: &'a StringRecord, idx: usize) -> &'a str {
    record.get(idx).unwrap_or("").trim()
}

/// Numeric coercion: blank, unparsable and non-finite cells become `None`
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}
