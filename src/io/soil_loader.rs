use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use crate::constants::SOIL_STATE_COLUMNS;
use crate::error::{PipelineError, Result};
use crate::io::{cell, open_reader, parse_numeric, HeaderMap};
use crate::pipeline::processing::reference::RegionTable;

/// Load the region-keyed soil profile table.
///
/// The key is the `State Name`/`State` column, or the first column when
/// neither is present. Every other column is a numeric proportion; blank or
/// unparsable cells are left out of that region's values.
pub fn load_region_table(path: &Path) -> Result<RegionTable> {
    let mut reader = open_reader(path)?;
    let headers = HeaderMap::new(reader.headers()?);

    if headers.names().is_empty() {
        return Err(PipelineError::MissingColumn {
            dataset: path.display().to_string(),
            column: SOIL_STATE_COLUMNS[0].to_string(),
        });
    }
    let key_idx = headers.find_any(SOIL_STATE_COLUMNS).unwrap_or(0);

    let value_columns: Vec<(usize, String)> = headers
        .names()
        .iter()
        .enumerate()
        .filter(|(idx, name)| *idx != key_idx && !name.is_empty())
        .map(|(idx, name)| (idx, name.clone()))
        .collect();

    let mut table = RegionTable::new(value_columns.iter().map(|(_, name)| name.clone()).collect());
    let mut skipped = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let row = match result {
            Ok(r) => r,
            Err(e) => {
                warn!("{} line {}: CSV parse error: {}", path.display(), idx + 2, e);
                skipped += 1;
                continue;
            }
        };

        let region = cell(&row, key_idx);
        let values: BTreeMap<String, f64> = value_columns
            .iter()
            .filter_map(|(i, name)| parse_numeric(cell(&row, *i)).map(|v| (name.clone(), v)))
            .collect();

        if !table.insert(region, values) {
            warn!("{} line {}: empty or duplicate region '{}' ignored", path.display(), idx + 2, region);
            skipped += 1;
        }
    }

    info!(
        "Loaded soil profiles for {} regions from {} ({} rows ignored)",
        table.len(),
        path.display(),
        skipped
    );
    if table.is_empty() {
        warn!("{} has no usable regions; every yield row will be skipped", path.display());
    }
    Ok(table)
}
