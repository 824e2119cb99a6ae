use regex::Regex;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use crate::constants::{YIELD_COLUMN_SUFFIX, YIELD_DISTRICT_COLUMN, YIELD_STATE_COLUMNS, YIELD_YEAR_COLUMN};
use crate::domain::YieldRecord;
use crate::error::Result;
use crate::io::{cell, open_reader, parse_numeric, HeaderMap, RowError};

/// Yield records loaded from a district-level yield CSV
#[derive(Debug, Clone)]
pub struct YieldDataset {
    /// Crop identifiers in schema order
    pub crops: Vec<String>,
    pub records: Vec<YieldRecord>,
    pub rows_read: usize,
    /// Rows dropped because every crop's yield was missing
    pub rows_without_yield: usize,
    pub row_errors: Vec<RowError>,
}

/// Load yield records. With an empty `crops` list the crops are discovered
/// from `<CROP> YIELD (Kg per ha)` headers.
pub fn load_yield_records(path: &Path, crops: &[String]) -> Result<YieldDataset> {
    let mut reader = open_reader(path)?;
    let headers = HeaderMap::new(reader.headers()?);

    let district_idx = headers.require(YIELD_DISTRICT_COLUMN, path)?;
    let year_idx = headers.require(YIELD_YEAR_COLUMN, path)?;
    let state_idx = headers.find_any(YIELD_STATE_COLUMNS);

    let crops: Vec<String> = if crops.is_empty() {
        discover_crops(headers.names())
    } else {
        crops.iter().map(|c| c.trim().to_uppercase()).collect()
    };

    let crop_columns: Vec<(String, Option<usize>)> = crops
        .iter()
        .map(|crop| {
            let column = format!("{crop}{YIELD_COLUMN_SUFFIX}");
            let idx = headers.find(&column);
            if idx.is_none() {
                warn!("Yield column '{}' not found in {}; treating {} as missing", column, path.display(), crop);
            }
            (crop.clone(), idx)
        })
        .collect();

    let mut records = Vec::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;
    let mut rows_without_yield = 0usize;

    for (idx, result) in reader.records().enumerate() {
        let line = idx + 2;
        rows_read += 1;

        let row = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        let district = cell(&row, district_idx);
        if district.is_empty() {
            row_errors.push(RowError {
                line,
                message: "empty district name".to_string(),
            });
            continue;
        }

        let Some(year) = parse_year(cell(&row, year_idx)) else {
            row_errors.push(RowError {
                line,
                message: format!("invalid year '{}'", cell(&row, year_idx)),
            });
            continue;
        };

        let yields: BTreeMap<String, Option<f64>> = crop_columns
            .iter()
            .map(|(crop, idx)| (crop.clone(), idx.and_then(|i| parse_numeric(cell(&row, i)))))
            .collect();

        let record = YieldRecord {
            district: district.to_string(),
            region: state_idx.map(|i| cell(&row, i).to_string()).filter(|s| !s.is_empty()),
            year,
            yields,
        };

        if !record.has_any_yield() {
            rows_without_yield += 1;
            continue;
        }
        records.push(record);
    }

    for error in &row_errors {
        warn!("{} line {}: {}", path.display(), error.line, error.message);
    }
    info!(
        "Loaded {} yield records from {} ({} rows read, {} without yield, {} invalid)",
        records.len(),
        path.display(),
        rows_read,
        rows_without_yield,
        row_errors.len()
    );

    Ok(YieldDataset {
        crops,
        records,
        rows_read,
        rows_without_yield,
        row_errors,
    })
}

/// Crop identifiers named by `<CROP> YIELD (Kg per ha)` headers, in header order
pub fn discover_crops(headers: &[String]) -> Vec<String> {
    let pattern = Regex::new(r"(?i)^\s*(.+?)\s+YIELD\s*\(\s*KG\s+PER\s+HA\s*\)\s*$").expect("valid regex");
    headers
        .iter()
        .filter_map(|h| pattern.captures(h))
        .filter_map(|c| c.get(1).map(|m| m.as_str().trim().to_uppercase()))
        .collect()
}

fn parse_year(raw: &str) -> Option<i32> {
    if let Ok(year) = raw.parse::<i32>() {
        return Some(year);
    }
    // Spreadsheet exports sometimes write years as "2020.0"
    let value = parse_numeric(raw)?;
    (value.fract() == 0.0 && value.abs() < i32::MAX as f64).then_some(value as i32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    const HEADER: &str = "Dist Code,Year,State Name,Dist Name,RICE YIELD (Kg per ha),WHEAT YIELD (Kg per ha),MAIZE YIELD (Kg per ha)";

    fn write_csv(body: &str) -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("yield.csv");
        fs::write(&path, format!("{HEADER}\n{body}")).unwrap();
        (dir, path)
    }

    #[test]
    fn test_loads_records_and_coerces_yields() {
        let (_dir, path) = write_csv(
            "1,2020,Maharashtra,Pune,2500,,abc\n\
             2,2020.0,Punjab,Ludhiana,,4500,\n",
        );
        let crops = vec!["RICE".to_string(), "WHEAT".to_string(), "MAIZE".to_string()];
        let dataset = load_yield_records(&path, &crops).unwrap();

        assert_eq!(dataset.records.len(), 2);
        let pune = &dataset.records[0];
        assert_eq!(pune.district, "Pune");
        assert_eq!(pune.region.as_deref(), Some("Maharashtra"));
        assert_eq!(pune.year, 2020);
        assert_eq!(pune.yields["RICE"], Some(2500.0));
        assert_eq!(pune.yields["WHEAT"], None);
        assert_eq!(pune.yields["MAIZE"], None);
        assert_eq!(dataset.records[1].year, 2020);
    }

    #[test]
    fn test_drops_rows_without_any_yield_and_invalid_rows() {
        let (_dir, path) = write_csv(
            "1,2020,Maharashtra,Pune,,,\n\
             2,twenty,Punjab,Ludhiana,100,,\n\
             3,2021,Punjab,,100,,\n\
             4,2021,Punjab,Amritsar,,3900,\n",
        );
        let dataset = load_yield_records(&path, &["RICE".to_string(), "WHEAT".to_string()]).unwrap();

        assert_eq!(dataset.rows_read, 4);
        assert_eq!(dataset.rows_without_yield, 1);
        assert_eq!(dataset.row_errors.len(), 2);
        assert_eq!(dataset.row_errors[0].line, 3);
        assert_eq!(dataset.records.len(), 1);
        assert_eq!(dataset.records[0].district, "Amritsar");
    }

    #[test]
    fn test_discovers_crops_when_not_configured() {
        let (_dir, path) = write_csv("1,2020,Maharashtra,Pune,2500,,1800\n");
        let dataset = load_yield_records(&path, &[]).unwrap();
        assert_eq!(dataset.crops, vec!["RICE", "WHEAT", "MAIZE"]);
        assert_eq!(dataset.records[0].yields["MAIZE"], Some(1800.0));
    }

    #[test]
    fn test_configured_crop_without_column_is_missing() {
        let (_dir, path) = write_csv("1,2020,Maharashtra,Pune,2500,,\n");
        let dataset = load_yield_records(&path, &["RICE".to_string(), "BARLEY".to_string()]).unwrap();
        assert_eq!(dataset.records[0].yields["BARLEY"], None);
        assert_eq!(dataset.records[0].yield_for("RICE"), Some(2500.0));
    }

    #[test]
    fn test_missing_required_column_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("yield.csv");
        fs::write(&path, "Year,RICE YIELD (Kg per ha)\n2020,100\n").unwrap();
        assert!(load_yield_records(&path, &[]).is_err());
    }

    #[test]
    fn test_discover_crops_pattern() {
        let headers: Vec<String> = ["Dist Name", "PEARL MILLET YIELD (Kg per ha)", "RICE AREA (1000 ha)", "rice yield (kg per ha)"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(discover_crops(&headers), vec!["PEARL MILLET", "RICE"]);
    }
}
