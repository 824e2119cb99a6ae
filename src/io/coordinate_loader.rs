use std::path::Path;
use tracing::{info, warn};

use crate::constants::{COORD_DISTRICT_COLUMN, COORD_LATITUDE_COLUMN, COORD_LONGITUDE_COLUMN, COORD_STATE_COLUMNS};
use crate::domain::Location;
use crate::error::Result;
use crate::io::{cell, open_reader, parse_numeric, HeaderMap, RowError};
use crate::pipeline::processing::resolver::LocationIndex;

/// District coordinates loaded from the coordinate reference CSV
#[derive(Debug, Clone)]
pub struct CoordinateDataset {
    pub index: LocationIndex,
    pub rows_read: usize,
    /// Later rows for a district already in the index
    pub duplicates: usize,
    pub row_errors: Vec<RowError>,
}

/// Load the district-to-location index. Rows with missing or unparsable
/// coordinates are skipped; for duplicate districts the first row wins.
pub fn load_location_index(path: &Path) -> Result<CoordinateDataset> {
    let mut reader = open_reader(path)?;
    let headers = HeaderMap::new(reader.headers()?);

    let district_idx = headers.require(COORD_DISTRICT_COLUMN, path)?;
    let lat_idx = headers.require(COORD_LATITUDE_COLUMN, path)?;
    let lon_idx = headers.require(COORD_LONGITUDE_COLUMN, path)?;
    let state_idx = headers.find_any(COORD_STATE_COLUMNS);

    let mut index = LocationIndex::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;
    let mut duplicates = 0usize;

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

        let coordinates = parse_numeric(cell(&row, lat_idx)).zip(parse_numeric(cell(&row, lon_idx)));
        let Some((latitude, longitude)) = coordinates.filter(|(lat, lon)| valid_coordinates(*lat, *lon)) else {
            row_errors.push(RowError {
                line,
                message: format!(
                    "invalid coordinates for '{}': ({}, {})",
                    district,
                    cell(&row, lat_idx),
                    cell(&row, lon_idx)
                ),
            });
            continue;
        };

        let location = Location {
            latitude,
            longitude,
            region: state_idx.map(|i| cell(&row, i).to_string()).filter(|s| !s.is_empty()),
        };
        if !index.insert(district, location) {
            duplicates += 1;
        }
    }

    for error in &row_errors {
        warn!("{} line {}: {}", path.display(), error.line, error.message);
    }
    if duplicates > 0 {
        warn!("{} duplicate district rows in {} ignored (first row kept)", duplicates, path.display());
    }
    info!("Loaded {} district locations from {}", index.len(), path.display());

    Ok(CoordinateDataset {
        index,
        rows_read,
        duplicates,
        row_errors,
    })
}

fn valid_coordinates(latitude: f64, longitude: f64) -> bool {
    (-90.0..=90.0).contains(&latitude) && (-180.0..=180.0).contains(&longitude)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_loads_index_skipping_bad_rows() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("coords.csv");
        fs::write(
            &path,
            "State Name,District Name,Latitude,Longitude\n\
             Maharashtra,Pune,18.52,73.85\n\
             Maharashtra,Nashik,n/a,73.79\n\
             Punjab,Ludhiana,30.90,75.85\n\
             Maharashtra,PUNE,19.00,74.00\n\
             Goa,,15.29,74.12\n\
             Nowhere,Atlantis,123.0,10.0\n",
        )
        .unwrap();

        let dataset = load_location_index(&path).unwrap();
        assert_eq!(dataset.rows_read, 6);
        assert_eq!(dataset.index.len(), 2);
        assert_eq!(dataset.duplicates, 1);
        assert_eq!(dataset.row_errors.len(), 3);

        let pune = dataset.index.get("pune").unwrap();
        assert_eq!((pune.latitude, pune.longitude), (18.52, 73.85));
        assert_eq!(pune.region.as_deref(), Some("Maharashtra"));
    }

    #[test]
    fn test_state_column_is_optional() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("coords.csv");
        fs::write(&path, "District Name,Latitude,Longitude\nPune,18.52,73.85\n").unwrap();

        let dataset = load_location_index(&path).unwrap();
        assert_eq!(dataset.index.get("PUNE").unwrap().region, None);
    }

    #[test]
    fn test_missing_latitude_column_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("coords.csv");
        fs::write(&path, "District Name,Longitude\nPune,73.85\n").unwrap();
        assert!(load_location_index(&path).is_err());
    }
}
