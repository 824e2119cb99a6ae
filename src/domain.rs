use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One row of the yield dataset: a district in a given year with a yield
/// value (kg/ha) per crop, possibly missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct YieldRecord {
    pub district: String,
    /// State as recorded in the yield dataset, if present
    pub region: Option<String>,
    pub year: i32,
    /// Crop identifier (e.g. "RICE") to yield value
    pub yields: BTreeMap<String, Option<f64>>,
}

impl YieldRecord {
    /// The crop's yield if it is present and a finite number
    pub fn yield_for(&self, crop: &str) -> Option<f64> {
        self.yields
            .get(crop)
            .copied()
            .flatten()
            .filter(|v| v.is_finite())
    }

    pub fn has_any_yield(&self) -> bool {
        self.yields.values().flatten().any(|v| v.is_finite())
    }
}

/// Coordinates of a district, with the state it belongs to when known
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub region: Option<String>,
}

/// Whether an enrichment result came from the live service or was synthesized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataOrigin {
    Live,
    Fallback,
}

/// Attributes returned by one enrichment service call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentResult {
    pub service: String,
    pub origin: DataOrigin,
    pub attributes: BTreeMap<String, f64>,
}

/// Location and time window handed to every enrichment service
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnrichmentQuery {
    pub latitude: f64,
    pub longitude: f64,
    pub year: Option<i32>,
}

/// Declaration of one numeric attribute a service provides, including the
/// range its synthetic fallback value is drawn from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeSpec {
    /// Output column name
    pub name: String,
    /// Field name in the service response, when it differs from `name`
    #[serde(default)]
    pub remote_field: Option<String>,
    pub min: f64,
    pub max: f64,
    #[serde(default)]
    pub decimals: u32,
    /// Whether the fallback value varies by year or only by location
    #[serde(default = "default_year_dependent")]
    pub year_dependent: bool,
}

fn default_year_dependent() -> bool {
    true
}

impl AttributeSpec {
    pub fn new(name: &str, min: f64, max: f64, decimals: u32) -> Self {
        Self {
            name: name.to_string(),
            remote_field: None,
            min,
            max,
            decimals,
            year_dependent: true,
        }
    }

    pub fn with_remote_field(mut self, field: &str) -> Self {
        self.remote_field = Some(field.to_string());
        self
    }

    pub fn location_only(mut self) -> Self {
        self.year_dependent = false;
        self
    }

    /// Key to look up in a live service response
    pub fn response_field(&self) -> &str {
        self.remote_field.as_deref().unwrap_or(&self.name)
    }

    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.name.trim().is_empty() {
            return Err("Attribute name must not be empty".to_string());
        }
        if !(self.min.is_finite() && self.max.is_finite() && self.min < self.max) {
            return Err(format!(
                "Attribute '{}' has an invalid range [{}, {})",
                self.name, self.min, self.max
            ));
        }
        Ok(())
    }
}

/// One output row: a yield record joined with its location, enrichment
/// attributes and auxiliary fields for a single crop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntegratedRecord {
    pub district: String,
    pub region: Option<String>,
    pub year: i32,
    /// Lowercased crop identifier
    pub crop: String,
    pub latitude: f64,
    pub longitude: f64,
    pub attributes: BTreeMap<String, f64>,
    /// Region-keyed reference fields (e.g. soil class proportions)
    pub auxiliary: BTreeMap<String, f64>,
    pub yield_value: f64,
}

impl IntegratedRecord {
    /// Numeric value of an enrichment or auxiliary column
    pub fn field(&self, column: &str) -> Option<f64> {
        self.attributes
            .get(column)
            .or_else(|| self.auxiliary.get(column))
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_yield_for_ignores_missing_and_non_finite() {
        let record = YieldRecord {
            district: "Pune".to_string(),
            region: None,
            year: 2020,
            yields: BTreeMap::from([
                ("RICE".to_string(), Some(2500.0)),
                ("WHEAT".to_string(), None),
                ("MAIZE".to_string(), Some(f64::NAN)),
            ]),
        };

        assert_eq!(record.yield_for("RICE"), Some(2500.0));
        assert_eq!(record.yield_for("WHEAT"), None);
        assert_eq!(record.yield_for("MAIZE"), None);
        assert_eq!(record.yield_for("BARLEY"), None);
        assert!(record.has_any_yield());
    }

    #[test]
    fn test_attribute_spec_response_field() {
        let spec = AttributeSpec::new("vegetation_index", 0.0, 1.0, 3).with_remote_field("ndvi");
        assert_eq!(spec.response_field(), "ndvi");
        assert!(spec.year_dependent);

        let spec = AttributeSpec::new("soil_ph", 5.5, 6.5, 1).location_only();
        assert_eq!(spec.response_field(), "soil_ph");
        assert!(!spec.year_dependent);
    }

    #[test]
    fn test_attribute_spec_validation() {
        assert!(AttributeSpec::new("rainfall", 800.0, 1800.0, 0).validate().is_ok());
        assert!(AttributeSpec::new("rainfall", 10.0, 10.0, 0).validate().is_err());
        assert!(AttributeSpec::new("", 0.0, 1.0, 0).validate().is_err());
        assert!(AttributeSpec::new("x", f64::NAN, 1.0, 0).validate().is_err());
    }
}
