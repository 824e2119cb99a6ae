//! Deterministic synthetic enrichment values.
//!
//! Every value is derived from SHA-256 over a versioned canonical string, so
//! the same (service, attribute, latitude, longitude, year) always produces
//! the same number on every platform and across restarts.

use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::constants::FALLBACK_HASH_VERSION;
use crate::domain::{AttributeSpec, EnrichmentQuery};

/// Canonical hash input. Coordinates are fixed at six decimals and a missing
/// (or ignored) year is written as `-`.
pub fn canonical_key(
    service: &str,
    attribute: &str,
    latitude: f64,
    longitude: f64,
    year: Option<i32>,
) -> String {
    let year = year.map(|y| y.to_string()).unwrap_or_else(|| "-".to_string());
    // Adding 0.0 folds -0.0 into 0.0 so both print identically
    format!(
        "{}|{}|{}|{:.6}|{:.6}|{}",
        FALLBACK_HASH_VERSION,
        service,
        attribute,
        latitude + 0.0,
        longitude + 0.0,
        year
    )
}

/// First eight bytes of the SHA-256 digest of the canonical key, big-endian
pub fn fallback_hash(
    service: &str,
    attribute: &str,
    latitude: f64,
    longitude: f64,
    year: Option<i32>,
) -> u64 {
    let key = canonical_key(service, attribute, latitude, longitude, year);
    let digest = Sha256::digest(key.as_bytes());
    let mut head = [0u8; 8];
    head.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(head)
}

/// Map a hash uniformly into the attribute's range, rounded to its decimals
pub fn value_in_range(hash: u64, spec: &AttributeSpec) -> f64 {
    let unit = hash as f64 / 18_446_744_073_709_551_616.0; // 2^64
    let raw = spec.min + unit * (spec.max - spec.min);
    let scale = 10f64.powi(spec.decimals as i32);
    ((raw * scale).round() / scale).clamp(spec.min, spec.max)
}

/// Synthesize every attribute of a service for one location and year
pub fn synthesize(
    service: &str,
    specs: &[AttributeSpec],
    query: &EnrichmentQuery,
) -> BTreeMap<String, f64> {
    specs
        .iter()
        .map(|spec| {
            let year = if spec.year_dependent { query.year } else { None };
            let hash = fallback_hash(service, &spec.name, query.latitude, query.longitude, year);
            (spec.name.clone(), value_in_range(hash, spec))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_services;

    fn query(latitude: f64, longitude: f64, year: Option<i32>) -> EnrichmentQuery {
        EnrichmentQuery {
            latitude,
            longitude,
            year,
        }
    }

    fn bhuvan_specs() -> Vec<AttributeSpec> {
        default_services()[0].attributes.clone()
    }

    fn vedas_specs() -> Vec<AttributeSpec> {
        default_services()[1].attributes.clone()
    }

    #[test]
    fn test_canonical_key_format() {
        assert_eq!(
            canonical_key("bhuvan", "soil_ph", 18.52, 73.85, None),
            "agri-fallback-v1|bhuvan|soil_ph|18.520000|73.850000|-"
        );
        assert_eq!(
            canonical_key("vedas", "rainfall", -0.0, 1.5, Some(2020)),
            "agri-fallback-v1|vedas|rainfall|0.000000|1.500000|2020"
        );
    }

    #[test]
    fn test_known_values_are_pinned() {
        // Pinned against the v1 hash; a change here breaks reproducibility
        let q = query(18.52, 73.85, Some(2020));
        let bhuvan = synthesize("bhuvan", &bhuvan_specs(), &q);
        let vedas = synthesize("vedas", &vedas_specs(), &q);

        assert_eq!(bhuvan["vegetation_index"], 0.942);
        assert_eq!(bhuvan["soil_ph"], 6.0);
        assert_eq!(vedas["rainfall"], 1182.0);
    }

    #[test]
    fn test_synthesis_is_deterministic() {
        let q = query(21.15, 79.09, Some(2011));
        let first = synthesize("bhuvan", &bhuvan_specs(), &q);
        let second = synthesize("bhuvan", &bhuvan_specs(), &q);
        assert_eq!(first, second);
    }

    #[test]
    fn test_different_inputs_differ() {
        let a = synthesize("vedas", &vedas_specs(), &query(18.52, 73.85, Some(2020)));
        let b = synthesize("vedas", &vedas_specs(), &query(18.52, 73.85, Some(2021)));
        let c = synthesize("vedas", &vedas_specs(), &query(21.15, 79.09, Some(2020)));
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_location_only_attributes_ignore_year() {
        let specs = bhuvan_specs();
        let a = synthesize("bhuvan", &specs, &query(18.52, 73.85, Some(2019)));
        let b = synthesize("bhuvan", &specs, &query(18.52, 73.85, Some(2020)));
        assert_eq!(a["soil_ph"], b["soil_ph"]);
    }

    #[test]
    fn test_values_stay_in_range() {
        let specs: Vec<AttributeSpec> = bhuvan_specs().into_iter().chain(vedas_specs()).collect();
        for i in 0..200 {
            let q = query(8.0 + i as f64 * 0.13, 68.0 + i as f64 * 0.17, Some(1966 + i % 50));
            for (name, value) in synthesize("svc", &specs, &q) {
                let spec = specs.iter().find(|s| s.name == name).unwrap();
                assert!(value >= spec.min && value <= spec.max, "{name}={value}");
            }
        }
    }

    #[test]
    fn test_value_in_range_bounds() {
        let spec = AttributeSpec::new("x", -1.0, 1.0, 2);
        assert_eq!(value_in_range(0, &spec), -1.0);
        assert_eq!(value_in_range(u64::MAX, &spec), 1.0);
    }
}
