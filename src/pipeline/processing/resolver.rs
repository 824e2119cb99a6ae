use std::collections::HashMap;

use crate::domain::Location;
use crate::pipeline::processing::similarity::token_set_ratio;

/// Read-only map from normalized district name to coordinates.
///
/// Entries keep their insertion order; fuzzy matching walks them in that
/// order so the same dataset always resolves the same way.
#[derive(Debug, Clone, Default)]
pub struct LocationIndex {
    entries: Vec<(String, Location)>,
    positions: HashMap<String, usize>,
}

impl LocationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Uppercased, trimmed form used for every key and lookup
    pub fn normalize_key(name: &str) -> String {
        name.trim().to_uppercase()
    }

    /// Insert a district; returns false (and keeps the existing entry) when
    /// the normalized name is already present.
    pub fn insert(&mut self, district: &str, location: Location) -> bool {
        let key = Self::normalize_key(district);
        if key.is_empty() || self.positions.contains_key(&key) {
            return false;
        }
        self.positions.insert(key.clone(), self.entries.len());
        self.entries.push((key, location));
        true
    }

    pub fn get(&self, key: &str) -> Option<&Location> {
        self.positions
            .get(&Self::normalize_key(key))
            .map(|&i| &self.entries[i].1)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Location)> {
        self.entries.iter().map(|(k, l)| (k.as_str(), l))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<S: AsRef<str>> FromIterator<(S, Location)> for LocationIndex {
    fn from_iter<T: IntoIterator<Item = (S, Location)>>(iter: T) -> Self {
        let mut index = LocationIndex::new();
        for (district, location) in iter {
            index.insert(district.as_ref(), location);
        }
        index
    }
}

/// How a district name was matched
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchKind {
    Exact,
    Fuzzy { score: u8 },
}

/// Successful resolution of a district name
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedLocation {
    /// Index key that matched
    pub key: String,
    pub location: Location,
    pub kind: MatchKind,
}

/// Maps district names to coordinates: exact lookup first, then the best
/// token-set match scoring strictly above the threshold.
#[derive(Debug, Clone)]
pub struct CoordinateResolver {
    index: LocationIndex,
    threshold: u8,
}

impl CoordinateResolver {
    pub fn new(index: LocationIndex, threshold: u8) -> Self {
        Self { index, threshold }
    }

    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Resolve a district name, or `None` when nothing matches well enough.
    ///
    /// Among equally scored keys the first in index order wins. That makes the
    /// result depend on the coordinate dataset's row order; ties are not
    /// otherwise broken.
    pub fn resolve(&self, district: &str) -> Option<ResolvedLocation> {
        let normalized = LocationIndex::normalize_key(district);
        if normalized.is_empty() {
            return None;
        }

        if let Some(location) = self.index.get(&normalized) {
            return Some(ResolvedLocation {
                key: normalized,
                location: location.clone(),
                kind: MatchKind::Exact,
            });
        }

        let mut best: Option<(&str, &Location, u8)> = None;
        for (key, location) in self.index.iter() {
            let score = token_set_ratio(&normalized, key);
            if best.map_or(true, |(_, _, s)| score > s) {
                best = Some((key, location, score));
            }
        }

        best.filter(|&(_, _, score)| score > self.threshold)
            .map(|(key, location, score)| ResolvedLocation {
                key: key.to_string(),
                location: location.clone(),
                kind: MatchKind::Fuzzy { score },
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(latitude: f64, longitude: f64, region: Option<&str>) -> Location {
        Location {
            latitude,
            longitude,
            region: region.map(str::to_string),
        }
    }

    fn test_index() -> LocationIndex {
        LocationIndex::from_iter([
            ("Pune", loc(18.52, 73.85, Some("Maharashtra"))),
            ("Nagpur", loc(21.15, 79.09, Some("Maharashtra"))),
            ("North Goa", loc(15.53, 73.96, Some("Goa"))),
            ("Ahmednagar", loc(19.09, 74.74, Some("Maharashtra"))),
        ])
    }

    #[test]
    fn test_exact_match_is_case_and_whitespace_insensitive() {
        let resolver = CoordinateResolver::new(test_index(), 80);
        for name in ["PUNE", "pune", "  Pune  "] {
            let resolved = resolver.resolve(name).unwrap();
            assert_eq!(resolved.kind, MatchKind::Exact);
            assert_eq!(resolved.key, "PUNE");
            assert_eq!(resolved.location, loc(18.52, 73.85, Some("Maharashtra")));
        }
    }

    #[test]
    fn test_fuzzy_match_above_threshold() {
        let resolver = CoordinateResolver::new(test_index(), 80);

        let resolved = resolver.resolve("Punee").unwrap();
        assert_eq!(resolved.key, "PUNE");
        assert_eq!(resolved.kind, MatchKind::Fuzzy { score: 89 });

        let resolved = resolver.resolve("GOA NORTH").unwrap();
        assert_eq!(resolved.key, "NORTH GOA");

        let resolved = resolver.resolve("Ahmadnagar").unwrap();
        assert_eq!(resolved.key, "AHMEDNAGAR");
    }

    #[test]
    fn test_below_threshold_is_not_found() {
        let index = LocationIndex::from_iter([
            ("Nagpur", loc(21.15, 79.09, None)),
            ("Kolhapur", loc(16.70, 74.24, None)),
        ]);
        let resolver = CoordinateResolver::new(index, 80);
        assert!(resolver.resolve("Punee").is_none());
    }

    #[test]
    fn test_score_equal_to_threshold_is_rejected() {
        // "punee" vs "pune" scores 89
        let resolver = CoordinateResolver::new(test_index(), 89);
        assert!(resolver.resolve("Punee").is_none());
        let resolver = CoordinateResolver::new(test_index(), 88);
        assert!(resolver.resolve("Punee").is_some());
    }

    #[test]
    fn test_ties_resolve_to_first_inserted_key() {
        let index = LocationIndex::from_iter([
            ("Goa North", loc(1.0, 1.0, None)),
            ("Goa South", loc(2.0, 2.0, None)),
        ]);
        let resolver = CoordinateResolver::new(index, 80);
        let resolved = resolver.resolve("GOA").unwrap();
        assert_eq!(resolved.key, "GOA NORTH");
        assert_eq!(resolved.kind, MatchKind::Fuzzy { score: 100 });
    }

    #[test]
    fn test_empty_name_and_empty_index() {
        let resolver = CoordinateResolver::new(test_index(), 80);
        assert!(resolver.resolve("   ").is_none());

        let resolver = CoordinateResolver::new(LocationIndex::new(), 80);
        assert!(resolver.resolve("Pune").is_none());
    }

    #[test]
    fn test_duplicate_keys_keep_first_entry() {
        let mut index = LocationIndex::new();
        assert!(index.insert("Pune", loc(18.52, 73.85, None)));
        assert!(!index.insert(" PUNE ", loc(0.0, 0.0, None)));
        assert_eq!(index.len(), 1);
        assert_eq!(index.get("pune").unwrap().latitude, 18.52);
    }
}
