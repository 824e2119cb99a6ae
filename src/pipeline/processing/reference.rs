use std::collections::{BTreeMap, HashMap};

/// Region-keyed auxiliary reference data (e.g. soil class proportions per
/// state). Built once at startup and only read afterwards.
#[derive(Debug, Clone, Default)]
pub struct RegionTable {
    /// Value columns in dataset order
    columns: Vec<String>,
    rows: HashMap<String, BTreeMap<String, f64>>,
}

impl RegionTable {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: HashMap::new(),
        }
    }

    fn normalize_key(region: &str) -> String {
        region.trim().to_uppercase()
    }

    /// Insert a region's values; the first row for a region wins
    pub fn insert(&mut self, region: &str, values: BTreeMap<String, f64>) -> bool {
        let key = Self::normalize_key(region);
        if key.is_empty() || self.rows.contains_key(&key) {
            return false;
        }
        self.rows.insert(key, values);
        true
    }

    pub fn lookup(&self, region: &str) -> Option<&BTreeMap<String, f64>> {
        self.rows.get(&Self::normalize_key(region))
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        let mut table = RegionTable::new(vec!["alluvial".to_string(), "black".to_string()]);
        table.insert(
            "Maharashtra",
            BTreeMap::from([("alluvial".to_string(), 0.1), ("black".to_string(), 0.7)]),
        );

        let row = table.lookup("  MAHARASHTRA ").unwrap();
        assert_eq!(row["black"], 0.7);
        assert!(table.lookup("Kerala").is_none());
        assert_eq!(table.columns(), ["alluvial", "black"]);
    }

    #[test]
    fn test_first_row_wins() {
        let mut table = RegionTable::new(vec!["red".to_string()]);
        assert!(table.insert("Goa", BTreeMap::from([("red".to_string(), 0.5)])));
        assert!(!table.insert("GOA", BTreeMap::from([("red".to_string(), 0.9)])));
        assert_eq!(table.lookup("goa").unwrap()["red"], 0.5);
        assert_eq!(table.len(), 1);
    }
}
