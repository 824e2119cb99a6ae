use metrics::counter;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, instrument, warn};

use crate::app::ports::{EnrichmentClient, IntegratedOutputPort};
use crate::domain::{EnrichmentQuery, IntegratedRecord, YieldRecord};
use crate::error::Result;
use crate::pipeline::processing::reference::RegionTable;
use crate::pipeline::processing::resolver::{CoordinateResolver, MatchKind, ResolvedLocation};
use crate::pipeline::storage::in_memory::InMemoryOutput;

/// Counters for one integration run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IntegrationStats {
    pub records_read: usize,
    pub unresolved: usize,
    pub fuzzy_matched: usize,
    pub missing_auxiliary: usize,
    pub without_yield: usize,
    pub rows_emitted: usize,
}

impl IntegrationStats {
    pub fn records_skipped(&self) -> usize {
        self.unresolved + self.missing_auxiliary + self.without_yield
    }
}

/// Why a yield record produced no rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Skip {
    Unresolved,
    MissingAuxiliary,
    NoYield,
}

/// Joins yield records with coordinates, enrichment attributes and optional
/// region-keyed reference data, emitting one row per crop with a yield.
pub struct IntegrationEngine {
    resolver: CoordinateResolver,
    clients: Vec<Box<dyn EnrichmentClient>>,
    auxiliary: Option<RegionTable>,
    crops: Vec<String>,
}

impl IntegrationEngine {
    pub fn new(resolver: CoordinateResolver, clients: Vec<Box<dyn EnrichmentClient>>, crops: Vec<String>) -> Self {
        Self {
            resolver,
            clients,
            auxiliary: None,
            crops,
        }
    }

    /// Require every record's region to be present in `table` and append its
    /// values to each row
    pub fn with_auxiliary(mut self, table: RegionTable) -> Self {
        self.auxiliary = Some(table);
        self
    }

    pub fn clients(&self) -> &[Box<dyn EnrichmentClient>] {
        &self.clients
    }

    /// Enrichment attribute columns in service order
    pub fn attribute_columns(&self) -> Vec<String> {
        self.clients
            .iter()
            .flat_map(|c| c.attributes().iter().map(|a| a.name.clone()))
            .collect()
    }

    /// Auxiliary columns in dataset order (empty without auxiliary data)
    pub fn auxiliary_columns(&self) -> Vec<String> {
        self.auxiliary
            .as_ref()
            .map(|t| t.columns().to_vec())
            .unwrap_or_default()
    }

    /// Process records in order, writing each row to `output` as soon as it
    /// is assembled. Only output failures abort the run.
    #[instrument(skip_all, fields(records = records.len()))]
    pub async fn run(&self, records: &[YieldRecord], output: &dyn IntegratedOutputPort) -> Result<IntegrationStats> {
        let mut stats = IntegrationStats::default();
        let mut resolved_cache: HashMap<String, Option<ResolvedLocation>> = HashMap::new();

        for record in records {
            stats.records_read += 1;

            let resolved = resolved_cache
                .entry(record.district.trim().to_uppercase())
                .or_insert_with(|| self.resolver.resolve(&record.district))
                .clone();

            match self.integrate_record(record, resolved.as_ref()).await {
                Ok(rows) => {
                    if matches!(resolved.as_ref().map(|r| r.kind), Some(MatchKind::Fuzzy { .. })) {
                        stats.fuzzy_matched += 1;
                    }
                    for row in &rows {
                        output.write_integrated_record(row).await?;
                        counter!("agri_rows_emitted_total", "crop" => row.crop.clone()).increment(1);
                    }
                    stats.rows_emitted += rows.len();
                }
                Err(skip) => {
                    let reason = match skip {
                        Skip::Unresolved => {
                            stats.unresolved += 1;
                            "unresolved"
                        }
                        Skip::MissingAuxiliary => {
                            stats.missing_auxiliary += 1;
                            "missing_auxiliary"
                        }
                        Skip::NoYield => {
                            stats.without_yield += 1;
                            "no_yield"
                        }
                    };
                    counter!("agri_records_skipped_total", "reason" => reason).increment(1);
                }
            }
        }

        output.finish().await?;
        info!(
            "Integrated {} records into {} rows ({} skipped: {} unresolved, {} without auxiliary data, {} without yield)",
            stats.records_read,
            stats.rows_emitted,
            stats.records_skipped(),
            stats.unresolved,
            stats.missing_auxiliary,
            stats.without_yield
        );
        Ok(stats)
    }

    /// Collect every integrated row in memory
    pub async fn integrate(&self, records: &[YieldRecord]) -> Result<Vec<IntegratedRecord>> {
        let output = InMemoryOutput::new();
        self.run(records, &output).await?;
        Ok(output.records())
    }

    async fn integrate_record(
        &self,
        record: &YieldRecord,
        resolved: Option<&ResolvedLocation>,
    ) -> std::result::Result<Vec<IntegratedRecord>, Skip> {
        let Some(resolved) = resolved else {
            warn!(district = %record.district, year = record.year, "Coordinates not found, skipping record");
            return Err(Skip::Unresolved);
        };
        if let MatchKind::Fuzzy { score } = resolved.kind {
            debug!(district = %record.district, matched = %resolved.key, score, "Fuzzy-matched district");
        }

        let location = &resolved.location;
        let region = location.region.clone().or_else(|| record.region.clone());

        let auxiliary = match &self.auxiliary {
            None => BTreeMap::new(),
            Some(table) => match region.as_deref().and_then(|r| table.lookup(r)) {
                Some(values) => values.clone(),
                None => {
                    warn!(
                        district = %record.district,
                        region = region.as_deref().unwrap_or("<unknown>"),
                        "No auxiliary data for region, skipping record"
                    );
                    return Err(Skip::MissingAuxiliary);
                }
            },
        };

        if !record.has_any_yield() {
            debug!(district = %record.district, year = record.year, "No usable yield values");
            return Err(Skip::NoYield);
        }

        let query = EnrichmentQuery {
            latitude: location.latitude,
            longitude: location.longitude,
            year: Some(record.year),
        };
        let mut attributes = BTreeMap::new();
        for client in &self.clients {
            let result = client.fetch(&query).await;
            attributes.extend(result.attributes);
        }

        let rows: Vec<IntegratedRecord> = self
            .crops
            .iter()
            .filter_map(|crop| {
                let yield_value = record.yield_for(crop)?;
                Some(IntegratedRecord {
                    district: record.district.clone(),
                    region: region.clone(),
                    year: record.year,
                    crop: crop.to_lowercase(),
                    latitude: location.latitude,
                    longitude: location.longitude,
                    attributes: attributes.clone(),
                    auxiliary: auxiliary.clone(),
                    yield_value,
                })
            })
            .collect();

        if rows.is_empty() {
            debug!(district = %record.district, year = record.year, "No configured crop has a yield value");
            return Err(Skip::NoYield);
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::enrichment::{ResilientEnrichmentClient, SyntheticProvider};
    use crate::domain::{AttributeSpec, Location};
    use crate::pipeline::processing::resolver::LocationIndex;

    fn yield_record(district: &str, year: i32, yields: &[(&str, Option<f64>)]) -> YieldRecord {
        YieldRecord {
            district: district.to_string(),
            region: None,
            year,
            yields: yields.iter().map(|(c, v)| (c.to_string(), *v)).collect(),
        }
    }

    fn resolver() -> CoordinateResolver {
        let index = LocationIndex::from_iter([
            (
                "Pune",
                Location {
                    latitude: 18.52,
                    longitude: 73.85,
                    region: Some("Maharashtra".to_string()),
                },
            ),
            (
                "Ludhiana",
                Location {
                    latitude: 30.90,
                    longitude: 75.85,
                    region: None,
                },
            ),
        ]);
        CoordinateResolver::new(index, 80)
    }

    fn clients() -> Vec<Box<dyn EnrichmentClient>> {
        vec![Box::new(ResilientEnrichmentClient::fallback_only(SyntheticProvider::new(
            "vedas",
            vec![AttributeSpec::new("rainfall", 800.0, 1800.0, 0)],
        )))]
    }

    fn engine() -> IntegrationEngine {
        IntegrationEngine::new(
            resolver(),
            clients(),
            vec!["RICE".to_string(), "WHEAT".to_string(), "MAIZE".to_string()],
        )
    }

    #[tokio::test]
    async fn test_one_row_per_present_crop() {
        let records = vec![yield_record(
            "Pune",
            2020,
            &[("RICE", Some(2500.0)), ("WHEAT", None), ("MAIZE", Some(1800.0))],
        )];

        let rows = engine().integrate(&records).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].crop, "rice");
        assert_eq!(rows[0].yield_value, 2500.0);
        assert_eq!(rows[1].crop, "maize");
        assert_eq!(rows[0].region.as_deref(), Some("Maharashtra"));
        assert!(rows[0].attributes.contains_key("rainfall"));
        assert_eq!(rows[0].attributes, rows[1].attributes);
    }

    #[tokio::test]
    async fn test_skips_unresolved_and_yieldless_records() {
        let records = vec![
            yield_record("Atlantis", 2020, &[("RICE", Some(1.0))]),
            yield_record("Pune", 2020, &[("RICE", None), ("WHEAT", None)]),
            yield_record("Ludhiana", 2020, &[("WHEAT", Some(4500.0))]),
        ];

        let output = InMemoryOutput::new();
        let stats = engine().run(&records, &output).await.unwrap();

        assert_eq!(stats.records_read, 3);
        assert_eq!(stats.unresolved, 1);
        assert_eq!(stats.without_yield, 1);
        assert_eq!(stats.rows_emitted, 1);
        let rows = output.records();
        assert_eq!(rows[0].district, "Ludhiana");
        assert_eq!(rows[0].crop, "wheat");
    }

    #[tokio::test]
    async fn test_crops_outside_schema_are_ignored() {
        let records = vec![yield_record("Pune", 2020, &[("SORGHUM", Some(900.0))])];
        let stats = engine().run(&records, &InMemoryOutput::new()).await.unwrap();
        assert_eq!(stats.rows_emitted, 0);
        assert_eq!(stats.without_yield, 1);
    }

    #[tokio::test]
    async fn test_auxiliary_lookup_uses_resolved_region() {
        let mut table = RegionTable::new(vec!["black".to_string()]);
        table.insert("MAHARASHTRA", BTreeMap::from([("black".to_string(), 0.7)]));
        let engine = engine().with_auxiliary(table);

        let mut ludhiana = yield_record("Ludhiana", 2020, &[("WHEAT", Some(4500.0))]);
        let records = vec![yield_record("Pune", 2020, &[("RICE", Some(2500.0))]), ludhiana.clone()];

        let output = InMemoryOutput::new();
        let stats = engine.run(&records, &output).await.unwrap();
        assert_eq!(stats.missing_auxiliary, 1);
        assert_eq!(output.records()[0].auxiliary["black"], 0.7);
        assert_eq!(engine.auxiliary_columns(), vec!["black"]);

        // The yield dataset's own state is used when the coordinates carry none
        ludhiana.region = Some("Maharashtra".to_string());
        let rows = engine.integrate(&[ludhiana]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].region.as_deref(), Some("Maharashtra"));
    }

    #[tokio::test]
    async fn test_fuzzy_matches_are_counted_once_per_record() {
        let records = vec![
            yield_record("Punee", 2019, &[("RICE", Some(2400.0))]),
            yield_record("Punee", 2020, &[("RICE", Some(2500.0))]),
        ];
        let output = InMemoryOutput::new();
        let stats = engine().run(&records, &output).await.unwrap();
        assert_eq!(stats.fuzzy_matched, 2);
        assert!(output.records().iter().all(|r| r.latitude == 18.52 && r.longitude == 73.85));
    }

    #[test]
    fn test_attribute_columns_follow_service_order() {
        assert_eq!(engine().attribute_columns(), vec!["rainfall"]);
        assert!(engine().auxiliary_columns().is_empty());
    }
}
