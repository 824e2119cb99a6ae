use chrono::Utc;
use std::path::PathBuf;
use tracing::{error, info, info_span, Instrument};
use uuid::Uuid;

use crate::app::enrichment::build_clients;
use crate::app::ports::{PublishOutcome, PublishPort, ServiceCallStats};
use crate::config::Config;
use crate::error::Result;
use crate::infra::csv_sink::CsvTableSink;
use crate::infra::git_publisher::GitPublisher;
use crate::io::coordinate_loader::load_location_index;
use crate::io::soil_loader::load_region_table;
use crate::io::yield_loader::load_yield_records;
use crate::pipeline::processing::integration::{IntegrationEngine, IntegrationStats};
use crate::pipeline::processing::resolver::CoordinateResolver;

/// Outcome of one pipeline run
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub run_id: Uuid,
    /// Data rows in the yield file
    pub yield_rows_read: usize,
    /// Yield rows dropped at load time (invalid, or no crop has a yield)
    pub yield_rows_rejected: usize,
    pub locations: usize,
    pub stats: IntegrationStats,
    pub services: Vec<ServiceCallStats>,
    pub output: PathBuf,
    /// `None` when versioning is disabled; an error message when it failed
    pub publish: Option<std::result::Result<PublishOutcome, String>>,
}

/// Use case running the whole pipeline once: load datasets, integrate,
/// write the output table and version it.
pub struct IntegrateUseCase {
    config: Config,
    publisher: Option<Box<dyn PublishPort>>,
}

impl IntegrateUseCase {
    /// Use case with the git publisher when versioning is enabled
    pub fn new(config: Config) -> Self {
        let publisher: Option<Box<dyn PublishPort>> = if config.versioning.enabled {
            Some(Box::new(GitPublisher::new(config.versioning_repo_dir(), &config.versioning)))
        } else {
            None
        };
        Self { config, publisher }
    }

    pub fn with_publisher(mut self, publisher: Box<dyn PublishPort>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    pub fn without_publish(mut self) -> Self {
        self.publisher = None;
        self
    }

    pub async fn execute(&self) -> Result<RunSummary> {
        let run_id = Uuid::new_v4();
        let span = info_span!("integrate_run", run_id = %run_id);
        self.execute_run(run_id).instrument(span).await
    }

    async fn execute_run(&self, run_id: Uuid) -> Result<RunSummary> {
        let paths = &self.config.paths;
        info!("Starting integration run");

        let yields = load_yield_records(&paths.yield_csv, &self.config.crops)?;
        let coordinates = load_location_index(&paths.coordinates_csv)?;
        let auxiliary = paths.soil_csv.as_deref().map(load_region_table).transpose()?;
        let locations = coordinates.index.len();

        let resolver = CoordinateResolver::new(coordinates.index, self.config.matching.threshold);
        let clients = build_clients(&self.config)?;
        let mut engine = IntegrationEngine::new(resolver, clients, yields.crops.clone());
        if let Some(table) = auxiliary {
            engine = engine.with_auxiliary(table);
        }

        let mut columns = engine.attribute_columns();
        columns.extend(engine.auxiliary_columns());
        let sink = CsvTableSink::open(&paths.output_csv, &columns)?;

        let stats = engine.run(&yields.records, &sink).await?;
        let services: Vec<ServiceCallStats> = engine.clients().iter().map(|c| c.stats()).collect();
        for service in &services {
            info!(
                service = %service.service,
                "{} live results, {} fallback results",
                service.live,
                service.fallback
            );
        }

        let publish = match &self.publisher {
            Some(publisher) => {
                let message = format!("Data update {}", Utc::now().to_rfc3339());
                match publisher.publish(sink.path(), &message).await {
                    Ok(outcome) => {
                        info!("Versioning: {:?}", outcome);
                        Some(Ok(outcome))
                    }
                    Err(e) => {
                        error!("Versioning failed: {}", e);
                        Some(Err(e.to_string()))
                    }
                }
            }
            None => None,
        };

        Ok(RunSummary {
            run_id,
            yield_rows_read: yields.rows_read,
            yield_rows_rejected: yields.rows_without_yield + yields.row_errors.len(),
            locations,
            stats,
            services,
            output: paths.output_csv.clone(),
            publish,
        })
    }
}
