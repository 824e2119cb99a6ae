use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

use agri_pipeline::app::enrichment::SyntheticProvider;
use agri_pipeline::app::integrate_use_case::{IntegrateUseCase, RunSummary};
use agri_pipeline::app::ports::PublishOutcome;
use agri_pipeline::config::Config;
use agri_pipeline::domain::EnrichmentQuery;
use agri_pipeline::io::coordinate_loader::load_location_index;
use agri_pipeline::logging;
use agri_pipeline::pipeline::processing::resolver::{CoordinateResolver, MatchKind};

#[derive(Parser)]
#[command(name = "agri_pipeline")]
#[command(about = "Integrate district crop yields with coordinates and agro-climatic data")]
#[command(version = "0.1.0")]
struct Cli {
    /// Path to a TOML configuration file (default: ./config.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full integration pipeline
    Run {
        #[arg(long)]
        yield_csv: Option<PathBuf>,
        #[arg(long)]
        coordinates_csv: Option<PathBuf>,
        /// Region-keyed soil profile table; records without a match are skipped
        #[arg(long)]
        soil_csv: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
        /// Do not commit or push the output even if versioning is enabled
        #[arg(long)]
        no_publish: bool,
        /// Never call live services; synthesize every attribute
        #[arg(long)]
        offline: bool,
    },
    /// Show how a district name resolves against the coordinate dataset
    Resolve {
        district: String,
        #[arg(long)]
        coordinates_csv: Option<PathBuf>,
    },
    /// Print the fallback attributes every service would synthesize
    Synthesize {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        #[arg(long)]
        year: Option<i32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    logging::init_logging();

    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Commands::Run {
            yield_csv,
            coordinates_csv,
            soil_csv,
            output,
            no_publish,
            offline,
        } => {
            if let Some(path) = yield_csv {
                config.paths.yield_csv = path;
            }
            if let Some(path) = coordinates_csv {
                config.paths.coordinates_csv = path;
            }
            if soil_csv.is_some() {
                config.paths.soil_csv = soil_csv;
            }
            if let Some(path) = output {
                config.paths.output_csv = path;
            }
            config.offline |= offline;

            let mut use_case = IntegrateUseCase::new(config);
            if no_publish {
                use_case = use_case.without_publish();
            }

            let summary = use_case.execute().await.context("Pipeline run failed")?;
            print_summary(&summary);
        }
        Commands::Resolve {
            district,
            coordinates_csv,
        } => {
            let path = coordinates_csv.unwrap_or_else(|| config.paths.coordinates_csv.clone());
            let dataset = load_location_index(&path)
                .with_context(|| format!("Failed to load coordinates from {}", path.display()))?;
            let resolver = CoordinateResolver::new(dataset.index, config.matching.threshold);

            match resolver.resolve(&district) {
                Some(resolved) => {
                    let how = match resolved.kind {
                        MatchKind::Exact => "exact".to_string(),
                        MatchKind::Fuzzy { score } => format!("fuzzy, score {score}"),
                    };
                    let region = resolved.location.region.as_deref().unwrap_or("-");
                    println!(
                        "{} -> {} ({}, {}) region {} [{}]",
                        district, resolved.key, resolved.location.latitude, resolved.location.longitude, region, how
                    );
                }
                None => {
                    println!(
                        "{} -> not found (no key scores above {})",
                        district,
                        resolver.threshold()
                    );
                }
            }
        }
        Commands::Synthesize { lat, lon, year } => {
            let query = EnrichmentQuery {
                latitude: lat,
                longitude: lon,
                year,
            };
            let values: BTreeMap<String, BTreeMap<String, f64>> = config
                .services
                .iter()
                .map(|service| {
                    let provider = SyntheticProvider::new(&service.name, service.attributes.clone());
                    (service.name.clone(), provider.synthesize(&query))
                })
                .collect();
            println!("{}", serde_json::to_string_pretty(&values)?);
        }
    }

    Ok(())
}

fn print_summary(summary: &RunSummary) {
    info!(run_id = %summary.run_id, "Pipeline finished");
    let stats = &summary.stats;

    println!("\n📊 Integration run {}", summary.run_id);
    println!("   Yield rows read: {}", summary.yield_rows_read);
    println!("   Yield rows rejected at load: {}", summary.yield_rows_rejected);
    println!("   District locations: {}", summary.locations);
    println!("   Records processed: {}", stats.records_read);
    println!("   Records skipped: {}", stats.records_skipped());
    println!("     - unresolved district: {}", stats.unresolved);
    println!("     - no auxiliary data: {}", stats.missing_auxiliary);
    println!("     - no usable yield: {}", stats.without_yield);
    println!("   Fuzzy-matched records: {}", stats.fuzzy_matched);
    println!("   Rows emitted: {}", stats.rows_emitted);
    for service in &summary.services {
        println!(
            "   {}: {} live, {} fallback",
            service.service, service.live, service.fallback
        );
    }
    println!("   Output file: {}", summary.output.display());

    match &summary.publish {
        None => {}
        Some(Ok(PublishOutcome::Unchanged)) => println!("   Versioning: no changes to commit"),
        Some(Ok(PublishOutcome::Committed { commit_id, pushed })) => {
            let pushed = if *pushed { "pushed" } else { "not pushed" };
            println!("   Versioning: committed {} ({})", commit_id, pushed);
        }
        Some(Err(e)) => println!("   ⚠️  Versioning failed: {}", e),
    }
}
