//! CLI command definitions for tripforge.
//!
//! Three commands: `run` executes the full ingestion pipeline, `zones`
//! reconciles the reference datasets on their own, and `top` answers a
//! bounded top-k ranking query over previously cleaned output.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use crate::pipeline::{PipelineConfig, PipelineOrchestrator, RunInputs};
use crate::quality::CleanedTripRecord;
use crate::ranking::{top_k, RankMetric};
use crate::storage::{JsonlSink, RecordSink};
use crate::zones::ZoneReconciler;

/// Default output directory for pipeline runs.
const DEFAULT_OUTPUT_DIR: &str = "./output";

/// Trip data quality pipeline and ranking queries.
#[derive(Parser)]
#[command(name = "tripforge")]
#[command(about = "Ingest raw trip records through a quality pipeline with full audit logging")]
#[command(version)]
#[command(
    long_about = "tripforge reconciles zone reference data, runs every raw trip through \
validation, deduplication, derived-feature computation and anomaly flagging, and persists \
cleaned/flagged/log streams as JSONL.\n\nExample usage:\n  tripforge run --trips trips.csv \
--zone-lookup zones.csv --zone-geometry geometry.csv --output ./output"
)]
pub struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    pub log_level: String,
}

/// Available CLI subcommands.
#[derive(clap::Subcommand)]
pub enum Commands {
    /// Run the full ingestion pipeline over one or more trip files.
    Run(RunArgs),

    /// Reconcile the zone reference datasets without ingesting trips.
    Zones(ZonesArgs),

    /// Rank previously cleaned trips by a metric, keeping only the top k.
    Top(TopArgs),
}

/// Arguments for `tripforge run`.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Raw trip CSV file(s), processed in order.
    #[arg(long, required = true, num_args = 1..)]
    pub trips: Vec<PathBuf>,

    /// Zone name lookup CSV.
    #[arg(long)]
    pub zone_lookup: PathBuf,

    /// Zone geometry metadata CSV.
    #[arg(long)]
    pub zone_geometry: PathBuf,

    /// Output directory for the JSONL streams.
    #[arg(short = 'o', long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// Cleaned records per batch flush (overrides TRIPFORGE_BATCH_SIZE).
    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Average speed ceiling before a trip is flagged (mph).
    #[arg(long)]
    pub max_speed_mph: Option<f64>,

    /// Average speed floor before a trip is flagged (mph).
    #[arg(long)]
    pub min_speed_mph: Option<f64>,

    /// Fare-per-mile floor before a trip is flagged.
    #[arg(long)]
    pub fare_per_mile_min: Option<f64>,

    /// Fare-per-mile ceiling before a trip is flagged.
    #[arg(long)]
    pub fare_per_mile_max: Option<f64>,

    /// Tip-to-fare ratio ceiling before a trip is flagged.
    #[arg(long)]
    pub tip_fare_ratio_ceiling: Option<f64>,

    /// Output the run summary as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `tripforge zones`.
#[derive(Parser, Debug)]
pub struct ZonesArgs {
    /// Zone name lookup CSV.
    #[arg(long)]
    pub zone_lookup: PathBuf,

    /// Zone geometry metadata CSV.
    #[arg(long)]
    pub zone_geometry: PathBuf,

    /// Output the reconciliation result as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Arguments for `tripforge top`.
#[derive(Parser, Debug)]
pub struct TopArgs {
    /// Cleaned trips JSONL file produced by a previous run.
    #[arg(long)]
    pub cleaned: PathBuf,

    /// Metric to rank by (revenue_per_minute, fare_per_mile,
    /// tip_percentage, avg_speed_mph, trip_distance, total_amount).
    #[arg(short = 'm', long)]
    pub metric: RankMetricArg,

    /// Number of top records to keep.
    #[arg(short = 'k', long, default_value = "10")]
    pub k: usize,

    /// Output the ranked records as JSON.
    #[arg(short = 'j', long)]
    pub json: bool,
}

/// Newtype so clap can parse the metric through its `FromStr`.
#[derive(Debug, Clone, Copy)]
pub struct RankMetricArg(pub RankMetric);

impl std::str::FromStr for RankMetricArg {
    type Err = crate::ranking::UnknownMetric;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        name.parse().map(RankMetricArg)
    }
}

/// Parses CLI arguments.
pub fn parse_cli() -> Cli {
    Cli::parse()
}

/// Parses arguments and runs the selected command.
pub async fn run() -> anyhow::Result<()> {
    run_with_cli(parse_cli()).await
}

/// Runs the selected command with already-parsed arguments.
pub async fn run_with_cli(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Run(args) => run_pipeline(args).await,
        Commands::Zones(args) => run_zones(args),
        Commands::Top(args) => run_top(args),
    }
}

async fn run_pipeline(args: RunArgs) -> anyhow::Result<()> {
    let mut config = PipelineConfig::from_env().context("invalid environment configuration")?;
    if let Some(batch_size) = args.batch_size {
        config.batch_size = batch_size;
    }
    if let Some(value) = args.max_speed_mph {
        config.thresholds.max_speed_mph = value;
    }
    if let Some(value) = args.min_speed_mph {
        config.thresholds.min_speed_mph = value;
    }
    if let Some(value) = args.fare_per_mile_min {
        config.thresholds.fare_per_mile_min = value;
    }
    if let Some(value) = args.fare_per_mile_max {
        config.thresholds.fare_per_mile_max = value;
    }
    if let Some(value) = args.tip_fare_ratio_ceiling {
        config.thresholds.tip_fare_ratio_ceiling = value;
    }

    let sink = Arc::new(JsonlSink::create(&args.output).await?);
    let orchestrator = PipelineOrchestrator::new(config, sink as Arc<dyn RecordSink>)?;

    let summary = orchestrator
        .run(RunInputs {
            zone_lookup: args.zone_lookup,
            zone_geometry: args.zone_geometry,
            trips: args.trips,
        })
        .await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        println!("Run {} complete in {:.2}s", summary.run_id, summary.duration_secs);
        println!("  zones:      {}", summary.zones.zones_out);
        println!("  raw trips:  {}", summary.counts.total_raw);
        println!("  excluded:   {}", summary.counts.excluded);
        println!("  duplicates: {}", summary.counts.duplicates);
        println!("  flagged:    {}", summary.counts.flagged);
        println!("  clean:      {}", summary.counts.clean);
        println!("Output written to {}", args.output.display());
    }
    Ok(())
}

fn run_zones(args: ZonesArgs) -> anyhow::Result<()> {
    let lookup_rows = crate::ingest::read_zone_lookup(&args.zone_lookup)?;
    let geometry_rows = crate::ingest::read_zone_geometry(&args.zone_geometry)?;
    let outcome = ZoneReconciler::new().reconcile(lookup_rows, geometry_rows);

    if args.json {
        let output = serde_json::json!({
            "summary": outcome.summary,
            "zones": outcome.dimension.records(),
            "issues": outcome.issues,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!(
            "Reconciled {} lookup rows into {} zones ({} issues)",
            outcome.summary.lookup_rows_in,
            outcome.summary.zones_out,
            outcome.issues.len()
        );
        if !outcome.summary.missing_geometry_ids.is_empty() {
            println!(
                "  missing geometry: {:?}",
                outcome.summary.missing_geometry_ids
            );
        }
    }
    Ok(())
}

fn run_top(args: TopArgs) -> anyhow::Result<()> {
    let metric = args.metric.0;
    let contents = std::fs::read_to_string(&args.cleaned)
        .with_context(|| format!("failed to read {}", args.cleaned.display()))?;

    let records: Vec<CleanedTripRecord> = contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(serde_json::from_str)
        .collect::<Result<_, _>>()
        .context("invalid cleaned-trips JSONL")?;

    info!(candidates = records.len(), %metric, k = args.k, "ranking query");
    let top = top_k(records, metric, args.k);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&top)?);
    } else {
        for (rank, record) in top.iter().enumerate() {
            let value = metric.value(record).unwrap_or_default();
            println!(
                "{:>3}. {:<28} {} = {:.3}",
                rank + 1,
                record.record_key,
                metric,
                value
            );
        }
    }
    Ok(())
}
