//! CLI entry point for the Citi Bike demand feature pipeline.
//!
//! One invocation is one run: build the training table, build inference rows
//! and predict, or just rank locations. Scheduling is left to cron or similar.

mod infra;

use crate::infra::s3::{S3FeatureStore, S3ModelRegistry};
use anyhow::{Result, anyhow};
use chrono::{DateTime, Utc};
use citibike_demand::{
    cleaner::{RawTrip, clean_trips},
    config::PipelineConfig,
    error::PipelineError,
    features::TargetPolicy,
    fetch::BasicClient,
    grid::build_dense_grid,
    output::{append_record, lag_table, print_json, write_table},
    pipeline::{AsOf, FeatureRun, build_inference_rows, build_training_table},
    predict::{PredictionRow, predict_run},
    publish::{publish_features, publish_predictions},
    rank::top_locations,
    registry::{DEFAULT_MODEL_NAME, DEFAULT_MODEL_VERSION, LocalModelRegistry, ModelRegistry},
    source::{DEFAULT_TRIPDATA_BASE_URL, TripDataClient, YearMonth, fetch_months, load_trips},
    store::LocalFeatureStore,
};
use clap::{Args, Parser, Subcommand};
use std::ffi::OsStr;
use std::path::Path;
use tracing::{error, info};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "citibike_demand")]
#[command(about = "Hourly Citi Bike demand features and predictions", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the training table and write it to the feature store
    Features {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        pipeline: PipelineArgs,

        #[command(flatten)]
        store: StoreArgs,

        /// Also export the table to this CSV file
        #[arg(long)]
        csv: Option<String>,
    },
    /// Build inference rows, predict, and write predictions to the feature store
    Predict {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        pipeline: PipelineArgs,

        #[command(flatten)]
        store: StoreArgs,

        #[command(flatten)]
        registry: RegistryArgs,

        /// Current time as RFC 3339, or "data-end" to anchor at the last hour of data
        #[arg(long)]
        as_of: Option<String>,

        /// Keep the observed landmark value as target (for backtests)
        #[arg(long, default_value_t = false)]
        backtest: bool,

        /// Also export the inference rows to this CSV file
        #[arg(long)]
        csv: Option<String>,
    },
    /// Log the busiest locations
    Rank {
        #[command(flatten)]
        input: InputArgs,

        #[command(flatten)]
        pipeline: PipelineArgs,
    },
}

#[derive(Args)]
struct InputArgs {
    /// Month to download as YYYY-MM (repeatable; default: previous full month)
    #[arg(short, long = "month", value_name = "YYYY-MM")]
    months: Vec<String>,

    /// First month of an inclusive range, used with --to
    #[arg(long, value_name = "YYYY-MM", requires = "to")]
    from: Option<String>,

    /// Last month of an inclusive range, used with --from
    #[arg(long, value_name = "YYYY-MM", requires = "from")]
    to: Option<String>,

    /// Local .zip/.csv file or URL to read instead of monthly archives
    #[arg(short, long, value_name = "FILE_OR_URL", conflicts_with_all = ["months", "from"])]
    source: Option<String>,
}

#[derive(Args)]
struct PipelineArgs {
    /// JSON file with pipeline parameters
    #[arg(long)]
    config: Option<String>,

    /// Number of lag hours per row
    #[arg(long)]
    window_size: Option<usize>,

    /// Hours between consecutive training windows
    #[arg(long)]
    step_size: Option<usize>,

    /// Number of busiest locations to keep
    #[arg(long)]
    top_k: Option<usize>,

    /// Longest trip, in hours, that counts as valid
    #[arg(long)]
    max_trip_hours: Option<i64>,

    /// CSV file to append run statistics to
    #[arg(long)]
    run_log: Option<String>,
}

#[derive(Args)]
struct StoreArgs {
    /// Directory of the local feature store
    #[arg(long, default_value = "feature_store")]
    store_dir: String,

    /// S3 bucket for the feature store (replaces --store-dir)
    #[arg(long)]
    s3_bucket: Option<String>,

    /// Key prefix inside the S3 bucket
    #[arg(long, default_value = "feature_store")]
    s3_prefix: String,
}

#[derive(Args)]
struct RegistryArgs {
    #[arg(long, default_value = DEFAULT_MODEL_NAME)]
    model_name: String,

    #[arg(long, default_value_t = DEFAULT_MODEL_VERSION)]
    model_version: u32,

    /// Directory of the local model registry
    #[arg(long, default_value = "models")]
    registry_dir: String,

    /// S3 bucket for the model registry (replaces --registry-dir)
    #[arg(long)]
    registry_s3_bucket: Option<String>,

    /// Key prefix inside the registry bucket
    #[arg(long, default_value = "models")]
    registry_s3_prefix: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path =
        std::env::var("LOG_FILE_PATH").unwrap_or_else(|_| "logs/citibike_demand.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("citibike_demand.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Features {
            input,
            pipeline,
            store,
            csv,
        } => {
            let config = pipeline.resolve()?;
            let raw = load_raw(&input).await.map_err(failed)?;
            let run = build_training_table(&raw, &config).map_err(failed)?;
            report(&run, pipeline.run_log.as_deref())?;

            if let Some(path) = csv {
                write_table(&path, &lag_table(run.window_size, &run.rows)?)?;
            }

            let written = store_features(&store, &run).await.map_err(failed)?;
            info!(rows = written, "Features run complete");
        }
        Commands::Predict {
            input,
            pipeline,
            store,
            registry,
            as_of,
            backtest,
            csv,
        } => {
            let config = pipeline.resolve()?;
            let as_of = parse_as_of(as_of.as_deref())?;
            let policy = if backtest {
                TargetPolicy::Keep
            } else {
                TargetPolicy::Omit
            };

            let raw = load_raw(&input).await.map_err(failed)?;
            let run = build_inference_rows(&raw, &config, as_of, policy).map_err(failed)?;
            report(&run, pipeline.run_log.as_deref())?;

            if let Some(path) = csv {
                write_table(&path, &lag_table(run.window_size, &run.rows)?)?;
            }

            let model_registry: Box<dyn ModelRegistry> = match &registry.registry_s3_bucket {
                Some(bucket) => Box::new(S3ModelRegistry::new(
                    s3_client().await,
                    bucket,
                    &registry.registry_s3_prefix,
                )),
                None => Box::new(LocalModelRegistry::new(&registry.registry_dir)),
            };
            let predictions = predict_run(
                model_registry.as_ref(),
                &registry.model_name,
                registry.model_version,
                &run,
            )
            .await
            .map_err(failed)?;

            let written = store_predictions(&store, &predictions)
                .await
                .map_err(failed)?;
            info!(rows = written, "Predict run complete");
        }
        Commands::Rank { input, pipeline } => {
            let config = pipeline.resolve()?;
            let raw = load_raw(&input).await.map_err(failed)?;
            let events = clean_trips(&raw, config.max_trip_duration());
            let grid = build_dense_grid(&events);

            info!(
                raw_rows = raw.len(),
                cleaned_rows = events.len(),
                locations = grid.locations().len(),
                hours = grid.hour_count(),
                "Grid summary"
            );
            for (rank, location) in top_locations(&grid, config.top_k).iter().enumerate() {
                info!(
                    rank = rank + 1,
                    location_id = location.location_id,
                    total_rides = location.total_rides,
                    "Location"
                );
            }
        }
    }

    Ok(())
}

impl PipelineArgs {
    /// Config file first, then flag overrides.
    fn resolve(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };

        if let Some(window_size) = self.window_size {
            config.window_size = window_size;
        }
        if let Some(step_size) = self.step_size {
            config.step_size = step_size;
        }
        if let Some(top_k) = self.top_k {
            config.top_k = top_k;
        }
        if let Some(hours) = self.max_trip_hours {
            config.max_trip_duration_hours = hours;
        }

        config.validate()?;
        info!(?config, "Pipeline config");
        Ok(config)
    }
}

impl InputArgs {
    fn months(&self) -> Result<Vec<YearMonth>> {
        let mut months = self
            .months
            .iter()
            .map(|m| m.parse())
            .collect::<Result<Vec<YearMonth>>>()?;

        if let (Some(from), Some(to)) = (&self.from, &self.to) {
            months.extend(YearMonth::range(from.parse()?, to.parse()?));
        }
        if months.is_empty() {
            months.push(YearMonth::previous_full_month(Utc::now().date_naive()));
        }

        months.sort();
        months.dedup();
        Ok(months)
    }
}

/// Reads raw trips from `--source` or downloads the requested months.
async fn load_raw(input: &InputArgs) -> Result<Vec<RawTrip>, PipelineError> {
    let client = BasicClient::new().map_err(|e| PipelineError::Retrieval(e.to_string()))?;

    if let Some(source) = &input.source {
        return load_trips(&client, source)
            .await
            .map_err(|e| PipelineError::Retrieval(format!("{e:#}")));
    }

    let months = input
        .months()
        .map_err(|e| PipelineError::Retrieval(format!("{e:#}")))?;
    let base_url = std::env::var("TRIPDATA_BASE_URL")
        .unwrap_or_else(|_| DEFAULT_TRIPDATA_BASE_URL.to_string());
    info!(months = months.len(), base_url = %base_url, "Retrieving trip archives");

    let source = TripDataClient::with_base_url(client, &base_url);
    fetch_months(&source, &months).await
}

fn parse_as_of(raw: Option<&str>) -> Result<AsOf> {
    match raw {
        None => Ok(AsOf::Clock(Utc::now())),
        Some("data-end") => Ok(AsOf::DataEnd),
        Some(ts) => DateTime::parse_from_rfc3339(ts)
            .map(|t| AsOf::Clock(t.with_timezone(&Utc)))
            .map_err(|e| anyhow!("invalid --as-of '{ts}': {e}")),
    }
}

async fn store_features(store: &StoreArgs, run: &FeatureRun) -> Result<usize, PipelineError> {
    match &store.s3_bucket {
        Some(bucket) => {
            let s3_store = S3FeatureStore::new(s3_client().await, bucket, &store.s3_prefix);
            publish_features(&s3_store, run).await
        }
        None => publish_features(&LocalFeatureStore::new(&store.store_dir), run).await,
    }
}

async fn store_predictions(
    store: &StoreArgs,
    predictions: &[PredictionRow],
) -> Result<usize, PipelineError> {
    match &store.s3_bucket {
        Some(bucket) => {
            let s3_store = S3FeatureStore::new(s3_client().await, bucket, &store.s3_prefix);
            publish_predictions(&s3_store, predictions).await
        }
        None => {
            let local_store = LocalFeatureStore::new(&store.store_dir);
            publish_predictions(&local_store, predictions).await
        }
    }
}

async fn s3_client() -> aws_sdk_s3::Client {
    let config = aws_config::load_from_env().await;
    aws_sdk_s3::Client::new(&config)
}

/// Logs the run summary and optionally appends it to the run log.
fn report(run: &FeatureRun, run_log: Option<&str>) -> Result<()> {
    print_json(&run.stats)?;
    if let Some(path) = run_log {
        append_record(path, &run.stats)?;
    }
    if run.stats.no_data {
        info!("Run produced no data");
    }
    Ok(())
}

/// Logs which stage failed before the error propagates out of `main`.
fn failed(e: PipelineError) -> anyhow::Error {
    error!(stage = e.stage(), error = %e, "Run failed");
    e.into()
}
