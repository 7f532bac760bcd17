//! CLI entry point for the car price predictor.
//!
//! Provides subcommands for training the pipeline artifact from a listings
//! CSV, serving the prediction web app, and one-off predictions.

use anyhow::{Context, Result};
use car_price_predictor::config::ServeConfig;
use car_price_predictor::dataset::read_listings;
use car_price_predictor::fetch::read_source;
use car_price_predictor::normalize::FormSubmission;
use car_price_predictor::pipeline::{ForestParams, Regressor, load_first, save_pipeline};
use car_price_predictor::predict::PredictionService;
use car_price_predictor::publish::{default_key, upload_artifact};
use car_price_predictor::training::{TrainConfig, train};
use car_price_predictor::web;
use clap::{Args, Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "car_price_predictor")]
#[command(about = "Train and serve a used-car price model", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train the pipeline from a listings CSV and write the artifact
    Train {
        /// Path to file or URL to fetch
        #[arg(value_name = "FILE_OR_URL")]
        data: String,

        /// Where to write the artifact
        #[arg(short, long, default_value = "model/car_price.model")]
        output: PathBuf,

        /// Number of trees in the forest
        #[arg(long, default_value_t = 200)]
        trees: usize,

        /// Maximum tree depth (unbounded when omitted)
        #[arg(long)]
        max_depth: Option<usize>,

        /// Minimum number of samples in a leaf
        #[arg(long, default_value_t = 1)]
        min_samples_leaf: usize,

        /// Fraction of listings held out for evaluation
        #[arg(long, default_value_t = 0.2)]
        test_size: f64,

        /// Seed for the split and the bootstrap samples
        #[arg(long, default_value_t = 42)]
        seed: u64,

        /// Optional: S3 bucket to publish the artifact to (e.g., "my-bucket")
        #[arg(long)]
        s3_bucket: Option<String>,

        /// Optional: S3 object key (defaults to a timestamped key under models/)
        #[arg(long, requires = "s3_bucket")]
        s3_key: Option<String>,
    },
    /// Serve the instructions page, the form and the prediction endpoints
    Serve {
        /// Interface to bind (overrides HOST)
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on (overrides PORT)
        #[arg(short, long)]
        port: Option<u16>,

        /// Artifact to try before the default locations (overrides MODEL_PATH)
        #[arg(short, long)]
        model: Option<PathBuf>,
    },
    /// Predict one price from command-line values; omitted values are imputed
    Predict {
        /// Artifact to try before the default locations (overrides MODEL_PATH)
        #[arg(short, long)]
        model: Option<PathBuf>,

        #[command(flatten)]
        car: CarArgs,
    },
}

#[derive(Args)]
struct CarArgs {
    #[arg(long)]
    year: Option<String>,
    #[arg(long)]
    km_driven: Option<String>,
    /// Petrol or Diesel
    #[arg(long)]
    fuel: Option<String>,
    /// Manual or Automatic
    #[arg(long)]
    transmission: Option<String>,
    /// e.g. "First Owner"
    #[arg(long)]
    owner: Option<String>,
    #[arg(long)]
    mileage: Option<String>,
    #[arg(long)]
    engine: Option<String>,
    #[arg(long)]
    max_power: Option<String>,
    #[arg(long)]
    brand: Option<String>,
}

impl From<CarArgs> for FormSubmission {
    fn from(car: CarArgs) -> Self {
        FormSubmission {
            year: car.year,
            km_driven: car.km_driven,
            fuel: car.fuel,
            transmission: car.transmission,
            owner: car.owner,
            mileage: car.mileage,
            engine: car.engine,
            max_power: car.max_power,
            brand: car.brand,
        }
    }
}

/// Colored stderr + JSON rolling log file. Debug mode lowers the stderr default to `debug`.
fn init_logging(debug: bool) -> WorkerGuard {
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/car_price_predictor.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("car_price_predictor.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if debug { "debug" } else { "info" };
    let stderr_filter = EnvFilter::try_from_env("RUST_LOG")
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    let json_filter =
        EnvFilter::try_from_env("RUST_LOG_JSON").unwrap_or_else(|_| EnvFilter::new("debug"));

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(stderr_filter);

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(json_filter);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok(); // Load .env file

    let cli = Cli::parse();
    let mut config = ServeConfig::from_env();
    let _log_guard = init_logging(config.debug);

    match cli.command {
        Commands::Train {
            data,
            output,
            trees,
            max_depth,
            min_samples_leaf,
            test_size,
            seed,
            s3_bucket,
            s3_key,
        } => {
            let train_config = TrainConfig {
                params: ForestParams {
                    n_trees: trees,
                    max_depth,
                    min_samples_leaf,
                    seed,
                },
                test_size,
            };
            train_command(&data, &output, train_config, s3_bucket, s3_key).await?;
        }
        Commands::Serve { host, port, model } => {
            if let Some(host) = host {
                config.host = host;
            }
            if let Some(port) = port {
                config.port = port;
            }
            if model.is_some() {
                config.model_path = model;
            }
            serve(config).await?;
        }
        Commands::Predict { model, car } => {
            if model.is_some() {
                config.model_path = model;
            }
            let service = load_service(&config)?;
            let estimate = service.estimate_submission(car.into())?;
            println!("{}", serde_json::to_string_pretty(&estimate)?);
        }
    }

    Ok(())
}

/// Loads the artifact from the configured candidates. Fails startup when none loads.
fn load_service(config: &ServeConfig) -> Result<PredictionService> {
    let (pipeline, path) = load_first(&config.model_candidates())?;
    info!(
        path = %path.display(),
        r2 = ?pipeline.metadata.r2,
        rmse = ?pipeline.metadata.rmse,
        "Using model"
    );
    let model: Arc<dyn Regressor> = Arc::new(pipeline);
    Ok(PredictionService::new(model))
}

#[tracing::instrument(skip(config), fields(host = %config.host, port = config.port, debug = config.debug))]
async fn serve(config: ServeConfig) -> Result<()> {
    let service = load_service(&config)?;
    let app = web::router(service);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "Starting Car Price Prediction App");
    axum::serve(listener, app).await?;
    Ok(())
}

/// Reads and cleans the listings, fits the pipeline off the async runtime,
/// writes the artifact and optionally publishes it to S3.
#[tracing::instrument(skip(output, config, s3_bucket, s3_key), fields(output = %output.display()))]
async fn train_command(
    data: &str,
    output: &Path,
    config: TrainConfig,
    s3_bucket: Option<String>,
    s3_key: Option<String>,
) -> Result<()> {
    let bytes = read_source(data).await?;
    let (listings, _report) = read_listings(bytes.as_slice())?;

    let (pipeline, _evaluation) =
        tokio::task::spawn_blocking(move || train(listings, &config)).await??;

    save_pipeline(&pipeline, output)?;

    if let Some(bucket) = s3_bucket {
        let key = s3_key.unwrap_or_else(|| default_key(&pipeline));
        let aws = aws_config::load_from_env().await;
        let s3 = aws_sdk_s3::Client::new(&aws);
        info!(bucket = %bucket, key = %key, "S3 upload enabled");
        upload_artifact(&s3, &bucket, &key, &pipeline).await?;
    }

    info!("Training finished");
    Ok(())
}
