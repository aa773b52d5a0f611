//! jamspread CLI: traffic-jam spread prediction.

use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use serde::Serialize;

use jamspread::api::{
    BottlenecksRequest, LearnRequest, PredictRequest, RunModelRequest, WhatIfRequest,
};
use jamspread::bottleneck::CancellationToken;
use jamspread::config::EngineConfig;
use jamspread::dataset::Dataset;
use jamspread::engine::Engine;
use jamspread::segment::SegmentId;

#[derive(Parser)]
#[command(name = "jamspread", version, about = "Traffic jam spread prediction")]
struct Cli {
    /// Data directory for persistent storage.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// TOML configuration file.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Fixed simulation seed for reproducible output.
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

/// Dataset selection shared by every data command.
#[derive(clap::Args)]
struct DatasetArgs {
    /// JSON dataset document (segments, adjacencies, observations).
    #[arg(long)]
    dataset: PathBuf,

    /// Identifier the dataset is registered and cached under.
    #[arg(long, default_value = "default")]
    id: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Learn influence probabilities for a dataset.
    Learn {
        #[command(flatten)]
        data: DatasetArgs,

        /// Horizons in minutes (comma-separated).
        #[arg(long, value_delimiter = ',', default_value = "5,15,30")]
        horizons: Vec<u32>,

        #[arg(long, default_value = "LIM")]
        model: String,
    },

    /// Predict jam spread from explicit seed segments.
    Predict {
        #[command(flatten)]
        data: DatasetArgs,

        /// Seed segment ids (comma-separated).
        #[arg(long, value_delimiter = ',', required = true)]
        seeds: Vec<u64>,

        #[arg(long, default_value = "30")]
        horizon: u32,

        #[arg(long, default_value = "LIM")]
        model: String,

        /// Monte Carlo trials. Defaults per model.
        #[arg(long)]
        simulations: Option<usize>,
    },

    /// Rank the top-K bottleneck segments.
    Bottlenecks {
        #[command(flatten)]
        data: DatasetArgs,

        #[arg(short, long, default_value = "10")]
        k: usize,

        #[arg(long, default_value = "30")]
        horizon: u32,

        #[arg(long, default_value = "LIM")]
        model: String,

        /// Ignore any cached ranking.
        #[arg(long)]
        force: bool,
    },

    /// Learn if needed, then recompute the ranking.
    RunModel {
        #[command(flatten)]
        data: DatasetArgs,

        #[arg(short, long, default_value = "10")]
        k: usize,

        #[arg(long, default_value = "30")]
        horizon: u32,

        #[arg(long, default_value = "LIM")]
        model: String,
    },

    /// Compare spread with and without fixing some segments.
    WhatIf {
        #[command(flatten)]
        data: DatasetArgs,

        /// Segment ids to fix (comma-separated).
        #[arg(long, value_delimiter = ',', required = true)]
        fixed: Vec<u64>,

        #[arg(long, default_value = "30")]
        horizon: u32,

        #[arg(long, default_value = "LIM")]
        model: String,
    },

    /// Show the current seed set.
    Seeds {
        #[command(flatten)]
        data: DatasetArgs,

        /// Reference time (unix seconds). Defaults to the latest observation.
        #[arg(long)]
        now: Option<u64>,
    },

    /// List the strongest learned influence edges.
    Flows {
        #[command(flatten)]
        data: DatasetArgs,

        #[arg(long, default_value = "30")]
        horizon: u32,

        /// Override the probability floor.
        #[arg(long)]
        min_probability: Option<f64>,
    },

    /// List what the cached bottlenecks push congestion into.
    Impacts {
        #[command(flatten)]
        data: DatasetArgs,

        #[arg(long, default_value = "30")]
        horizon: u32,

        /// Inspect a single bottleneck.
        #[arg(long)]
        bottleneck: Option<u64>,
    },

    /// Show engine info and statistics.
    Info {
        /// Optional dataset to load first.
        #[arg(long)]
        dataset: Option<PathBuf>,

        #[arg(long, default_value = "default")]
        id: String,
    },

    /// Print the effective configuration as TOML.
    Config {
        /// Write it to this path instead.
        #[arg(long)]
        write: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = match cli.config {
        Some(ref path) => EngineConfig::load(path).into_diagnostic()?,
        None => EngineConfig::default(),
    };
    if cli.data_dir.is_some() {
        config.data_dir = cli.data_dir.clone();
    }
    if cli.seed.is_some() {
        config.rng_seed = cli.seed;
    }

    let cancel = CancellationToken::new();

    match cli.command {
        Commands::Learn {
            data,
            horizons,
            model,
        } => {
            let engine = open(config, &data)?;
            let resp = engine
                .learn(&LearnRequest {
                    dataset_id: data.id,
                    time_horizons: horizons,
                    model_type: model,
                })
                .into_diagnostic()?;
            print_json(&resp)?;
        }

        Commands::Predict {
            data,
            seeds,
            horizon,
            model,
            simulations,
        } => {
            let engine = open(config, &data)?;
            let resp = engine
                .predict(&PredictRequest {
                    dataset_id: data.id,
                    seed_segment_ids: segment_ids(&seeds)?,
                    time_horizon_minutes: horizon,
                    model_type: model,
                    num_simulations: simulations,
                })
                .into_diagnostic()?;
            print_json(&resp)?;
        }

        Commands::Bottlenecks {
            data,
            k,
            horizon,
            model,
            force,
        } => {
            let engine = open(config, &data)?;
            let resp = engine
                .top_k_bottlenecks(
                    &BottlenecksRequest {
                        dataset_id: data.id,
                        k,
                        time_horizon_minutes: horizon,
                        model_type: model,
                        force_recompute: force,
                    },
                    &cancel,
                )
                .into_diagnostic()?;
            print_json(&resp)?;
        }

        Commands::RunModel {
            data,
            k,
            horizon,
            model,
        } => {
            let engine = open(config, &data)?;
            let resp = engine
                .run_model(
                    &RunModelRequest {
                        dataset_id: data.id,
                        k,
                        time_horizon_minutes: horizon,
                        model_type: model,
                    },
                    &cancel,
                )
                .into_diagnostic()?;
            print_json(&resp)?;
        }

        Commands::WhatIf {
            data,
            fixed,
            horizon,
            model,
        } => {
            let engine = open(config, &data)?;
            let resp = engine
                .what_if(&WhatIfRequest {
                    dataset_id: data.id,
                    fixed_segment_ids: segment_ids(&fixed)?,
                    time_horizon_minutes: horizon,
                    model_type: model,
                })
                .into_diagnostic()?;
            print_json(&resp)?;
        }

        Commands::Seeds { data, now } => {
            let engine = open(config, &data)?;
            print_json(&engine.seed_set(&data.id, now))?;
        }

        Commands::Flows {
            data,
            horizon,
            min_probability,
        } => {
            let engine = open(config, &data)?;
            let resp = engine
                .influence_flows(&data.id, horizon, min_probability)
                .into_diagnostic()?;
            print_json(&resp)?;
        }

        Commands::Impacts {
            data,
            horizon,
            bottleneck,
        } => {
            let engine = open(config, &data)?;
            let only = bottleneck.map(segment_id).transpose()?;
            let resp = engine
                .bottleneck_impacts(&data.id, horizon, only)
                .into_diagnostic()?;
            print_json(&resp)?;
        }

        Commands::Info { dataset, id } => {
            let engine = Engine::new(config).into_diagnostic()?;
            if let Some(path) = dataset {
                register(&engine, &id, &path)?;
            }
            println!("{}", engine.info().into_diagnostic()?);
        }

        Commands::Config { write } => match write {
            Some(path) => {
                config.save(&path).into_diagnostic()?;
                println!("Wrote configuration to {}", path.display());
            }
            None => print!("{}", config.to_toml().into_diagnostic()?),
        },
    }

    Ok(())
}

/// Build an engine and register the dataset named on the command line.
fn open(config: EngineConfig, data: &DatasetArgs) -> Result<Engine> {
    let engine = Engine::new(config).into_diagnostic()?;
    register(&engine, &data.id, &data.dataset)?;
    Ok(engine)
}

fn register(engine: &Engine, id: &str, path: &Path) -> Result<()> {
    let dataset = Dataset::load(path).into_diagnostic()?;
    engine.register_dataset(id, dataset).into_diagnostic()
}

fn segment_id(raw: u64) -> Result<SegmentId> {
    SegmentId::new(raw).ok_or_else(|| miette::miette!("segment id must be positive, got {raw}"))
}

fn segment_ids(raw: &[u64]) -> Result<Vec<SegmentId>> {
    raw.iter().map(|&r| segment_id(r)).collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).into_diagnostic()?;
    println!("{json}");
    Ok(())
}
