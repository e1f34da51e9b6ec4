//! Summaflow - command-line driver and REST server.
//!
//! `summaflow train` runs the whole pipeline, `summaflow stage <name>` runs a
//! single stage against the latest run, `summaflow predict` summarizes text and
//! `summaflow serve` starts the REST API.

mod server;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::net::SocketAddr;
use std::path::PathBuf;
use summaflow::app::SummaflowApp;
use summaflow::config::PipelineConfig;
use summaflow::core::StageId;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Summaflow - train, promote and serve a dialogue summarization model.
#[derive(Parser, Debug)]
#[command(name = "summaflow", author, version, about)]
struct Args {
    /// Configuration file (TOML)
    #[arg(short, long, global = true, env = "SUMMAFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,

    /// Log output format
    #[arg(long, value_enum, default_value_t = LogFormat::Pretty, global = true)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the REST server
    Serve {
        /// Listen address (overrides the configuration)
        #[arg(long)]
        address: Option<SocketAddr>,
    },

    /// Run the full training pipeline
    Train,

    /// Run a single pipeline stage
    Stage {
        /// ingestion, validation, transformation, training, evaluation or pusher
        #[arg(value_parser = parse_stage)]
        name: StageId,

        /// Run directory to use (defaults to the latest run)
        #[arg(long)]
        run_id: Option<String>,
    },

    /// Summarize a text with the stored best model
    Predict {
        /// Text to summarize
        text: String,
    },
}

fn parse_stage(value: &str) -> Result<StageId, String> {
    value.parse()
}

fn init_tracing(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(&args.log_level, args.log_format);

    let config = PipelineConfig::load(args.config.as_deref()).context("loading configuration")?;
    let app = SummaflowApp::from_config(config);

    match args.command {
        Command::Serve { address } => {
            let address = address.unwrap_or(app.config().server.address);
            server::serve(app, address).await?;
        }
        Command::Train => {
            let result = app.train().await?;
            info!(run_id = %result.run_id, stages = result.records.len(), "training pipeline finished");
        }
        Command::Stage { name, run_id } => {
            let record = app.run_stage(name, run_id.as_deref()).await?;
            info!(stage = %record.stage, duration_ms = record.duration_ms(), "stage finished");
        }
        Command::Predict { text } => {
            let summary = app.predict(&text).await?;
            println!("{summary}");
        }
    }
    Ok(())
}
