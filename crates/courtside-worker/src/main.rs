//! Match analytics worker binary.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use courtside_models::MatchId;
use courtside_worker::{
    metrics, AnalyticsSink, ApiAnalyticsSink, Capabilities, JsonFileSink, MatchProcessor,
    MatchRequest, TracingStatusSink, WorkerConfig,
};

#[derive(Debug, Parser)]
#[command(name = "courtside-worker", version, about = "Tennis match video analytics")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Analyze one match video and persist the analytics
    Process {
        #[arg(long)]
        match_id: u64,
        #[arg(long)]
        video: PathBuf,
        /// Write the payload to this file instead of posting it to the API
        #[arg(long)]
        output: Option<PathBuf>,
        #[arg(long)]
        no_highlights: bool,
        /// Write Prometheus metrics to this file when the run ends
        #[arg(long)]
        metrics_out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing()?;

    let cli = Cli::parse();
    match cli.command {
        Command::Process {
            match_id,
            video,
            output,
            no_highlights,
            metrics_out,
        } => process(match_id, video, output, !no_highlights, metrics_out).await,
    }
}

async fn process(
    match_id: u64,
    video: PathBuf,
    output: Option<PathBuf>,
    highlights: bool,
    metrics_out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let metrics_handle = metrics::init_metrics()?;

    let config = WorkerConfig::from_env();
    info!(config = ?config, "Worker config");

    let capabilities = Capabilities::load(&config.models, config.pipeline.batch_size);
    let sink: Arc<dyn AnalyticsSink> = match output {
        Some(path) => Arc::new(JsonFileSink::new(path)),
        None => Arc::new(ApiAnalyticsSink::new(config.clone())?),
    };
    let processor = MatchProcessor::new(config, capabilities, Arc::new(TracingStatusSink), sink);

    let (cancel_tx, cancel_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received shutdown signal, cancelling run");
            cancel_tx.send(true).ok();
        }
    });

    let request = MatchRequest::new(MatchId::new(match_id), video).with_highlights(highlights);
    let result = processor.process(&request, cancel_rx).await;

    if let Some(path) = metrics_out {
        tokio::fs::write(&path, metrics_handle.render())
            .await
            .with_context(|| format!("writing metrics to {}", path.display()))?;
    }

    let analytics = result.with_context(|| format!("processing match {}", match_id))?;
    info!(
        match_id,
        run_id = %analytics.run_id,
        shots = analytics.shots.len(),
        rallies = analytics.rally_stats.total_rallies,
        "Match processed"
    );
    Ok(())
}

fn init_tracing() -> anyhow::Result<()> {
    // Colored output for dev, JSON for production
    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);

    let env_filter = EnvFilter::from_default_env()
        .add_directive("courtside=info".parse()?)
        .add_directive("ort=warn".parse()?);

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false),
            )
            .with(env_filter)
            .init();
    }
    Ok(())
}
