//! footprint-harvest - batch footprint extraction
//!
//! Loads a target list, harmonizes each target against the refinement
//! oracle, segments a final capture and exports one CSV row per polygon.
//! Ctrl-C stops the batch at the next target boundary; the rows gathered so
//! far are still exported.

use anyhow::{Context, Result};
use clap::Parser;
use footprint_common::config::{write_toml_config, ConfigResolver, TomlConfig};
use footprint_common::events::{BatchEvent, EventBus};
use footprint_harvest::config::resolve_oracle_endpoints;
use footprint_harvest::oracle::{HttpRefinementClient, HttpSegmentationClient};
use footprint_harvest::orchestrator::BatchOrchestrator;
use footprint_harvest::reporter::EventReporter;
use footprint_harvest::sink::CsvResultSink;
use footprint_harvest::surface::{TileMosaicConfig, TileMosaicSurface};
use footprint_harvest::targets::load_targets;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for footprint-harvest
#[derive(Parser, Debug)]
#[command(name = "footprint-harvest")]
#[command(about = "Extract geo-referenced footprints for a list of point targets")]
#[command(version)]
struct Args {
    /// Target list (CSV with id + lat/lng or wkt_geom columns)
    #[arg(short, long, env = "FOOTPRINT_TARGETS", required_unless_present = "init_config")]
    targets: Option<PathBuf>,

    /// Configuration file (overrides FOOTPRINT_CONFIG and the default location)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Directory for the CSV export (overrides [export].output_dir)
    #[arg(short, long, env = "FOOTPRINT_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// Process only the first N targets
    #[arg(long)]
    limit: Option<usize>,

    /// Refinement oracle endpoint
    #[arg(long)]
    refinement_url: Option<String>,

    /// Segmentation oracle endpoint
    #[arg(long)]
    segmentation_url: Option<String>,

    /// Append every batch event to this file as JSON lines
    #[arg(long)]
    event_log: Option<PathBuf>,

    /// Write a config file with all defaults to this path and exit
    #[arg(long, value_name = "PATH")]
    init_config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = &args.init_config {
        write_toml_config(&TomlConfig::default(), path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        println!("Wrote default configuration to {}", path.display());
        return Ok(());
    }

    let (mut config, source) = ConfigResolver::new("harvest")
        .resolve(args.config.as_deref())
        .context("Failed to load configuration")?;

    // Initialize tracing (RUST_LOG wins over [logging].level)
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.logging.level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting footprint-harvest {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Build: {} ({}, {})",
        env!("GIT_HASH"),
        env!("BUILD_PROFILE"),
        env!("BUILD_TIMESTAMP")
    );
    info!("Configuration source: {:?}", source);

    if let Some(dir) = &args.output_dir {
        config.export.output_dir = dir.clone();
    }
    config.validate().context("Invalid configuration")?;

    let endpoints = resolve_oracle_endpoints(
        args.refinement_url.as_deref(),
        args.segmentation_url.as_deref(),
        &config,
    )
    .context("Failed to resolve oracle endpoints")?;

    let targets_path = args
        .targets
        .as_deref()
        .context("--targets is required")?;
    let mut targets = load_targets(targets_path)
        .with_context(|| format!("Failed to load targets from {}", targets_path.display()))?;
    if let Some(limit) = args.limit {
        targets.truncate(limit);
    }
    if targets.is_empty() {
        warn!("Target list is empty, the export will only contain a header");
    }

    let event_bus = EventBus::new(256);
    let event_log = match &args.event_log {
        Some(path) => Some(spawn_event_log(&event_bus, path).await?),
        None => None,
    };

    let timeout = Duration::from_secs(config.oracles.timeout_secs);
    let refinement = HttpRefinementClient::new(endpoints.refinement_url.clone(), timeout)
        .context("Failed to create refinement client")?;
    let segmentation = HttpSegmentationClient::new(endpoints.segmentation_url.clone(), timeout)
        .context("Failed to create segmentation client")?;
    info!("Refinement oracle: {}", endpoints.refinement_url);
    info!("Segmentation oracle: {}", endpoints.segmentation_url);

    let surface = TileMosaicSurface::new(TileMosaicConfig::from_settings(&config.surface))
        .context("Failed to create tile surface")?;
    let sink = CsvResultSink::new(&config.export.output_dir, config.export.file_prefix.clone());

    let mut orchestrator =
        BatchOrchestrator::from_config(surface, Arc::new(refinement), Arc::new(segmentation), &config)
            .with_sink(Box::new(sink));

    let cancel = CancellationToken::new();
    let ctrl_c_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, stopping after the current target");
            ctrl_c_token.cancel();
        }
    });

    let reporter = EventReporter::new(event_bus);
    let report = orchestrator.run(&targets, &reporter, &cancel).await;

    // Closing the last sender ends the event log writer
    drop(reporter);
    if let Some(handle) = event_log {
        if let Err(e) = handle.await {
            warn!("Event log writer failed: {}", e);
        }
    }

    info!(
        "Finished: {} rows, {} succeeded, {} failed{}",
        report.rows.len(),
        report.succeeded(),
        report.failed(),
        report
            .export_path
            .as_ref()
            .map(|p| format!(", export {}", p.display()))
            .unwrap_or_default()
    );
    Ok(())
}

/// Write every event as one JSON line until the bus closes
async fn spawn_event_log(bus: &EventBus, path: &Path) -> Result<JoinHandle<()>> {
    let file = tokio::fs::File::create(path)
        .await
        .with_context(|| format!("Failed to create event log {}", path.display()))?;
    let mut rx = bus.subscribe();
    let path = path.to_path_buf();

    Ok(tokio::spawn(async move {
        let mut writer = tokio::io::BufWriter::new(file);
        loop {
            let event: BatchEvent = match rx.recv().await {
                Ok(event) => event,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Event log fell behind, events dropped");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            let mut line = match serde_json::to_string(&event) {
                Ok(line) => line,
                Err(e) => {
                    warn!("Failed to serialize event: {}", e);
                    continue;
                }
            };
            line.push('\n');
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                warn!("Event log write to {} failed: {}", path.display(), e);
                return;
            }
        }
        if let Err(e) = writer.flush().await {
            warn!("Event log flush failed: {}", e);
        }
    }))
}
