//! Camtrail - offline multi-camera intrusion and identity correlation
//!
//! Reads per-camera trajectory files, detects debounced zone intrusions,
//! clusters tracks into global identities and writes an enriched event log.
//!
//! Module structure:
//! - `domain/` - Core types (Track, Zone, Event, EventLog)
//! - `io/` - File inputs and outputs (trajectories, site files, egress, report)
//! - `services/` - Processing stages (TimeSync, ZoneIndex, intrusion, identity, enrichment)
//! - `infra/` - Infrastructure (Config, Metrics, Diagnostics)

use camtrail::infra::{Config, Diagnostics, RunMetrics};
use camtrail::io::{load_run_inputs, Egress, RunReport};
use camtrail::services::Pipeline;
use clap::Parser;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::fmt::time::UtcTime;
use tracing_subscriber::EnvFilter;

/// Camtrail - multi-camera identity resolution and intrusion event correlation
#[derive(Parser, Debug)]
#[command(name = "camtrail", version, about)]
struct Args {
    /// Path to TOML configuration file (falls back to CONFIG_FILE, then config/camtrail.toml)
    #[arg(short, long)]
    config: Option<String>,

    /// Override `input.trajectories_dir`
    #[arg(long)]
    trajectories_dir: Option<String>,

    /// Override `output.dir`
    #[arg(long)]
    output_dir: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Structured logging, level via RUST_LOG (default: info)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .init();

    info!(version = %env!("CARGO_PKG_VERSION"), git_hash = %env!("GIT_HASH"), "camtrail starting");

    let args = Args::parse();

    let config_path = args.config.unwrap_or_else(|| Config::resolve_config_path(&[]));
    let mut config = Config::load_from_path(&config_path);
    if let Some(dir) = args.trajectories_dir {
        config = config.with_trajectories_dir(dir);
    }
    if let Some(dir) = args.output_dir {
        config = config.with_output_dir(dir);
    }

    info!(
        config_file = %config.config_file(),
        trajectories_dir = %config.trajectories_dir().display(),
        output_dir = %config.output_dir().display(),
        min_duration_s = %config.min_duration_s(),
        containment = ?config.containment(),
        threshold = %config.threshold(),
        match_order = ?config.match_order(),
        dedup_window_s = %config.dedup_window_s(),
        workers = %config.workers(),
        "config_loaded"
    );

    let metrics = Arc::new(RunMetrics::new());
    let diagnostics = Arc::new(Diagnostics::new());

    // Handle shutdown on Ctrl+C
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("shutdown_signal_received");
        let _ = shutdown_tx.send(true);
    });

    let inputs = load_run_inputs(&config, &diagnostics, &metrics)?;
    let pipeline = Pipeline::new(config.clone(), Arc::clone(&metrics), Arc::clone(&diagnostics));
    let output = pipeline.run(inputs, shutdown_rx).await?;

    Egress::new(config.events_path()).write_events(&output.events)?;
    Egress::new(config.identities_path()).write_identities(&output.registry)?;

    let summary = metrics.summary();
    let report = RunReport::build(&output, &diagnostics, summary.clone());
    Egress::new(config.report_path()).write_json(&report)?;

    summary.log();
    if output.cancelled {
        warn!(run_id = %report.run_id, "camtrail stopped early, outputs hold a partial run");
    } else {
        info!(run_id = %report.run_id, diagnostics = %diagnostics.len(), "camtrail run complete");
    }
    Ok(())
}
