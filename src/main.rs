//! Application entry point for the `sensorfleet` simulator.
//!
//! This binary orchestrates the full startup sequence for the fleet
//! simulation, including:
//! - Loading configuration from environment variables or `.env`
//! - Initializing structured logging/tracing
//! - Loading the scoring model (degrading to rules-only if unavailable)
//! - Registering the demo fleet and starting every production loop
//! - Watching the alert stream until the configured duration elapses or
//!   Ctrl-C is received
//! - Stopping the fleet cooperatively and logging final totals
//!
//! # Environment Variables
//! - `FLEET_MODEL_PATH` (optional) – scoring-model parameter file
//! - `FLEET_BUFFER_SIZE` (optional) – per-source history capacity (default: 100)
//! - `FLEET_FAULT_PROBABILITY` (optional) – fault-injection probability (default: 0.02)
//! - `FLEET_WATCH_SECS` (optional) – alert-watch duration (default: 30)
//! - `FLEET_LOG_LEVEL` (optional) – log verbosity (default: `info`)
//! - `FLEET_SPAN_EVENTS` (optional) – span event mode for tracing

use std::{env, io::IsTerminal, time::Duration};

use anyhow::Result;
use dotenvy::dotenv;
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;

use sensorfleet::{config, AnomalyEvaluator, FleetManager, ScoringModel, SourceProfile};

// ---

/// Demo fleet: id and production interval, as in the reference deployment.
const DEMO_FLEET: [(&str, u64); 3] = [
    ("SENSOR_01", 800),
    ("SENSOR_02", 1200),
    ("SENSOR_03", 1000),
];

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    init_tracing();
    dotenv().ok();

    let cfg = config::load_from_env()?;
    cfg.log_config();

    let model = load_model(&cfg);
    let evaluator = AnomalyEvaluator::new(model);
    let mut fleet = FleetManager::new(evaluator);

    for (source_id, interval_ms) in DEMO_FLEET {
        let profile =
            SourceProfile::for_id(source_id).with_fault_probability(cfg.fault_probability);
        fleet.register_with_profile(
            source_id,
            Duration::from_millis(interval_ms),
            cfg.buffer_size as usize,
            profile,
        );
    }

    fleet.start_all();

    tokio::select! {
        _ = fleet.watch_alerts(Duration::from_secs(cfg.watch_secs.into())) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupted, shutting down");
        }
    }

    fleet.stop_all().await;

    let snapshot = fleet.snapshot();
    tracing::info!(
        "final totals: {} readings, {} anomalies ({:.1}% global rate)",
        snapshot.total_readings,
        snapshot.total_anomalies,
        snapshot.global_anomaly_rate_pct
    );

    Ok(())
}

// ---

/// Load the scoring model if configured; any failure degrades the pipeline
/// to rules-only evaluation rather than aborting startup.
fn load_model(cfg: &config::Config) -> Option<ScoringModel> {
    // ---
    let path = cfg.model_path.as_deref()?;
    match ScoringModel::load(path) {
        Ok(model) => {
            tracing::info!("scoring model loaded from {path}");
            Some(model)
        }
        Err(e) => {
            tracing::warn!("scoring model unavailable, running rules-only: {e:#}");
            None
        }
    }
}

/// Initialize the global tracing subscriber for structured logging.
///
/// This function configures the [`tracing_subscriber`] with:
/// - Log target, file, and line number output enabled
/// - Color output controlled by TTY detection and `FORCE_COLOR` env var:
///   - `FORCE_COLOR=1|true|yes`: force colors on
///   - `FORCE_COLOR=0|false|no`: force colors off
///   - unset or other values: auto-detect TTY
/// - Span event emission mode controlled by the `FLEET_SPAN_EVENTS` env var:
///   - `"full"`       : emit ENTER, EXIT, and CLOSE events with timing
///   - `"enter_exit"` : emit ENTER and EXIT only
///   - unset or other values: emit CLOSE events only (default)
/// - Log level controlled by the `FLEET_LOG_LEVEL` env var
///
/// This should be called once at application startup before any logging
/// or tracing macros are invoked. It installs the subscriber globally
/// for the lifetime of the process.
fn init_tracing() {
    // ---
    let span_events = match env::var("FLEET_SPAN_EVENTS").as_deref() {
        Ok("full") => FmtSpan::FULL,
        Ok("enter_exit") => FmtSpan::ENTER | FmtSpan::EXIT,
        _ => FmtSpan::CLOSE,
    };

    // Determine if we should use colors
    let use_color = match env::var("FORCE_COLOR").as_deref() {
        Ok("1") | Ok("true") | Ok("yes") => true,
        Ok("0") | Ok("false") | Ok("no") => false,
        _ => std::io::stdout().is_terminal(),
    };

    // Use RUST_LOG if available, otherwise fall back to FLEET_LOG_LEVEL
    let env_filter = if env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        let level = match env::var("FLEET_LOG_LEVEL").ok().as_deref() {
            Some("trace") => "trace",
            Some("debug") => "debug",
            Some("info") => "info",
            Some("warn") => "warn",
            Some("error") => "error",
            _ => "info",
        };
        EnvFilter::new(level.to_string())
    };

    tracing_subscriber::fmt()
        .with_target(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(span_events)
        .with_env_filter(env_filter)
        .with_ansi(use_color)
        .compact()
        .init();
}
