//! Configuration loader for the `sensorfleet` simulator.
//!
//! This module centralizes all runtime configuration values and their
//! defaults, loading from environment variables (with optional `.env` file
//! support provided by the caller). By consolidating configuration logic
//! here, we avoid scattering `env::var` calls throughout the codebase.

use std::env;

use anyhow::{anyhow, Result};

/// Parse an optional integer environment variable with a default value.
macro_rules! parse_env_u32 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<u32>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Parse an optional float environment variable with a default value.
macro_rules! parse_env_f64 {
    ($var_name:expr, $default:expr) => {
        env::var($var_name)
            .ok()
            .map(|v| v.parse::<f64>())
            .transpose()
            .map_err(|e| anyhow!("Invalid {}: {}", $var_name, e))?
            .unwrap_or($default)
    };
}

/// Strongly typed application configuration.
///
/// All fields are immutable after loading, ensuring a consistent
/// configuration snapshot for the lifetime of the application.
#[derive(Debug, Clone)]
pub struct Config {
    // ---
    /// Path to the scoring-model parameter file. When unset the evaluator
    /// runs rules-only.
    pub model_path: Option<String>,

    /// History-buffer capacity per source.
    pub buffer_size: u32,

    /// Per-tick fault-injection probability.
    pub fault_probability: f64,

    /// How long the demo binary watches the alert stream.
    pub watch_secs: u32,
}

/// Load configuration from environment variables with defaults.
///
/// Optional:
/// - `FLEET_MODEL_PATH` – scoring-model parameter file (default: none)
/// - `FLEET_BUFFER_SIZE` – per-source history capacity (default: 100)
/// - `FLEET_FAULT_PROBABILITY` – fault-injection probability (default: 0.02)
/// - `FLEET_WATCH_SECS` – alert-watch duration in seconds (default: 30)
///
/// Returns an error if any variable is present but invalid.
pub fn load_from_env() -> Result<Config> {
    // ---
    let model_path = env::var("FLEET_MODEL_PATH").ok();
    let buffer_size = parse_env_u32!("FLEET_BUFFER_SIZE", 100);
    let fault_probability = parse_env_f64!("FLEET_FAULT_PROBABILITY", 0.02);
    let watch_secs = parse_env_u32!("FLEET_WATCH_SECS", 30);

    if !(0.0..=1.0).contains(&fault_probability) {
        return Err(anyhow!(
            "FLEET_FAULT_PROBABILITY must be in [0, 1], got {fault_probability}"
        ));
    }
    if buffer_size == 0 {
        return Err(anyhow!("FLEET_BUFFER_SIZE must be at least 1"));
    }

    Ok(Config {
        model_path,
        buffer_size,
        fault_probability,
        watch_secs,
    })
}

impl Config {
    /// Log the loaded configuration for debugging purposes.
    pub fn log_config(&self) {
        // ---
        tracing::info!("Configuration loaded:");
        tracing::info!(
            "  FLEET_MODEL_PATH        : {}",
            self.model_path.as_deref().unwrap_or("(unset, rules-only)")
        );
        tracing::info!("  FLEET_BUFFER_SIZE       : {}", self.buffer_size);
        tracing::info!("  FLEET_FAULT_PROBABILITY : {}", self.fault_probability);
        tracing::info!("  FLEET_WATCH_SECS        : {}", self.watch_secs);
    }
}
