//! Shared data models for the sensor-fleet pipeline.
//!
//! Everything that crosses a component boundary lives here: the annotated
//! [`Reading`] produced by each source, the per-rule diagnostics attached to
//! it, and the derived status/snapshot views consumed by external gateways.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---

/// Where an alert came from. A reading with no active signal carries the
/// single tag [`AlertSource::Normal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AlertSource {
    // ---
    ModelScore,
    LowVoltage,
    HighTemperature,
    EfficiencyDrop,
    Normal,
}

impl fmt::Display for AlertSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // ---
        let name = match self {
            AlertSource::ModelScore => "ModelScore",
            AlertSource::LowVoltage => "LowVoltage",
            AlertSource::HighTemperature => "HighTemperature",
            AlertSource::EfficiencyDrop => "EfficiencyDrop",
            AlertSource::Normal => "Normal",
        };
        f.write_str(name)
    }
}

/// Per-rule booleans kept alongside the composite decision for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleFlags {
    // ---
    pub model_score: bool,
    pub low_voltage: bool,
    pub high_temperature: bool,
    pub efficiency_drop: bool,
}

/// Result of evaluating one reading against the hybrid anomaly policy.
///
/// Produced by the evaluator and merged into a [`Reading`] by the source.
/// Invariant: `alert` is true iff `alert_sources` excludes `Normal`, and
/// `alert_sources` is never empty.
#[derive(Debug, Clone, PartialEq)]
pub struct Annotation {
    // ---
    pub alert: bool,
    pub alert_sources: Vec<AlertSource>,
    pub efficiency_delta: Option<f64>,
    pub rule_flags: RuleFlags,
}

/// One annotated observation from one source. Immutable after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    // ---
    pub source_id: String,
    pub captured_at: DateTime<Utc>,
    pub temperature_c: f64,
    pub voltage_v: f64,
    pub efficiency_pct: f64,
    pub alert: bool,
    pub alert_sources: Vec<AlertSource>,
    pub efficiency_delta: Option<f64>,
    pub rule_flags: RuleFlags,
}

impl Reading {
    /// Build a reading from raw measurements plus the evaluator's annotation.
    pub fn new(
        source_id: impl Into<String>,
        captured_at: DateTime<Utc>,
        temperature_c: f64,
        voltage_v: f64,
        efficiency_pct: f64,
        annotation: Annotation,
    ) -> Self {
        // ---
        Reading {
            source_id: source_id.into(),
            captured_at,
            temperature_c,
            voltage_v,
            efficiency_pct,
            alert: annotation.alert,
            alert_sources: annotation.alert_sources,
            efficiency_delta: annotation.efficiency_delta,
            rule_flags: annotation.rule_flags,
        }
    }
}

// ---

/// Exported per-source status view, derived from a source's running counters.
#[derive(Debug, Clone, Serialize)]
pub struct SourceStatus {
    // ---
    pub source_id: String,
    pub active: bool,
    pub total_readings: u64,
    pub total_anomalies: u64,
    pub anomaly_rate_pct: f64,
    pub readings_per_minute: u32,
    pub buffer_occupancy: usize,
    pub has_active_alert: bool,
    pub last_reading: Option<Reading>,
}

/// Point-in-time aggregation over the whole fleet. Computed on demand,
/// never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct FleetSnapshot {
    // ---
    pub generated_at: DateTime<Utc>,
    pub sources: BTreeMap<String, SourceStatus>,
    pub total_readings: u64,
    pub total_anomalies: u64,
    pub global_anomaly_rate_pct: f64,
}

// ---

/// Round to two decimal places, matching the precision sources report at.
pub(crate) fn round2(value: f64) -> f64 {
    // ---
    (value * 100.0).round() / 100.0
}
