//! Fleet-wide coordination: registry, bulk lifecycle, aggregation, alerts.
//!
//! The [`FleetManager`] owns every registered [`SensorSource`] in an explicit
//! collection; there is no ambient registry. It never reaches into a
//! source's internals: lifecycle and queries go through the source's own
//! start/stop/snapshot contract, and alert draining reads only the output
//! channels the sources publish to.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{info, warn};

use crate::evaluator::AnomalyEvaluator;
use crate::models::{round2, FleetSnapshot, Reading, SourceStatus};
use crate::source::{SensorSource, SourceProfile};

// ---

/// Bounded wait applied to each source during `stop`/`stop_all`.
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Poll interval between channel drain sweeps in `watch_alerts`.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cadence of the aggregated status line in `watch_alerts`.
const STATUS_INTERVAL: Duration = Duration::from_secs(10);

struct SourceEntry {
    // ---
    source: SensorSource,
    alerts: broadcast::Receiver<Arc<Reading>>,
}

/// Registry and coordinator for all simulated sources.
pub struct FleetManager {
    // ---
    evaluator: Arc<AnomalyEvaluator>,
    sources: BTreeMap<String, SourceEntry>,
}

impl FleetManager {
    pub fn new(evaluator: AnomalyEvaluator) -> Self {
        // ---
        FleetManager {
            evaluator: Arc::new(evaluator),
            sources: BTreeMap::new(),
        }
    }

    /// Register a new source with the baseline profile for its id. Rejects
    /// duplicate ids.
    pub fn register(&mut self, source_id: &str, interval: Duration, buffer_capacity: usize) -> bool {
        // ---
        self.register_with_profile(
            source_id,
            interval,
            buffer_capacity,
            SourceProfile::for_id(source_id),
        )
    }

    /// Register a new source with an explicit simulation profile.
    pub fn register_with_profile(
        &mut self,
        source_id: &str,
        interval: Duration,
        buffer_capacity: usize,
        profile: SourceProfile,
    ) -> bool {
        // ---
        if self.sources.contains_key(source_id) {
            warn!(source = source_id, "already registered, ignoring");
            return false;
        }

        let source = SensorSource::new(
            source_id,
            interval,
            buffer_capacity,
            Arc::clone(&self.evaluator),
            profile,
        );
        let alerts = source.subscribe();

        self.sources
            .insert(source_id.to_string(), SourceEntry { source, alerts });
        info!(source = source_id, ?interval, buffer_capacity, "source registered");
        true
    }

    /// Start one source. `false` for an unknown id or an already-running
    /// source.
    pub fn start(&self, source_id: &str) -> bool {
        // ---
        match self.sources.get(source_id) {
            Some(entry) => entry.source.start(),
            None => {
                warn!(source = source_id, "cannot start unknown source");
                false
            }
        }
    }

    /// Stop one source with the default bounded wait. `false` for an unknown
    /// id, a source that was not running, or an unconfirmed stop.
    pub async fn stop(&self, source_id: &str) -> bool {
        // ---
        match self.sources.get(source_id) {
            Some(entry) => entry.source.stop(STOP_TIMEOUT).await,
            None => {
                warn!(source = source_id, "cannot stop unknown source");
                false
            }
        }
    }

    /// Start every registered source; one source failing to transition does
    /// not skip the rest. Returns how many transitioned.
    pub fn start_all(&self) -> usize {
        // ---
        let started = self
            .sources
            .values()
            .filter(|entry| entry.source.start())
            .count();
        info!("started {started} of {} sources", self.sources.len());
        started
    }

    /// Stop every registered source; returns how many confirmed stops.
    pub async fn stop_all(&self) -> usize {
        // ---
        let mut stopped = 0;
        for entry in self.sources.values() {
            if entry.source.stop(STOP_TIMEOUT).await {
                stopped += 1;
            }
        }
        info!("stopped {stopped} of {} sources", self.sources.len());
        stopped
    }

    /// Up to the last `n` readings of one source, empty for an unknown id.
    pub fn recent(&self, source_id: &str, n: usize) -> Vec<Arc<Reading>> {
        // ---
        self.sources
            .get(source_id)
            .map(|entry| entry.source.recent(n))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// Aggregate every source's current statistics into a fleet snapshot.
    /// Read-only; safe to call while production loops run.
    pub fn snapshot(&self) -> FleetSnapshot {
        // ---
        let mut sources: BTreeMap<String, SourceStatus> = BTreeMap::new();
        let mut total_readings = 0u64;
        let mut total_anomalies = 0u64;

        for (id, entry) in &self.sources {
            let status = entry.source.snapshot();
            total_readings += status.total_readings;
            total_anomalies += status.total_anomalies;
            sources.insert(id.clone(), status);
        }

        let global_anomaly_rate_pct = if total_readings == 0 {
            0.0
        } else {
            round2(total_anomalies as f64 / total_readings as f64 * 100.0)
        };

        FleetSnapshot {
            generated_at: Utc::now(),
            sources,
            total_readings,
            total_anomalies,
            global_anomaly_rate_pct,
        }
    }

    /// Monitor the fleet for `duration`: drain each source's output channel
    /// non-blockingly, log every alerting reading as it arrives, and emit an
    /// aggregated status line on a fixed cadence.
    ///
    /// Diagnostic utility; the snapshot/subscription contract is the primary
    /// consumption path for gateways.
    pub async fn watch_alerts(&mut self, duration: Duration) {
        // ---
        info!("watching alerts for {duration:?}");
        let started = Instant::now();
        let mut last_status: Option<Instant> = None;

        while started.elapsed() < duration {
            for entry in self.sources.values_mut() {
                drain_entry(entry);
            }

            let status_due = last_status
                .map(|at| at.elapsed() >= STATUS_INTERVAL)
                .unwrap_or(true);
            if status_due {
                self.log_status(started.elapsed());
                last_status = Some(Instant::now());
            }

            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }

        info!("alert watch finished after {:?}", started.elapsed());
    }

    fn log_status(&self, elapsed: Duration) {
        // ---
        info!("fleet status at {}s:", elapsed.as_secs());
        for (id, status) in &self.snapshot().sources {
            info!(
                "  [{id}] {} readings, {} anomalies ({:.1}%)",
                status.total_readings, status.total_anomalies, status.anomaly_rate_pct
            );
        }
    }
}

/// Drain one source's channel without blocking, logging alerting readings.
fn drain_entry(entry: &mut SourceEntry) {
    // ---
    loop {
        match entry.alerts.try_recv() {
            Ok(reading) => {
                if reading.alert {
                    log_alert(&reading);
                }
            }
            Err(TryRecvError::Lagged(skipped)) => {
                // Overflow dropped the oldest entries; the receiver is
                // repositioned and keeps going.
                warn!(
                    source = %entry.source.id(),
                    "alert stream lagged, {skipped} readings dropped"
                );
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}

fn log_alert(reading: &Reading) {
    // ---
    let sources = reading
        .alert_sources
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ");

    warn!(
        "ALERT [{}] {} - T: {:.1}C | V: {:.1}V | E: {:.1}% | sources: {sources}",
        reading.source_id,
        reading.captured_at.format("%H:%M:%S"),
        reading.temperature_c,
        reading.voltage_v,
        reading.efficiency_pct,
    );
    if let Some(delta) = reading.efficiency_delta {
        warn!("  efficiency delta: {delta:.2}%");
    }
}
