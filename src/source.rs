//! A single simulated telemetry source and its production loop.
//!
//! Each [`SensorSource`] owns its drift state, history buffer, running
//! statistics, and output channel. The production loop runs as one spawned
//! tokio task per source: synthesize a reading from Gaussian baselines plus
//! bounded drift, annotate it through the shared [`AnomalyEvaluator`], append
//! it to the history buffer, publish it, update counters, sleep, repeat.
//! Shutdown is cooperative: `stop` clears the running flag and waits a
//! bounded time for the loop to observe it between ticks.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};

use anyhow::Result;
use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::Normal;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::evaluator::AnomalyEvaluator;
use crate::history::HistoryBuffer;
use crate::models::{round2, Reading, SourceStatus};

// ---

/// Bound on the per-source output channel. The broadcast ring overwrites the
/// oldest value when full, so a stalled consumer costs memory up to this
/// depth and nothing more.
const READING_CHANNEL_CAPACITY: usize = 256;

/// Rolling window for the readings-per-minute figure.
const RATE_WINDOW: Duration = Duration::from_secs(60);

/// Drift accumulators are clamped to these symmetric bounds so the random
/// walk cannot run away from the baseline.
const TEMP_DRIFT_BOUND: f64 = 3.0;
const VOLT_DRIFT_BOUND: f64 = 8.0;
const EFFIC_DRIFT_BOUND: f64 = 4.0;

/// Static per-source simulation parameters: Gaussian baselines, per-tick
/// drift step widths, and the fault-injection probability.
#[derive(Debug, Clone, Copy)]
pub struct SourceProfile {
    // ---
    pub temperature_base: f64,
    pub temperature_std: f64,
    pub voltage_base: f64,
    pub voltage_std: f64,
    pub efficiency_base: f64,
    pub efficiency_std: f64,
    pub fault_probability: f64,
}

impl SourceProfile {
    /// Baseline parameters for the well-known fleet members; unknown ids get
    /// the SENSOR_01 defaults.
    pub fn for_id(source_id: &str) -> Self {
        // ---
        match source_id {
            "SENSOR_02" => SourceProfile {
                temperature_base: 68.0,
                temperature_std: 2.5,
                voltage_base: 218.0,
                voltage_std: 4.0,
                efficiency_base: 80.0,
                efficiency_std: 2.8,
                fault_probability: 0.02,
            },
            "SENSOR_03" => SourceProfile {
                temperature_base: 72.0,
                temperature_std: 3.5,
                voltage_base: 222.0,
                voltage_std: 6.0,
                efficiency_base: 84.0,
                efficiency_std: 3.2,
                fault_probability: 0.02,
            },
            _ => SourceProfile {
                temperature_base: 70.0,
                temperature_std: 3.0,
                voltage_base: 220.0,
                voltage_std: 5.0,
                efficiency_base: 82.0,
                efficiency_std: 3.0,
                fault_probability: 0.02,
            },
        }
    }

    pub fn with_fault_probability(mut self, probability: f64) -> Self {
        // ---
        self.fault_probability = probability;
        self
    }
}

/// Slow per-source calibration decay: three accumulators updated by a small
/// random step each tick and clamped to fixed bounds. Owned exclusively by
/// the production loop.
#[derive(Debug, Default)]
struct DriftState {
    // ---
    temperature: f64,
    voltage: f64,
    efficiency: f64,
}

impl DriftState {
    fn update(&mut self, rng: &mut StdRng) -> Result<()> {
        // ---
        self.temperature =
            (self.temperature + rng.sample(Normal::new(0.0, 0.02)?)).clamp(-TEMP_DRIFT_BOUND, TEMP_DRIFT_BOUND);
        self.voltage =
            (self.voltage + rng.sample(Normal::new(0.0, 0.1)?)).clamp(-VOLT_DRIFT_BOUND, VOLT_DRIFT_BOUND);
        self.efficiency =
            (self.efficiency + rng.sample(Normal::new(0.0, 0.05)?)).clamp(-EFFIC_DRIFT_BOUND, EFFIC_DRIFT_BOUND);
        Ok(())
    }
}

/// State shared between the production task and callers.
struct SourceInner {
    // ---
    id: String,
    interval: Duration,
    profile: SourceProfile,
    evaluator: Arc<AnomalyEvaluator>,
    running: AtomicBool,
    history: RwLock<HistoryBuffer>,
    total_readings: AtomicU64,
    total_anomalies: AtomicU64,
    readings_per_minute: AtomicU32,
    tx: broadcast::Sender<Arc<Reading>>,
}

/// One simulated telemetry origin with its own lifecycle and statistics.
pub struct SensorSource {
    // ---
    inner: Arc<SourceInner>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl SensorSource {
    pub fn new(
        source_id: impl Into<String>,
        interval: Duration,
        buffer_capacity: usize,
        evaluator: Arc<AnomalyEvaluator>,
        profile: SourceProfile,
    ) -> Self {
        // ---
        let (tx, _rx) = broadcast::channel(READING_CHANNEL_CAPACITY);

        SensorSource {
            inner: Arc::new(SourceInner {
                id: source_id.into(),
                interval,
                profile,
                evaluator,
                running: AtomicBool::new(false),
                history: RwLock::new(HistoryBuffer::new(buffer_capacity)),
                total_readings: AtomicU64::new(0),
                total_anomalies: AtomicU64::new(0),
                readings_per_minute: AtomicU32::new(0),
                tx,
            }),
            handle: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        // ---
        &self.inner.id
    }

    pub fn is_running(&self) -> bool {
        // ---
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Subscribe to the source's output channel. Every annotated reading is
    /// published here; slow consumers lose the oldest entries first.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Reading>> {
        // ---
        self.inner.tx.subscribe()
    }

    /// Launch the production loop. No-op (returns `false`) when already
    /// running. Must be called from within a tokio runtime.
    pub fn start(&self) -> bool {
        // ---
        if self.inner.running.swap(true, Ordering::SeqCst) {
            return false;
        }

        let inner = Arc::clone(&self.inner);
        let task = tokio::spawn(production_loop(inner));
        *lock_recovering(&self.handle) = Some(task);
        true
    }

    /// Request a cooperative stop and wait up to `timeout` for the loop to
    /// observe the cleared flag between ticks.
    ///
    /// Returns `true` when the stop was confirmed within budget. Returns
    /// `false` when the source was not running, or when the loop did not exit
    /// in time; the flag stays cleared in that case, so the loop still exits
    /// at its next flag check.
    pub async fn stop(&self, timeout: Duration) -> bool {
        // ---
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            return false;
        }

        let task = lock_recovering(&self.handle).take();
        let Some(task) = task else {
            return true;
        };

        match tokio::time::timeout(timeout, task).await {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(source = %self.inner.id, "production task failed during shutdown: {e}");
                true
            }
            Err(_) => {
                warn!(
                    source = %self.inner.id,
                    "stop not confirmed within {timeout:?}; loop exits at next flag check"
                );
                false
            }
        }
    }

    /// Current statistics view. Reads atomics plus a short history read-lock;
    /// safe to call concurrently with the production loop.
    pub fn snapshot(&self) -> SourceStatus {
        // ---
        let total_readings = self.inner.total_readings.load(Ordering::Relaxed);
        let total_anomalies = self.inner.total_anomalies.load(Ordering::Relaxed);
        let anomaly_rate_pct = round2(total_anomalies as f64 / total_readings.max(1) as f64 * 100.0);

        let history = read_recovering(&self.inner.history);
        let last_reading = history.latest().map(|r| (**r).clone());

        SourceStatus {
            source_id: self.inner.id.clone(),
            active: self.is_running(),
            total_readings,
            total_anomalies,
            anomaly_rate_pct,
            readings_per_minute: self.inner.readings_per_minute.load(Ordering::Relaxed),
            buffer_occupancy: history.len(),
            has_active_alert: last_reading.as_ref().map(|r| r.alert).unwrap_or(false),
            last_reading,
        }
    }

    /// Up to the last `n` readings in insertion order, fewer if the history
    /// holds fewer.
    pub fn recent(&self, n: usize) -> Vec<Arc<Reading>> {
        // ---
        read_recovering(&self.inner.history).recent(n)
    }
}

// ---

/// The per-source production loop. Runs until the flag is cleared; a failed
/// tick is logged and retried after the normal sleep rather than terminating
/// the source.
async fn production_loop(inner: Arc<SourceInner>) {
    // ---
    info!(source = %inner.id, interval = ?inner.interval, "source started");

    let mut rng = StdRng::from_entropy();
    let mut drift = DriftState::default();
    let mut window_start = Instant::now();
    let mut window_count: u32 = 0;

    while inner.running.load(Ordering::SeqCst) {
        match tick(&inner, &mut rng, &mut drift) {
            Ok(reading) => {
                inner.total_readings.fetch_add(1, Ordering::Relaxed);
                if reading.alert {
                    inner.total_anomalies.fetch_add(1, Ordering::Relaxed);
                    debug!(
                        source = %inner.id,
                        sources = %format_sources(&reading),
                        "anomalous reading"
                    );
                }
                window_count += 1;
            }
            Err(e) => {
                error!(source = %inner.id, "tick failed, retrying after interval: {e}");
            }
        }

        if window_start.elapsed() >= RATE_WINDOW {
            inner.readings_per_minute.store(window_count, Ordering::Relaxed);
            window_count = 0;
            window_start = Instant::now();
        }

        tokio::time::sleep(inner.interval).await;
    }

    info!(source = %inner.id, "source stopped");
}

/// Synthesize, annotate, buffer, and publish one reading.
fn tick(inner: &SourceInner, rng: &mut StdRng, drift: &mut DriftState) -> Result<Arc<Reading>> {
    // ---
    let profile = &inner.profile;

    // Every tick draws all three measurements from the drifted baselines; a
    // fault branch then overrides the affected one.
    let mut temperature = rng.sample(Normal::new(
        profile.temperature_base + drift.temperature,
        profile.temperature_std,
    )?);
    let mut voltage = rng.sample(Normal::new(
        profile.voltage_base + drift.voltage,
        profile.voltage_std,
    )?);
    let efficiency = rng.sample(Normal::new(
        profile.efficiency_base + drift.efficiency,
        profile.efficiency_std,
    )?);

    if rng.gen::<f64>() < profile.fault_probability {
        if rng.gen::<f64>() < 0.3 {
            // Undervoltage fault.
            voltage = rng.sample(Normal::new(200.0, 5.0)?);
        } else if rng.gen::<f64>() < 0.3 {
            // Thermal fault.
            temperature = rng.sample(Normal::new(85.0, 2.0)?);
        }
        // Otherwise the reading stays nominal-looking; a later efficiency
        // drop or the model score is what flags this path.
    }

    drift.update(rng)?;

    let temperature = round2(temperature);
    let voltage = round2(voltage);
    let efficiency = round2(efficiency);

    let previous_efficiency = read_recovering(&inner.history)
        .latest()
        .map(|r| r.efficiency_pct);

    let annotation = inner
        .evaluator
        .evaluate(temperature, voltage, efficiency, previous_efficiency);

    let reading = Arc::new(Reading::new(
        inner.id.clone(),
        Utc::now(),
        temperature,
        voltage,
        efficiency,
        annotation,
    ));

    write_recovering(&inner.history).push(Arc::clone(&reading));

    // Send only fails when no receiver exists, which is fine: publication is
    // best-effort and the history buffer already has the reading.
    let _ = inner.tx.send(Arc::clone(&reading));

    Ok(reading)
}

fn format_sources(reading: &Reading) -> String {
    // ---
    reading
        .alert_sources
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

// A poisoned lock means a tick panicked mid-update; the guarded structures
// are still well-formed (push/read are single operations), so recover the
// guard instead of propagating the poison.
fn lock_recovering<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn read_recovering<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|e| e.into_inner())
}

fn write_recovering<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|e| e.into_inner())
}
