//! Concurrent IoT sensor-fleet simulator with hybrid anomaly detection.
//!
//! The pipeline: each [`SensorSource`] runs an independent periodic
//! production loop that synthesizes a reading, annotates it through the
//! shared [`AnomalyEvaluator`] (pretrained scoring model + deterministic
//! threshold rules), keeps it in a bounded FIFO history, and publishes it to
//! a bounded output channel. The [`FleetManager`] owns the source registry,
//! coordinates bulk start/stop, aggregates per-source statistics into a
//! [`FleetSnapshot`], and drains the output channels to surface alerts.
//!
//! Transport layers (REST/WebSocket gateways) are external consumers of the
//! snapshot and subscription contracts; nothing here persists beyond process
//! memory.

pub mod config;

mod evaluator;
mod fleet;
mod history;
mod models;
mod scoring;
mod source;

pub use config::Config;
pub use evaluator::AnomalyEvaluator;
pub use fleet::FleetManager;
pub use history::HistoryBuffer;
pub use models::{AlertSource, Annotation, FleetSnapshot, Reading, RuleFlags, SourceStatus};
pub use scoring::ScoringModel;
pub use source::{SensorSource, SourceProfile};
