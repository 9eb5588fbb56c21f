//! End-to-end tests over the library surface: the annotate-buffer chain a
//! source runs per tick, and a live fleet exercising the full pipeline.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;

use sensorfleet::{
    AlertSource, AnomalyEvaluator, FleetManager, HistoryBuffer, Reading, SourceProfile,
};

// ---

/// Run one reading through the same evaluate-then-buffer chain a source's
/// production loop uses, with fixed nominal temperature and voltage.
fn feed(evaluator: &AnomalyEvaluator, buffer: &mut HistoryBuffer, efficiency: f64) -> Arc<Reading> {
    // ---
    let previous_efficiency = buffer.latest().map(|r| r.efficiency_pct);
    let annotation = evaluator.evaluate(70.0, 220.0, efficiency, previous_efficiency);
    let reading = Arc::new(Reading::new(
        "SENSOR_01",
        Utc::now(),
        70.0,
        220.0,
        efficiency,
        annotation,
    ));
    buffer.push(Arc::clone(&reading));
    reading
}

#[test]
fn efficiency_drop_scenario_with_capacity_three() {
    // ---
    let evaluator = AnomalyEvaluator::new(None);
    let mut buffer = HistoryBuffer::new(3);

    // Three readings with no drop large enough to trigger the rule.
    for efficiency in [90.0, 91.0, 92.0] {
        let reading = feed(&evaluator, &mut buffer, efficiency);
        assert!(!reading.alert, "unexpected alert at efficiency {efficiency}");
    }

    // Fourth reading drops by 4.0 from the previous 92.0.
    let dropped = feed(&evaluator, &mut buffer, 88.0);
    assert_eq!(dropped.efficiency_delta, Some(-4.0));
    assert!(dropped.alert);
    assert!(dropped.alert_sources.contains(&AlertSource::EfficiencyDrop));

    // After four inserts at capacity three, only readings 2-4 remain.
    let retained: Vec<f64> = buffer.recent(10).iter().map(|r| r.efficiency_pct).collect();
    assert_eq!(retained, vec![91.0, 92.0, 88.0]);
}

#[test]
fn rules_classify_without_a_model() {
    // ---
    // Model unavailable, low voltage, nominal temperature, first reading.
    let evaluator = AnomalyEvaluator::new(None);
    let annotation = evaluator.evaluate(75.0, 205.0, 82.0, None);

    assert!(annotation.alert);
    assert_eq!(annotation.alert_sources, vec![AlertSource::LowVoltage]);
    assert!(annotation.efficiency_delta.is_none());
}

#[tokio::test]
async fn live_fleet_end_to_end() -> Result<()> {
    // ---
    let mut fleet = FleetManager::new(AnomalyEvaluator::new(None));

    // High fault probability so the short run reliably produces alerts for
    // the watcher to drain.
    let profile = SourceProfile::for_id("SENSOR_01").with_fault_probability(0.5);
    assert!(fleet.register_with_profile(
        "SENSOR_01",
        Duration::from_millis(10),
        5,
        profile,
    ));
    assert!(fleet.register("SENSOR_02", Duration::from_millis(15), 8));
    assert!(!fleet.register("SENSOR_02", Duration::from_millis(15), 8));

    assert_eq!(fleet.start_all(), 2);
    fleet.watch_alerts(Duration::from_millis(300)).await;
    assert_eq!(fleet.stop_all().await, 2);

    let snapshot = fleet.snapshot();
    assert!(snapshot.total_readings > 0);
    assert!(snapshot.total_anomalies <= snapshot.total_readings);
    assert!(snapshot.global_anomaly_rate_pct >= 0.0);
    assert!(snapshot.global_anomaly_rate_pct <= 100.0);

    for (id, status) in &snapshot.sources {
        assert!(!status.active, "{id} still active after stop_all");
        assert!(status.total_anomalies <= status.total_readings);
        assert!(status.last_reading.is_some());
        // Per-reading invariant on whatever the buffer retained.
        for reading in fleet.recent(id, 100) {
            assert_eq!(
                reading.alert,
                !reading.alert_sources.contains(&AlertSource::Normal)
            );
            assert!(!reading.alert_sources.is_empty());
        }
    }

    let status = &snapshot.sources["SENSOR_01"];
    assert!(status.buffer_occupancy <= 5);
    assert_eq!(fleet.recent("SENSOR_01", 3).len(), 3);

    // The snapshot serializes for gateway consumers.
    let json = serde_json::to_value(&snapshot)?;
    assert!(json["sources"]["SENSOR_01"]["total_readings"].as_u64().unwrap() > 0);

    Ok(())
}
