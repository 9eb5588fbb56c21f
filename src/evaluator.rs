//! Hybrid anomaly evaluation: pretrained model score + threshold rules.
//!
//! [`AnomalyEvaluator::evaluate`] is a pure decision function over one
//! reading's measurements (plus the previous efficiency from the same
//! source). Four independent signals are evaluated without short-circuiting:
//! the model classification and three deterministic rules. Model failures
//! degrade to rules-only evaluation; they are logged, never propagated.

use tracing::warn;

use crate::models::{round2, AlertSource, Annotation, RuleFlags};
use crate::scoring::ScoringModel;

// ---

/// Rule thresholds. Measurements are unconstrained floats; no range
/// validation happens before these comparisons.
const LOW_VOLTAGE_THRESHOLD: f64 = 210.0;
const HIGH_TEMPERATURE_THRESHOLD: f64 = 80.0;
const EFFICIENCY_DROP_THRESHOLD: f64 = -2.0;

/// Stateless decision procedure around an optional scoring model.
///
/// The model handle is read-only after construction and the underlying
/// inference is pure, so one evaluator is shared across all production loops
/// without internal locking.
#[derive(Debug)]
pub struct AnomalyEvaluator {
    // ---
    model: Option<ScoringModel>,
}

impl AnomalyEvaluator {
    pub fn new(model: Option<ScoringModel>) -> Self {
        // ---
        AnomalyEvaluator { model }
    }

    /// Whether a scoring model is loaded (rules always run either way).
    pub fn has_model(&self) -> bool {
        // ---
        self.model.is_some()
    }

    /// Evaluate one measurement triple against all four signals.
    ///
    /// `previous_efficiency` is the efficiency of the immediately preceding
    /// reading of the same source, absent for a source's first reading. When
    /// absent the efficiency-drop rule is inactive (it contributes no tag)
    /// and no delta is reported.
    pub fn evaluate(
        &self,
        temperature: f64,
        voltage: f64,
        efficiency: f64,
        previous_efficiency: Option<f64>,
    ) -> Annotation {
        // ---
        let model_score = self.model_signal(temperature, voltage, efficiency);
        let low_voltage = voltage < LOW_VOLTAGE_THRESHOLD;
        let high_temperature = temperature > HIGH_TEMPERATURE_THRESHOLD;

        // The rule compares the raw delta; rounding is only for reporting.
        let raw_delta = previous_efficiency.map(|prev| efficiency - prev);
        let efficiency_drop = raw_delta
            .map(|delta| delta < EFFICIENCY_DROP_THRESHOLD)
            .unwrap_or(false);
        let efficiency_delta = raw_delta.map(round2);

        let mut alert_sources = Vec::new();
        if model_score {
            alert_sources.push(AlertSource::ModelScore);
        }
        if low_voltage {
            alert_sources.push(AlertSource::LowVoltage);
        }
        if high_temperature {
            alert_sources.push(AlertSource::HighTemperature);
        }
        if efficiency_drop {
            alert_sources.push(AlertSource::EfficiencyDrop);
        }

        let alert = !alert_sources.is_empty();
        if alert_sources.is_empty() {
            alert_sources.push(AlertSource::Normal);
        }

        Annotation {
            alert,
            alert_sources,
            efficiency_delta,
            rule_flags: RuleFlags {
                model_score,
                low_voltage,
                high_temperature,
                efficiency_drop,
            },
        }
    }

    /// Ask the model for a classification; any inference failure is logged
    /// and treated as "no model signal" so the deterministic rules still run.
    fn model_signal(&self, temperature: f64, voltage: f64, efficiency: f64) -> bool {
        // ---
        let Some(model) = &self.model else {
            return false;
        };

        match model.predict(temperature, voltage, efficiency) {
            Ok(anomalous) => anomalous,
            Err(e) => {
                warn!("model inference failed, falling back to rules only: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    fn rules_only() -> AnomalyEvaluator {
        // ---
        AnomalyEvaluator::new(None)
    }

    /// Model that flags everything, for exercising the ModelScore path.
    fn always_anomalous() -> AnomalyEvaluator {
        // ---
        AnomalyEvaluator::new(Some(ScoringModel {
            feature_means: [0.0, 0.0, 0.0],
            feature_stds: [1.0, 1.0, 1.0],
            weights: [0.0, 0.0, 0.0],
            bias: 1.0,
            threshold: 0.0,
        }))
    }

    #[test]
    fn test_nominal_reading_is_normal() {
        // ---
        let annotation = rules_only().evaluate(70.0, 220.0, 82.0, Some(82.0));

        assert!(!annotation.alert);
        assert_eq!(annotation.alert_sources, vec![AlertSource::Normal]);
        assert_eq!(annotation.efficiency_delta, Some(0.0));
        assert_eq!(annotation.rule_flags, RuleFlags::default());
    }

    #[test]
    fn test_low_voltage_strict_threshold() {
        // ---
        let active = rules_only().evaluate(70.0, 209.9, 82.0, None);
        assert!(active.rule_flags.low_voltage);
        assert!(active.alert);

        let inactive = rules_only().evaluate(70.0, 210.0, 82.0, None);
        assert!(!inactive.rule_flags.low_voltage);
        assert!(!inactive.alert);
    }

    #[test]
    fn test_high_temperature_strict_threshold() {
        // ---
        let inactive = rules_only().evaluate(80.0, 220.0, 82.0, None);
        assert!(!inactive.rule_flags.high_temperature);
        assert!(!inactive.alert);

        let active = rules_only().evaluate(80.1, 220.0, 82.0, None);
        assert!(active.rule_flags.high_temperature);
        assert_eq!(active.alert_sources, vec![AlertSource::HighTemperature]);
    }

    #[test]
    fn test_efficiency_drop_requires_previous_reading() {
        // ---
        // First reading of a source: rule inactive even at a very low value.
        let first = rules_only().evaluate(70.0, 220.0, 40.0, None);
        assert!(!first.rule_flags.efficiency_drop);
        assert!(first.efficiency_delta.is_none());
        assert!(!first.alert);

        // Drop of exactly 2.0 does not fire (strict <).
        let boundary = rules_only().evaluate(70.0, 220.0, 80.0, Some(82.0));
        assert!(!boundary.rule_flags.efficiency_drop);
        assert_eq!(boundary.efficiency_delta, Some(-2.0));

        // Drop beyond 2.0 fires.
        let dropped = rules_only().evaluate(70.0, 220.0, 79.9, Some(82.0));
        assert!(dropped.rule_flags.efficiency_drop);
        assert_eq!(dropped.alert_sources, vec![AlertSource::EfficiencyDrop]);
    }

    #[test]
    fn test_delta_reported_even_when_rule_does_not_fire() {
        // ---
        let annotation = rules_only().evaluate(70.0, 220.0, 85.0, Some(82.0));
        assert_eq!(annotation.efficiency_delta, Some(3.0));
        assert!(!annotation.rule_flags.efficiency_drop);
    }

    #[test]
    fn test_no_model_degrades_to_rules_only() {
        // ---
        // Spec scenario: model unavailable, voltage 205, temperature 75, no
        // previous efficiency.
        let annotation = rules_only().evaluate(75.0, 205.0, 82.0, None);

        assert!(annotation.alert);
        assert_eq!(annotation.alert_sources, vec![AlertSource::LowVoltage]);
        assert!(annotation.efficiency_delta.is_none());
    }

    #[test]
    fn test_model_signal_contributes_tag() {
        // ---
        let annotation = always_anomalous().evaluate(70.0, 220.0, 82.0, None);

        assert!(annotation.alert);
        assert_eq!(annotation.alert_sources, vec![AlertSource::ModelScore]);
        assert!(annotation.rule_flags.model_score);
    }

    #[test]
    fn test_all_signals_fire_in_order() {
        // ---
        let annotation = always_anomalous().evaluate(85.0, 200.0, 70.0, Some(82.0));

        assert!(annotation.alert);
        assert_eq!(
            annotation.alert_sources,
            vec![
                AlertSource::ModelScore,
                AlertSource::LowVoltage,
                AlertSource::HighTemperature,
                AlertSource::EfficiencyDrop,
            ]
        );
    }

    #[test]
    fn test_model_inference_error_falls_back_to_rules() {
        // ---
        // Non-finite measurement breaks standardization inside the model but
        // must not break the evaluation: the voltage rule still classifies.
        let annotation = always_anomalous().evaluate(f64::NAN, 205.0, 82.0, None);

        assert!(!annotation.rule_flags.model_score);
        assert!(annotation.rule_flags.low_voltage);
        assert_eq!(annotation.alert_sources, vec![AlertSource::LowVoltage]);
    }

    #[test]
    fn test_alert_iff_sources_exclude_normal() {
        // ---
        let cases = [
            (70.0, 220.0, 82.0, None),
            (85.0, 220.0, 82.0, None),
            (70.0, 205.0, 82.0, None),
            (70.0, 220.0, 75.0, Some(82.0)),
            (85.0, 205.0, 75.0, Some(82.0)),
        ];

        for (t, v, e, prev) in cases {
            let annotation = rules_only().evaluate(t, v, e, prev);
            assert!(!annotation.alert_sources.is_empty());
            assert_eq!(
                annotation.alert,
                !annotation.alert_sources.contains(&AlertSource::Normal),
                "invariant violated for ({t}, {v}, {e}, {prev:?})"
            );
        }
    }
}
