//! Pretrained scoring-model boundary.
//!
//! The model is treated as an opaque binary classifier over exactly three
//! named measurements (temperature, voltage, efficiency - fixed order). It is
//! shipped as a JSON parameter file: the standardization step exported from
//! the training-side scaler plus a linear decision function exported from the
//! trained detector. Loading is fallible and validated up front; inference is
//! pure, `Sync`, and safe to call concurrently from every production loop.
//!
//! A missing or unloadable model must never stop the pipeline: callers hold
//! an `Option<ScoringModel>` and degrade to rules-only evaluation.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

// ---

/// Number of input features: temperature, voltage, efficiency.
const FEATURE_COUNT: usize = 3;

/// Loaded scoring model: standardize the input vector, apply the linear
/// decision function, compare against the threshold.
#[derive(Debug, Clone, Deserialize)]
pub struct ScoringModel {
    // ---
    pub(crate) feature_means: [f64; FEATURE_COUNT],
    pub(crate) feature_stds: [f64; FEATURE_COUNT],
    pub(crate) weights: [f64; FEATURE_COUNT],
    pub(crate) bias: f64,
    pub(crate) threshold: f64,
}

impl ScoringModel {
    /// Load and validate a model parameter file.
    ///
    /// Errors if the file is missing, not valid JSON for the expected shape,
    /// or carries parameters that cannot produce a usable score (non-finite
    /// values, non-positive standard deviations).
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        // ---
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read model file '{}'", path.display()))?;

        let model: ScoringModel = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse model file '{}'", path.display()))?;

        model
            .validate()
            .with_context(|| format!("invalid model parameters in '{}'", path.display()))?;

        Ok(model)
    }

    fn validate(&self) -> Result<()> {
        // ---
        for (i, std) in self.feature_stds.iter().enumerate() {
            if !std.is_finite() || *std <= 0.0 {
                bail!("feature_stds[{i}] must be finite and positive, got {std}");
            }
        }
        for (i, mean) in self.feature_means.iter().enumerate() {
            if !mean.is_finite() {
                bail!("feature_means[{i}] must be finite, got {mean}");
            }
        }
        for (i, w) in self.weights.iter().enumerate() {
            if !w.is_finite() {
                bail!("weights[{i}] must be finite, got {w}");
            }
        }
        if !self.bias.is_finite() || !self.threshold.is_finite() {
            bail!(
                "bias ({}) and threshold ({}) must be finite",
                self.bias,
                self.threshold
            );
        }
        Ok(())
    }

    /// Classify one measurement triple. `Ok(true)` means anomalous.
    ///
    /// Errors when standardization or scoring produces a non-finite value
    /// (e.g. infinite input measurements); the caller treats that as "no
    /// model signal".
    pub fn predict(&self, temperature: f64, voltage: f64, efficiency: f64) -> Result<bool> {
        // ---
        let features = [temperature, voltage, efficiency];

        let mut score = self.bias;
        for i in 0..FEATURE_COUNT {
            let standardized = (features[i] - self.feature_means[i]) / self.feature_stds[i];
            if !standardized.is_finite() {
                bail!("feature {i} standardized to non-finite value from input {}", features[i]);
            }
            score += self.weights[i] * standardized;
        }

        if !score.is_finite() {
            bail!("model score is not finite");
        }

        Ok(score > self.threshold)
    }
}
