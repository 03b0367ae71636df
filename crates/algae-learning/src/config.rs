//! Configuration types for per-species training.
//!
//! This module provides [`TrainingConfig`] and its builder.
//!
//! # Example
//!
//! ```
//! use algae_learning::TrainingConfig;
//!
//! let config = TrainingConfig::builder()
//!     .degree(2)
//!     .alpha(1.0)
//!     .min_samples(30)
//!     .holdout_fraction(0.2)
//!     .build()
//!     .expect("valid config");
//! assert_eq!(config.seed, 42);
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default polynomial degree of the feature expansion.
pub const DEFAULT_DEGREE: usize = 2;
/// Default ridge regularization strength.
pub const DEFAULT_ALPHA: f64 = 1.0;
/// Default minimum number of observations a species needs to be trained.
pub const DEFAULT_MIN_SAMPLES: usize = 30;
/// Default share of samples held out for evaluation.
pub const DEFAULT_HOLDOUT_FRACTION: f64 = 0.2;
/// Default seed of the train/holdout shuffle.
pub const DEFAULT_SEED: u64 = 42;
/// Default artifact directory.
pub const DEFAULT_MODELS_DIR: &str = "trained_models";

/// Configuration of a training run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Maximum total degree of the polynomial feature expansion (>= 1).
    pub degree: usize,

    /// Ridge penalty. Zero gives ordinary least squares, which fails on
    /// collinear features.
    pub alpha: f64,

    /// Species with fewer observations are skipped (>= 2).
    pub min_samples: usize,

    /// Fraction of each species' rows held out for evaluation, in (0, 1).
    pub holdout_fraction: f64,

    /// Seed of the deterministic train/holdout shuffle.
    pub seed: u64,

    /// Directory used by the file artifact store.
    pub models_dir: PathBuf,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            degree: DEFAULT_DEGREE,
            alpha: DEFAULT_ALPHA,
            min_samples: DEFAULT_MIN_SAMPLES,
            holdout_fraction: DEFAULT_HOLDOUT_FRACTION,
            seed: DEFAULT_SEED,
            models_dir: PathBuf::from(DEFAULT_MODELS_DIR),
        }
    }
}

impl TrainingConfig {
    /// Create a new builder for `TrainingConfig`.
    #[must_use]
    pub fn builder() -> TrainingConfigBuilder {
        TrainingConfigBuilder::default()
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.degree == 0 {
            return Err(ConfigValidationError::InvalidDegree(self.degree));
        }

        if !self.alpha.is_finite() || self.alpha < 0.0 {
            return Err(ConfigValidationError::InvalidAlpha(self.alpha));
        }

        if self.min_samples < 2 {
            return Err(ConfigValidationError::InvalidMinSamples(self.min_samples));
        }

        if !(self.holdout_fraction > 0.0 && self.holdout_fraction < 1.0) {
            return Err(ConfigValidationError::InvalidFraction {
                field: "holdout_fraction".to_string(),
                value: self.holdout_fraction,
            });
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid polynomial degree: {0} (must be at least 1)")]
    InvalidDegree(usize),

    #[error("Invalid alpha: {0} (must be finite and non-negative)")]
    InvalidAlpha(f64),

    #[error("Invalid min_samples: {0} (must be at least 2)")]
    InvalidMinSamples(usize),

    #[error("Invalid fraction for '{field}': {value} (must be between 0.0 and 1.0, exclusive)")]
    InvalidFraction { field: String, value: f64 },

    #[error("Invalid band for '{field}': {value} (must be in [0.0, 1.0))")]
    InvalidBand { field: String, value: f64 },
}

/// Builder for [`TrainingConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct TrainingConfigBuilder {
    degree: Option<usize>,
    alpha: Option<f64>,
    min_samples: Option<usize>,
    holdout_fraction: Option<f64>,
    seed: Option<u64>,
    models_dir: Option<PathBuf>,
}

impl TrainingConfigBuilder {
    /// Set the polynomial degree (default: 2).
    pub fn degree(mut self, degree: usize) -> Self {
        self.degree = Some(degree);
        self
    }

    /// Set the ridge penalty (default: 1.0).
    pub fn alpha(mut self, alpha: f64) -> Self {
        self.alpha = Some(alpha);
        self
    }

    /// Set the minimum observations per species (default: 30).
    pub fn min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = Some(min_samples);
        self
    }

    /// Set the holdout fraction (default: 0.2).
    pub fn holdout_fraction(mut self, fraction: f64) -> Self {
        self.holdout_fraction = Some(fraction);
        self
    }

    /// Set the shuffle seed (default: 42).
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Set the artifact directory (default: `trained_models`).
    pub fn models_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.models_dir = Some(dir.into());
        self
    }

    /// Build the configuration, validating all settings.
    pub fn build(self) -> Result<TrainingConfig, ConfigValidationError> {
        let config = TrainingConfig {
            degree: self.degree.unwrap_or(DEFAULT_DEGREE),
            alpha: self.alpha.unwrap_or(DEFAULT_ALPHA),
            min_samples: self.min_samples.unwrap_or(DEFAULT_MIN_SAMPLES),
            holdout_fraction: self.holdout_fraction.unwrap_or(DEFAULT_HOLDOUT_FRACTION),
            seed: self.seed.unwrap_or(DEFAULT_SEED),
            models_dir: self
                .models_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODELS_DIR)),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TrainingConfig::default();
        assert_eq!(config.degree, 2);
        assert_eq!(config.alpha, 1.0);
        assert_eq!(config.min_samples, 30);
        assert_eq!(config.holdout_fraction, 0.2);
        assert_eq!(config.seed, 42);
        assert_eq!(config.models_dir, PathBuf::from("trained_models"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder_overrides() {
        let config = TrainingConfig::builder()
            .degree(3)
            .alpha(0.5)
            .min_samples(10)
            .holdout_fraction(0.25)
            .seed(7)
            .models_dir("out")
            .build()
            .unwrap();
        assert_eq!(config.degree, 3);
        assert_eq!(config.alpha, 0.5);
        assert_eq!(config.min_samples, 10);
        assert_eq!(config.holdout_fraction, 0.25);
        assert_eq!(config.seed, 7);
        assert_eq!(config.models_dir, PathBuf::from("out"));
    }

    #[test]
    fn test_invalid_degree() {
        let err = TrainingConfig::builder().degree(0).build().unwrap_err();
        assert_eq!(err, ConfigValidationError::InvalidDegree(0));
    }

    #[test]
    fn test_invalid_alpha() {
        assert!(TrainingConfig::builder().alpha(-1.0).build().is_err());
        assert!(TrainingConfig::builder().alpha(f64::NAN).build().is_err());
        assert!(TrainingConfig::builder().alpha(0.0).build().is_ok());
    }

    #[test]
    fn test_invalid_holdout_fraction() {
        for fraction in [0.0, 1.0, -0.1, f64::NAN] {
            assert!(
                TrainingConfig::builder()
                    .holdout_fraction(fraction)
                    .build()
                    .is_err(),
                "{fraction} should be rejected"
            );
        }
    }

    #[test]
    fn test_invalid_min_samples() {
        assert!(TrainingConfig::builder().min_samples(1).build().is_err());
    }
}
