//! Per-species ridge regression on encoded features.
//!
//! A [`SpeciesModel`] starts untrained and becomes trained exactly once.
//! Training shuffles the rows with a seeded generator, holds out a share of
//! them for evaluation and fits a ridge regression with intercept on the
//! rest.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, ArrayView1, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use tracing::debug;

use crate::artifacts::{self, MODEL_KIND, SCHEMA_VERSION};
use crate::encoder::FeatureMatrix;
use crate::error::{LearningError, Result};
use crate::metrics::{Metrics, SplitMetrics};

#[derive(Debug, Clone, PartialEq)]
struct Fitted {
    intercept: f64,
    coefficients: Vec<f64>,
    metrics: Metrics,
    n_samples: usize,
}

/// Ridge regression model of one species' biomass.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeciesModel {
    species: String,
    alpha: f64,
    fitted: Option<Fitted>,
}

impl SpeciesModel {
    pub fn new(species: impl Into<String>, alpha: f64) -> Self {
        Self {
            species: species.into(),
            alpha,
            fitted: None,
        }
    }

    pub fn species(&self) -> &str {
        &self.species
    }

    pub fn alpha(&self) -> f64 {
        self.alpha
    }

    pub fn is_trained(&self) -> bool {
        self.fitted.is_some()
    }

    pub fn metrics(&self) -> Option<&Metrics> {
        self.fitted.as_ref().map(|f| &f.metrics)
    }

    /// Number of rows the model was trained and evaluated on.
    pub fn n_samples(&self) -> usize {
        self.fitted.as_ref().map_or(0, |f| f.n_samples)
    }

    pub fn intercept(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.intercept)
    }

    pub fn coefficients(&self) -> Option<&[f64]> {
        self.fitted.as_ref().map(|f| f.coefficients.as_slice())
    }

    /// Fit the model and evaluate it on a holdout partition.
    ///
    /// `ceil(n × holdout_fraction)` rows, chosen by a shuffle seeded with
    /// `seed`, are held out. Both partitions need at least two rows.
    pub fn train(
        &mut self,
        x: &FeatureMatrix,
        y: &[f64],
        holdout_fraction: f64,
        seed: u64,
    ) -> Result<Metrics> {
        if self.is_trained() {
            return Err(LearningError::InvalidState(format!(
                "model for '{}' is already trained",
                self.species
            )));
        }
        if x.n_rows() != y.len() {
            return Err(LearningError::FeatureMismatch {
                expected: x.n_rows(),
                actual: y.len(),
            });
        }

        let n = y.len();
        let n_test = (n as f64 * holdout_fraction).ceil() as usize;
        let n_train = n.saturating_sub(n_test);
        if n_test < 2 || n_train < 2 {
            return Err(LearningError::InsufficientData(format!(
                "{n} samples give {n_train} training and {n_test} holdout rows; both need at least 2"
            )));
        }

        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(seed);
        indices.shuffle(&mut rng);
        let (test_idx, train_idx) = indices.split_at(n_test);

        let x_train = x.select_rows(train_idx);
        let x_test = x.select_rows(test_idx);
        let y_train: Vec<f64> = train_idx.iter().map(|&i| y[i]).collect();
        let y_test: Vec<f64> = test_idx.iter().map(|&i| y[i]).collect();

        let (intercept, coefficients) = self.solve(&x_train, &y_train)?;

        let train_pred = linear_predict(&x_train, intercept, &coefficients);
        let test_pred = linear_predict(&x_test, intercept, &coefficients);
        let metrics = Metrics {
            train: SplitMetrics::compute(&y_train, &train_pred),
            test: SplitMetrics::compute(&y_test, &test_pred),
            n_train_samples: n_train,
            n_test_samples: n_test,
            n_features: x.n_cols(),
        };
        if !metrics.is_finite() {
            return Err(LearningError::TrainingFailure(format!(
                "{}: non-finite metrics (train rmse {}, holdout rmse {})",
                self.species, metrics.train.rmse, metrics.test.rmse
            )));
        }

        debug!(
            "Trained '{}' on {} rows: holdout r2={:.4} rmse={:.4}",
            self.species, n_train, metrics.test.r2, metrics.test.rmse
        );

        self.fitted = Some(Fitted {
            intercept,
            coefficients,
            metrics,
            n_samples: n,
        });
        Ok(metrics)
    }

    /// Centered ridge fit: `(XcᵀXc + αI) w = Xcᵀyc`, solved by Cholesky.
    fn solve(&self, x: &FeatureMatrix, y: &[f64]) -> Result<(f64, Vec<f64>)> {
        let failure =
            |reason: &str| LearningError::TrainingFailure(format!("{}: {reason}", self.species));

        let x = x.as_array();
        let y = ArrayView1::from(y);
        let n_cols = x.ncols();
        let y_mean = y.mean().ok_or_else(|| failure("no training rows"))?;
        if n_cols == 0 {
            return Ok((y_mean, Vec::new()));
        }
        let x_means = x.mean_axis(Axis(0)).ok_or_else(|| failure("no training rows"))?;

        let xc = x - &x_means;
        let yc = y.mapv(|v| v - y_mean);
        let mut gram = xc.t().dot(&xc);
        gram.diag_mut().mapv_inplace(|v| v + self.alpha);
        let rhs = xc.t().dot(&yc);

        let a = DMatrix::from_fn(n_cols, n_cols, |i, j| gram[(i, j)]);
        let b = DVector::from_iterator(n_cols, rhs.iter().copied());
        let weights = a
            .cholesky()
            .ok_or_else(|| failure("normal equations are not positive definite"))?
            .solve(&b);

        if weights.iter().any(|w| !w.is_finite()) {
            return Err(failure("non-finite coefficients"));
        }

        let weights = Array1::from_iter(weights.iter().copied());
        let intercept = y_mean - x_means.dot(&weights);
        Ok((intercept, weights.to_vec()))
    }

    /// Unclamped model output.
    pub fn predict_raw(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        let fitted = self
            .fitted
            .as_ref()
            .ok_or_else(|| LearningError::NotTrained(self.species.clone()))?;
        if x.n_cols() != fitted.coefficients.len() {
            return Err(LearningError::FeatureMismatch {
                expected: fitted.coefficients.len(),
                actual: x.n_cols(),
            });
        }
        Ok(linear_predict(x, fitted.intercept, &fitted.coefficients))
    }

    /// Predicted biomass; negative outputs are clamped to zero.
    pub fn predict(&self, x: &FeatureMatrix) -> Result<Vec<f64>> {
        let mut predictions = self.predict_raw(x)?;
        for p in &mut predictions {
            *p = p.max(0.0);
        }
        Ok(predictions)
    }

    /// Short description of the model.
    pub fn model_info(&self) -> String {
        let mut out = format!(
            "species: {}\ntrained: {}\nn_samples: {}\nalpha: {}",
            self.species,
            self.is_trained(),
            self.n_samples(),
            self.alpha
        );
        if let Some(f) = &self.fitted {
            let _ = write!(
                out,
                "\nn_features: {}\nholdout r2: {:.4}",
                f.coefficients.len(),
                f.metrics.test.r2
            );
        }
        out
    }

    /// Train and holdout metrics as a printable block.
    pub fn metrics_summary(&self) -> String {
        let Some(f) = &self.fitted else {
            return format!("Model for '{}' is not trained", self.species);
        };
        let m = &f.metrics;
        let mut out = String::new();
        let _ = writeln!(out, "=== Metrics for {} ===", self.species);
        let _ = writeln!(out, "Train samples: {}", m.n_train_samples);
        let _ = writeln!(out, "Test samples: {}", m.n_test_samples);
        let _ = writeln!(out, "Features: {}", m.n_features);
        let _ = writeln!(out);
        let _ = writeln!(out, "Train:");
        let _ = writeln!(out, "  R²:   {:.4}", m.train.r2);
        let _ = writeln!(out, "  RMSE: {:.4}", m.train.rmse);
        let _ = writeln!(out, "  MAE:  {:.4}", m.train.mae);
        let _ = writeln!(out);
        let _ = writeln!(out, "Test:");
        let _ = writeln!(out, "  R²:   {:.4}", m.test.r2);
        let _ = writeln!(out, "  RMSE: {:.4}", m.test.rmse);
        let _ = write!(out, "  MAE:  {:.4}", m.test.mae);
        out
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    pub fn to_artifact(&self) -> Result<ModelArtifact> {
        let f = self
            .fitted
            .as_ref()
            .ok_or_else(|| LearningError::NotTrained(self.species.clone()))?;
        Ok(ModelArtifact {
            schema_version: SCHEMA_VERSION,
            kind: MODEL_KIND.to_string(),
            species: self.species.clone(),
            alpha: self.alpha,
            intercept: f.intercept,
            coefficients: f.coefficients.clone(),
            metrics: f.metrics,
            n_samples: f.n_samples,
        })
    }

    pub fn from_artifact(artifact: ModelArtifact) -> Result<Self> {
        artifacts::check_header(MODEL_KIND, artifact.schema_version, &artifact.kind)?;
        if artifact.coefficients.len() != artifact.metrics.n_features {
            return Err(LearningError::ArtifactFormat {
                key: MODEL_KIND.to_string(),
                reason: format!(
                    "{} coefficients for {} features",
                    artifact.coefficients.len(),
                    artifact.metrics.n_features
                ),
            });
        }
        Ok(Self {
            species: artifact.species,
            alpha: artifact.alpha,
            fitted: Some(Fitted {
                intercept: artifact.intercept,
                coefficients: artifact.coefficients,
                metrics: artifact.metrics,
                n_samples: artifact.n_samples,
            }),
        })
    }

    /// Serialize the trained model as a JSON artifact.
    pub fn serialize(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_artifact()?)?)
    }

    /// Restore a model from [`serialize`](Self::serialize) output.
    pub fn deserialize(json: &str) -> Result<Self> {
        let artifact: ModelArtifact = artifacts::decode(MODEL_KIND, MODEL_KIND, json)?;
        Self::from_artifact(artifact)
    }
}

/// Persisted form of a trained [`SpeciesModel`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub schema_version: u32,
    pub kind: String,
    pub species: String,
    pub alpha: f64,
    pub intercept: f64,
    pub coefficients: Vec<f64>,
    pub metrics: Metrics,
    pub n_samples: usize,
}

fn linear_predict(x: &FeatureMatrix, intercept: f64, coefficients: &[f64]) -> Vec<f64> {
    x.as_array()
        .dot(&ArrayView1::from(coefficients))
        .mapv(|v| v + intercept)
        .to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    /// y = 3 + 2·a − b with a little deterministic wobble.
    fn linear_data(n: usize) -> (FeatureMatrix, Vec<f64>) {
        let mut rows = Vec::with_capacity(n);
        let mut y = Vec::with_capacity(n);
        for i in 0..n {
            let a = i as f64 / 4.0;
            let b = ((i * 7) % 11) as f64;
            let wobble = if i % 2 == 0 { 0.01 } else { -0.01 };
            rows.push(vec![a, b]);
            y.push(3.0 + 2.0 * a - b + wobble);
        }
        (FeatureMatrix::from_rows(&rows).unwrap(), y)
    }

    #[test]
    fn test_train_recovers_linear_relation() {
        let (x, y) = linear_data(40);
        let mut model = SpeciesModel::new("Ulva", 1e-6);
        let metrics = model.train(&x, &y, 0.2, 42).unwrap();

        assert_eq!(metrics.n_test_samples, 8);
        assert_eq!(metrics.n_train_samples, 32);
        assert_eq!(metrics.n_features, 2);
        assert!(metrics.test.r2 > 0.99);

        let w = model.coefficients().unwrap();
        assert!((w[0] - 2.0).abs() < 0.01);
        assert!((w[1] + 1.0).abs() < 0.01);
        assert!((model.intercept().unwrap() - 3.0).abs() < 0.05);
        assert_eq!(model.n_samples(), 40);
    }

    #[test]
    fn test_training_is_deterministic() {
        let (x, y) = linear_data(30);
        let mut a = SpeciesModel::new("A", 1.0);
        let mut b = SpeciesModel::new("A", 1.0);
        assert_eq!(a.train(&x, &y, 0.25, 7).unwrap(), b.train(&x, &y, 0.25, 7).unwrap());
        assert_eq!(a.coefficients(), b.coefficients());
    }

    #[test]
    fn test_retraining_is_rejected() {
        let (x, y) = linear_data(20);
        let mut model = SpeciesModel::new("A", 1.0);
        model.train(&x, &y, 0.2, 1).unwrap();
        let err = model.train(&x, &y, 0.2, 1).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_STATE");
    }

    #[test]
    fn test_tiny_partitions_are_rejected() {
        let (x, y) = linear_data(3);
        let err = SpeciesModel::new("A", 1.0).train(&x, &y, 0.2, 1).unwrap_err();
        assert!(matches!(err, LearningError::InsufficientData(_)));
    }

    #[test]
    fn test_predict_before_training() {
        let (x, _) = linear_data(4);
        let err = SpeciesModel::new("A", 1.0).predict(&x).unwrap_err();
        assert!(matches!(err, LearningError::NotTrained(ref s) if s == "A"));
    }

    #[test]
    fn test_predict_clamps_negatives() {
        let (x, y) = linear_data(40);
        let mut model = SpeciesModel::new("A", 1e-6);
        model.train(&x, &y, 0.2, 3).unwrap();

        // a = 0, b = 100 gives roughly 3 - 100
        let probe = FeatureMatrix::from_rows(&[vec![0.0, 100.0], vec![10.0, 0.0]]).unwrap();
        let raw = model.predict_raw(&probe).unwrap();
        let clamped = model.predict(&probe).unwrap();
        assert!(raw[0] < 0.0);
        assert_eq!(clamped[0], 0.0);
        assert_eq!(clamped[1], raw[1]);
    }

    #[test]
    fn test_predict_rejects_wrong_width() {
        let (x, y) = linear_data(20);
        let mut model = SpeciesModel::new("A", 1.0);
        model.train(&x, &y, 0.2, 1).unwrap();
        let probe = FeatureMatrix::from_rows(&[vec![1.0, 2.0, 3.0]]).unwrap();
        assert!(matches!(
            model.predict(&probe),
            Err(LearningError::FeatureMismatch {
                expected: 2,
                actual: 3
            })
        ));
    }

    #[test]
    fn test_zero_alpha_on_constant_column_fails() {
        let rows: Vec<Vec<f64>> = (0..20).map(|i| vec![i as f64, 5.0]).collect();
        let y: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let x = FeatureMatrix::from_rows(&rows).unwrap();
        let err = SpeciesModel::new("A", 0.0).train(&x, &y, 0.2, 1).unwrap_err();
        assert_eq!(err.error_code(), "TRAINING_FAILURE");
    }

    #[test]
    fn test_overflowing_targets_fail_training() {
        let (x, y) = linear_data(40);
        let y: Vec<f64> = y.iter().map(|v| v * 1e200).collect();
        let mut model = SpeciesModel::new("Big", 1.0);
        let err = model.train(&x, &y, 0.2, 42).unwrap_err();
        assert_eq!(err.error_code(), "TRAINING_FAILURE");
        assert!(!model.is_trained());
    }

    #[test]
    fn test_serialize_round_trip_is_bit_exact() {
        let (x, y) = linear_data(40);
        let mut model = SpeciesModel::new("Gracilaria sp.", 0.5);
        model.train(&x, &y, 0.2, 42).unwrap();

        let restored = SpeciesModel::deserialize(&model.serialize().unwrap()).unwrap();
        assert_eq!(restored, model);
        let before = model.predict_raw(&x).unwrap();
        let after = restored.predict_raw(&x).unwrap();
        for (a, b) in before.iter().zip(&after) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
    }

    #[test]
    fn test_deserialize_rejects_encoder_artifact() {
        let json = r#"{"schema_version":1,"kind":"encoder","degree":2}"#;
        let err = SpeciesModel::deserialize(json).unwrap_err();
        assert_eq!(err.error_code(), "ARTIFACT_FORMAT");
    }

    #[test]
    fn test_metrics_summary_text() {
        let (x, y) = linear_data(20);
        let mut model = SpeciesModel::new("Ulva", 1.0);
        assert!(model.metrics_summary().contains("not trained"));
        model.train(&x, &y, 0.2, 1).unwrap();
        let text = model.metrics_summary();
        assert!(text.starts_with("=== Metrics for Ulva ==="));
        assert!(text.contains("Test samples: 4"));
        assert!(model.model_info().contains("trained: true"));
    }
}
