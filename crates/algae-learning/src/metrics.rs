//! Regression accuracy metrics.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Accuracy on one partition of the data.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SplitMetrics {
    pub r2: f64,
    pub rmse: f64,
    pub mae: f64,
    pub mse: f64,
}

impl SplitMetrics {
    /// Compare predictions against targets.
    ///
    /// With zero target variance R² is 1.0 for a perfect fit and 0.0
    /// otherwise. Empty input yields NaN everywhere.
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Self {
        debug_assert_eq!(y_true.len(), y_pred.len());
        if y_true.is_empty() {
            return Self {
                r2: f64::NAN,
                rmse: f64::NAN,
                mae: f64::NAN,
                mse: f64::NAN,
            };
        }

        let n = y_true.len() as f64;
        let mean = y_true.iter().sum::<f64>() / n;

        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        let mut abs_err = 0.0;
        for (truth, pred) in y_true.iter().zip(y_pred) {
            let residual = truth - pred;
            ss_res += residual * residual;
            ss_tot += (truth - mean) * (truth - mean);
            abs_err += residual.abs();
        }

        let r2 = if ss_tot == 0.0 {
            if ss_res == 0.0 { 1.0 } else { 0.0 }
        } else {
            1.0 - ss_res / ss_tot
        };
        let mse = ss_res / n;

        Self {
            r2,
            rmse: mse.sqrt(),
            mae: abs_err / n,
            mse,
        }
    }

    pub fn is_finite(&self) -> bool {
        [self.r2, self.rmse, self.mae, self.mse]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Value of one metric.
    pub fn get(&self, metric: MetricKind) -> f64 {
        match metric {
            MetricKind::R2 => self.r2,
            MetricKind::Rmse => self.rmse,
            MetricKind::Mae => self.mae,
            MetricKind::Mse => self.mse,
        }
    }
}

/// Training and holdout accuracy of one fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub train: SplitMetrics,
    pub test: SplitMetrics,
    pub n_train_samples: usize,
    pub n_test_samples: usize,
    pub n_features: usize,
}

impl Metrics {
    /// Whether every value of both partitions is a finite number.
    pub fn is_finite(&self) -> bool {
        self.train.is_finite() && self.test.is_finite()
    }
}

/// Metric used to rank models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKind {
    #[default]
    R2,
    Rmse,
    Mae,
    Mse,
}

impl MetricKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::R2 => "r2",
            Self::Rmse => "rmse",
            Self::Mae => "mae",
            Self::Mse => "mse",
        }
    }

    /// R² ranks descending, the error metrics ascending.
    pub fn higher_is_better(&self) -> bool {
        matches!(self, Self::R2)
    }
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "r2" => Ok(Self::R2),
            "rmse" => Ok(Self::Rmse),
            "mae" => Ok(Self::Mae),
            "mse" => Ok(Self::Mse),
            other => Err(format!(
                "unknown metric '{other}' (expected r2, rmse, mae or mse)"
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_fit() {
        let m = SplitMetrics::compute(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);
        assert_eq!(m.r2, 1.0);
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.mae, 0.0);
    }

    #[test]
    fn test_known_values() {
        // residuals 1, -1, 0, 2
        let m = SplitMetrics::compute(&[2.0, 4.0, 6.0, 8.0], &[1.0, 5.0, 6.0, 6.0]);
        assert_eq!(m.mse, 1.5);
        assert_eq!(m.mae, 1.0);
        assert!((m.rmse - 1.5f64.sqrt()).abs() < 1e-12);
        // ss_tot = 20, ss_res = 6
        assert!((m.r2 - 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_zero_variance_targets() {
        assert_eq!(SplitMetrics::compute(&[3.0, 3.0], &[3.0, 3.0]).r2, 1.0);
        assert_eq!(SplitMetrics::compute(&[3.0, 3.0], &[2.0, 3.0]).r2, 0.0);
    }

    #[test]
    fn test_overflowing_errors_are_not_finite() {
        let m = SplitMetrics::compute(&[1e200, -1e200], &[-1e200, 1e200]);
        assert!(m.mse.is_infinite());
        assert!(!m.is_finite());
        assert!(SplitMetrics::compute(&[1.0, 2.0], &[1.5, 2.5]).is_finite());
    }

    #[test]
    fn test_metric_kind_parsing_and_direction() {
        assert_eq!("RMSE".parse::<MetricKind>(), Ok(MetricKind::Rmse));
        assert!("accuracy".parse::<MetricKind>().is_err());
        assert!(MetricKind::R2.higher_is_better());
        assert!(!MetricKind::Mae.higher_is_better());
    }
}
