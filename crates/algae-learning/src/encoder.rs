//! Feature encoding: season indicators, standardization and polynomial
//! expansion.
//!
//! The encoder turns environmental conditions into the fixed-length feature
//! vectors a [`SpeciesModel`](crate::SpeciesModel) consumes:
//!
//! 1. five numeric inputs (`temperature`, `din_min`, `din_max`, `nt_min`,
//!    `nt_max`) followed by one indicator per season seen at fit time,
//!    except the alphabetically first (the baseline);
//! 2. each column standardized with the mean and population standard
//!    deviation computed at fit time (a zero deviation becomes 1);
//! 3. all monomials of total degree `1..=degree` over the standardized
//!    columns, without a bias column.
//!
//! Fitted state is immutable, so transforming the same input always yields
//! the same bits as it did during fitting.

use algae_processing::{EnvironmentalConditions, Observation, Season};
use ndarray::{Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::borrow::Borrow;
use tracing::debug;

use crate::artifacts::{self, ENCODER_KIND, SCHEMA_VERSION};
use crate::defaults::ResolvedInputs;
use crate::error::{LearningError, Result};

// =============================================================================
// Feature Sources
// =============================================================================

/// Anything that can provide the environmental inputs of one row.
pub trait FeatureSource {
    fn conditions(&self) -> EnvironmentalConditions;
}

impl FeatureSource for EnvironmentalConditions {
    fn conditions(&self) -> EnvironmentalConditions {
        *self
    }
}

impl FeatureSource for Observation {
    fn conditions(&self) -> EnvironmentalConditions {
        Observation::conditions(self)
    }
}

impl FeatureSource for ResolvedInputs {
    fn conditions(&self) -> EnvironmentalConditions {
        ResolvedInputs::conditions(self)
    }
}

impl<T: FeatureSource + ?Sized> FeatureSource for &T {
    fn conditions(&self) -> EnvironmentalConditions {
        (**self).conditions()
    }
}

// =============================================================================
// Feature Matrix
// =============================================================================

/// Encoded features, one row per observation.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    values: Array2<f64>,
}

impl FeatureMatrix {
    /// Build a matrix from row-major data.
    pub fn new(n_rows: usize, n_cols: usize, data: Vec<f64>) -> Result<Self> {
        let actual = data.len();
        let values = Array2::from_shape_vec((n_rows, n_cols), data).map_err(|_| {
            LearningError::FeatureMismatch {
                expected: n_rows * n_cols,
                actual,
            }
        })?;
        Ok(Self { values })
    }

    /// Build a matrix from equally long rows.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let n_cols = rows.first().map_or(0, Vec::len);
        if let Some(row) = rows.iter().find(|row| row.len() != n_cols) {
            return Err(LearningError::FeatureMismatch {
                expected: n_cols,
                actual: row.len(),
            });
        }
        Self::new(rows.len(), n_cols, rows.concat())
    }

    pub fn n_rows(&self) -> usize {
        self.values.nrows()
    }

    pub fn n_cols(&self) -> usize {
        self.values.ncols()
    }

    pub fn is_empty(&self) -> bool {
        self.values.nrows() == 0
    }

    pub fn as_array(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn into_array(self) -> Array2<f64> {
        self.values
    }

    /// One row. Panics if `i` is out of range.
    pub fn row(&self, i: usize) -> ArrayView1<'_, f64> {
        self.values.row(i)
    }

    pub fn rows(&self) -> impl Iterator<Item = ArrayView1<'_, f64>> {
        self.values.outer_iter()
    }

    /// New matrix made of the given rows, in the given order.
    pub fn select_rows(&self, indices: &[usize]) -> FeatureMatrix {
        FeatureMatrix {
            values: self.values.select(Axis(0), indices),
        }
    }
}

impl From<Array2<f64>> for FeatureMatrix {
    fn from(values: Array2<f64>) -> Self {
        Self { values }
    }
}

// =============================================================================
// Encoder
// =============================================================================

/// Names of the numeric inputs, in column order.
pub const NUMERIC_FEATURES: [&str; 5] = EnvironmentalConditions::NUMERIC_FIELDS;

/// Description of a fitted encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureInfo {
    pub degree: usize,
    pub original_features: Vec<String>,
    pub n_original_features: usize,
    pub n_polynomial_features: usize,
    pub season_columns: Vec<Season>,
    pub baseline_season: Option<Season>,
}

#[derive(Debug, Clone, PartialEq)]
struct FittedState {
    means: Vec<f64>,
    scales: Vec<f64>,
    season_columns: Vec<Season>,
    baseline_season: Option<Season>,
    terms: Vec<Vec<usize>>,
}

/// Encodes environmental conditions into polynomial feature vectors.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureEncoder {
    degree: usize,
    state: Option<FittedState>,
}

impl FeatureEncoder {
    /// Create an unfitted encoder expanding to the given polynomial degree.
    pub fn new(degree: usize) -> Self {
        Self {
            degree,
            state: None,
        }
    }

    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn is_fitted(&self) -> bool {
        self.state.is_some()
    }

    /// Fit the encoder on a species' observations and encode them.
    ///
    /// Returns the feature matrix and the biomass targets in input order.
    pub fn fit_transform<O: Borrow<Observation>>(
        &mut self,
        observations: &[O],
    ) -> Result<(FeatureMatrix, Vec<f64>)> {
        if self.state.is_some() {
            return Err(LearningError::InvalidState(
                "encoder is already fitted; create a new encoder to refit".to_string(),
            ));
        }
        if self.degree == 0 {
            return Err(LearningError::InvalidState(
                "polynomial degree must be at least 1".to_string(),
            ));
        }
        if observations.is_empty() {
            return Err(LearningError::InsufficientData(
                "cannot fit encoder on zero observations".to_string(),
            ));
        }

        let mut seasons: Vec<Season> = observations.iter().map(|o| o.borrow().season).collect();
        seasons.sort();
        seasons.dedup();
        let baseline_season = seasons.first().copied();
        let season_columns: Vec<Season> = seasons.into_iter().skip(1).collect();

        let raw: Vec<Vec<f64>> = observations
            .iter()
            .map(|o| raw_row(&o.borrow().conditions(), &season_columns))
            .collect();
        let (means, scales) = column_stats(&raw);
        let terms = polynomial_terms(means.len(), self.degree);

        debug!(
            "Fitted encoder: {} inputs, {} polynomial features, season columns {:?}",
            means.len(),
            terms.len(),
            season_columns
        );

        self.state = Some(FittedState {
            means,
            scales,
            season_columns,
            baseline_season,
            terms,
        });

        let rows: Vec<&Observation> = observations.iter().map(Borrow::borrow).collect();
        let matrix = self.transform(&rows)?;
        let targets = rows.iter().map(|o| o.biomass).collect();
        Ok((matrix, targets))
    }

    /// Encode rows with the fitted state.
    ///
    /// A season without an indicator column (the baseline, or one never seen
    /// at fit time) encodes as all-zero raw indicators.
    pub fn transform<T: FeatureSource>(&self, rows: &[T]) -> Result<FeatureMatrix> {
        let state = self.state.as_ref().ok_or(LearningError::NotFitted)?;

        let n_cols = state.terms.len();
        let mut data = Vec::with_capacity(rows.len() * n_cols);
        for row in rows {
            let raw = raw_row(&row.conditions(), &state.season_columns);
            let standardized: Vec<f64> = raw
                .iter()
                .zip(state.means.iter().zip(&state.scales))
                .map(|(value, (mean, scale))| (value - mean) / scale)
                .collect();
            for term in &state.terms {
                data.push(
                    term.iter()
                        .fold(1.0, |product, &column| product * standardized[column]),
                );
            }
        }

        FeatureMatrix::new(rows.len(), n_cols, data)
    }

    /// Names of the standardized input columns.
    pub fn input_feature_names(&self) -> Result<Vec<String>> {
        let state = self.state.as_ref().ok_or(LearningError::NotFitted)?;
        Ok(input_names(&state.season_columns))
    }

    /// Names of the output columns, e.g. `temperature`, `temperature^2`,
    /// `temperature din_min`.
    pub fn polynomial_feature_names(&self) -> Result<Vec<String>> {
        let state = self.state.as_ref().ok_or(LearningError::NotFitted)?;
        let inputs = input_names(&state.season_columns);
        Ok(state.terms.iter().map(|term| term_name(term, &inputs)).collect())
    }

    pub fn feature_info(&self) -> Result<FeatureInfo> {
        let state = self.state.as_ref().ok_or(LearningError::NotFitted)?;
        let original_features = input_names(&state.season_columns);
        Ok(FeatureInfo {
            degree: self.degree,
            n_original_features: original_features.len(),
            original_features,
            n_polynomial_features: state.terms.len(),
            season_columns: state.season_columns.clone(),
            baseline_season: state.baseline_season,
        })
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    pub fn to_artifact(&self) -> Result<EncoderArtifact> {
        let state = self.state.as_ref().ok_or(LearningError::NotFitted)?;
        Ok(EncoderArtifact {
            schema_version: SCHEMA_VERSION,
            kind: ENCODER_KIND.to_string(),
            degree: self.degree,
            means: state.means.clone(),
            scales: state.scales.clone(),
            season_columns: state.season_columns.clone(),
            baseline_season: state.baseline_season,
            feature_names: input_names(&state.season_columns),
        })
    }

    pub fn from_artifact(artifact: EncoderArtifact) -> Result<Self> {
        artifacts::check_header(ENCODER_KIND, artifact.schema_version, &artifact.kind)?;

        let invalid = |reason: String| LearningError::ArtifactFormat {
            key: ENCODER_KIND.to_string(),
            reason,
        };
        let n_inputs = NUMERIC_FEATURES.len() + artifact.season_columns.len();
        if artifact.degree == 0 {
            return Err(invalid("degree must be at least 1".to_string()));
        }
        if artifact.means.len() != n_inputs || artifact.scales.len() != n_inputs {
            return Err(invalid(format!(
                "expected {} means and scales, found {} and {}",
                n_inputs,
                artifact.means.len(),
                artifact.scales.len()
            )));
        }
        if artifact
            .scales
            .iter()
            .chain(&artifact.means)
            .any(|v| !v.is_finite())
            || artifact.scales.contains(&0.0)
        {
            return Err(invalid("means and scales must be finite and scales non-zero".to_string()));
        }

        Ok(Self {
            degree: artifact.degree,
            state: Some(FittedState {
                terms: polynomial_terms(n_inputs, artifact.degree),
                means: artifact.means,
                scales: artifact.scales,
                season_columns: artifact.season_columns,
                baseline_season: artifact.baseline_season,
            }),
        })
    }

    /// Serialize the fitted encoder as a JSON artifact.
    pub fn serialize(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.to_artifact()?)?)
    }

    /// Restore an encoder from [`serialize`](Self::serialize) output.
    pub fn deserialize(json: &str) -> Result<Self> {
        let artifact: EncoderArtifact = artifacts::decode(ENCODER_KIND, ENCODER_KIND, json)?;
        Self::from_artifact(artifact)
    }
}

/// Persisted form of a fitted [`FeatureEncoder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderArtifact {
    pub schema_version: u32,
    pub kind: String,
    pub degree: usize,
    pub means: Vec<f64>,
    pub scales: Vec<f64>,
    pub season_columns: Vec<Season>,
    pub baseline_season: Option<Season>,
    /// Informational; derived from `season_columns` on load.
    pub feature_names: Vec<String>,
}

// =============================================================================
// Helpers
// =============================================================================

fn raw_row(conditions: &EnvironmentalConditions, season_columns: &[Season]) -> Vec<f64> {
    let mut row = conditions.numeric_values().to_vec();
    row.extend(season_columns.iter().map(|s| {
        if *s == conditions.season {
            1.0
        } else {
            0.0
        }
    }));
    row
}

/// Per-column mean and population standard deviation.
///
/// Deviations that are zero, or indistinguishable from rounding noise
/// around the mean, are replaced by 1.
fn column_stats(rows: &[Vec<f64>]) -> (Vec<f64>, Vec<f64>) {
    let n_cols = rows.first().map_or(0, Vec::len);
    let n = rows.len() as f64;
    let mut means = Vec::with_capacity(n_cols);
    let mut scales = Vec::with_capacity(n_cols);

    for col in 0..n_cols {
        let mean = rows.iter().map(|r| r[col]).sum::<f64>() / n;
        let variance = rows.iter().map(|r| (r[col] - mean).powi(2)).sum::<f64>() / n;
        let std = variance.sqrt();
        let scale = if std == 0.0 || std <= 10.0 * f64::EPSILON * mean.abs() {
            1.0
        } else {
            std
        };
        means.push(mean);
        scales.push(scale);
    }
    (means, scales)
}

/// Index tuples of all monomials of degree `1..=degree` over `n_inputs`
/// columns, in combinations-with-replacement order within each degree.
pub(crate) fn polynomial_terms(n_inputs: usize, degree: usize) -> Vec<Vec<usize>> {
    fn extend(start: usize, remaining: usize, n: usize, current: &mut Vec<usize>, out: &mut Vec<Vec<usize>>) {
        if remaining == 0 {
            out.push(current.clone());
            return;
        }
        for i in start..n {
            current.push(i);
            extend(i, remaining - 1, n, current, out);
            current.pop();
        }
    }

    let mut terms = Vec::new();
    for d in 1..=degree {
        extend(0, d, n_inputs, &mut Vec::with_capacity(d), &mut terms);
    }
    terms
}

fn input_names(season_columns: &[Season]) -> Vec<String> {
    NUMERIC_FEATURES
        .iter()
        .map(|name| name.to_string())
        .chain(season_columns.iter().map(|s| format!("season_{}", s.as_str())))
        .collect()
}

fn term_name(term: &[usize], inputs: &[String]) -> String {
    let mut parts: Vec<String> = Vec::new();
    let mut i = 0;
    while i < term.len() {
        let column = term[i];
        let power = term[i..].iter().take_while(|&&c| c == column).count();
        if power == 1 {
            parts.push(inputs[column].clone());
        } else {
            parts.push(format!("{}^{}", inputs[column], power));
        }
        i += power;
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use algae_processing::Month;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn observation(month: u32, temperature: f64, biomass: f64) -> Observation {
        let date = NaiveDate::from_ymd_opt(2024, month, 10).unwrap();
        let month = Month::of(date);
        Observation {
            site: "S1".to_string(),
            date,
            month,
            year: 2024,
            season: month.season(),
            species: "Ulva".to_string(),
            biomass,
            din_min: 4.0 + temperature / 10.0,
            din_max: 8.0,
            nt_min: 13.0,
            nt_max: 30.0 - temperature / 5.0,
            temperature,
        }
    }

    fn three_season_sample() -> Vec<Observation> {
        vec![
            observation(1, 18.5, 4.0),
            observation(4, 20.0, 6.0),
            observation(8, 27.0, 9.0),
            observation(12, 26.5, 5.0),
        ]
    }

    #[test]
    fn test_polynomial_terms_order() {
        let terms = polynomial_terms(3, 2);
        let expected: Vec<Vec<usize>> = vec![
            vec![0],
            vec![1],
            vec![2],
            vec![0, 0],
            vec![0, 1],
            vec![0, 2],
            vec![1, 1],
            vec![1, 2],
            vec![2, 2],
        ];
        assert_eq!(terms, expected);
    }

    #[test]
    fn test_column_count_formula() {
        // k = 5 numeric + 2 season indicators, C(9, 2) - 1 = 35
        let mut encoder = FeatureEncoder::new(2);
        let (matrix, targets) = encoder.fit_transform(&three_season_sample()).unwrap();
        assert_eq!(matrix.n_cols(), 35);
        assert_eq!(matrix.n_rows(), 4);
        assert_eq!(targets, vec![4.0, 6.0, 9.0, 5.0]);

        // degree 3: C(10, 3) - 1 = 119
        let mut encoder = FeatureEncoder::new(3);
        let (matrix, _) = encoder.fit_transform(&three_season_sample()).unwrap();
        assert_eq!(matrix.n_cols(), 119);
    }

    #[test]
    fn test_baseline_is_alphabetically_first_season() {
        let mut encoder = FeatureEncoder::new(2);
        encoder.fit_transform(&three_season_sample()).unwrap();
        let info = encoder.feature_info().unwrap();
        assert_eq!(info.baseline_season, Some(Season::Cold));
        assert_eq!(info.season_columns, vec![Season::Dry, Season::Rainy]);
        assert_eq!(info.n_original_features, 7);
        assert_eq!(
            encoder.input_feature_names().unwrap(),
            vec![
                "temperature",
                "din_min",
                "din_max",
                "nt_min",
                "nt_max",
                "season_dry",
                "season_rainy"
            ]
        );
    }

    #[test]
    fn test_transform_matches_fit_transform_bits() {
        let sample = three_season_sample();
        let mut encoder = FeatureEncoder::new(2);
        let (fitted, _) = encoder.fit_transform(&sample).unwrap();

        for (i, obs) in sample.iter().enumerate() {
            let again = encoder.transform(&[obs.conditions()]).unwrap();
            let expected: Vec<u64> = fitted.row(i).iter().map(|v| v.to_bits()).collect();
            let actual: Vec<u64> = again.row(0).iter().map(|v| v.to_bits()).collect();
            assert_eq!(actual, expected);
        }
    }

    #[test]
    fn test_single_record_is_stable() {
        let sample = vec![observation(3, 18.0, 2.0)];
        let mut encoder = FeatureEncoder::new(2);
        let (fitted, _) = encoder.fit_transform(&sample).unwrap();
        let again = encoder.transform(&sample).unwrap();
        assert_eq!(fitted, again);
        // One season: no indicator columns, constant inputs standardize to 0
        assert_eq!(fitted.n_cols(), 20);
        assert!(fitted.as_array().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_unseen_season_encodes_like_baseline() {
        let sample = vec![observation(4, 20.0, 6.0), observation(8, 27.0, 9.0)];
        let mut encoder = FeatureEncoder::new(1);
        encoder.fit_transform(&sample).unwrap();

        let mut conditions = sample[0].conditions();
        conditions.season = Season::Dry;
        let baseline = encoder.transform(&[conditions]).unwrap();
        conditions.season = Season::Cold;
        let unseen = encoder.transform(&[conditions]).unwrap();
        assert_eq!(baseline, unseen);
    }

    #[test]
    fn test_transform_before_fit() {
        let encoder = FeatureEncoder::new(2);
        let err = encoder.transform(&three_season_sample()).unwrap_err();
        assert!(matches!(err, LearningError::NotFitted));
    }

    #[test]
    fn test_fit_on_empty_input() {
        let mut encoder = FeatureEncoder::new(2);
        let empty: Vec<Observation> = Vec::new();
        let err = encoder.fit_transform(&empty).unwrap_err();
        assert!(matches!(err, LearningError::InsufficientData(_)));
    }

    #[test]
    fn test_refit_is_rejected() {
        let mut encoder = FeatureEncoder::new(2);
        encoder.fit_transform(&three_season_sample()).unwrap();
        let err = encoder.fit_transform(&three_season_sample()).unwrap_err();
        assert!(matches!(err, LearningError::InvalidState(_)));
    }

    #[test]
    fn test_polynomial_feature_names() {
        let mut encoder = FeatureEncoder::new(2);
        encoder.fit_transform(&three_season_sample()).unwrap();
        let names = encoder.polynomial_feature_names().unwrap();
        assert_eq!(names[0], "temperature");
        assert_eq!(names[7], "temperature^2");
        assert_eq!(names[8], "temperature din_min");
        assert_eq!(names.last().unwrap(), "season_rainy^2");
    }

    #[test]
    fn test_serialization_round_trip_is_exact() {
        let sample = three_season_sample();
        let mut encoder = FeatureEncoder::new(2);
        encoder.fit_transform(&sample).unwrap();

        let restored = FeatureEncoder::deserialize(&encoder.serialize().unwrap()).unwrap();
        assert_eq!(restored, encoder);
        assert_eq!(
            restored.transform(&sample).unwrap(),
            encoder.transform(&sample).unwrap()
        );
    }

    #[test]
    fn test_deserialize_rejects_model_artifact_kind() {
        let mut encoder = FeatureEncoder::new(2);
        encoder.fit_transform(&three_season_sample()).unwrap();
        let json = encoder.serialize().unwrap().replace("\"encoder\"", "\"model\"");
        let err = FeatureEncoder::deserialize(&json).unwrap_err();
        assert!(matches!(err, LearningError::ArtifactFormat { .. }));
    }

    #[test]
    fn test_matrix_helpers() {
        let matrix = FeatureMatrix::from_rows(&[vec![1.0, 2.0], vec![3.0, 4.0], vec![5.0, 6.0]]).unwrap();
        assert_eq!(matrix.row(1).to_vec(), vec![3.0, 4.0]);
        assert_eq!(matrix.rows().count(), 3);
        let selected = matrix.select_rows(&[2, 0]);
        assert_eq!(selected.into_array(), ndarray::array![[5.0, 6.0], [1.0, 2.0]]);
        assert!(FeatureMatrix::from_rows(&[vec![1.0], vec![1.0, 2.0]]).is_err());
    }
}
