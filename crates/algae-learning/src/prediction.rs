//! Biomass prediction from stored species models.
//!
//! A [`PredictionService`] reads the training summary and the per-species
//! artifacts from an [`ArtifactStore`] on first use and keeps the loaded
//! encoder/model pairs in a [`ModelCache`]. Missing environmental inputs
//! are filled from [`SeasonalDefaults`].
//!
//! # Example
//!
//! ```rust,ignore
//! use algae_learning::{FsArtifactStore, PredictionRequest, PredictionService, SeasonalDefaults};
//! use std::sync::Arc;
//!
//! let service = PredictionService::new(
//!     Arc::new(FsArtifactStore::new("trained_models")),
//!     SeasonalDefaults::default(),
//! );
//! let prediction = service.predict(&PredictionRequest::new("Ulva lactuca", "Bahía", "2025-07-15"))?;
//! println!("{} g/m² ({})", prediction.estimate, prediction.season);
//! ```

use chrono::{DateTime, Datelike, Months, NaiveDate, NaiveDateTime};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use algae_processing::{BiomassStats, Dataset, Month, Season};

use crate::artifacts::ArtifactStore;
use crate::defaults::{DefaultsProfile, ResolvedInputs, SeasonalDefaults};
use crate::encoder::FeatureEncoder;
use crate::error::{LearningError, Result};
use crate::metrics::Metrics;
use crate::model::SpeciesModel;
use crate::trainer::{SpeciesOutcome, TrainingSummary};

/// Highest accepted water temperature override (°C).
pub const MAX_TEMPERATURE: f64 = 50.0;

/// Day of the month used for calendar projections.
const PROJECTION_DAY: u32 = 15;

// =============================================================================
// Requests and responses
// =============================================================================

/// Prediction for one species, site and date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionRequest {
    pub species: String,
    pub site: String,
    /// `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS` or RFC 3339.
    pub date: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub din: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nt: Option<f64>,
}

impl PredictionRequest {
    pub fn new(species: impl Into<String>, site: impl Into<String>, date: impl Into<String>) -> Self {
        Self {
            species: species.into(),
            site: site.into(),
            date: date.into(),
            temperature: None,
            din: None,
            nt: None,
        }
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    #[must_use]
    pub fn with_din(mut self, din: f64) -> Self {
        self.din = Some(din);
        self
    }

    #[must_use]
    pub fn with_nt(mut self, nt: f64) -> Self {
        self.nt = Some(nt);
        self
    }
}

/// Environmental values a prediction was made with, rounded to 2 decimals.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InputsUsed {
    pub temperature: f64,
    pub din: f64,
    pub din_min: f64,
    pub din_max: f64,
    pub nt: f64,
    pub nt_min: f64,
    pub nt_max: f64,
}

impl From<&ResolvedInputs> for InputsUsed {
    fn from(inputs: &ResolvedInputs) -> Self {
        Self {
            temperature: round_to(inputs.temperature, 2),
            din: round_to(inputs.din, 2),
            din_min: round_to(inputs.din_min, 2),
            din_max: round_to(inputs.din_max, 2),
            nt: round_to(inputs.nt, 2),
            nt_min: round_to(inputs.nt_min, 2),
            nt_max: round_to(inputs.nt_max, 2),
        }
    }
}

/// Holdout accuracy of the model behind a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Confidence {
    /// Rounded to 4 decimals.
    pub r2: f64,
    /// Rounded to 2 decimals.
    pub rmse: f64,
    /// Rounded to 2 decimals.
    pub mae: f64,
}

impl From<&Metrics> for Confidence {
    fn from(metrics: &Metrics) -> Self {
        Self {
            r2: round_to(metrics.test.r2, 4),
            rmse: round_to(metrics.test.rmse, 2),
            mae: round_to(metrics.test.mae, 2),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub species: String,
    pub site: String,
    pub date: NaiveDate,
    /// Predicted biomass, never negative, rounded to 2 decimals.
    pub estimate: f64,
    pub inputs_used: InputsUsed,
    pub season: Season,
    pub confidence: Confidence,
}

/// A successfully trained species with its holdout accuracy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub species: String,
    pub r2: f64,
    pub rmse: f64,
}

/// Model metrics and data statistics of one species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpeciesInfo {
    pub species: String,
    pub r2: f64,
    pub rmse: f64,
    pub mae: f64,
    pub total_samples: usize,
    pub train_samples: usize,
    pub test_samples: usize,
    /// Biomass distribution in the dataset, when one was supplied.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub biomass: Option<BiomassStats>,
}

/// Estimate for one calendar month under default conditions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyProjection {
    pub date: NaiveDate,
    pub year: i32,
    pub month: u32,
    pub month_name: String,
    pub season: Season,
    pub temperature: f64,
    /// Rounded to 2 decimals.
    pub biomass: f64,
    pub mae: f64,
    pub r2: f64,
}

// =============================================================================
// Model cache
// =============================================================================

/// Encoder and model of one species, as loaded from the store.
#[derive(Debug)]
pub struct LoadedSpecies {
    encoder: FeatureEncoder,
    model: SpeciesModel,
}

impl LoadedSpecies {
    pub fn new(encoder: FeatureEncoder, model: SpeciesModel) -> Result<Self> {
        let info = encoder.feature_info()?;
        let n_coefficients = model.coefficients().map_or(0, <[f64]>::len);
        if info.n_polynomial_features != n_coefficients {
            return Err(LearningError::FeatureMismatch {
                expected: n_coefficients,
                actual: info.n_polynomial_features,
            });
        }
        Ok(Self { encoder, model })
    }

    pub fn encoder(&self) -> &FeatureEncoder {
        &self.encoder
    }

    pub fn model(&self) -> &SpeciesModel {
        &self.model
    }

    /// Clamped estimate for one set of inputs.
    fn estimate(&self, inputs: &ResolvedInputs) -> Result<f64> {
        let x = self.encoder.transform(std::slice::from_ref(inputs))?;
        let predictions = self.model.predict(&x)?;
        Ok(predictions.first().copied().unwrap_or(0.0))
    }

    fn metrics(&self) -> Result<&Metrics> {
        self.model
            .metrics()
            .ok_or_else(|| LearningError::NotTrained(self.model.species().to_string()))
    }
}

/// Loaded species keyed by name.
///
/// Entries are immutable once inserted. When two callers load the same
/// species concurrently, the first insert wins and both get that entry.
#[derive(Debug, Default)]
pub struct ModelCache {
    entries: RwLock<HashMap<String, Arc<LoadedSpecies>>>,
}

impl ModelCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, species: &str) -> Option<Arc<LoadedSpecies>> {
        self.entries.read().get(species).cloned()
    }

    /// Insert unless present; returns the cached entry.
    pub fn insert(&self, species: &str, loaded: LoadedSpecies) -> Arc<LoadedSpecies> {
        self.entries
            .write()
            .entry(species.to_string())
            .or_insert_with(|| Arc::new(loaded))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

// =============================================================================
// Service
// =============================================================================

/// Serves predictions from trained species models.
#[derive(Debug)]
pub struct PredictionService {
    store: Arc<dyn ArtifactStore>,
    defaults: SeasonalDefaults,
    projection_defaults: SeasonalDefaults,
    summary: RwLock<Option<Arc<TrainingSummary>>>,
    cache: ModelCache,
}

impl PredictionService {
    /// Service over `store`; `defaults` fill in missing request inputs.
    ///
    /// Monthly projections use the [`DefaultsProfile::Projection`] table.
    pub fn new(store: Arc<dyn ArtifactStore>, defaults: SeasonalDefaults) -> Self {
        Self {
            store,
            defaults,
            projection_defaults: SeasonalDefaults::for_profile(DefaultsProfile::Projection),
            summary: RwLock::new(None),
            cache: ModelCache::new(),
        }
    }

    /// Replace the table used by the monthly projections.
    #[must_use]
    pub fn with_projection_defaults(mut self, defaults: SeasonalDefaults) -> Self {
        self.projection_defaults = defaults;
        self
    }

    pub fn defaults(&self) -> &SeasonalDefaults {
        &self.defaults
    }

    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// The training summary, read from the store on first use.
    pub fn summary(&self) -> Result<Arc<TrainingSummary>> {
        if let Some(summary) = self.summary.read().as_ref() {
            return Ok(summary.clone());
        }
        let loaded = Arc::new(TrainingSummary::load(self.store.as_ref())?);
        debug!("Loaded training summary ({} species)", loaded.len());
        Ok(self.summary.write().get_or_insert(loaded).clone())
    }

    /// Forget the summary and every loaded model, e.g. after retraining.
    pub fn reload(&self) {
        *self.summary.write() = None;
        self.cache.clear();
    }

    /// Encoder and model of a successfully trained species.
    pub fn load(&self, species: &str) -> Result<Arc<LoadedSpecies>> {
        if let Some(loaded) = self.cache.get(species) {
            return Ok(loaded);
        }

        let summary = self.summary()?;
        let Some(SpeciesOutcome::Success {
            model_file,
            encoder_file,
            ..
        }) = summary.get(species)
        else {
            return Err(LearningError::UnknownSpecies(species.to_string()));
        };

        let encoder = FeatureEncoder::deserialize(&self.store.get(encoder_file)?)?;
        let model = SpeciesModel::deserialize(&self.store.get(model_file)?)?;
        info!("Loaded model for '{species}'");
        Ok(self.cache.insert(species, LoadedSpecies::new(encoder, model)?))
    }

    /// Predict biomass for a request.
    pub fn predict(&self, request: &PredictionRequest) -> Result<Prediction> {
        validate_overrides(request)?;
        let loaded = self.load(&request.species)?;
        let date = parse_request_date(&request.date)?;

        let inputs = self.defaults.resolve(
            Month::of(date),
            request.temperature,
            request.din,
            request.nt,
        );
        let estimate = loaded.estimate(&inputs)?;
        debug!(
            "Predicted {:.3} for '{}' on {} ({})",
            estimate, request.species, date, inputs.season
        );

        Ok(Prediction {
            species: request.species.clone(),
            site: request.site.clone(),
            date,
            estimate: round_to(estimate, 2),
            inputs_used: InputsUsed::from(&inputs),
            season: inputs.season,
            confidence: Confidence::from(loaded.metrics()?),
        })
    }

    /// Successfully trained species, best holdout R² first.
    pub fn species_catalog(&self) -> Result<Vec<CatalogEntry>> {
        let summary = self.summary()?;
        let mut entries: Vec<CatalogEntry> = summary
            .iter()
            .filter_map(|(species, outcome)| {
                outcome.metrics().map(|m| CatalogEntry {
                    species: species.to_string(),
                    r2: m.test.r2,
                    rmse: m.test.rmse,
                })
            })
            .collect();
        entries.sort_by(|a, b| {
            let r2 = |v: f64| if v.is_nan() { f64::NEG_INFINITY } else { v };
            r2(b.r2)
                .total_cmp(&r2(a.r2))
                .then_with(|| a.species.cmp(&b.species))
        });
        Ok(entries)
    }

    /// Metrics and sample counts of a species, plus its biomass
    /// distribution when `dataset` is given.
    pub fn species_info(&self, species: &str, dataset: Option<&Dataset>) -> Result<SpeciesInfo> {
        let summary = self.summary()?;
        let Some(SpeciesOutcome::Success {
            n_samples, metrics, ..
        }) = summary.get(species)
        else {
            return Err(LearningError::UnknownSpecies(species.to_string()));
        };

        let biomass = match dataset {
            Some(dataset) => dataset.species_stats(species)?,
            None => None,
        };

        Ok(SpeciesInfo {
            species: species.to_string(),
            r2: metrics.test.r2,
            rmse: metrics.test.rmse,
            mae: metrics.test.mae,
            total_samples: *n_samples,
            train_samples: metrics.n_train_samples,
            test_samples: metrics.n_test_samples,
            biomass,
        })
    }

    /// Estimate for one month under the projection defaults.
    pub fn predict_month(&self, species: &str, year: i32, month: u32) -> Result<MonthlyProjection> {
        let date = NaiveDate::from_ymd_opt(year, month, PROJECTION_DAY)
            .ok_or_else(|| LearningError::InvalidDate(format!("{year}-{month:02}")))?;
        self.project(species, date)
    }

    /// Estimates for the twelve months of a year.
    pub fn predict_year(&self, species: &str, year: i32) -> Result<Vec<MonthlyProjection>> {
        (1..=12)
            .map(|month| self.predict_month(species, year, month))
            .collect()
    }

    /// Estimates for `n` consecutive calendar months starting at `start`.
    pub fn predict_next_months(
        &self,
        species: &str,
        start: NaiveDate,
        n: u32,
    ) -> Result<Vec<MonthlyProjection>> {
        (0..n)
            .map(|k| {
                let date = start
                    .checked_add_months(Months::new(k))
                    .ok_or_else(|| LearningError::InvalidDate(format!("{start} + {k} months")))?;
                self.project(species, date)
            })
            .collect()
    }

    fn project(&self, species: &str, date: NaiveDate) -> Result<MonthlyProjection> {
        let loaded = self.load(species)?;
        let month = Month::of(date);
        let inputs = self.projection_defaults.resolve(month, None, None, None);
        let biomass = loaded.estimate(&inputs)?;
        let metrics = loaded.metrics()?;

        Ok(MonthlyProjection {
            date,
            year: date.year(),
            month: month.number(),
            month_name: month.name().to_string(),
            season: inputs.season,
            temperature: inputs.temperature,
            biomass: round_to(biomass, 2),
            mae: metrics.test.mae,
            r2: metrics.test.r2,
        })
    }
}

static_assertions::assert_impl_all!(PredictionService: Send, Sync);
static_assertions::assert_impl_all!(ModelCache: Send, Sync);

// =============================================================================
// Helpers
// =============================================================================

/// Parse a request date.
///
/// Accepts `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS[.fff]` and RFC 3339 (with a
/// numeric offset or `Z`); the time of day is ignored.
pub fn parse_request_date(value: &str) -> Result<NaiveDate> {
    let trimmed = value.trim();
    if let Ok(date) = NaiveDate::parse_from_str(trimmed, "%Y-%m-%d") {
        return Ok(date);
    }
    if let Ok(datetime) = NaiveDateTime::parse_from_str(trimmed, "%Y-%m-%dT%H:%M:%S%.f") {
        return Ok(datetime.date());
    }
    if let Ok(datetime) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(datetime.date_naive());
    }
    Err(LearningError::InvalidDate(value.to_string()))
}

fn validate_overrides(request: &PredictionRequest) -> Result<()> {
    if let Some(t) = request.temperature.filter(|t| !(0.0..=MAX_TEMPERATURE).contains(t)) {
        return Err(LearningError::InvalidInput(format!(
            "temperature {t} must be between 0 and {MAX_TEMPERATURE} °C"
        )));
    }
    for (name, value) in [("din", request.din), ("nt", request.nt)] {
        if let Some(v) = value.filter(|v| !(*v >= 0.0 && v.is_finite())) {
            return Err(LearningError::InvalidInput(format!(
                "{name} {v} must be a non-negative number"
            )));
        }
    }
    Ok(())
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::artifacts::MemoryArtifactStore;
    use crate::config::TrainingConfig;
    use crate::trainer::Trainer;
    use algae_processing::Observation;

    fn observations(species: &str, n: usize) -> Vec<Observation> {
        (0..n)
            .map(|i| {
                let date = NaiveDate::from_ymd_opt(2023, (i % 12) as u32 + 1, 10).unwrap();
                let month = Month::of(date);
                let temperature = 18.0 + (i % 10) as f64;
                Observation {
                    site: "S1".to_string(),
                    date,
                    month,
                    year: 2023,
                    season: month.season(),
                    species: species.to_string(),
                    biomass: 2.0 * temperature + (i % 3) as f64,
                    din_min: 3.0 + (i % 4) as f64,
                    din_max: 7.0 + (i % 4) as f64,
                    nt_min: 12.0 + (i % 5) as f64,
                    nt_max: 30.0 + (i % 5) as f64,
                    temperature,
                }
            })
            .collect()
    }

    fn trained_service() -> PredictionService {
        let store = Arc::new(MemoryArtifactStore::new());
        let mut data = observations("Ulva", 40);
        data.extend(observations("Rare", 5));
        Trainer::builder()
            .config(TrainingConfig::default())
            .store(store.clone())
            .build()
            .unwrap()
            .train_all(&data)
            .unwrap();
        PredictionService::new(store, SeasonalDefaults::default())
    }

    #[test]
    fn test_parse_request_date_forms() {
        let expected = NaiveDate::from_ymd_opt(2025, 7, 15).unwrap();
        assert_eq!(parse_request_date("2025-07-15").unwrap(), expected);
        assert_eq!(parse_request_date("2025-07-15T10:30:00").unwrap(), expected);
        assert_eq!(parse_request_date("2025-07-15T10:30:00Z").unwrap(), expected);
        assert_eq!(parse_request_date("2025-07-15T10:30:00+02:00").unwrap(), expected);
        assert!(matches!(
            parse_request_date("15/07/2025"),
            Err(LearningError::InvalidDate(_))
        ));
        assert!(parse_request_date("2025-13-45").is_err());
    }

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(0.987654, 4), 0.9877);
    }

    #[test]
    fn test_predict_with_defaults() {
        let service = trained_service();
        let prediction = service
            .predict(&PredictionRequest::new("Ulva", "S1", "2025-07-15"))
            .unwrap();

        assert_eq!(prediction.season, Season::Rainy);
        assert_eq!(prediction.inputs_used.temperature, 26.5);
        assert_eq!(prediction.inputs_used.din, 6.5);
        assert!(prediction.estimate >= 0.0);
        assert_eq!(prediction.estimate, round_to(prediction.estimate, 2));

        let summary = service.summary().unwrap();
        let metrics = summary.get("Ulva").unwrap().metrics().unwrap();
        assert_eq!(prediction.confidence, Confidence::from(metrics));
        assert_eq!(service.cache().len(), 1);
    }

    #[test]
    fn test_predict_with_overrides() {
        let service = trained_service();
        let request = PredictionRequest::new("Ulva", "S1", "2025-03-01")
            .with_temperature(21.0)
            .with_din(10.0)
            .with_nt(20.0);
        let prediction = service.predict(&request).unwrap();
        assert_eq!(prediction.season, Season::Dry);
        assert_eq!(prediction.inputs_used.temperature, 21.0);
        assert_eq!(prediction.inputs_used.din_min, 9.0);
        assert_eq!(prediction.inputs_used.din_max, 11.0);
        assert_eq!(prediction.inputs_used.nt_min, 17.0);
        assert_eq!(prediction.inputs_used.nt_max, 23.0);
    }

    #[test]
    fn test_unknown_and_skipped_species() {
        let service = trained_service();
        for species in ["Nope", "Rare"] {
            let err = service
                .predict(&PredictionRequest::new(species, "S1", "2025-07-15"))
                .unwrap_err();
            assert!(matches!(err, LearningError::UnknownSpecies(ref s) if s == species));
        }
    }

    #[test]
    fn test_invalid_date_and_inputs() {
        let service = trained_service();
        let err = service
            .predict(&PredictionRequest::new("Ulva", "S1", "July 15th"))
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_DATE");

        let err = service
            .predict(&PredictionRequest::new("Ulva", "S1", "2025-07-15").with_temperature(80.0))
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");

        let err = service
            .predict(&PredictionRequest::new("Ulva", "S1", "2025-07-15").with_nt(-1.0))
            .unwrap_err();
        assert_eq!(err.error_code(), "INVALID_INPUT");
    }

    #[test]
    fn test_catalog_and_info() {
        let service = trained_service();
        let catalog = service.species_catalog().unwrap();
        assert_eq!(catalog.len(), 1);
        assert_eq!(catalog[0].species, "Ulva");

        let info = service.species_info("Ulva", None).unwrap();
        assert_eq!(info.total_samples, 40);
        assert_eq!(info.train_samples + info.test_samples, 40);
        assert!(info.biomass.is_none());

        let dataset = Dataset::from_observations(observations("Ulva", 40));
        let info = service.species_info("Ulva", Some(&dataset)).unwrap();
        assert_eq!(info.biomass.unwrap().count, 40);

        assert!(matches!(
            service.species_info("Rare", None),
            Err(LearningError::UnknownSpecies(_))
        ));
    }

    #[test]
    fn test_projections() {
        let service = trained_service();
        let year = service.predict_year("Ulva", 2026).unwrap();
        assert_eq!(year.len(), 12);
        assert_eq!(year[0].month_name, "January");
        assert_eq!(year[0].season, Season::Cold);
        assert_eq!(year[11].temperature, 19.5);
        assert!(year.iter().all(|p| p.biomass >= 0.0));

        let start = NaiveDate::from_ymd_opt(2025, 11, 30).unwrap();
        let next = service.predict_next_months("Ulva", start, 4).unwrap();
        let months: Vec<u32> = next.iter().map(|p| p.month).collect();
        assert_eq!(months, vec![11, 12, 1, 2]);
        assert_eq!(next[2].year, 2026);
        assert_eq!(next[3].date, NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());

        assert!(service.predict_month("Ulva", 2026, 13).is_err());
    }

    #[test]
    fn test_reload_clears_cache() {
        let service = trained_service();
        service.load("Ulva").unwrap();
        assert!(!service.cache().is_empty());
        service.reload();
        assert!(service.cache().is_empty());
    }

    #[test]
    fn test_cache_first_insert_wins() {
        let service = trained_service();
        let first = service.load("Ulva").unwrap();
        let encoder = first.encoder().clone();
        let model = first.model().clone();
        let again = service
            .cache()
            .insert("Ulva", LoadedSpecies::new(encoder, model).unwrap());
        assert!(Arc::ptr_eq(&first, &again));
    }
}
