//! Training orchestration over every species of a dataset.
//!
//! The [`Trainer`] groups observations by species, fits a fresh
//! [`FeatureEncoder`] and [`SpeciesModel`] for each species with enough
//! samples, writes their artifacts and records the outcome of every species
//! in a [`TrainingSummary`]. A failure of one species is recorded and the
//! run continues.
//!
//! # Example
//!
//! ```rust,ignore
//! use algae_learning::{FsArtifactStore, Trainer, TrainingConfig};
//! use std::sync::Arc;
//!
//! let trainer = Trainer::builder()
//!     .config(TrainingConfig::builder().min_samples(30).build()?)
//!     .store(Arc::new(FsArtifactStore::new("trained_models")))
//!     .on_progress(|u| println!("[{:.0}%] {}", u.progress * 100.0, u.message))
//!     .build()?;
//!
//! let summary = trainer.train_all(dataset.observations())?;
//! println!("{}", summary.render_report());
//! ```

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashSet};
use std::fmt::Write as _;
use std::sync::Arc;
use tracing::{debug, info, warn};

use algae_processing::Observation;

use crate::artifacts::{ArtifactStore, FsArtifactStore, SUMMARY_KEY, encoder_key, model_key};
use crate::config::{ConfigValidationError, TrainingConfig};
use crate::encoder::FeatureEncoder;
use crate::error::{LearningError, Result};
use crate::metrics::{MetricKind, Metrics};
use crate::model::SpeciesModel;
use crate::progress::{ClosureProgressReporter, ProgressReporter, ProgressUpdate, TrainingStage};

// =============================================================================
// Summary
// =============================================================================

/// Result of training one species.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SpeciesOutcome {
    Success {
        n_samples: usize,
        metrics: Metrics,
        model_file: String,
        encoder_file: String,
    },
    Skipped {
        reason: String,
        n_samples: usize,
    },
    Error {
        reason: String,
        n_samples: usize,
    },
}

impl SpeciesOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn n_samples(&self) -> usize {
        match self {
            Self::Success { n_samples, .. }
            | Self::Skipped { n_samples, .. }
            | Self::Error { n_samples, .. } => *n_samples,
        }
    }

    /// Status label as stored in the summary document.
    pub fn status(&self) -> &'static str {
        match self {
            Self::Success { .. } => "success",
            Self::Skipped { .. } => "skipped",
            Self::Error { .. } => "error",
        }
    }

    /// Holdout metrics of a successful species.
    pub fn metrics(&self) -> Option<&Metrics> {
        match self {
            Self::Success { metrics, .. } => Some(metrics),
            _ => None,
        }
    }

    /// Why a species was skipped or failed.
    pub fn reason(&self) -> Option<&str> {
        match self {
            Self::Skipped { reason, .. } | Self::Error { reason, .. } => Some(reason),
            Self::Success { .. } => None,
        }
    }
}

/// Number of species per outcome.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryCounts {
    pub successful: usize,
    pub skipped: usize,
    pub errors: usize,
    pub total: usize,
}

/// Outcome of every species of a training run, keyed by species name.
///
/// Serialized as a plain JSON object so that the stored
/// `training_summary.json` maps species directly to their outcome.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrainingSummary {
    species: BTreeMap<String, SpeciesOutcome>,
}

impl TrainingSummary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read the summary stored under [`SUMMARY_KEY`].
    pub fn load(store: &dyn ArtifactStore) -> Result<Self> {
        let text = store.get(SUMMARY_KEY)?;
        serde_json::from_str(&text).map_err(|e| LearningError::ArtifactFormat {
            key: SUMMARY_KEY.to_string(),
            reason: e.to_string(),
        })
    }

    pub fn insert(&mut self, species: impl Into<String>, outcome: SpeciesOutcome) {
        self.species.insert(species.into(), outcome);
    }

    pub fn get(&self, species: &str) -> Option<&SpeciesOutcome> {
        self.species.get(species)
    }

    /// Outcomes in species order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &SpeciesOutcome)> {
        self.species.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.species.len()
    }

    pub fn is_empty(&self) -> bool {
        self.species.is_empty()
    }

    fn names_with(&self, status: &str) -> Vec<&str> {
        self.iter()
            .filter(|(_, o)| o.status() == status)
            .map(|(name, _)| name)
            .collect()
    }

    pub fn successful(&self) -> Vec<&str> {
        self.names_with("success")
    }

    pub fn skipped(&self) -> Vec<&str> {
        self.names_with("skipped")
    }

    pub fn errors(&self) -> Vec<&str> {
        self.names_with("error")
    }

    pub fn counts(&self) -> SummaryCounts {
        let mut counts = SummaryCounts {
            total: self.len(),
            ..SummaryCounts::default()
        };
        for (_, outcome) in self.iter() {
            match outcome {
                SpeciesOutcome::Success { .. } => counts.successful += 1,
                SpeciesOutcome::Skipped { .. } => counts.skipped += 1,
                SpeciesOutcome::Error { .. } => counts.errors += 1,
            }
        }
        counts
    }

    /// Printable report: outcome counts, the ten best species by holdout R²
    /// and the first skipped species.
    pub fn render_report(&self) -> String {
        let rule = "=".repeat(60);
        let counts = self.counts();
        let mut out = String::new();

        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out, "DETAILED TRAINING SUMMARY");
        let _ = writeln!(out, "{rule}");
        let _ = writeln!(out);
        let _ = writeln!(out, "Successful models: {}", counts.successful);
        let _ = writeln!(out, "Skipped models:    {}", counts.skipped);
        let _ = writeln!(out, "Failed models:     {}", counts.errors);

        let best = best_models(self, 10, MetricKind::R2);
        if !best.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "--- TOP 10 MODELS BY R² ---");
            for (i, m) in best.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "{:2}. {:40} | R²: {:.4} | RMSE: {:.2} | N: {}",
                    i + 1,
                    m.species,
                    m.r2_test,
                    m.rmse_test,
                    m.n_samples
                );
            }
        }

        let skipped = self.skipped();
        if !skipped.is_empty() {
            let _ = writeln!(out);
            let _ = writeln!(out, "--- SKIPPED SPECIES ({}) ---", skipped.len());
            for name in skipped.iter().take(5) {
                let reason = self.get(name).and_then(SpeciesOutcome::reason).unwrap_or("");
                let _ = writeln!(out, "  • {name}: {reason}");
            }
            if skipped.len() > 5 {
                let _ = writeln!(out, "  ... and {} more", skipped.len() - 5);
            }
        }

        out
    }
}

// =============================================================================
// Ranking
// =============================================================================

/// One entry of a [`best_models`] ranking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedModel {
    pub species: String,
    pub metric: MetricKind,
    pub value: f64,
    pub n_samples: usize,
    pub r2_test: f64,
    pub rmse_test: f64,
}

/// Successful species ranked by a holdout metric.
///
/// R² ranks descending and the error metrics ascending. NaN values sort
/// last and ties are broken by species name.
pub fn best_models(summary: &TrainingSummary, top_n: usize, metric: MetricKind) -> Vec<RankedModel> {
    let mut ranked: Vec<RankedModel> = summary
        .iter()
        .filter_map(|(species, outcome)| match outcome {
            SpeciesOutcome::Success {
                n_samples, metrics, ..
            } => Some(RankedModel {
                species: species.to_string(),
                metric,
                value: metrics.test.get(metric),
                n_samples: *n_samples,
                r2_test: metrics.test.r2,
                rmse_test: metrics.test.rmse,
            }),
            _ => None,
        })
        .collect();

    ranked.sort_by(|a, b| {
        compare_metric(a.value, b.value, metric.higher_is_better())
            .then_with(|| a.species.cmp(&b.species))
    });
    ranked.truncate(top_n);
    ranked
}

fn compare_metric(a: f64, b: f64, descending: bool) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ord = a.total_cmp(&b);
            if descending { ord.reverse() } else { ord }
        }
    }
}

// =============================================================================
// Trainer
// =============================================================================

struct TrainedSpecies {
    encoder: FeatureEncoder,
    model: SpeciesModel,
    metrics: Metrics,
}

/// Trains one model per species and persists the results.
pub struct Trainer {
    config: TrainingConfig,
    store: Arc<dyn ArtifactStore>,
    progress: Option<Arc<dyn ProgressReporter>>,
}

impl std::fmt::Debug for Trainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Trainer")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("progress", &self.progress.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl Trainer {
    #[must_use]
    pub fn builder() -> TrainerBuilder {
        TrainerBuilder::default()
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Train every species with the configured settings.
    pub fn train_all(&self, observations: &[Observation]) -> Result<TrainingSummary> {
        self.train_all_with(
            observations,
            self.config.min_samples,
            self.config.holdout_fraction,
        )
    }

    /// Train every species, overriding the sample threshold and holdout
    /// fraction of the configuration.
    ///
    /// Only a failure to write the summary document is returned as an error;
    /// per-species problems are recorded in the summary.
    pub fn train_all_with(
        &self,
        observations: &[Observation],
        min_samples: usize,
        holdout_fraction: f64,
    ) -> Result<TrainingSummary> {
        if min_samples < 2 {
            return Err(ConfigValidationError::InvalidMinSamples(min_samples).into());
        }
        if !(holdout_fraction > 0.0 && holdout_fraction < 1.0) {
            return Err(ConfigValidationError::InvalidFraction {
                field: "holdout_fraction".to_string(),
                value: holdout_fraction,
            }
            .into());
        }

        self.report(ProgressUpdate::new(
            TrainingStage::Initializing,
            0.0,
            format!("Grouping {} observations by species", observations.len()),
        ));

        let mut by_species: BTreeMap<&str, Vec<&Observation>> = BTreeMap::new();
        for obs in observations {
            by_species.entry(obs.species.as_str()).or_default().push(obs);
        }
        let total = by_species.len();

        info!(
            "Training {} species from {} observations (min_samples={}, holdout={})",
            total,
            observations.len(),
            min_samples,
            holdout_fraction
        );

        let mut summary = TrainingSummary::new();
        let mut trained: Vec<(&str, TrainedSpecies)> = Vec::new();

        for (i, (species, rows)) in by_species.iter().enumerate() {
            let n_samples = rows.len();
            self.report(ProgressUpdate::with_items(
                TrainingStage::Training,
                *species,
                i,
                total,
                format!("Training {species} ({n_samples} samples)"),
            ));

            if n_samples < min_samples {
                debug!("Skipping '{species}': {n_samples} < {min_samples}");
                summary.insert(
                    *species,
                    SpeciesOutcome::Skipped {
                        reason: format!("Insufficient samples: {n_samples} < {min_samples}"),
                        n_samples,
                    },
                );
                continue;
            }

            match self.train_species(species, rows, holdout_fraction) {
                Ok(result) => trained.push((*species, result)),
                Err(e) => {
                    warn!("Training failed for '{species}': {e}");
                    summary.insert(
                        *species,
                        SpeciesOutcome::Error {
                            reason: e.to_string(),
                            n_samples,
                        },
                    );
                }
            }
        }

        let n_trained = trained.len();
        let mut used_keys = HashSet::new();
        for (i, (species, result)) in trained.into_iter().enumerate() {
            self.report(ProgressUpdate::with_items(
                TrainingStage::SavingArtifacts,
                species,
                i,
                n_trained,
                format!("Saving artifacts for {species}"),
            ));

            let n_samples = result.model.n_samples();
            let outcome = match self.write_artifacts(species, &result, &mut used_keys) {
                Ok((model_file, encoder_file)) => SpeciesOutcome::Success {
                    n_samples,
                    metrics: result.metrics,
                    model_file,
                    encoder_file,
                },
                Err(e) => {
                    warn!("Could not save artifacts for '{species}': {e}");
                    SpeciesOutcome::Error {
                        reason: format!("failed to save artifacts: {e}"),
                        n_samples,
                    }
                }
            };
            summary.insert(species, outcome);
        }

        self.report(ProgressUpdate::new(
            TrainingStage::SavingSummary,
            0.0,
            "Saving training summary",
        ));
        if let Err(e) = self.write_summary(&summary) {
            self.report(ProgressUpdate::failed(format!("Could not save summary: {e}")));
            return Err(e);
        }

        let counts = summary.counts();
        info!(
            "Training complete: {} successful, {} skipped, {} failed",
            counts.successful, counts.skipped, counts.errors
        );
        self.report(ProgressUpdate::complete(format!(
            "Trained {} of {} species",
            counts.successful, counts.total
        )));

        Ok(summary)
    }

    fn train_species(
        &self,
        species: &str,
        rows: &[&Observation],
        holdout_fraction: f64,
    ) -> Result<TrainedSpecies> {
        let mut encoder = FeatureEncoder::new(self.config.degree);
        let (x, y) = encoder.fit_transform(rows)?;

        let mut model = SpeciesModel::new(species, self.config.alpha);
        let metrics = model.train(&x, &y, holdout_fraction, self.config.seed)?;

        Ok(TrainedSpecies {
            encoder,
            model,
            metrics,
        })
    }

    fn write_artifacts(
        &self,
        species: &str,
        result: &TrainedSpecies,
        used_keys: &mut HashSet<String>,
    ) -> Result<(String, String)> {
        let model_file = model_key(species);
        let encoder_file = encoder_key(species);
        if !used_keys.insert(model_file.clone()) {
            return Err(LearningError::InvalidState(format!(
                "artifact name '{model_file}' is already used by another species"
            )));
        }

        self.store.put(&encoder_file, &result.encoder.serialize()?)?;
        self.store.put(&model_file, &result.model.serialize()?)?;
        Ok((model_file, encoder_file))
    }

    fn write_summary(&self, summary: &TrainingSummary) -> Result<()> {
        let json = serde_json::to_string_pretty(summary)?;
        self.store.put(SUMMARY_KEY, &json)?;
        info!("Saved training summary ({} species)", summary.len());
        Ok(())
    }

    fn report(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress {
            reporter.report(update);
        }
    }
}

/// Builder for [`Trainer`].
#[derive(Default)]
pub struct TrainerBuilder {
    config: Option<TrainingConfig>,
    store: Option<Arc<dyn ArtifactStore>>,
    progress: Option<Arc<dyn ProgressReporter>>,
}

impl std::fmt::Debug for TrainerBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TrainerBuilder")
            .field("config", &self.config)
            .field("store", &self.store)
            .field("progress", &self.progress.as_ref().map(|_| "<callback>"))
            .finish()
    }
}

impl TrainerBuilder {
    /// Set the training configuration (default: [`TrainingConfig::default`]).
    #[must_use]
    pub fn config(mut self, config: TrainingConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the artifact store (default: a directory store at the
    /// configuration's `models_dir`).
    #[must_use]
    pub fn store(mut self, store: Arc<dyn ArtifactStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Receive progress updates through a closure.
    #[must_use]
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Receive progress updates through a reporter.
    #[must_use]
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress = Some(reporter);
        self
    }

    /// Build the trainer, validating the configuration.
    pub fn build(self) -> Result<Trainer> {
        let config = self.config.unwrap_or_default();
        config.validate()?;
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(FsArtifactStore::new(config.models_dir.clone())));

        Ok(Trainer {
            config,
            store,
            progress: self.progress,
        })
    }
}
