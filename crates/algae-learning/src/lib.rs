//! algae-learning: per-species biomass models for macroalgae cultivation.
//!
//! This crate turns the typed observations of [`algae_processing`] into one
//! ridge polynomial regression model per algae species, persists the fitted
//! encoders and models, and serves biomass predictions from them.
//!
//! # Features
//!
//! - **Feature encoding**: standardized environmental inputs plus season
//!   indicators, expanded to polynomial terms ([`FeatureEncoder`])
//! - **Species models**: ridge regression with a seeded holdout split and
//!   R²/RMSE/MAE/MSE metrics ([`SpeciesModel`])
//! - **Training runs**: every species of a dataset trained, skipped or
//!   recorded as failed, with progress callbacks ([`Trainer`])
//! - **Prediction**: seasonal defaults for missing inputs, cached models and
//!   monthly projections ([`PredictionService`])
//! - **Artifacts**: versioned JSON documents in a directory or in memory
//!   ([`ArtifactStore`])
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use algae_learning::{
//!     FsArtifactStore, PredictionRequest, PredictionService, SeasonalDefaults, Trainer,
//!     TrainingConfig,
//! };
//! use algae_processing::DatasetLoader;
//! use std::sync::Arc;
//!
//! let dataset = DatasetLoader::new().load_csv("dataset_completo.csv")?;
//! let store = Arc::new(FsArtifactStore::new("trained_models"));
//!
//! let trainer = Trainer::builder()
//!     .config(TrainingConfig::builder().min_samples(30).build()?)
//!     .store(store.clone())
//!     .build()?;
//! let summary = trainer.train_all(dataset.observations())?;
//! println!("{}", summary.render_report());
//!
//! let service = PredictionService::new(store, SeasonalDefaults::default());
//! let prediction = service.predict(&PredictionRequest::new("Ulva lactuca", "Bahía", "2025-07-15"))?;
//! println!("{} g/m²", prediction.estimate);
//! ```
//!
//! # Error Handling
//!
//! Fallible operations return [`Result<T, LearningError>`](LearningError).
//! Problems with one species during a training run do not fail the run;
//! they are recorded in the [`TrainingSummary`] as `skipped` or `error`.
//!
//! # Thread Safety
//!
//! [`PredictionService`] is `Send + Sync` and can be shared behind an `Arc`.
//! Loaded models are immutable and cached behind a read-write lock.

pub mod artifacts;
pub mod config;
pub mod defaults;
pub mod encoder;
pub mod error;
pub mod metrics;
pub mod model;
pub mod prediction;
pub mod progress;
pub mod trainer;

pub use artifacts::{
    ArtifactStore, FsArtifactStore, MemoryArtifactStore, SCHEMA_VERSION, SUMMARY_KEY, encoder_key,
    model_key, safe_name,
};
pub use config::{ConfigValidationError, TrainingConfig, TrainingConfigBuilder};
pub use defaults::{
    DEFAULT_DIN_BAND, DEFAULT_NT_BAND, DefaultsProfile, NutrientDefaults, ResolvedInputs,
    SeasonalDefaults,
};
pub use encoder::{EncoderArtifact, FeatureEncoder, FeatureInfo, FeatureMatrix, FeatureSource};
pub use error::{LearningError, Result};
pub use metrics::{MetricKind, Metrics, SplitMetrics};
pub use model::{ModelArtifact, SpeciesModel};
pub use prediction::{
    CatalogEntry, Confidence, InputsUsed, LoadedSpecies, ModelCache, MonthlyProjection, Prediction,
    PredictionRequest, PredictionService, SpeciesInfo, parse_request_date,
};
pub use progress::{
    ClosureProgressReporter, NoopReporter, ProgressReporter, ProgressUpdate, TrainingStage,
};
pub use trainer::{
    RankedModel, SpeciesOutcome, SummaryCounts, Trainer, TrainerBuilder, TrainingSummary,
    best_models,
};
