//! Progress reporting for training runs.
//!
//! The trainer emits a [`ProgressUpdate`] at every stage boundary and once
//! per species, so a CLI spinner or a UI can follow a long run.
//!
//! # Example
//!
//! ```rust,ignore
//! use algae_learning::Trainer;
//!
//! let trainer = Trainer::builder()
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?;
//! ```

use serde::{Deserialize, Serialize};

/// Stages of a training run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrainingStage {
    /// Grouping observations by species
    Initializing,
    /// Fitting one encoder and model per species
    Training,
    /// Writing encoder and model artifacts
    SavingArtifacts,
    /// Writing the training summary
    SavingSummary,
    /// Run completed
    Complete,
    /// Run failed with an error
    Failed,
}

impl TrainingStage {
    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Initializing => "Initializing",
            Self::Training => "Training Models",
            Self::SavingArtifacts => "Saving Artifacts",
            Self::SavingSummary => "Saving Summary",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }

    /// Share of the overall run spent in this stage (0.0 - 1.0).
    pub fn weight(&self) -> f32 {
        match self {
            Self::Initializing => 0.05,
            Self::Training => 0.80,
            Self::SavingArtifacts => 0.12,
            Self::SavingSummary => 0.03,
            Self::Complete | Self::Failed => 0.0,
        }
    }

    /// Cumulative progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Initializing => 0.0,
            Self::Training => 0.05,
            Self::SavingArtifacts => 0.85,
            Self::SavingSummary => 0.97,
            Self::Complete => 1.0,
            Self::Failed => 0.0,
        }
    }
}

/// Progress of a training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    pub stage: TrainingStage,

    /// Species being processed, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub species: Option<String>,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within current stage (0.0 - 1.0)
    pub stage_progress: f32,

    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_processed: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_total: Option<usize>,
}

impl ProgressUpdate {
    pub fn new(stage: TrainingStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            species: None,
            progress: progress.clamp(0.0, 1.0),
            stage_progress: stage_progress.clamp(0.0, 1.0),
            message: message.into(),
            items_processed: None,
            items_total: None,
        }
    }

    /// Update for the `current`-th of `total` species.
    pub fn with_items(
        stage: TrainingStage,
        species: impl Into<String>,
        current: usize,
        total: usize,
        message: impl Into<String>,
    ) -> Self {
        let stage_progress = if total > 0 {
            current as f32 / total as f32
        } else {
            0.0
        };
        Self {
            species: Some(species.into()),
            items_processed: Some(current),
            items_total: Some(total),
            ..Self::new(stage, stage_progress, message)
        }
    }

    pub fn complete(message: impl Into<String>) -> Self {
        Self::new(TrainingStage::Complete, 1.0, message)
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self::new(TrainingStage::Failed, 0.0, message)
    }
}

/// Receiver of training progress.
///
/// Implementations must be `Send + Sync` so a run can report from a worker
/// thread.
pub trait ProgressReporter: Send + Sync {
    fn report(&self, update: ProgressUpdate);
}

/// [`ProgressReporter`] backed by a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

/// Reporter that drops every update.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn report(&self, _update: ProgressUpdate) {}
}

static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_progress_update_with_items() {
        let update = ProgressUpdate::with_items(TrainingStage::Training, "Ulva", 1, 4, "Training Ulva");
        assert_eq!(update.species.as_deref(), Some("Ulva"));
        assert_eq!(update.stage_progress, 0.25);
        assert!((update.progress - 0.25).abs() < 1e-6);
        assert_eq!(update.items_total, Some(4));
    }

    #[test]
    fn test_complete_and_failed() {
        assert_eq!(ProgressUpdate::complete("done").progress, 1.0);
        let failed = ProgressUpdate::failed("boom");
        assert_eq!(failed.stage, TrainingStage::Failed);
        assert_eq!(failed.progress, 0.0);
    }

    #[test]
    fn test_stage_weights_sum_to_one() {
        let stages = [
            TrainingStage::Initializing,
            TrainingStage::Training,
            TrainingStage::SavingArtifacts,
            TrainingStage::SavingSummary,
        ];
        let total: f32 = stages.iter().map(|s| s.weight()).sum();
        assert!((total - 1.0).abs() < 1e-6);
        for pair in stages.windows(2) {
            let end = pair[0].base_progress() + pair[0].weight();
            assert!((end - pair[1].base_progress()).abs() < 1e-6);
        }
    }

    #[test]
    fn test_closure_progress_reporter() {
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let reporter = ClosureProgressReporter::new(move |_update| {
            calls_clone.fetch_add(1, Ordering::SeqCst);
        });
        reporter.report(ProgressUpdate::new(TrainingStage::Initializing, 0.0, "start"));
        reporter.report(ProgressUpdate::complete("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_serialization_skips_empty_fields() {
        let json = serde_json::to_value(ProgressUpdate::new(TrainingStage::Training, 0.5, "x")).unwrap();
        assert_eq!(json["stage"], "training");
        assert!(json.get("species").is_none());
    }
}
