//! Error types for the algae-learning crate.
//!
//! This module defines [`LearningError`], the main error type used throughout
//! the crate. All public API functions return `Result<T, LearningError>`.
//!
//! Per-species failures during a training run are *recorded* in the
//! [`TrainingSummary`](crate::TrainingSummary) rather than returned; only
//! run-level failures (such as failing to write the summary) surface as
//! errors from [`Trainer::train_all`](crate::Trainer::train_all).
//!
//! # Example
//!
//! ```no_run
//! use algae_learning::{LearningError, TrainingConfig};
//!
//! fn configure() -> Result<TrainingConfig, LearningError> {
//!     let config = TrainingConfig::builder().degree(2).alpha(1.0).build()?;
//!     Ok(config)
//! }
//! ```

use algae_processing::ProcessingError;
use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

use crate::config::ConfigValidationError;

/// The main error type for algae-learning operations.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum LearningError {
    /// The feature encoder was used before `fit_transform`.
    #[error("Feature encoder is not fitted")]
    NotFitted,

    /// The species model was used for prediction before training.
    #[error("Model for '{0}' is not trained")]
    NotTrained(String),

    /// Not enough rows to fit or to split into train and holdout sets.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// No successfully trained model exists for the requested species.
    ///
    /// Species that were skipped or failed during training are reported
    /// as unknown as well.
    #[error("Unknown species '{0}'")]
    UnknownSpecies(String),

    /// A prediction date could not be parsed.
    ///
    /// Accepted forms are `YYYY-MM-DD`, `YYYY-MM-DDTHH:MM:SS` and RFC 3339.
    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),

    /// A prediction override is outside its accepted range.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The ridge system could not be solved or produced non-finite weights.
    #[error("Training failed: {0}")]
    TrainingFailure(String),

    /// The number of feature columns does not match the trained model.
    #[error("Feature mismatch: model expects {expected} columns, got {actual}")]
    FeatureMismatch { expected: usize, actual: usize },

    /// An operation was attempted in a state that does not allow it, such as
    /// training a model twice.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Invalid configuration values.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(#[from] ConfigValidationError),

    /// A stored artifact does not exist.
    #[error("Artifact not found: {0}")]
    ArtifactNotFound(String),

    /// A stored artifact exists but is not of the expected kind or version.
    #[error("Invalid artifact '{key}': {reason}")]
    ArtifactFormat { key: String, reason: String },

    /// Error from the dataset layer.
    #[error(transparent)]
    Processing(#[from] ProcessingError),

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl LearningError {
    /// Get error code for API-layer handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::NotFitted => "NOT_FITTED",
            Self::NotTrained(_) => "NOT_TRAINED",
            Self::InsufficientData(_) => "INSUFFICIENT_DATA",
            Self::UnknownSpecies(_) => "UNKNOWN_SPECIES",
            Self::InvalidDate(_) => "INVALID_DATE",
            Self::InvalidInput(_) => "INVALID_INPUT",
            Self::TrainingFailure(_) => "TRAINING_FAILURE",
            Self::FeatureMismatch { .. } => "FEATURE_MISMATCH",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::ArtifactNotFound(_) => "ARTIFACT_NOT_FOUND",
            Self::ArtifactFormat { .. } => "ARTIFACT_FORMAT",
            Self::Processing(e) => e.error_code(),
            Self::Io(_) => "IO_ERROR",
            Self::Json(_) => "JSON_ERROR",
        }
    }

    /// Whether the error was caused by the caller's request rather than by
    /// the stored models or the environment.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::UnknownSpecies(_)
                | Self::InvalidDate(_)
                | Self::InvalidInput(_)
                | Self::InvalidConfig(_)
        )
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for LearningError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("LearningError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for learning operations.
pub type Result<T> = std::result::Result<T, LearningError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = LearningError::UnknownSpecies("Ulva".to_string());
        assert_eq!(err.to_string(), "Unknown species 'Ulva'");

        let err = LearningError::FeatureMismatch {
            expected: 27,
            actual: 20,
        };
        assert!(err.to_string().contains("27"));
        assert!(err.to_string().contains("20"));
    }

    #[test]
    fn test_processing_error_keeps_code() {
        let err: LearningError = ProcessingError::DataFormat("no header".to_string()).into();
        assert_eq!(err.error_code(), "DATA_FORMAT_ERROR");
        assert_eq!(err.to_string(), "Data format error: no header");
    }

    #[test]
    fn test_client_errors() {
        assert!(LearningError::InvalidDate("tomorrow".to_string()).is_client_error());
        assert!(LearningError::InvalidInput("temperature".to_string()).is_client_error());
        assert!(!LearningError::NotFitted.is_client_error());
    }

    #[test]
    fn test_error_serialization() {
        let err = LearningError::InvalidDate("2025-13-45".to_string());
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "INVALID_DATE");
        assert!(json["message"].as_str().unwrap().contains("2025-13-45"));
    }
}
