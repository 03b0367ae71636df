//! Custom error types for dataset loading and reshaping.
//!
//! This module provides the error hierarchy using `thiserror` for the
//! loader, the wide-sheet assembly and the dataset queries.
//!
//! Errors are serializable so a surrounding API layer can forward them
//! as `{code, message}` documents.

use serde::Serialize;
use serde::ser::SerializeStruct;
use thiserror::Error;

/// The main error type for dataset processing.
#[derive(Error, Debug)]
pub enum ProcessingError {
    /// The source is not a table, or lacks the headers the loader needs.
    #[error("Data format error: {0}")]
    DataFormat(String),

    /// Column was not found in the dataset.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// A single cell could not be interpreted.
    #[error("Invalid value '{value}' in column '{column}'")]
    InvalidValue { column: String, value: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ProcessingError>,
    },
}

impl ProcessingError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ProcessingError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Get error code for API-layer handling.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::DataFormat(_) => "DATA_FORMAT_ERROR",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::InvalidValue { .. } => "INVALID_VALUE",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// Check if this error means the source itself is malformed.
    pub fn is_data_format(&self) -> bool {
        match self {
            Self::DataFormat(_) | Self::ColumnNotFound(_) => true,
            Self::WithContext { source, .. } => source.is_data_format(),
            _ => false,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for ProcessingError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("ProcessingError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for processing operations.
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ProcessingError::Polars(e).with_context(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code() {
        assert_eq!(
            ProcessingError::DataFormat("no header".to_string()).error_code(),
            "DATA_FORMAT_ERROR"
        );
        assert_eq!(
            ProcessingError::ColumnNotFound("Biomass".to_string()).error_code(),
            "COLUMN_NOT_FOUND"
        );
    }

    #[test]
    fn test_is_data_format_through_context() {
        let error = ProcessingError::DataFormat("bad".to_string()).with_context("Loading sheet");
        assert!(error.is_data_format());
        assert!(!ProcessingError::Io(std::io::Error::other("disk")).is_data_format());
    }

    #[test]
    fn test_error_serialization() {
        let error = ProcessingError::ColumnNotFound("Temperature".to_string());
        let json = serde_json::to_string(&error).unwrap();
        assert!(json.contains("COLUMN_NOT_FOUND"));
        assert!(json.contains("Temperature"));
    }

    #[test]
    fn test_with_context() {
        let error =
            ProcessingError::ColumnNotFound("Site".to_string()).with_context("During assembly");
        assert!(error.to_string().contains("During assembly"));
        assert_eq!(error.error_code(), "COLUMN_NOT_FOUND");
    }
}
