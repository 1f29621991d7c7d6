//! Error types for the feature pipeline.

use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can abort a pipeline run.
///
/// Every variant is fatal for the run that raised it. Conditions that only
/// affect individual cells (insufficient history for a lag, a weighted
/// location without data) are resolved with nulls or logged instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// A source frame lacks a column the pipeline needs.
    #[error("Missing required column `{column}` in {frame}")]
    MissingColumn {
        /// Frame the column was expected in
        frame: String,
        /// Name of the missing column
        column: String,
    },

    /// A source frame is malformed or unreadable.
    #[error("Ingestion error in {frame}: {reason}")]
    Ingestion {
        /// Frame that failed to ingest
        frame: String,
        /// What was wrong with it
        reason: String,
    },

    /// Joining a frame left no timestamps shared with the frames before it.
    #[error("Alignment error at {frame}: {reason}")]
    Alignment {
        /// Frame whose join emptied the dataset
        frame: String,
        /// Details about the mismatch
        reason: String,
    },

    /// Invalid date range
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange {
        /// Start of the range
        start: String,
        /// End of the range
        end: String,
    },

    /// Not enough rows to carve out the forecast horizon.
    #[error("Insufficient data: need {required} rows, got {available}")]
    InsufficientData {
        /// Required number of rows
        required: usize,
        /// Available number of rows
        available: usize,
    },

    /// Invalid run configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Polars DataFrame error
    #[error("DataFrame error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// Filesystem error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    Json(#[from] serde_json::Error),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),
}

impl PipelineError {
    /// Shorthand for an [`PipelineError::Ingestion`] error.
    pub fn ingestion(frame: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Ingestion {
            frame: frame.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for a [`PipelineError::MissingColumn`] error.
    pub fn missing_column(frame: impl Into<String>, column: impl Into<String>) -> Self {
        Self::MissingColumn {
            frame: frame.into(),
            column: column.into(),
        }
    }
}
