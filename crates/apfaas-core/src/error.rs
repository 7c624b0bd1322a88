use std::path::PathBuf;

use thiserror::Error;

/// Canonical error type for configuration, sample and persistence operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The sample cannot saturate the highest concurrency level.
    #[error(
        "maximum concurrency ({maximum}) is greater than the data size ({data_size}); \
         the maximum concurrency has to be lower than or equal to the data size"
    )]
    SampleTooSmall {
        /// Requested sample size.
        data_size: usize,
        /// Configured `concurrency.maximum`.
        maximum: usize,
    },

    /// Configuration value failed validation.
    #[error("validation error: {0}")]
    ValidationError(String),

    /// Configuration file could not be read or parsed.
    #[error("error reading {path}: {message}")]
    ConfigFile {
        /// File that failed to load.
        path: PathBuf,
        /// Parser or I/O message.
        message: String,
    },

    /// Layered tool settings failed to build.
    #[error("settings error: {0}")]
    Settings(#[from] config::ConfigError),

    /// A result table is malformed.
    #[error("malformed table {path}: {message}")]
    MalformedTable {
        /// Offending file.
        path: PathBuf,
        /// Human-readable details.
        message: String,
    },

    /// I/O error occurred during file operations.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// CSV encoding or decoding failed.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON encoding or decoding failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    /// Creates a `ValidationError` variant.
    #[must_use]
    pub fn validation(message: impl Into<String>) -> Self {
        Self::ValidationError(message.into())
    }

    /// Creates a `MalformedTable` variant.
    #[must_use]
    pub fn malformed(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::MalformedTable {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Convenient result alias for core operations.
pub type CoreResult<T> = Result<T, CoreError>;
