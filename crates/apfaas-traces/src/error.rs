use std::path::PathBuf;

use apfaas_core::CoreError;
use thiserror::Error;

/// Errors of the trace stage.
///
/// A window returning a capped or partial result set is not an error; it is
/// logged and the stage continues.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("run directory not found: {0}")]
    MissingRunDirectory(PathBuf),

    #[error("run manifest not found: {0}")]
    MissingManifest(PathBuf),

    /// The manifest lists a different number of level files than the run
    /// directory holds.
    #[error("the manifest lists {expected} test file(s) but {found} are stored in {directory}")]
    ResultFileMismatch {
        directory: PathBuf,
        expected: usize,
        found: usize,
    },

    #[error("provider credentials not found")]
    MissingCredentials,

    #[error("unsupported provider: {0}")]
    UnknownProvider(String),

    /// The telemetry backend rejected or failed a query call.
    #[error("query failed: {0}")]
    Query(String),

    #[error("trace task failed: {0}")]
    Join(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type TraceResult<T> = Result<T, TraceError>;
