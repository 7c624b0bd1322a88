use apfaas_core::CoreError;
use thiserror::Error;

/// Errors that abort a level or a whole run.
///
/// Individual request failures never show up here; the transport executor
/// turns them into result rows.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error(transparent)]
    Core(#[from] CoreError),

    /// The single-threaded scheduler of a partition could not be built.
    #[error("failed to build partition runtime: {0}")]
    Runtime(String),

    /// A non-empty partition was assigned no concurrency.
    #[error("partition {index} holds {records} request(s) but no concurrency")]
    InvalidConcurrency { index: usize, records: usize },

    /// A worker exited abnormally or returned an unreadable payload.
    #[error("worker for partition {index} failed: {message}")]
    WorkerFailed { index: usize, message: String },

    /// A partition task panicked or was cancelled.
    #[error("partition task failed: {0}")]
    Join(String),

    /// Persisted level files do not match the concurrency sequence.
    #[error("the number of test file(s) stored ({found}) is distinct from the number of concurrency levels ({expected})")]
    IntegrityMismatch { expected: usize, found: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type FetchResult<T> = Result<T, FetchError>;
