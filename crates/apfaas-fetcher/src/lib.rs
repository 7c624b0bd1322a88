//! Concurrency ramp engine for apfaas.
//!
//! The [`RampScheduler`] fans a request sample out over worker partitions for
//! every concurrency level. Each partition runs the bounded batch runner on
//! its own single-threaded runtime, and every request goes through the
//! transport executor, which never fails past its boundary.

pub mod error;
pub mod experiment;
pub mod launcher;
pub mod plan;
pub mod progress;
pub mod runner;
pub mod scheduler;
pub mod transport;

pub use error::{FetchError, FetchResult};
pub use experiment::{Experiment, ExperimentOutcome};
pub use launcher::{run_worker, PartitionLauncher, ProcessLauncher, ThreadLauncher};
pub use plan::{concurrency_sequence, partition_concurrency, process_count, split_chunks, LevelPlan};
pub use progress::{BarProgress, LogProgress, NoProgress, ProgressReporter};
pub use runner::{run_batch, run_partition, BatchOptions, PartitionJob};
pub use scheduler::RampScheduler;
pub use transport::{execute, FailureKind, TransportOptions};
