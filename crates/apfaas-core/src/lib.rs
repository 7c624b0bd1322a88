//! Core domain types shared by the apfaas load profiler.
//!
//! The fetcher crate produces [`RequestResult`] tables from a generated
//! [`RequestRecord`] sample; the traces crate reads them back through the
//! [`RunManifest`] and joins them against provider telemetry.

pub mod config;
pub mod error;
pub mod manifest;
pub mod request;
pub mod sample;
pub mod settings;
pub mod table;

pub use config::{
    ConcurrencyPolicy, Credentials, EventKind, ExperimentConfig, FunctionDefinition,
    SampleDefinition,
};
pub use error::{CoreError, CoreResult};
pub use manifest::{ExperimentalResults, RunManifest, MANIFEST_FILE_NAME};
pub use request::{QueryParams, RequestRecord, RequestResult};
pub use sample::generate_sample;
pub use settings::{FetchSettings, LogFormat, LoggingSettings, Settings, TraceSettings, WorkerMode};
