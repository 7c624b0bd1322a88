//! Trace correlation engine for apfaas.
//!
//! The span of a completed run is cut into time windows, each window is
//! queried against the provider's log store, and the returned execution
//! records are joined with the persisted request results on the
//! provider-assigned correlation identifier.

pub mod aws;
pub mod correlate;
pub mod error;
pub mod pipeline;
pub mod provider;
pub mod query;
pub mod record;
pub mod window;

pub use aws::{insights_query, AwsTraceFactory, CloudWatchLogsClient, LambdaInsightsProvider};
pub use correlate::{correlate, CorrelatedRecord, Correlation, ExperimentalRow};
pub use error::{TraceError, TraceResult};
pub use pipeline::{collect_traces, write_artifacts, RunDirectory, TraceCollection};
pub use provider::{ProviderRegistry, TraceProvider, TraceProviderFactory};
pub use query::{run_windows, LogQueryClient, QueryRequest, QueryResults, QueryStatus, QueryWindowRunner};
pub use record::TraceRecord;
pub use window::{partition_windows, TimeWindow};
