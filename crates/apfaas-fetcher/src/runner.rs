//! Bounded async batch runner.
//!
//! All requests of a partition are started at once and compete for a
//! counting gate of `concurrency` slots. Results are collected positionally,
//! so row `i` of the output always belongs to request `i` of the input.

use std::sync::Arc;
use std::time::Duration;

use apfaas_core::{RequestRecord, RequestResult};
use futures::future::join_all;
use serde::{Deserialize, Serialize};
use tokio::sync::Semaphore;
use tracing::debug;

use crate::error::{FetchError, FetchResult};
use crate::progress::ProgressReporter;
use crate::transport::{self, TransportOptions};

/// Options for one batch.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    pub transport: TransportOptions,
    /// Calls in flight at most
    pub concurrency: usize,
    /// Backoff applied when the gate is saturated as a call completes
    pub rate_per_request: Duration,
    /// Delay before the runtime is torn down
    pub linger: Duration,
}

/// One partition of a concurrency level, as handed to a worker.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PartitionJob {
    /// Zero-based partition index
    pub index: usize,
    pub records: Vec<RequestRecord>,
    pub response_headers: Vec<String>,
    pub correlation_header: String,
    /// Sub-concurrency of this partition
    pub concurrency: usize,
    /// Seconds
    pub rate_per_request: f64,
    /// Seconds; `None` is unbounded
    pub request_timeout: Option<f64>,
    pub linger_ms: u64,
}

impl PartitionJob {
    pub fn batch_options(&self) -> BatchOptions {
        BatchOptions {
            transport: TransportOptions {
                response_headers: self.response_headers.clone(),
                correlation_header: self.correlation_header.clone(),
                timeout: self.request_timeout.map(Duration::from_secs_f64),
            },
            concurrency: self.concurrency,
            rate_per_request: Duration::from_secs_f64(self.rate_per_request.max(0.0)),
            linger: Duration::from_millis(self.linger_ms),
        }
    }
}

/// Run `records` with at most `options.concurrency` calls in flight.
///
/// Individual request failures are rows, never errors.
pub async fn run_batch(
    records: &[RequestRecord],
    options: &BatchOptions,
    progress: Arc<dyn ProgressReporter>,
) -> FetchResult<Vec<RequestResult>> {
    if records.is_empty() {
        return Ok(Vec::new());
    }

    if options.concurrency == 0 {
        return Err(FetchError::InvalidConcurrency {
            index: 0,
            records: records.len(),
        });
    }

    let gate = Semaphore::new(options.concurrency);
    let calls = records
        .iter()
        .map(|record| gated_call(record, &gate, options, progress.as_ref()));

    Ok(join_all(calls).await)
}

async fn gated_call(
    record: &RequestRecord,
    gate: &Semaphore,
    options: &BatchOptions,
    progress: &dyn ProgressReporter,
) -> RequestResult {
    // The gate is never closed, so acquisition only waits.
    let permit = gate.acquire().await.ok();

    let result = transport::execute(record, &options.transport, progress).await;

    // Best-effort limiter: throttle only while every slot is taken.
    if gate.available_permits() == 0 && !options.rate_per_request.is_zero() {
        tokio::time::sleep(options.rate_per_request).await;
    }

    drop(permit);
    result
}

/// Run one partition on its own single-threaded runtime.
///
/// Blocks the calling thread. The runtime lingers briefly after the batch so
/// in-flight connections can close, then is dropped on every exit path.
pub fn run_partition(
    job: &PartitionJob,
    progress: Arc<dyn ProgressReporter>,
) -> FetchResult<Vec<RequestResult>> {
    if !job.records.is_empty() && job.concurrency == 0 {
        return Err(FetchError::InvalidConcurrency {
            index: job.index,
            records: job.records.len(),
        });
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| FetchError::Runtime(e.to_string()))?;

    let options = job.batch_options();
    debug!(
        partition = job.index,
        records = job.records.len(),
        concurrency = job.concurrency,
        "Partition started"
    );

    let results = runtime.block_on(async {
        let results = run_batch(&job.records, &options, progress.clone()).await;
        if !job.records.is_empty() {
            tokio::time::sleep(options.linger).await;
        }
        results
    });

    progress.finish();
    results
}
