//! Trace stage: read a completed run, fetch its telemetry, write the joined
//! artifacts into `<run_dir>/traces/`.

use std::path::{Path, PathBuf};

use apfaas_core::manifest::level_from_file_name;
use apfaas_core::table::{read_results, write_table};
use apfaas_core::{RunManifest, TraceSettings, MANIFEST_FILE_NAME};
use tracing::{info, warn};

use crate::correlate::{
    correlate, correlated_header, correlated_row, experimental_header, experimental_row,
    trace_fields, trace_header, trace_row, ExperimentalRow,
};
use crate::error::{TraceError, TraceResult};
use crate::provider::ProviderRegistry;
use crate::record::TraceRecord;

pub const TRACES_DIR_NAME: &str = "traces";
pub const EXPERIMENTAL_DATA_FILE: &str = "experimental_data.csv";
pub const TRACE_DATA_FILE: &str = "trace_data.csv";
pub const COMPLETE_DATA_FILE: &str = "complete_data.csv";
pub const UNMATCHED_TRACES_FILE: &str = "unmatched_traces.csv";

/// Summary of a trace stage run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceCollection {
    pub traces_dir: PathBuf,
    pub requests: usize,
    pub traces: usize,
    pub unmatched_traces: usize,
    /// Requests with a status above 200
    pub failed_requests: usize,
    /// Request rows without telemetry
    pub missing_traces: usize,
}

/// A run directory checked for completeness.
#[derive(Debug, Clone)]
pub struct RunDirectory {
    pub path: PathBuf,
    pub manifest: RunManifest,
}

impl RunDirectory {
    /// Open `path`, requiring its manifest and exactly the level files the
    /// manifest lists.
    pub fn open(path: &Path) -> TraceResult<Self> {
        if !path.is_dir() {
            return Err(TraceError::MissingRunDirectory(path.to_path_buf()));
        }

        let manifest_path = path.join(MANIFEST_FILE_NAME);
        if !manifest_path.is_file() {
            return Err(TraceError::MissingManifest(manifest_path));
        }
        let manifest = RunManifest::read(&manifest_path)?;

        let expected = manifest.experimental_results.test_files.len();
        let found = count_csv_files(path)?;
        if found != expected {
            return Err(TraceError::ResultFileMismatch {
                directory: path.to_path_buf(),
                expected,
                found,
            });
        }

        Ok(Self {
            path: path.to_path_buf(),
            manifest,
        })
    }

    /// All level rows, in manifest order, tagged with their level.
    pub fn experimental_rows(&self) -> TraceResult<Vec<ExperimentalRow>> {
        let mut rows = Vec::new();
        for file in &self.manifest.experimental_results.test_files {
            let concurrency = level_from_file_name(file)?;
            let results = read_results(self.path.join(file))?;
            rows.extend(
                results
                    .into_iter()
                    .map(|result| ExperimentalRow {
                        concurrency,
                        result,
                    }),
            );
        }
        Ok(rows)
    }
}

fn count_csv_files(dir: &Path) -> TraceResult<usize> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("csv") {
            count += 1;
        }
    }
    Ok(count)
}

/// Run the trace stage for the run stored in `directory`.
pub async fn collect_traces(
    directory: &Path,
    resolution: u64,
    registry: &ProviderRegistry,
    settings: &TraceSettings,
) -> TraceResult<TraceCollection> {
    let run = RunDirectory::open(directory)?;
    let rows = run.experimental_rows()?;
    let config = &run.manifest.config;
    info!(provider = %config.provider.to_uppercase(), "Provider");

    let provider = registry
        .create(&config.provider, config.function_names(), &run.manifest, settings)
        .await?;

    let successful = rows.iter().filter(|row| row.result.is_success()).count();
    info!("{} requests were successful", successful);

    let traces = provider.get_traces_per_request(rows.len(), resolution).await?;
    info!("{} out of {} function traces found", traces.len(), rows.len());

    let traces_dir = directory.join(TRACES_DIR_NAME);
    std::fs::create_dir_all(&traces_dir)?;
    let collection = write_artifacts(&traces_dir, &rows, &traces, &config.response_headers)?;

    info!(
        "(Unsuccessful Requests) - Experimental data: {} | Function traces: {}",
        collection.failed_requests, collection.missing_traces
    );
    if collection.unmatched_traces > 0 {
        warn!(
            unmatched = collection.unmatched_traces,
            "Traces without a matching request"
        );
    }
    info!(
        file = %traces_dir.join(COMPLETE_DATA_FILE).display(),
        "Complete experiment data saved"
    );

    Ok(collection)
}

/// Write the four trace artifacts.
pub fn write_artifacts(
    traces_dir: &Path,
    rows: &[ExperimentalRow],
    traces: &[TraceRecord],
    headers: &[String],
) -> TraceResult<TraceCollection> {
    let fields = trace_fields(traces);

    write_table(
        traces_dir.join(EXPERIMENTAL_DATA_FILE),
        &experimental_header(headers),
        rows.iter().map(|row| experimental_row(row, headers)),
    )?;

    write_table(
        traces_dir.join(TRACE_DATA_FILE),
        &trace_header(&fields),
        traces.iter().map(|trace| trace_row(trace, &fields)),
    )?;

    let correlation = correlate(rows, traces);
    write_table(
        traces_dir.join(COMPLETE_DATA_FILE),
        &correlated_header(headers, &fields),
        correlation
            .merged
            .iter()
            .map(|record| correlated_row(record, headers, &fields)),
    )?;

    write_table(
        traces_dir.join(UNMATCHED_TRACES_FILE),
        &trace_header(&fields),
        correlation
            .unmatched
            .iter()
            .map(|trace| trace_row(trace, &fields)),
    )?;

    Ok(TraceCollection {
        traces_dir: traces_dir.to_path_buf(),
        requests: rows.len(),
        traces: traces.len(),
        unmatched_traces: correlation.unmatched.len(),
        failed_requests: rows.iter().filter(|row| row.result.is_failure()).count(),
        missing_traces: correlation.missing_traces(),
    })
}
