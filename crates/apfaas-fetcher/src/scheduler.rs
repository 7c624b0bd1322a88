//! Ramp scheduler: one partition fan-out per concurrency level.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use apfaas_core::manifest::level_file_name;
use apfaas_core::table::write_results;
use apfaas_core::{ExperimentConfig, RequestRecord, RequestResult};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::error::{FetchError, FetchResult};
use crate::launcher::PartitionLauncher;
use crate::plan::{concurrency_sequence, process_count, LevelPlan};
use crate::runner::PartitionJob;

/// Default delay before a partition runtime is torn down.
const DEFAULT_LINGER: Duration = Duration::from_secs(2);

/// Drives every concurrency level of one run and persists one result file
/// per level into `output_dir`.
pub struct RampScheduler {
    config: Arc<ExperimentConfig>,
    launcher: Arc<dyn PartitionLauncher>,
    output_dir: PathBuf,
    cores: usize,
    linger: Duration,
}

impl RampScheduler {
    pub fn new(
        config: ExperimentConfig,
        launcher: Arc<dyn PartitionLauncher>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        let cores = std::thread::available_parallelism()
            .map(|cores| cores.get())
            .unwrap_or(1);

        Self {
            config: Arc::new(config),
            launcher,
            output_dir: output_dir.into(),
            cores,
            linger: DEFAULT_LINGER,
        }
    }

    /// Override the detected logical core count.
    pub fn with_cores(mut self, cores: usize) -> Self {
        self.cores = cores.max(1);
        self
    }

    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = linger;
        self
    }

    /// Run all levels over `sample`. Returns the level file names in ramp
    /// order.
    pub async fn run(&self, sample: &[RequestRecord]) -> FetchResult<Vec<String>> {
        let levels = concurrency_sequence(&self.config.concurrency);
        let processes = process_count(self.cores, self.config.cpu_percentage, sample.len());
        info!(
            levels = ?levels,
            process_count = processes,
            requests = sample.len(),
            "Starting concurrency ramp"
        );

        let mut files = Vec::with_capacity(levels.len());
        for (position, &level) in levels.iter().enumerate() {
            let plan = LevelPlan::new(sample, level, processes);
            info!(concurrency = level, processes = plan.processes(), "Running concurrency level");

            let results = self.run_level(&plan).await?;

            let file_name = level_file_name(level);
            write_results(
                self.output_dir.join(&file_name),
                &results,
                &self.config.response_headers,
            )?;

            let success = results.iter().filter(|result| result.is_success()).count();
            let failure = results.iter().filter(|result| result.is_failure()).count();
            info!(
                concurrency = level,
                success,
                failure,
                file = %file_name,
                "Concurrency level completed"
            );
            if failure > 0 {
                warn!(concurrency = level, failure, "Requests failed at this level");
            }
            files.push(file_name);

            if position + 1 < levels.len() {
                tokio::time::sleep(self.config.concurrency.wait()).await;
            }
        }

        let stored = count_level_files(&self.output_dir)?;
        if stored != levels.len() {
            return Err(FetchError::IntegrityMismatch {
                expected: levels.len(),
                found: stored,
            });
        }

        Ok(files)
    }

    /// Fan one level out over its partitions and gather the rows in
    /// partition order.
    async fn run_level(&self, plan: &LevelPlan) -> FetchResult<Vec<RequestResult>> {
        let stagger = self.config.ramp_up().div_f64(plan.processes() as f64);
        let mut tasks = JoinSet::new();

        for (index, (records, &concurrency)) in
            plan.chunks.iter().zip(plan.concurrency.iter()).enumerate()
        {
            let job = self.job(index, records.clone(), concurrency);
            let launcher = Arc::clone(&self.launcher);
            tasks.spawn(async move { (index, launcher.launch(job).await) });
            debug!(partition = index, concurrency, "Partition launched");

            if !stagger.is_zero() {
                tokio::time::sleep(stagger).await;
            }
        }

        let outcome = collect_partitions(&mut tasks, plan.processes()).await;
        tasks.shutdown().await;
        outcome
    }

    fn job(&self, index: usize, records: Vec<RequestRecord>, concurrency: usize) -> PartitionJob {
        PartitionJob {
            index,
            records,
            response_headers: self.config.response_headers.clone(),
            correlation_header: self.config.correlation_header.clone(),
            concurrency,
            rate_per_request: self.config.rate_per_request,
            request_timeout: self.config.request_timeout,
            linger_ms: self.linger.as_millis() as u64,
        }
    }
}

async fn collect_partitions(
    tasks: &mut JoinSet<(usize, FetchResult<Vec<RequestResult>>)>,
    partitions: usize,
) -> FetchResult<Vec<RequestResult>> {
    let mut chunks: Vec<Option<Vec<RequestResult>>> = vec![None; partitions];

    while let Some(joined) = tasks.join_next().await {
        let (index, result) = joined.map_err(|e| FetchError::Join(e.to_string()))?;
        chunks[index] = Some(result?);
    }

    let mut rows = Vec::new();
    for (index, chunk) in chunks.into_iter().enumerate() {
        let chunk = chunk.ok_or_else(|| FetchError::WorkerFailed {
            index,
            message: "partition produced no result".to_string(),
        })?;
        rows.extend(chunk);
    }
    Ok(rows)
}

fn count_level_files(dir: &Path) -> FetchResult<usize> {
    let mut count = 0;
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && path.extension().and_then(|ext| ext.to_str()) == Some("csv") {
            count += 1;
        }
    }
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;
    use apfaas_core::QueryParams;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Answers every request with a canned 200 row and records the jobs.
    #[derive(Default)]
    struct RecordingLauncher {
        jobs: Mutex<Vec<PartitionJob>>,
    }

    #[async_trait]
    impl PartitionLauncher for RecordingLauncher {
        async fn launch(&self, job: PartitionJob) -> FetchResult<Vec<RequestResult>> {
            let rows = job
                .records
                .iter()
                .map(|record| RequestResult {
                    record: record.clone(),
                    request_id: format!("{}-{}", job.index, record.path),
                    response_id: Some(record.path.clone()),
                    status: 200,
                    response_body: "ok".to_string(),
                    request_time: 0.0,
                    response_time: 0.0,
                    headers: vec![("x-cache".to_string(), Some("HIT".to_string()))],
                })
                .collect();
            self.jobs.lock().unwrap().push(job);
            Ok(rows)
        }
    }

    struct FailingLauncher;

    #[async_trait]
    impl PartitionLauncher for FailingLauncher {
        async fn launch(&self, job: PartitionJob) -> FetchResult<Vec<RequestResult>> {
            Err(FetchError::WorkerFailed {
                index: job.index,
                message: "boom".to_string(),
            })
        }
    }

    fn config() -> ExperimentConfig {
        serde_json::from_value(serde_json::json!({
            "name": "ramp",
            "region": "us-east-1",
            "data_size": 5,
            "random_seed": 1,
            "ramp_up_time": 0.0,
            "rate_per_request": 0.0,
            "concurrency": {"initial": 1, "maximum": 4, "increment": 2, "wait_time": 0.0},
            "response_headers": ["x-cache"],
            "functions": [{
                "name": "f",
                "endpoint": "http://localhost",
                "samples": [{"path": "p"}]
            }]
        }))
        .unwrap()
    }

    fn sample() -> Vec<RequestRecord> {
        (0..5)
            .map(|i| RequestRecord {
                function_name: "f".to_string(),
                endpoint: "http://localhost".to_string(),
                path: format!("p{}", i),
                method: "GET".to_string(),
                query: QueryParams::default(),
                body: None,
            })
            .collect()
    }

    #[tokio::test]
    async fn test_run_writes_one_file_per_level() {
        let dir = TempDir::new().unwrap();
        let launcher = Arc::new(RecordingLauncher::default());
        let scheduler = RampScheduler::new(config(), launcher.clone(), dir.path()).with_cores(2);

        let files = scheduler.run(&sample()).await.unwrap();

        assert_eq!(
            files,
            vec![
                "test_1_concurrency.csv",
                "test_3_concurrency.csv",
                "test_4_concurrency.csv"
            ]
        );
        for file in &files {
            let rows = apfaas_core::table::read_results(dir.path().join(file)).unwrap();
            let paths: Vec<_> = rows.iter().map(|row| row.record.path.clone()).collect();
            assert_eq!(paths, vec!["p0", "p1", "p2", "p3", "p4"]);
        }

        let jobs = launcher.jobs.lock().unwrap();
        // 1 process at level 1, then 2 processes at levels 3 and 4
        assert_eq!(jobs.len(), 5);
        assert!(jobs.iter().all(|job| job.linger_ms == 2000));
        let level_three: Vec<usize> = jobs[1..3].iter().map(|job| job.concurrency).collect();
        let mut sorted = level_three.clone();
        sorted.sort_unstable();
        assert_eq!(sorted, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_stray_result_file_fails_integrity_check() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("leftover.csv"), "a\n1\n").unwrap();
        let scheduler =
            RampScheduler::new(config(), Arc::new(RecordingLauncher::default()), dir.path());

        let err = scheduler.run(&sample()).await.unwrap_err();

        assert!(matches!(
            err,
            FetchError::IntegrityMismatch {
                expected: 3,
                found: 4
            }
        ));
    }

    #[tokio::test]
    async fn test_worker_failure_aborts_level() {
        let dir = TempDir::new().unwrap();
        let scheduler = RampScheduler::new(config(), Arc::new(FailingLauncher), dir.path());

        let err = scheduler.run(&sample()).await.unwrap_err();

        assert!(matches!(err, FetchError::WorkerFailed { .. }));
        assert_eq!(count_level_files(dir.path()).unwrap(), 0);
    }
}
