//! Experiment pipeline: validate, draw the sample, ramp, write the manifest.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use apfaas_core::{generate_sample, ExperimentConfig, RunManifest, MANIFEST_FILE_NAME};
use chrono::{DateTime, Utc};
use tracing::info;

use crate::error::FetchResult;
use crate::launcher::PartitionLauncher;
use crate::scheduler::RampScheduler;

/// Completed run.
#[derive(Debug, Clone)]
pub struct ExperimentOutcome {
    /// `<output_dir>/<start_seconds>_<name>`
    pub run_dir: PathBuf,
    pub manifest: RunManifest,
}

/// One experiment run, configured builder style.
pub struct Experiment {
    config: ExperimentConfig,
    launcher: Arc<dyn PartitionLauncher>,
    output_dir: PathBuf,
    cores: Option<usize>,
    linger: Option<Duration>,
}

impl Experiment {
    pub fn new(
        config: ExperimentConfig,
        launcher: Arc<dyn PartitionLauncher>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            config,
            launcher,
            output_dir: output_dir.into(),
            cores: None,
            linger: None,
        }
    }

    /// Replace the configured experiment name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.config.name = name.into();
        self
    }

    pub fn with_cores(mut self, cores: usize) -> Self {
        self.cores = Some(cores);
        self
    }

    pub fn with_linger(mut self, linger: Duration) -> Self {
        self.linger = Some(linger);
        self
    }

    pub async fn run(self) -> FetchResult<ExperimentOutcome> {
        self.config.validate()?;
        let sample = generate_sample(&self.config)?;

        let start = Utc::now();
        std::fs::create_dir_all(&self.output_dir)?;
        let run_dir = self
            .output_dir
            .join(format!("{}_{}", run_timestamp(start), self.config.name));
        std::fs::create_dir(&run_dir)?;
        info!(
            experiment = %self.config.name,
            run_dir = %run_dir.display(),
            data_size = sample.len(),
            "Experiment started"
        );

        let mut scheduler = RampScheduler::new(self.config.clone(), self.launcher, &run_dir);
        if let Some(cores) = self.cores {
            scheduler = scheduler.with_cores(cores);
        }
        if let Some(linger) = self.linger {
            scheduler = scheduler.with_linger(linger);
        }
        let test_files = scheduler.run(&sample).await?;

        let end = Utc::now();
        let manifest = RunManifest::new(self.config, start, end, test_files);
        manifest.write(run_dir.join(MANIFEST_FILE_NAME))?;
        info!(
            run_dir = %run_dir.display(),
            elapsed_secs = (end - start).num_milliseconds() as f64 / 1000.0,
            "Experiment completed"
        );

        Ok(ExperimentOutcome { run_dir, manifest })
    }
}

/// Start time in whole seconds, rounded.
fn run_timestamp(start: DateTime<Utc>) -> i64 {
    (start.timestamp_millis() as f64 / 1000.0).round() as i64
}
