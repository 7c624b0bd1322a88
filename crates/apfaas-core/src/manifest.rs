use std::path::Path;

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::config::ExperimentConfig;
use crate::error::{CoreError, CoreResult};

/// File name of the run manifest inside a run directory.
pub const MANIFEST_FILE_NAME: &str = "config_used.json";

/// Run manifest: the experiment configuration merged with the run outcome.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunManifest {
    #[serde(flatten)]
    pub config: ExperimentConfig,

    pub experimental_results: ExperimentalResults,
}

/// Timing window and level files of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentalResults {
    /// Run start, epoch seconds
    pub start_time: f64,
    /// Run end, epoch seconds
    pub end_time: f64,
    /// Level result files, in ramp order
    pub test_files: Vec<String>,
}

impl RunManifest {
    pub fn new(
        config: ExperimentConfig,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        test_files: Vec<String>,
    ) -> Self {
        Self {
            config,
            experimental_results: ExperimentalResults {
                start_time: epoch_seconds(start),
                end_time: epoch_seconds(end),
                test_files,
            },
        }
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> CoreResult<()> {
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    pub fn read<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    pub fn start(&self) -> DateTime<Utc> {
        from_epoch_seconds(self.experimental_results.start_time)
    }

    pub fn end(&self) -> DateTime<Utc> {
        from_epoch_seconds(self.experimental_results.end_time)
    }
}

/// Result file name for one concurrency level.
pub fn level_file_name(level: usize) -> String {
    format!("test_{}_concurrency.csv", level)
}

/// Concurrency level encoded in a result file name.
pub fn level_from_file_name(name: &str) -> CoreResult<usize> {
    name.strip_prefix("test_")
        .and_then(|rest| rest.strip_suffix("_concurrency.csv"))
        .and_then(|level| level.parse().ok())
        .ok_or_else(|| CoreError::validation(format!("`{}` is not a level result file", name)))
}

fn epoch_seconds(time: DateTime<Utc>) -> f64 {
    time.timestamp_millis() as f64 / 1000.0
}

fn from_epoch_seconds(seconds: f64) -> DateTime<Utc> {
    let millis = (seconds * 1000.0).round() as i64;
    Utc.timestamp_millis_opt(millis)
        .single()
        .unwrap_or_default()
}
