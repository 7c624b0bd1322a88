//! Tool settings for apfaas
//!
//! Settings are layered with precedence:
//! 1. Environment variables (highest priority), e.g. `APFAAS__TRACES__RESOLUTION=60`
//! 2. Settings file passed on the command line
//! 3. Hardcoded defaults (lowest priority)

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};

/// Root settings structure
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    /// Directory receiving experiment run directories
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default)]
    pub logging: LoggingSettings,

    #[serde(default)]
    pub fetch: FetchSettings,

    #[serde(default)]
    pub traces: TraceSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            logging: LoggingSettings::default(),
            fetch: FetchSettings::default(),
            traces: TraceSettings::default(),
        }
    }
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("generated_data")
}

impl Settings {
    /// Load settings from defaults, an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Self::set_defaults(Config::builder())?;

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }

        // Example: APFAAS__FETCH__WORKER_MODE=thread
        builder = builder.add_source(
            Environment::with_prefix("APFAAS")
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    fn set_defaults(
        builder: config::ConfigBuilder<config::builder::DefaultState>,
    ) -> Result<config::ConfigBuilder<config::builder::DefaultState>, ConfigError> {
        builder
            .set_default("output_dir", "generated_data")?
            // Logging
            .set_default("logging.level", "info")?
            .set_default("logging.format", "pretty")?
            // Fetch
            .set_default("fetch.linger_ms", 2000)?
            .set_default("fetch.worker_mode", "process")?
            // Traces
            .set_default("traces.resolution", 30)?
            .set_default("traces.max_parallel_queries", 20)?
            .set_default("traces.submit_interval_ms", 500)?
            .set_default("traces.poll_attempts", 3)?
            .set_default("traces.poll_interval_ms", 1000)?
            .set_default("traces.page_cap", 10_000)?
            .set_default("traces.lag_padding_secs", 900)?
            .set_default("traces.log_group", "/aws/lambda-insights")
    }

    /// Validate settings values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.traces.resolution == 0 {
            return Err(ConfigError::Message(
                "traces.resolution must be > 0".to_string(),
            ));
        }

        if self.traces.max_parallel_queries == 0 {
            return Err(ConfigError::Message(
                "traces.max_parallel_queries must be > 0".to_string(),
            ));
        }

        if self.traces.poll_attempts == 0 {
            return Err(ConfigError::Message(
                "traces.poll_attempts must be > 0".to_string(),
            ));
        }

        if self.traces.page_cap == 0 {
            return Err(ConfigError::Message("traces.page_cap must be > 0".to_string()));
        }

        Ok(())
    }
}

/// Console logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingSettings {
    /// Log level: trace, debug, info, warn, error
    pub level: String,

    /// Output format
    pub format: LogFormat,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Pretty,
        }
    }
}

/// Log line format
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Pretty,
    Json,
}

/// How partitions are executed during the ramp
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum WorkerMode {
    /// One OS process per partition
    Process,
    /// One dedicated thread (with its own runtime) per partition
    Thread,
}

/// Load generation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct FetchSettings {
    /// Delay before a worker runtime is torn down, letting connections close
    pub linger_ms: u64,

    /// Partition execution strategy
    pub worker_mode: WorkerMode,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            linger_ms: 2000,
            worker_mode: WorkerMode::Process,
        }
    }
}

impl FetchSettings {
    pub fn linger(&self) -> Duration {
        Duration::from_millis(self.linger_ms)
    }
}

/// Trace retrieval settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TraceSettings {
    /// Default window width in seconds
    pub resolution: u64,

    /// Queries in flight at once
    pub max_parallel_queries: usize,

    /// Delay between two query submissions
    pub submit_interval_ms: u64,

    /// Status polls per query
    pub poll_attempts: u32,

    /// Delay before each status poll
    pub poll_interval_ms: u64,

    /// Provider page cap; reaching it triggers a warning
    pub page_cap: usize,

    /// Padding added to the run end for provider reporting lag
    pub lag_padding_secs: u64,

    /// Log group queried by the AWS provider
    pub log_group: String,
}

impl Default for TraceSettings {
    fn default() -> Self {
        Self {
            resolution: 30,
            max_parallel_queries: 20,
            submit_interval_ms: 500,
            poll_attempts: 3,
            poll_interval_ms: 1000,
            page_cap: 10_000,
            lag_padding_secs: 900,
            log_group: "/aws/lambda-insights".to_string(),
        }
    }
}

impl TraceSettings {
    pub fn submit_interval(&self) -> Duration {
        Duration::from_millis(self.submit_interval_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lag_padding(&self) -> Duration {
        Duration::from_secs(self.lag_padding_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();

        assert_eq!(settings.output_dir, PathBuf::from("generated_data"));
        assert_eq!(settings.fetch.linger().as_millis(), 2000);
        assert_eq!(settings.fetch.worker_mode, WorkerMode::Process);
        assert_eq!(settings.traces.resolution, 30);
        assert_eq!(settings.traces.max_parallel_queries, 20);
        assert_eq!(settings.traces.poll_attempts, 3);
        assert_eq!(settings.traces.page_cap, 10_000);
        assert_eq!(settings.traces.lag_padding().as_secs(), 15 * 60);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("apfaas.toml");
        std::fs::write(
            &path,
            "output_dir = \"runs\"\n[traces]\nresolution = 60\n[fetch]\nworker_mode = \"thread\"\n",
        )
        .unwrap();

        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.output_dir, PathBuf::from("runs"));
        assert_eq!(settings.traces.resolution, 60);
        assert_eq!(settings.traces.max_parallel_queries, 20);
        assert_eq!(settings.fetch.worker_mode, WorkerMode::Thread);
    }

    #[test]
    fn test_validation_errors() {
        let mut settings = Settings::default();
        settings.traces.resolution = 0;
        assert!(settings.validate().is_err());

        settings.traces.resolution = 30;
        assert!(settings.validate().is_ok());

        settings.traces.poll_attempts = 0;
        assert!(settings.validate().is_err());
    }
}
