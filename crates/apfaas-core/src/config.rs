//! Experiment configuration.
//!
//! An experiment file describes the functions under test, the sample to draw
//! from them and the concurrency ramp to drive. Both JSON and YAML are
//! accepted; the format is chosen by file extension.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, CoreResult};

/// Header carrying the provider-assigned correlation identifier.
pub const DEFAULT_CORRELATION_HEADER: &str = "response-id";

/// Root experiment configuration, immutable once loaded.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExperimentConfig {
    /// Experiment name, used in the run directory name
    pub name: String,

    /// Telemetry provider identifier (e.g. `"aws"`)
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Protocol of the generated events
    #[serde(default)]
    pub event: EventKind,

    /// Provider region
    #[serde(default)]
    pub region: String,

    /// Provider credentials, required only by the trace stage
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Credentials>,

    /// Number of requests issued per concurrency level
    pub data_size: usize,

    /// Seed for the sample draw
    #[serde(default)]
    pub random_seed: u64,

    /// Share of logical cores used as worker processes (0-100]
    #[serde(default = "default_cpu_percentage")]
    pub cpu_percentage: f64,

    /// Seconds over which worker processes are started for one level
    #[serde(default)]
    pub ramp_up_time: f64,

    /// Backoff in seconds applied when a worker's gate is saturated
    #[serde(default)]
    pub rate_per_request: f64,

    /// Concurrency ramp
    pub concurrency: ConcurrencyPolicy,

    /// Response headers captured for every successful request
    #[serde(default)]
    pub response_headers: Vec<String>,

    /// Header holding the correlation identifier
    #[serde(default = "default_correlation_header")]
    pub correlation_header: String,

    /// Optional per-request timeout in seconds; absent means unbounded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout: Option<f64>,

    /// Functions under test
    pub functions: Vec<FunctionDefinition>,
}

/// Kind of event sent to the functions.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// Plain HTTP(S) invocation through the function endpoint
    #[default]
    Https,
}

/// Concurrency ramp: `initial, initial + increment, ...` up to `maximum`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ConcurrencyPolicy {
    /// First concurrency level
    pub initial: usize,

    /// Last concurrency level, always reached
    pub maximum: usize,

    /// Step between levels
    pub increment: usize,

    /// Pause in seconds between two levels
    #[serde(default)]
    pub wait_time: f64,
}

impl ConcurrencyPolicy {
    /// Pause between two levels
    pub fn wait(&self) -> Duration {
        Duration::from_secs_f64(self.wait_time.max(0.0))
    }
}

/// Provider credentials: a named profile or a static key pair.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Credentials {
    /// Named profile from the local credentials file
    Profile {
        /// Profile name
        profile: String,
    },
    /// Static access/secret key pair
    Keys {
        /// Access key id
        access_key: String,
        /// Secret access key
        secret_key: String,
    },
}

/// One function endpoint and the request templates to draw from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FunctionDefinition {
    /// Provider-side function name
    pub name: String,

    /// Base URL of the function
    pub endpoint: String,

    /// Request templates
    pub samples: Vec<SampleDefinition>,
}

/// A request template.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SampleDefinition {
    /// Path appended to the endpoint
    #[serde(default)]
    pub path: String,

    /// HTTP method
    #[serde(default = "default_method")]
    pub method: String,

    /// Query parameters; list values become repeated keys
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_string: Option<serde_json::Map<String, serde_json::Value>>,

    /// JSON body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,
}

fn default_provider() -> String {
    "aws".to_string()
}

fn default_cpu_percentage() -> f64 {
    100.0
}

fn default_correlation_header() -> String {
    DEFAULT_CORRELATION_HEADER.to_string()
}

fn default_method() -> String {
    "GET".to_string()
}

impl ExperimentConfig {
    /// Load an experiment file. `.yaml`/`.yml` files are parsed as YAML,
    /// everything else as JSON.
    pub fn from_file<P: AsRef<Path>>(path: P) -> CoreResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| CoreError::ConfigFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        );

        let parsed = if is_yaml {
            serde_yaml::from_str(&raw).map_err(|e| e.to_string())
        } else {
            serde_json::from_str(&raw).map_err(|e| e.to_string())
        };

        parsed.map_err(|message| CoreError::ConfigFile {
            path: path.to_path_buf(),
            message,
        })
    }

    /// Validate the configuration. Every failure is fatal for a run.
    pub fn validate(&self) -> CoreResult<()> {
        if self.name.trim().is_empty() {
            return Err(CoreError::validation("name must not be empty"));
        }

        // The name becomes a directory under the output root.
        if self.name.contains(['/', '\\']) || self.name == "." || self.name == ".." {
            return Err(CoreError::validation(format!(
                "name `{}` must be a plain directory name",
                self.name
            )));
        }

        if self.functions.is_empty() {
            return Err(CoreError::validation("at least one function is required"));
        }

        for function in &self.functions {
            if function.samples.is_empty() {
                return Err(CoreError::validation(format!(
                    "function `{}` has no samples",
                    function.name
                )));
            }
        }

        if self.data_size == 0 {
            return Err(CoreError::validation("data_size must be > 0"));
        }

        let concurrency = &self.concurrency;
        if concurrency.initial == 0 {
            return Err(CoreError::validation("concurrency.initial must be > 0"));
        }

        if concurrency.increment == 0 {
            return Err(CoreError::validation("concurrency.increment must be > 0"));
        }

        if concurrency.initial > concurrency.maximum {
            return Err(CoreError::validation(
                "concurrency.initial must be <= concurrency.maximum",
            ));
        }

        if !(self.cpu_percentage > 0.0 && self.cpu_percentage <= 100.0) {
            return Err(CoreError::validation("cpu_percentage must be in (0, 100]"));
        }

        if self.ramp_up_time < 0.0 || self.rate_per_request < 0.0 || concurrency.wait_time < 0.0 {
            return Err(CoreError::validation(
                "ramp_up_time, rate_per_request and wait_time must be >= 0",
            ));
        }

        if matches!(self.request_timeout, Some(timeout) if timeout <= 0.0) {
            return Err(CoreError::validation("request_timeout must be > 0"));
        }

        self.ensure_sample_covers_concurrency()
    }

    /// The sample must be at least as large as the highest concurrency level.
    pub fn ensure_sample_covers_concurrency(&self) -> CoreResult<()> {
        if self.data_size < self.concurrency.maximum {
            return Err(CoreError::SampleTooSmall {
                data_size: self.data_size,
                maximum: self.concurrency.maximum,
            });
        }
        Ok(())
    }

    /// Ramp-up duration
    pub fn ramp_up(&self) -> Duration {
        Duration::from_secs_f64(self.ramp_up_time.max(0.0))
    }

    /// Distinct function names, in definition order
    pub fn function_names(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for function in &self.functions {
            if !names.contains(&function.name) {
                names.push(function.name.clone());
            }
        }
        names
    }
}
