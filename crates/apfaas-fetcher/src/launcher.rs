//! Partition launchers.
//!
//! A launcher runs one [`PartitionJob`] in isolation and hands back its
//! result rows. [`ProcessLauncher`] re-executes a worker binary per partition
//! and talks JSON over stdin/stdout; [`ThreadLauncher`] runs the partition on
//! a dedicated OS thread with its own runtime.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;

use apfaas_core::RequestResult;
use async_trait::async_trait;
use indicatif::MultiProgress;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::sync::oneshot;
use tracing::debug;

use crate::error::{FetchError, FetchResult};
use crate::progress::{BarProgress, NoProgress, ProgressReporter};
use crate::runner::{run_partition, PartitionJob};

/// Runs one partition to completion.
#[async_trait]
pub trait PartitionLauncher: Send + Sync {
    async fn launch(&self, job: PartitionJob) -> FetchResult<Vec<RequestResult>>;
}

/// One OS process per partition.
///
/// Children are killed if the launch future is dropped, so an aborted level
/// never leaves workers behind.
#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Re-execute the running binary with its `worker` subcommand.
    pub fn current_exe() -> FetchResult<Self> {
        Ok(Self::new(std::env::current_exe()?, vec!["worker".to_string()]))
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }
}

#[async_trait]
impl PartitionLauncher for ProcessLauncher {
    async fn launch(&self, job: PartitionJob) -> FetchResult<Vec<RequestResult>> {
        let index = job.index;
        let worker_failed = |message: String| FetchError::WorkerFailed { index, message };

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;
        debug!(partition = index, pid = child.id(), "Worker process spawned");

        let payload = serde_json::to_vec(&job)?;
        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| worker_failed("worker stdin unavailable".to_string()))?;
        stdin.write_all(&payload).await?;
        stdin.shutdown().await?;
        drop(stdin);

        let output = child.wait_with_output().await?;
        if !output.status.success() {
            return Err(worker_failed(format!("worker exited with {}", output.status)));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| worker_failed(format!("unreadable worker output: {}", e)))
    }
}

/// One dedicated OS thread per partition.
#[derive(Default, Clone)]
pub struct ThreadLauncher {
    multi: Option<MultiProgress>,
}

impl ThreadLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Render one progress bar per partition on a shared display.
    pub fn with_progress(multi: MultiProgress) -> Self {
        Self { multi: Some(multi) }
    }
}

#[async_trait]
impl PartitionLauncher for ThreadLauncher {
    async fn launch(&self, job: PartitionJob) -> FetchResult<Vec<RequestResult>> {
        let index = job.index;
        let progress: Arc<dyn ProgressReporter> = match &self.multi {
            Some(multi) => Arc::new(BarProgress::attached(multi, index, job.records.len())),
            None => Arc::new(NoProgress),
        };

        let (sender, receiver) = oneshot::channel();
        std::thread::Builder::new()
            .name(format!("apfaas-partition-{}", index))
            .spawn(move || {
                let _ = sender.send(run_partition(&job, progress));
            })?;

        receiver.await.map_err(|_| FetchError::WorkerFailed {
            index,
            message: "partition thread exited without a result".to_string(),
        })?
    }
}

/// Worker side of [`ProcessLauncher`]: read one job from `input`, run it and
/// write the result rows to `output` as JSON.
pub fn run_worker<R, W, F>(mut input: R, mut output: W, make_progress: F) -> FetchResult<usize>
where
    R: Read,
    W: Write,
    F: FnOnce(&PartitionJob) -> Arc<dyn ProgressReporter>,
{
    let mut raw = Vec::new();
    input.read_to_end(&mut raw)?;
    let job: PartitionJob = serde_json::from_slice(&raw)?;

    let progress = make_progress(&job);
    let results = run_partition(&job, progress)?;

    serde_json::to_writer(&mut output, &results)?;
    output.flush()?;
    Ok(results.len())
}
