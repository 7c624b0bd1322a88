use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use apfaas_core::{ExperimentConfig, LogFormat, LoggingSettings, Settings, WorkerMode};
use apfaas_fetcher::{
    run_worker, Experiment, LogProgress, PartitionLauncher, ProcessLauncher, ProgressReporter,
    ThreadLauncher,
};
use apfaas_traces::{collect_traces, ProviderRegistry};
use clap::{Parser, Subcommand};
use indicatif::MultiProgress;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "apfaas")]
#[command(about = "Load profiler for Function-as-a-Service endpoints", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a concurrency ramp against the configured functions
    Experiment {
        /// Experiment file (JSON or YAML)
        #[arg(short, long)]
        file: PathBuf,

        /// Experiment name, overriding the one in the file
        #[arg(short, long)]
        name: Option<String>,

        /// Tool settings file
        #[arg(short, long, env = "APFAAS_SETTINGS")]
        settings: Option<PathBuf>,
    },

    /// Fetch provider traces for a completed run and join them
    Trace {
        /// Run directory holding the level files and config_used.json
        #[arg(short, long)]
        directory: PathBuf,

        /// Query window width in seconds
        #[arg(short, long)]
        resolution: Option<u64>,

        /// Tool settings file
        #[arg(short, long, env = "APFAAS_SETTINGS")]
        settings: Option<PathBuf>,
    },

    /// Run one partition read from stdin (internal)
    #[command(hide = true)]
    Worker {
        #[arg(long, default_value = "info")]
        log_level: String,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Experiment {
            file,
            name,
            settings,
        } => {
            let settings = load_settings(settings.as_deref())?;
            init_logging(&settings.logging);
            block_on(run_experiment(&file, name, &settings))
        }
        Command::Trace {
            directory,
            resolution,
            settings,
        } => {
            let settings = load_settings(settings.as_deref())?;
            init_logging(&settings.logging);
            block_on(run_trace(&directory, resolution, &settings))
        }
        // The partition builds its own runtime, so the worker stays synchronous.
        Command::Worker { log_level } => {
            init_logging(&LoggingSettings {
                level: log_level,
                format: LogFormat::Pretty,
            });
            run_worker_command()
        }
    }
}

fn load_settings(path: Option<&Path>) -> anyhow::Result<Settings> {
    Settings::load(path).context("failed to load settings")
}

/// Initialize logging on stderr; stdout carries worker payloads.
fn init_logging(settings: &LoggingSettings) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.level));
    let builder = fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    match settings.format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.init(),
    }
}

fn block_on<F>(future: F) -> anyhow::Result<()>
where
    F: std::future::Future<Output = anyhow::Result<()>>,
{
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build runtime")?;

    let result = runtime.block_on(future);
    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}

async fn run_experiment(file: &Path, name: Option<String>, settings: &Settings) -> anyhow::Result<()> {
    let config = ExperimentConfig::from_file(file)?;
    info!(
        experiment = %name.as_deref().unwrap_or(&config.name),
        file = %file.display(),
        "Starting experiment"
    );

    let launcher: Arc<dyn PartitionLauncher> = match settings.fetch.worker_mode {
        WorkerMode::Process => Arc::new(
            ProcessLauncher::current_exe()?
                .arg("--log-level")
                .arg(settings.logging.level.clone()),
        ),
        WorkerMode::Thread => Arc::new(ThreadLauncher::with_progress(MultiProgress::new())),
    };

    let mut experiment = Experiment::new(config, launcher, &settings.output_dir)
        .with_linger(settings.fetch.linger());
    if let Some(name) = name {
        experiment = experiment.with_name(name);
    }

    let outcome = experiment.run().await?;
    info!(
        start = %outcome.manifest.start().format("%m/%d/%Y %H:%M:%S"),
        end = %outcome.manifest.end().format("%m/%d/%Y %H:%M:%S"),
        "Experimental result successfully stored"
    );
    println!("{}", outcome.run_dir.display());
    Ok(())
}

async fn run_trace(directory: &Path, resolution: Option<u64>, settings: &Settings) -> anyhow::Result<()> {
    let resolution = resolution.unwrap_or(settings.traces.resolution);
    if resolution == 0 {
        anyhow::bail!("resolution must be > 0");
    }
    info!(
        directory = %directory.display(),
        resolution,
        "Collecting traces"
    );

    let registry = ProviderRegistry::with_defaults();
    let collection = collect_traces(directory, resolution, &registry, &settings.traces).await?;
    println!("{}", collection.traces_dir.display());
    Ok(())
}

fn run_worker_command() -> anyhow::Result<()> {
    let stdin = std::io::stdin();
    let stdout = std::io::stdout();

    run_worker(stdin.lock(), stdout.lock(), |job| {
        Arc::new(LogProgress::new(job.index, job.records.len())) as Arc<dyn ProgressReporter>
    })
    .context("worker failed")?;
    Ok(())
}
