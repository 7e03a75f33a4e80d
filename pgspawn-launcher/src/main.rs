//! pgspawn
//!
//! Launches a PostGIS server as a Slurm batch job and follows its console
//! output until interrupted.
//!
//! Architecture:
//! - Configuration: built once from command-line flags and environment
//! - Scheduler: `sbatch`/`scontrol` invoked as child processes
//! - Services: job submission, state polling, output tailing
//! - Orchestrator: runs the services in sequence and owns cancellation
//!
//! The remote job is never cancelled on exit; stop it with `scancel`.

mod config;
mod context;
mod error;
mod orchestrator;
mod scheduler;
mod service;
mod shutdown;

use anyhow::{Context, Result};
use clap::Parser;
use pgspawn_core::domain::job::{DatabaseSettings, JobResources, PortRange};
use pgspawn_core::template::PayloadTemplate;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{ConnectionFormat, DEFAULT_IMAGE, LaunchConfig};
use crate::error::LaunchError;
use crate::orchestrator::Orchestrator;
use crate::scheduler::SlurmScheduler;

#[derive(Parser, Debug)]
#[command(name = "pgspawn")]
#[command(about = "Launch a PostGIS server as a Slurm batch job", long_about = None)]
struct Cli {
    /// Slurm partition
    #[arg(long, default_value = "std")]
    partition: String,

    /// Number of GPUs
    #[arg(long = "n-gpus", default_value_t = 0)]
    n_gpus: u32,

    /// Number of CPU cores
    #[arg(long = "n-cpus", default_value_t = 4)]
    n_cpus: u32,

    /// Container image
    #[arg(long, env = "PGSPAWN_IMAGE", default_value = DEFAULT_IMAGE)]
    image: String,

    /// Slurm job name
    #[arg(long, default_value = "postgis-server")]
    job_name: String,

    /// Slurm time limit
    #[arg(long, default_value = "0-12:00:00")]
    time_limit: String,

    /// Extra container mounts (src:dst), comma-separated
    #[arg(long, env = "PGSPAWN_CONTAINER_MOUNTS", value_delimiter = ',')]
    container_mounts: Vec<String>,

    /// Lowest port the server may listen on
    #[arg(long, default_value_t = PortRange::DEFAULT_MIN)]
    port_min: u16,

    /// Highest port the server may listen on
    #[arg(long, default_value_t = PortRange::DEFAULT_MAX)]
    port_max: u16,

    /// Seconds between job state queries
    #[arg(long, default_value_t = 10)]
    poll_interval: u64,

    /// Seconds between reads of the job output
    #[arg(long, default_value_t = 10)]
    tail_interval: u64,

    /// Give up if the job is not running after this many seconds
    #[arg(long)]
    pending_timeout: Option<u64>,

    /// Batch script template replacing the built-in one
    #[arg(long)]
    template: Option<PathBuf>,

    /// Database created on first start
    #[arg(long, env = "PG_DBNAME", default_value = "postgres")]
    db_name: String,

    /// Database superuser
    #[arg(long, env = "PG_USERNAME", default_value = "postgres")]
    db_user: String,

    /// Database superuser password
    #[arg(
        long,
        env = "PG_PASSWORD",
        default_value = "changeme",
        hide_env_values = true,
        hide_default_value = true
    )]
    db_password: String,

    /// Write connection details here once the job runs
    #[arg(long)]
    connection_file: Option<PathBuf>,

    /// Format of the connection file
    #[arg(long, value_enum, default_value_t = ConnectionFormat::Env)]
    connection_format: ConnectionFormat,

    /// Submission command
    #[arg(long, env = "SBATCH_BIN", default_value = "sbatch")]
    sbatch: String,

    /// Job query command
    #[arg(long, env = "SCONTROL_BIN", default_value = "scontrol")]
    scontrol: String,
}

impl Cli {
    /// Builds the launch configuration, reading the template file if given
    fn into_config(self) -> Result<LaunchConfig> {
        let template = match &self.template {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read template {}", path.display()))?;
                PayloadTemplate::new(text)
                    .with_context(|| format!("Invalid template {}", path.display()))?
            }
            None => PayloadTemplate::default(),
        };

        let ports = PortRange::new(self.port_min, self.port_max)?;

        let mut config = LaunchConfig::new(
            JobResources {
                partition: self.partition,
                gpu_count: self.n_gpus,
                cpu_count: self.n_cpus,
                image_ref: self.image,
                job_name: self.job_name,
                time_limit: self.time_limit,
                container_mounts: self
                    .container_mounts
                    .into_iter()
                    .map(|m| m.trim().to_string())
                    .filter(|m| !m.is_empty())
                    .collect(),
            },
            DatabaseSettings {
                name: self.db_name,
                user: self.db_user,
                password: self.db_password,
            },
        );
        config.ports = ports;
        config.template = template;
        config.poll_interval = Duration::from_secs(self.poll_interval);
        config.tail_interval = Duration::from_secs(self.tail_interval);
        config.pending_timeout = self.pending_timeout.map(Duration::from_secs);
        config.connection_file = self.connection_file;
        config.connection_format = self.connection_format;
        config.sbatch = self.sbatch;
        config.scontrol = self.scontrol;

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pgspawn_launcher=info,pgspawn_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<LaunchError>().and_then(LaunchError::job_id) {
                Some(job_id) => error!(job_id, "Launch failed: {:#}", e),
                None => error!("Launch failed: {:#}", e),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = cli.into_config()?;
    let stop = shutdown::install_shutdown_handler().context("Failed to install signal handlers")?;

    let scheduler = Arc::new(SlurmScheduler::new(
        config.sbatch.clone(),
        config.scontrol.clone(),
    ));
    let request = config.job_request();

    info!(
        "Poll interval: {:?}, tail interval: {:?}, pending timeout: {:?}",
        config.poll_interval, config.tail_interval, config.pending_timeout
    );

    let orchestrator = Orchestrator::new(config, scheduler);
    let summary = orchestrator.run(&request, &stop).await?;

    info!(
        "Stopped following job {} after {} line(s); the job keeps running at {}, stop it with `scancel {}`",
        summary.handle,
        summary.lines_emitted,
        summary.connection.endpoint(),
        summary.handle
    );

    Ok(())
}
