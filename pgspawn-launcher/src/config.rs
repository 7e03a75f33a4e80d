//! Launcher configuration
//!
//! Built once from the parsed command line and passed by value into the
//! orchestrator. Holds the job's resource request, the database identity
//! baked into the bootstrap script, and the timing of polling and tailing.

use clap::ValueEnum;
use pgspawn_core::domain::job::{DatabaseSettings, JobRequest, JobResources, PortRange};
use pgspawn_core::template::PayloadTemplate;
use std::path::PathBuf;
use std::time::Duration;

/// Container image used when none is given
pub const DEFAULT_IMAGE: &str = "postgis/postgis:15-3.4";

/// How connection details are written for downstream tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum ConnectionFormat {
    /// `PG_*=value` lines, as read by dotenv loaders
    #[default]
    Env,
    /// Pretty-printed JSON object
    Json,
}

#[derive(Debug, Clone)]
pub struct LaunchConfig {
    /// Resources requested from the scheduler
    pub resources: JobResources,

    /// Database created by the bootstrap script
    pub database: DatabaseSettings,

    /// Range the listen port is drawn from
    pub ports: PortRange,

    /// Batch script template
    pub template: PayloadTemplate,

    /// How often to query the scheduler while the job is pending
    pub poll_interval: Duration,

    /// How often to re-read the job's output file
    pub tail_interval: Duration,

    /// Give up if the job is still not running after this long
    pub pending_timeout: Option<Duration>,

    /// Where to write connection details once the job runs
    pub connection_file: Option<PathBuf>,

    pub connection_format: ConnectionFormat,

    /// Submission binary (name or path)
    pub sbatch: String,

    /// Query binary (name or path)
    pub scontrol: String,
}

impl LaunchConfig {
    /// Creates a configuration with default timing and tooling
    pub fn new(resources: JobResources, database: DatabaseSettings) -> Self {
        Self {
            resources,
            database,
            ports: PortRange::default(),
            template: PayloadTemplate::default(),
            poll_interval: Duration::from_secs(10),
            tail_interval: Duration::from_secs(10),
            pending_timeout: None,
            connection_file: None,
            connection_format: ConnectionFormat::default(),
            sbatch: "sbatch".to_string(),
            scontrol: "scontrol".to_string(),
        }
    }

    /// Builds the job request, choosing the listen port
    pub fn job_request(&self) -> JobRequest {
        JobRequest::new(
            self.resources.clone(),
            self.database.clone(),
            self.ports,
            self.template.as_str().to_string(),
        )
    }

    /// Validates the configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.resources.partition.trim().is_empty() {
            anyhow::bail!("partition cannot be empty");
        }

        if self.resources.image_ref.trim().is_empty() {
            anyhow::bail!("image cannot be empty");
        }

        if self.resources.job_name.trim().is_empty() {
            anyhow::bail!("job name cannot be empty");
        }

        if self.resources.cpu_count == 0 {
            anyhow::bail!("n_cpus must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            anyhow::bail!("poll_interval must be greater than 0");
        }

        if self.tail_interval.is_zero() {
            anyhow::bail!("tail_interval must be greater than 0");
        }

        if self.pending_timeout.is_some_and(|t| t.is_zero()) {
            anyhow::bail!("pending_timeout must be greater than 0");
        }

        if self.database.name.is_empty() || self.database.user.is_empty() {
            anyhow::bail!("database name and user cannot be empty");
        }

        if self.sbatch.is_empty() || self.scontrol.is_empty() {
            anyhow::bail!("scheduler commands cannot be empty");
        }

        Ok(())
    }
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self::new(
            JobResources {
                partition: "std".to_string(),
                gpu_count: 0,
                cpu_count: 4,
                image_ref: DEFAULT_IMAGE.to_string(),
                job_name: "postgis-server".to_string(),
                time_limit: "0-12:00:00".to_string(),
                container_mounts: Vec::new(),
            },
            DatabaseSettings::default(),
        )
    }
}
