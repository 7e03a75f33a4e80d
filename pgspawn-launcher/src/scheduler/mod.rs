//! Scheduler layer
//!
//! The batch scheduler is only ever reached through command-line tools.
//! This layer runs those tools and hands their raw output back; it does not
//! interpret job ids or job states. That is the service layer's job.
//!
//! The trait seam lets the services run against a scripted scheduler in tests.

mod slurm;

#[cfg(test)]
pub mod testing;

use async_trait::async_trait;

use crate::error::LaunchError;

pub use slurm::SlurmScheduler;

/// Captured result of one scheduler command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when the process was killed by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// Command-line contract of a batch scheduler
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Verifies the submission tooling exists on this host
    ///
    /// Fails with [`LaunchError::Environment`] before any side effect.
    async fn check_available(&self) -> Result<(), LaunchError>;

    /// Submits a batch script, returning the submission command's output
    async fn submit(&self, script: &str) -> std::io::Result<CommandOutput>;

    /// Queries the scheduler for one job's metadata
    async fn query(&self, job_id: u64) -> std::io::Result<CommandOutput>;
}
