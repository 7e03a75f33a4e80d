//! Job state tracker
//!
//! Polls the scheduler for a submitted job until it is running, has ended,
//! or has waited longer than an optional deadline. The job's output path is
//! remembered from the first response that carries one.

use pgspawn_core::domain::job::{JobHandle, JobInfo, JobState, RequestError};
use pgspawn_core::record::KeyValueRecord;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{self, Instant};
use tracing::{debug, info, instrument};

use crate::context::LogContext;
use crate::error::{LaunchError, PollError, Result};
use crate::scheduler::Scheduler;

/// A job confirmed to be running
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunningJob {
    pub handle: JobHandle,
    pub stdout: PathBuf,
    pub info: JobInfo,
}

pub struct JobStateTracker {
    scheduler: Arc<dyn Scheduler>,
    stdout: Option<PathBuf>,
}

impl JobStateTracker {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self {
            scheduler,
            stdout: None,
        }
    }

    /// Queries the scheduler once and parses the job's record
    ///
    /// Query failures are returned as-is; retrying is left to the caller.
    pub async fn poll_once(&mut self, handle: JobHandle) -> Result<JobInfo> {
        let job_id = handle.id();

        let output = self
            .scheduler
            .query(job_id)
            .await
            .map_err(|source| PollError::Spawn { job_id, source })?;

        if !output.success() {
            return Err(PollError::CommandFailed {
                job_id,
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            }
            .into());
        }

        let info = KeyValueRecord::parse(&output.stdout)
            .map_err(RequestError::from)
            .and_then(|record| JobInfo::from_record(&record))
            .map_err(|source| PollError::Malformed { job_id, source })?;

        if self.stdout.is_none() {
            if let Some(path) = &info.stdout {
                debug!("Job {} writes its output to {}", job_id, path.display());
                self.stdout = Some(path.clone());
            }
        }

        Ok(info)
    }

    /// Polls every `poll_interval` until the job runs
    ///
    /// `deadline` bounds how long a job may stay pending; `None` waits until
    /// the job runs, ends or the caller stops waiting.
    #[instrument(name = "wait_until_running", parent = ctx.span(), skip_all)]
    pub async fn wait_until_running(
        &mut self,
        handle: JobHandle,
        poll_interval: Duration,
        deadline: Option<Duration>,
        ctx: &LogContext,
    ) -> Result<RunningJob> {
        let started = Instant::now();

        loop {
            let info = self.poll_once(handle).await?;

            if info.state == JobState::Running {
                let stdout = self.stdout.clone().ok_or(PollError::MissingOutputPath {
                    job_id: handle.id(),
                })?;
                info!("Job {} is running", handle);
                return Ok(RunningJob {
                    handle,
                    stdout,
                    info,
                });
            }

            if info.state.is_terminal() {
                return Err(LaunchError::JobTerminal {
                    job_id: handle.id(),
                    state: info.state,
                });
            }

            match (&info.state, &info.reason) {
                (JobState::Pending, Some(reason)) => {
                    info!("Job {} is pending ({}), waiting to start...", handle, reason)
                }
                (JobState::Pending, None) => {
                    info!("Job {} is pending, waiting to start...", handle)
                }
                (other, _) => info!("Job {} is in state {}, waiting to start...", handle, other),
            }

            let waited = started.elapsed();
            if let Some(limit) = deadline {
                if waited >= limit {
                    return Err(LaunchError::PendingTimeout {
                        job_id: handle.id(),
                        waited,
                    });
                }
            }

            time::sleep(poll_interval).await;
        }
    }
}
