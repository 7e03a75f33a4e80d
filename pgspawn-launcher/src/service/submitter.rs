//! Job submitter
//!
//! Renders the batch script for a request, hands it to the scheduler and
//! extracts the job id the scheduler assigned.

use pgspawn_core::domain::job::{JobHandle, JobRequest};
use pgspawn_core::template::PayloadTemplate;
use std::sync::Arc;
use tracing::{info, instrument};

use crate::context::LogContext;
use crate::error::{Result, SubmissionError};
use crate::scheduler::Scheduler;

pub struct JobSubmitter {
    scheduler: Arc<dyn Scheduler>,
}

impl JobSubmitter {
    pub fn new(scheduler: Arc<dyn Scheduler>) -> Self {
        Self { scheduler }
    }

    /// Submits `request` and returns the handle of the queued job
    ///
    /// Tool availability is checked before anything is rendered or sent.
    /// If the job id cannot be parsed after a successful submission the job
    /// may already exist remotely; the error is surfaced, never retried.
    #[instrument(name = "submit", parent = ctx.span(), skip_all)]
    pub async fn submit(&self, request: &JobRequest, ctx: &LogContext) -> Result<JobHandle> {
        self.scheduler.check_available().await?;

        let script = PayloadTemplate::render(request)?;

        info!(
            "Submitting job '{}' to partition '{}' ({} CPU(s), {} GPU(s), image {})",
            request.job_name(),
            request.partition(),
            request.cpu_count(),
            request.gpu_count(),
            request.image_ref()
        );

        let output = self
            .scheduler
            .submit(&script)
            .await
            .map_err(SubmissionError::Spawn)?;

        if !output.success() {
            return Err(SubmissionError::CommandFailed {
                code: output.code,
                stderr: output.stderr.trim().to_string(),
            }
            .into());
        }

        let handle = parse_job_id(&output.stdout)?;
        ctx.record_job(handle);
        info!("Job queued with id {}", handle);

        Ok(handle)
    }
}

/// Parses the job id printed by the submission command
///
/// Accepts a bare id or the `--parsable` form `<id>;<cluster>`, with any
/// surrounding whitespace.
pub fn parse_job_id(raw: &str) -> std::result::Result<JobHandle, SubmissionError> {
    let trimmed = raw.trim();
    let id_part = trimmed
        .split_once(';')
        .map(|(id, _cluster)| id)
        .unwrap_or(trimmed);

    id_part
        .parse::<u64>()
        .ok()
        .and_then(JobHandle::new)
        .ok_or_else(|| SubmissionError::UnparseableId {
            raw: raw.to_string(),
        })
}
