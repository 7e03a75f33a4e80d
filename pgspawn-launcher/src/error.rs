//! Error types for the launcher
//!
//! Every variant is fatal to the run. The only recoverable condition, the
//! job output file not existing yet, is handled inside the tailer and never
//! reaches these types.

use pgspawn_core::domain::job::{JobState, RequestError};
use pgspawn_core::template::TemplateError;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::orchestrator::RunPhase;

/// Result type alias for launcher operations
pub type Result<T> = std::result::Result<T, LaunchError>;

/// Top-level failure of a launch
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Required scheduler tooling is missing on this host
    #[error("'{command}' is not available on this host: {reason}")]
    Environment { command: String, reason: String },

    #[error(transparent)]
    Submission(#[from] SubmissionError),

    #[error(transparent)]
    Poll(#[from] PollError),

    /// The job ended before it ever ran
    #[error("job {job_id} reached terminal state {state} before running")]
    JobTerminal { job_id: u64, state: JobState },

    /// The job was still waiting when the pending deadline passed
    #[error("job {job_id} still not running after {waited:?}")]
    PendingTimeout { job_id: u64, waited: Duration },

    /// An operator interrupt arrived before tailing started
    #[error("interrupted while {phase}")]
    Interrupted {
        phase: RunPhase,
        job_id: Option<u64>,
    },

    #[error("failed to render job script: {0}")]
    Template(#[from] TemplateError),

    #[error("failed to write connection file {path}: {source}")]
    ConnectionFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl LaunchError {
    /// Scheduler job id the error relates to, when one was assigned
    pub fn job_id(&self) -> Option<u64> {
        match self {
            LaunchError::JobTerminal { job_id, .. }
            | LaunchError::PendingTimeout { job_id, .. } => Some(*job_id),
            LaunchError::Poll(e) => Some(e.job_id()),
            LaunchError::Interrupted { job_id, .. } => *job_id,
            _ => None,
        }
    }
}

/// Failure to submit the batch job
#[derive(Debug, Error)]
pub enum SubmissionError {
    /// The submission command could not be started
    #[error("failed to run submission command: {0}")]
    Spawn(#[source] std::io::Error),

    /// The submission command exited unsuccessfully
    #[error("submission command failed (exit code {code:?}): {stderr}")]
    CommandFailed { code: Option<i32>, stderr: String },

    /// The command succeeded but printed no usable job id
    ///
    /// The job may exist remotely at this point.
    #[error("could not parse job id from submission output '{raw}'")]
    UnparseableId { raw: String },
}

/// Failure to query a submitted job
#[derive(Debug, Error)]
pub enum PollError {
    #[error("failed to run query command for job {job_id}: {source}")]
    Spawn {
        job_id: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("query for job {job_id} failed (exit code {code:?}): {stderr}")]
    CommandFailed {
        job_id: u64,
        code: Option<i32>,
        stderr: String,
    },

    #[error("malformed query response for job {job_id}: {source}")]
    Malformed {
        job_id: u64,
        #[source]
        source: RequestError,
    },

    /// The job ran but the scheduler never reported an output path
    #[error("job {job_id} is running but reported no StdOut path")]
    MissingOutputPath { job_id: u64 },
}

impl PollError {
    pub fn job_id(&self) -> u64 {
        match self {
            PollError::Spawn { job_id, .. }
            | PollError::CommandFailed { job_id, .. }
            | PollError::Malformed { job_id, .. }
            | PollError::MissingOutputPath { job_id } => *job_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgspawn_core::record::RecordError;

    #[test]
    fn test_job_id_context() {
        let terminal = LaunchError::JobTerminal {
            job_id: 17,
            state: JobState::Failed,
        };
        assert_eq!(terminal.job_id(), Some(17));
        assert_eq!(
            terminal.to_string(),
            "job 17 reached terminal state FAILED before running"
        );

        let poll: LaunchError = PollError::Malformed {
            job_id: 9,
            source: RequestError::Record(RecordError::Empty),
        }
        .into();
        assert_eq!(poll.job_id(), Some(9));

        let submission: LaunchError = SubmissionError::UnparseableId {
            raw: "abc".to_string(),
        }
        .into();
        assert_eq!(submission.job_id(), None);
        assert!(submission.to_string().contains("'abc'"));
    }
}
