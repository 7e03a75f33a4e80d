//! Launch orchestrator
//!
//! Drives one launch through its phases:
//!
//! `Submitting -> Polling -> Tailing -> Stopped`
//!
//! Errors end the run from `Submitting` or `Polling`. Once tailing starts
//! the only way out is the stop signal, which counts as success. The job's
//! state is not checked again while tailing, so a job that dies after it
//! started running leaves the tail idling until the operator stops it.

use pgspawn_core::domain::connection::ConnectionInfo;
use pgspawn_core::domain::job::{JobHandle, JobRequest};
use std::fmt;
use std::future::Future;
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, info};

use crate::config::{ConnectionFormat, LaunchConfig};
use crate::context::LogContext;
use crate::error::{LaunchError, Result};
use crate::scheduler::Scheduler;
use crate::service::{JobStateTracker, JobSubmitter, LogTailer};

/// Where a launch currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunPhase {
    Submitting,
    Polling,
    Tailing,
    Stopped,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunPhase::Submitting => write!(f, "submitting"),
            RunPhase::Polling => write!(f, "polling"),
            RunPhase::Tailing => write!(f, "tailing"),
            RunPhase::Stopped => write!(f, "stopped"),
        }
    }
}

/// Outcome of a launch that reached the tail stage
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub handle: JobHandle,
    pub connection: ConnectionInfo,
    pub lines_emitted: u64,
}

pub struct Orchestrator {
    config: LaunchConfig,
    scheduler: Arc<dyn Scheduler>,
}

impl Orchestrator {
    pub fn new(config: LaunchConfig, scheduler: Arc<dyn Scheduler>) -> Self {
        Self { config, scheduler }
    }

    /// Submits `request`, waits for it to run and tails its output until
    /// `stop` is cancelled
    ///
    /// A stop before tailing aborts the run with [`LaunchError::Interrupted`];
    /// the remote job is left as it is either way.
    pub async fn run(&self, request: &JobRequest, stop: &CancellationToken) -> Result<RunSummary> {
        let ctx = LogContext::for_request(request);
        self.run_phases(request, stop, &ctx)
            .instrument(ctx.span().clone())
            .await
    }

    async fn run_phases(
        &self,
        request: &JobRequest,
        stop: &CancellationToken,
        ctx: &LogContext,
    ) -> Result<RunSummary> {
        info!("PostGIS port {}", request.listen_port());

        info!("Phase: {}", RunPhase::Submitting);
        let submitter = JobSubmitter::new(Arc::clone(&self.scheduler));
        let handle = Self::interruptible(
            RunPhase::Submitting,
            None,
            stop,
            submitter.submit(request, ctx),
        )
        .await?;

        info!("Phase: {}", RunPhase::Polling);
        let mut tracker = JobStateTracker::new(Arc::clone(&self.scheduler));
        let running = Self::interruptible(
            RunPhase::Polling,
            Some(handle),
            stop,
            tracker.wait_until_running(
                handle,
                self.config.poll_interval,
                self.config.pending_timeout,
                ctx,
            ),
        )
        .await?;

        let connection = ConnectionInfo::new(
            running.handle,
            running.info.primary_host(),
            request.listen_port(),
            request.database(),
        );
        info!(
            "PostGIS server of job {} will listen on {} (database '{}', user '{}')",
            handle,
            connection.endpoint(),
            connection.database,
            connection.username
        );

        if let Some(path) = &self.config.connection_file {
            write_connection_file(path, self.config.connection_format, &connection)?;
            info!("Connection details written to {}", path.display());
        }

        info!("Phase: {}", RunPhase::Tailing);
        info!("Waiting for server to spawn...");
        let mut tailer = LogTailer::new(running.stdout);
        let lines_emitted = tailer
            .tail(
                self.config.tail_interval,
                |line: &str| info!("{}", line),
                stop,
                ctx,
            )
            .await;

        if tailer.cursor().resets() > 0 {
            info!(
                "Output file was rewritten {} time(s) while tailing",
                tailer.cursor().resets()
            );
        }
        info!("Phase: {}", RunPhase::Stopped);

        Ok(RunSummary {
            handle,
            connection,
            lines_emitted,
        })
    }

    /// Runs a pre-tail stage, turning a stop signal into an error
    async fn interruptible<T>(
        phase: RunPhase,
        handle: Option<JobHandle>,
        stop: &CancellationToken,
        stage: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        tokio::select! {
            biased;
            _ = stop.cancelled() => Err(LaunchError::Interrupted {
                phase,
                job_id: handle.map(|h| h.id()),
            }),
            result = stage => result,
        }
    }
}

fn write_connection_file(
    path: &Path,
    format: ConnectionFormat,
    connection: &ConnectionInfo,
) -> Result<()> {
    let contents = match format {
        ConnectionFormat::Env => connection.to_env(),
        ConnectionFormat::Json => {
            let mut json = connection.to_json().map_err(|e| LaunchError::ConnectionFile {
                path: path.to_path_buf(),
                source: e.into(),
            })?;
            json.push('\n');
            json
        }
    };

    std::fs::write(path, contents).map_err(|source| LaunchError::ConnectionFile {
        path: path.to_path_buf(),
        source,
    })
}
