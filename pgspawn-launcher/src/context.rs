//! Logging context for a launch
//!
//! One span per run, carrying the job name, the chosen port and, once the
//! scheduler has assigned it, the job id. The orchestrator creates it and
//! passes it explicitly to every service call, which runs its work inside
//! the span so each log line carries the run's identity.

use pgspawn_core::domain::job::{JobHandle, JobRequest};
use tracing::{Span, field, info_span};

#[derive(Debug, Clone)]
pub struct LogContext {
    span: Span,
}

impl LogContext {
    /// Creates the root span for launching `request`
    pub fn for_request(request: &JobRequest) -> Self {
        let span = info_span!(
            "launch",
            job_name = %request.job_name(),
            port = request.listen_port(),
            job_id = field::Empty,
        );
        Self { span }
    }

    /// A context that is not attached to any subscriber
    #[cfg(test)]
    pub fn disabled() -> Self {
        Self {
            span: Span::none(),
        }
    }

    /// Records the scheduler-assigned id on the span
    pub fn record_job(&self, handle: JobHandle) {
        self.span.record("job_id", handle.id());
    }

    pub fn span(&self) -> &Span {
        &self.span
    }
}
