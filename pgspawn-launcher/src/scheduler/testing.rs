//! Scripted scheduler for service tests

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

use super::{CommandOutput, Scheduler};
use crate::error::LaunchError;

/// Replays canned command outputs in order
///
/// Once the query script runs dry the last response is repeated.
#[derive(Default)]
pub struct ScriptedScheduler {
    pub available: bool,
    submit_output: Mutex<Option<CommandOutput>>,
    queries: Mutex<VecDeque<CommandOutput>>,
    last_query: Mutex<Option<CommandOutput>>,
    pub submitted: Mutex<Vec<String>>,
    pub query_count: Mutex<usize>,
}

impl ScriptedScheduler {
    pub fn new() -> Self {
        Self {
            available: true,
            ..Default::default()
        }
    }

    pub fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: &str) -> CommandOutput {
        CommandOutput {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    /// A successful `scontrol` line for the given state
    pub fn state_line(job_id: u64, state: &str) -> CommandOutput {
        Self::ok(&format!(
            "JobId={} JobName=postgis-server JobState={} Reason=None NodeList=gpu-node07 StdOut=/tmp/slurm-{}.out\n",
            job_id, state, job_id
        ))
    }

    pub fn with_submit(self, output: CommandOutput) -> Self {
        *self.submit_output.lock().unwrap() = Some(output);
        self
    }

    pub fn with_queries(self, outputs: impl IntoIterator<Item = CommandOutput>) -> Self {
        self.queries.lock().unwrap().extend(outputs);
        self
    }

    pub fn queries_made(&self) -> usize {
        *self.query_count.lock().unwrap()
    }
}

#[async_trait]
impl Scheduler for ScriptedScheduler {
    async fn check_available(&self) -> Result<(), LaunchError> {
        if self.available {
            Ok(())
        } else {
            Err(LaunchError::Environment {
                command: "sbatch".to_string(),
                reason: "not found".to_string(),
            })
        }
    }

    async fn submit(&self, script: &str) -> std::io::Result<CommandOutput> {
        self.submitted.lock().unwrap().push(script.to_string());
        Ok(self
            .submit_output
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Self::ok("1\n")))
    }

    async fn query(&self, _job_id: u64) -> std::io::Result<CommandOutput> {
        *self.query_count.lock().unwrap() += 1;

        let next = self.queries.lock().unwrap().pop_front();
        let mut last = self.last_query.lock().unwrap();
        if let Some(output) = next {
            *last = Some(output);
        }
        Ok(last.clone().unwrap_or_default())
    }
}
