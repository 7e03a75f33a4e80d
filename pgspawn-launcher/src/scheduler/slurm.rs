//! Slurm command-line scheduler
//!
//! Runs the Slurm client tools as child processes:
//! - `sbatch --version` to check the tools exist
//! - `sbatch --parsable` with the batch script on stdin to submit
//! - `scontrol show jobid <id> -o` to read a job's one-line record

use async_trait::async_trait;
use std::io::ErrorKind;
use std::process::Stdio;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, info};

use super::{CommandOutput, Scheduler};
use crate::error::LaunchError;

/// Scheduler backed by the `sbatch` and `scontrol` binaries
#[derive(Debug, Clone)]
pub struct SlurmScheduler {
    sbatch: String,
    scontrol: String,
}

impl SlurmScheduler {
    /// Creates a scheduler using the given binaries (names or paths)
    pub fn new(sbatch: impl Into<String>, scontrol: impl Into<String>) -> Self {
        Self {
            sbatch: sbatch.into(),
            scontrol: scontrol.into(),
        }
    }

    async fn run(command: &mut Command, stdin: Option<&str>) -> std::io::Result<CommandOutput> {
        command
            .stdin(if stdin.is_some() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = command.spawn()?;

        if let Some(input) = stdin {
            if let Some(mut pipe) = child.stdin.take() {
                // A rejecting tool may exit before reading its input; the
                // exit status and stderr are still collected below.
                let written = match pipe.write_all(input.as_bytes()).await {
                    Ok(()) => pipe.shutdown().await,
                    Err(e) => Err(e),
                };
                match written {
                    Err(e) if e.kind() == ErrorKind::BrokenPipe => {
                        debug!("Command closed stdin before reading the whole input");
                    }
                    other => other?,
                }
            }
        }

        let output = child.wait_with_output().await?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        };

        if !result.stdout.trim().is_empty() {
            debug!("stdout: {}", result.stdout.trim());
        }
        if !result.stderr.trim().is_empty() {
            debug!("stderr: {}", result.stderr.trim());
        }

        Ok(result)
    }
}

impl Default for SlurmScheduler {
    fn default() -> Self {
        Self::new("sbatch", "scontrol")
    }
}

#[async_trait]
impl Scheduler for SlurmScheduler {
    async fn check_available(&self) -> Result<(), LaunchError> {
        let output = Self::run(Command::new(&self.sbatch).arg("--version"), None)
            .await
            .map_err(|e| LaunchError::Environment {
                command: self.sbatch.clone(),
                reason: match e.kind() {
                    ErrorKind::NotFound => "not found, is this a Slurm cluster?".to_string(),
                    _ => e.to_string(),
                },
            })?;

        if !output.success() {
            return Err(LaunchError::Environment {
                command: self.sbatch.clone(),
                reason: format!(
                    "'--version' exited with code {:?}: {}",
                    output.code,
                    output.stderr.trim()
                ),
            });
        }

        info!("Slurm is available: {}", output.stdout.trim());
        Ok(())
    }

    async fn submit(&self, script: &str) -> std::io::Result<CommandOutput> {
        debug!("Submitting batch script ({} bytes)", script.len());
        Self::run(Command::new(&self.sbatch).arg("--parsable"), Some(script)).await
    }

    async fn query(&self, job_id: u64) -> std::io::Result<CommandOutput> {
        Self::run(
            Command::new(&self.scontrol)
                .arg("show")
                .arg("jobid")
                .arg(job_id.to_string())
                .arg("-o"),
            None,
        )
        .await
    }
}
