//! Job domain types

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

use crate::record::{KeyValueRecord, RecordError};

/// Errors raised while building a job request or reading job metadata
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RequestError {
    #[error("invalid port range {min}-{max}")]
    InvalidPortRange { min: u16, max: u16 },

    #[error(transparent)]
    Record(#[from] RecordError),

    #[error("output path '{path}' contains unsupported characters")]
    InvalidOutputPath { path: String },
}

/// Inclusive range the server's listen port is drawn from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRange {
    min: u16,
    max: u16,
}

impl PortRange {
    pub const DEFAULT_MIN: u16 = 40000;
    pub const DEFAULT_MAX: u16 = 45000;

    pub fn new(min: u16, max: u16) -> Result<Self, RequestError> {
        if min == 0 || min > max {
            return Err(RequestError::InvalidPortRange { min, max });
        }
        Ok(Self { min, max })
    }

    pub fn min(&self) -> u16 {
        self.min
    }

    pub fn max(&self) -> u16 {
        self.max
    }

    pub fn contains(&self, port: u16) -> bool {
        (self.min..=self.max).contains(&port)
    }

    /// Picks a port uniformly at random within the range
    pub fn choose(&self) -> u16 {
        rand::rng().random_range(self.min..=self.max)
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self {
            min: Self::DEFAULT_MIN,
            max: Self::DEFAULT_MAX,
        }
    }
}

/// Database identity the bootstrap script initializes the server with
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    pub name: String,
    pub user: String,
    pub password: String,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            name: "postgres".to_string(),
            user: "postgres".to_string(),
            password: "changeme".to_string(),
        }
    }
}

/// Resources and payload for a single batch submission
///
/// Immutable once built: the listen port is chosen exactly once, here, and
/// every later rendering of the payload sees the same value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    partition: String,
    gpu_count: u32,
    cpu_count: u32,
    image_ref: String,
    job_name: String,
    time_limit: String,
    container_mounts: Vec<String>,
    database: DatabaseSettings,
    listen_port: u16,
    payload_template: String,
}

/// Resource fields supplied by the operator
#[derive(Debug, Clone)]
pub struct JobResources {
    pub partition: String,
    pub gpu_count: u32,
    pub cpu_count: u32,
    pub image_ref: String,
    pub job_name: String,
    pub time_limit: String,
    pub container_mounts: Vec<String>,
}

impl JobRequest {
    /// Builds a request, drawing the listen port from `ports`
    pub fn new(
        resources: JobResources,
        database: DatabaseSettings,
        ports: PortRange,
        payload_template: String,
    ) -> Self {
        Self::with_port(resources, database, ports.choose(), payload_template)
    }

    /// Builds a request with a fixed listen port
    pub fn with_port(
        resources: JobResources,
        database: DatabaseSettings,
        listen_port: u16,
        payload_template: String,
    ) -> Self {
        Self {
            partition: resources.partition,
            gpu_count: resources.gpu_count,
            cpu_count: resources.cpu_count,
            image_ref: resources.image_ref,
            job_name: resources.job_name,
            time_limit: resources.time_limit,
            container_mounts: resources.container_mounts,
            database,
            listen_port,
            payload_template,
        }
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn gpu_count(&self) -> u32 {
        self.gpu_count
    }

    pub fn cpu_count(&self) -> u32 {
        self.cpu_count
    }

    pub fn image_ref(&self) -> &str {
        &self.image_ref
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn time_limit(&self) -> &str {
        &self.time_limit
    }

    pub fn container_mounts(&self) -> &[String] {
        &self.container_mounts
    }

    pub fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub fn listen_port(&self) -> u16 {
        self.listen_port
    }

    pub fn payload_template(&self) -> &str {
        &self.payload_template
    }
}

/// Scheduler-assigned identifier of a submitted job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobHandle {
    id: u64,
}

impl JobHandle {
    /// Wraps a scheduler job id; ids are strictly positive
    pub fn new(id: u64) -> Option<Self> {
        (id > 0).then_some(Self { id })
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Job lifecycle state as reported by the scheduler
///
/// Anything outside the recognized vocabulary is kept as `Unknown` and
/// treated like `Pending`: the launcher keeps waiting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobState {
    Pending,
    Running,
    Cancelled,
    Completed,
    Failed,
    Unknown(String),
}

impl JobState {
    pub fn parse(token: &str) -> Self {
        match token.trim() {
            "PENDING" => JobState::Pending,
            "RUNNING" => JobState::Running,
            "CANCELLED" => JobState::Cancelled,
            "COMPLETED" => JobState::Completed,
            "FAILED" => JobState::Failed,
            other => JobState::Unknown(other.to_string()),
        }
    }

    /// True for states from which the job can no longer reach `Running`
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Cancelled | JobState::Completed | JobState::Failed
        )
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobState::Pending => write!(f, "PENDING"),
            JobState::Running => write!(f, "RUNNING"),
            JobState::Cancelled => write!(f, "CANCELLED"),
            JobState::Completed => write!(f, "COMPLETED"),
            JobState::Failed => write!(f, "FAILED"),
            JobState::Unknown(token) => write!(f, "{}", token),
        }
    }
}

/// Job metadata extracted from one scheduler query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobInfo {
    pub state: JobState,
    pub stdout: Option<PathBuf>,
    pub node_list: Option<String>,
    pub reason: Option<String>,
}

impl JobInfo {
    pub const STATE_KEY: &'static str = "JobState";
    pub const STDOUT_KEY: &'static str = "StdOut";
    pub const NODE_LIST_KEY: &'static str = "NodeList";
    pub const REASON_KEY: &'static str = "Reason";

    /// Reads job metadata from a parsed record
    ///
    /// `JobState` is required. `StdOut` is optional, but when present it must
    /// consist only of word characters, `/`, `.` and `-`.
    pub fn from_record(record: &KeyValueRecord) -> Result<Self, RequestError> {
        let state = JobState::parse(record.require(Self::STATE_KEY)?);

        let stdout = match record.get(Self::STDOUT_KEY) {
            Some(path) if !path.is_empty() => {
                if !is_plain_path(path) {
                    return Err(RequestError::InvalidOutputPath {
                        path: path.to_string(),
                    });
                }
                Some(PathBuf::from(path))
            }
            _ => None,
        };

        let node_list = non_placeholder(record.get(Self::NODE_LIST_KEY));
        let reason = non_placeholder(record.get(Self::REASON_KEY));

        Ok(Self {
            state,
            stdout,
            node_list,
            reason,
        })
    }

    /// First host of the allocated node list, if the scheduler reported one
    ///
    /// Compressed host lists are expanded only as far as their first entry:
    /// `gpu[01-04],cpu02` yields `gpu01`.
    pub fn primary_host(&self) -> Option<String> {
        let nodes = self.node_list.as_deref()?.trim();

        let mut depth = 0usize;
        let mut end = nodes.len();
        for (idx, c) in nodes.char_indices() {
            match c {
                '[' => depth += 1,
                ']' => depth = depth.saturating_sub(1),
                ',' if depth == 0 => {
                    end = idx;
                    break;
                }
                _ => {}
            }
        }

        let first = &nodes[..end];
        let host = match first.split_once('[') {
            Some((prefix, range)) => {
                let index = range.split([',', '-', ']']).next().unwrap_or_default();
                format!("{}{}", prefix, index)
            }
            None => first.to_string(),
        };

        (!host.is_empty()).then_some(host)
    }
}

/// Slurm reports unset fields as `(null)` or `None`
fn non_placeholder(value: Option<&str>) -> Option<String> {
    match value {
        Some("") | Some("(null)") | Some("None") | None => None,
        Some(v) => Some(v.to_string()),
    }
}

fn is_plain_path(path: &str) -> bool {
    path.chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '_' | '/' | '.' | '-'))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resources() -> JobResources {
        JobResources {
            partition: "std".to_string(),
            gpu_count: 0,
            cpu_count: 4,
            image_ref: "/images/postgis-h3.sqsh".to_string(),
            job_name: "postgis-server".to_string(),
            time_limit: "0-12:00:00".to_string(),
            container_mounts: vec![],
        }
    }

    #[test]
    fn test_port_range_validation() {
        assert!(PortRange::new(40000, 45000).is_ok());
        assert!(PortRange::new(5432, 5432).is_ok());
        assert_eq!(
            PortRange::new(45000, 40000),
            Err(RequestError::InvalidPortRange {
                min: 45000,
                max: 40000
            })
        );
        assert!(PortRange::new(0, 10).is_err());
    }

    #[test]
    fn test_chosen_port_within_bounds() {
        let range = PortRange::default();
        for _ in 0..1000 {
            let request = JobRequest::new(
                resources(),
                DatabaseSettings::default(),
                range,
                String::new(),
            );
            assert!(range.contains(request.listen_port()));
        }

        let narrow = PortRange::new(41000, 41000).unwrap();
        assert_eq!(narrow.choose(), 41000);
    }

    #[test]
    fn test_job_handle_rejects_zero() {
        assert!(JobHandle::new(0).is_none());
        assert_eq!(JobHandle::new(12345).unwrap().id(), 12345);
    }

    #[test]
    fn test_job_state_classification() {
        assert_eq!(JobState::parse("RUNNING"), JobState::Running);
        assert_eq!(JobState::parse(" PENDING "), JobState::Pending);
        assert!(JobState::parse("CANCELLED").is_terminal());
        assert!(JobState::parse("COMPLETED").is_terminal());
        assert!(JobState::parse("FAILED").is_terminal());
        assert!(!JobState::parse("PENDING").is_terminal());
        assert!(!JobState::parse("RUNNING").is_terminal());

        let drifted = JobState::parse("CONFIGURING");
        assert_eq!(drifted, JobState::Unknown("CONFIGURING".to_string()));
        assert!(!drifted.is_terminal());
        assert_eq!(drifted.to_string(), "CONFIGURING");
    }

    #[test]
    fn test_job_info_from_record() {
        let record = KeyValueRecord::parse(
            "JobId=7 JobState=RUNNING Reason=None NodeList=gpu-node07 StdOut=/home/gis/slurm-7.out",
        )
        .unwrap();
        let info = JobInfo::from_record(&record).unwrap();

        assert_eq!(info.state, JobState::Running);
        assert_eq!(info.stdout, Some(PathBuf::from("/home/gis/slurm-7.out")));
        assert_eq!(info.node_list.as_deref(), Some("gpu-node07"));
        assert_eq!(info.reason, None);
        assert_eq!(info.primary_host().as_deref(), Some("gpu-node07"));
    }

    #[test]
    fn test_job_info_requires_state() {
        let record = KeyValueRecord::parse("JobId=7 StdOut=/tmp/out").unwrap();
        assert_eq!(
            JobInfo::from_record(&record),
            Err(RequestError::Record(RecordError::MissingKey {
                key: "JobState".to_string()
            }))
        );
    }

    #[test]
    fn test_job_info_rejects_odd_output_path() {
        let record = KeyValueRecord::parse("JobState=PENDING StdOut=/tmp/$(rm)").unwrap();
        assert!(matches!(
            JobInfo::from_record(&record),
            Err(RequestError::InvalidOutputPath { .. })
        ));
    }

    #[test]
    fn test_pending_info_without_nodes() {
        let record =
            KeyValueRecord::parse("JobState=PENDING Reason=Priority NodeList=(null)").unwrap();
        let info = JobInfo::from_record(&record).unwrap();
        assert_eq!(info.reason.as_deref(), Some("Priority"));
        assert_eq!(info.node_list, None);
        assert_eq!(info.primary_host(), None);
        assert_eq!(info.stdout, None);
    }

    #[test]
    fn test_primary_host_of_compressed_list() {
        let info = JobInfo {
            state: JobState::Running,
            stdout: None,
            node_list: Some("gpu[01-04,07],cpu02".to_string()),
            reason: None,
        };
        assert_eq!(info.primary_host().as_deref(), Some("gpu01"));
    }
}
