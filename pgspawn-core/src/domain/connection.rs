//! Connection details handed to downstream consumers
//!
//! Once the server job runs, the launcher knows where it lives. Data-access
//! tooling reads that location from `PG_*` environment variables, so the
//! details can be rendered either as a dotenv file or as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::job::{DatabaseSettings, JobHandle};

/// Where and how to reach a launched server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub job_id: u64,
    pub host: Option<String>,
    pub port: u16,
    pub database: String,
    pub username: String,
    pub password: String,
    pub started_at: DateTime<Utc>,
}

impl ConnectionInfo {
    pub const DRIVER: &'static str = "postgresql";

    pub fn new(
        handle: JobHandle,
        host: Option<String>,
        port: u16,
        database: &DatabaseSettings,
    ) -> Self {
        Self {
            job_id: handle.id(),
            host,
            port,
            database: database.name.clone(),
            username: database.user.clone(),
            password: database.password.clone(),
            started_at: Utc::now(),
        }
    }

    /// `host:port`, with `?` standing in for an unknown host
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host.as_deref().unwrap_or("?"), self.port)
    }

    /// Renders the dotenv form read by the data-access layer
    pub fn to_env(&self) -> String {
        let mut out = format!(
            "# pgspawn job {} started {}\n",
            self.job_id,
            self.started_at.to_rfc3339()
        );
        let pairs = [
            ("PG_DRIVER", Self::DRIVER.to_string()),
            ("PG_HOST", self.host.clone().unwrap_or_default()),
            ("PG_PORT", self.port.to_string()),
            ("PG_DBNAME", self.database.clone()),
            ("PG_USERNAME", self.username.clone()),
            ("PG_PASSWORD", self.password.clone()),
        ];
        for (key, value) in pairs {
            out.push_str(key);
            out.push('=');
            out.push_str(&value);
            out.push('\n');
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}
