//! Deployment models

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Backend identifier of a deployment
pub type DeploymentId = i64;

/// Remote lifecycle status of a deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentStatus {
    /// Never deployed
    NotDeployed,

    /// Deploy in progress
    Pending,

    /// Last deploy succeeded
    Success,

    /// Last deploy failed
    Failed,

    /// Application running on the target machine
    Running,

    /// Application stopped
    Stopped,

    /// Code sync in progress
    Syncing,

    SyncFailed,

    /// Application start in progress
    Starting,

    StartFailed,

    /// Application stop in progress
    Stopping,

    StopFailed,
}

impl DeploymentStatus {
    pub const ALL: [DeploymentStatus; 12] = [
        DeploymentStatus::NotDeployed,
        DeploymentStatus::Pending,
        DeploymentStatus::Success,
        DeploymentStatus::Failed,
        DeploymentStatus::Running,
        DeploymentStatus::Stopped,
        DeploymentStatus::Syncing,
        DeploymentStatus::SyncFailed,
        DeploymentStatus::Starting,
        DeploymentStatus::StartFailed,
        DeploymentStatus::Stopping,
        DeploymentStatus::StopFailed,
    ];

    /// An operation is in flight on the target machine
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Pending
                | DeploymentStatus::Syncing
                | DeploymentStatus::Starting
                | DeploymentStatus::Stopping
        )
    }

    /// Resting status, changes only on a new user action
    pub fn is_stable(&self) -> bool {
        !self.is_transient()
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            DeploymentStatus::Failed
                | DeploymentStatus::SyncFailed
                | DeploymentStatus::StartFailed
                | DeploymentStatus::StopFailed
        )
    }

    /// Wire name
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentStatus::NotDeployed => "not_deployed",
            DeploymentStatus::Pending => "pending",
            DeploymentStatus::Success => "success",
            DeploymentStatus::Failed => "failed",
            DeploymentStatus::Running => "running",
            DeploymentStatus::Stopped => "stopped",
            DeploymentStatus::Syncing => "syncing",
            DeploymentStatus::SyncFailed => "sync_failed",
            DeploymentStatus::Starting => "starting",
            DeploymentStatus::StartFailed => "start_failed",
            DeploymentStatus::Stopping => "stopping",
            DeploymentStatus::StopFailed => "stop_failed",
        }
    }

    /// Display label
    pub fn label(&self) -> &'static str {
        match self {
            DeploymentStatus::NotDeployed => "Not deployed",
            DeploymentStatus::Pending => "Deploying",
            DeploymentStatus::Success => "Deployed",
            DeploymentStatus::Failed => "Deploy failed",
            DeploymentStatus::Running => "Running",
            DeploymentStatus::Stopped => "Stopped",
            DeploymentStatus::Syncing => "Syncing",
            DeploymentStatus::SyncFailed => "Sync failed",
            DeploymentStatus::Starting => "Starting",
            DeploymentStatus::StartFailed => "Start failed",
            DeploymentStatus::Stopping => "Stopping",
            DeploymentStatus::StopFailed => "Stop failed",
        }
    }
}

impl fmt::Display for DeploymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target environment of a deployment
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Development => "development",
            Environment::Staging => "staging",
            Environment::Production => "production",
        }
    }
}

impl std::str::FromStr for Environment {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "development" | "dev" => Ok(Environment::Development),
            "staging" => Ok(Environment::Staging),
            "production" | "prod" => Ok(Environment::Production),
            _ => Err(format!("Invalid environment: {}", s)),
        }
    }
}

/// One binding of a project to a target machine, as reported by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Deployment {
    /// Unique deployment ID
    pub id: DeploymentId,

    /// Project being deployed
    pub project_id: i64,

    /// Target machine
    pub machine_id: i64,

    #[serde(default)]
    pub environment: Environment,

    /// Remote directory, unset until the first deploy
    #[serde(default)]
    pub deploy_path: Option<String>,

    pub status: DeploymentStatus,

    /// Output of the last remote operation
    #[serde(default)]
    pub log: Option<String>,

    /// Last time the backend touched this deployment
    #[serde(default, rename = "deployed_at", deserialize_with = "lenient_timestamp")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Deployment {
    /// Deploy path, if set and not blank
    pub fn deploy_path(&self) -> Option<&str> {
        self.deploy_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
    }
}

/// Accepts RFC 3339 as well as the naive timestamps the backend emits for
/// rows written without a zone, which are UTC.
fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    let Some(raw) = raw else {
        return Ok(None);
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    chrono::NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}
