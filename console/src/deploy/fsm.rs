//! Deployment state model: user actions and the transitions they cause

use std::fmt;

use crate::models::deployment::{DeploymentStatus, Environment};

/// Kind of user action, without payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    /// Deploy or redeploy
    Deploy,
    Sync,
    Start,
    Stop,
    Delete,
}

impl ActionKind {
    pub const ALL: [ActionKind; 5] = [
        ActionKind::Deploy,
        ActionKind::Sync,
        ActionKind::Start,
        ActionKind::Stop,
        ActionKind::Delete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::Deploy => "deploy",
            ActionKind::Sync => "sync",
            ActionKind::Start => "start",
            ActionKind::Stop => "stop",
            ActionKind::Delete => "delete",
        }
    }

    /// Whether the action is legal from `status`
    pub fn allowed_from(&self, status: DeploymentStatus) -> bool {
        if status.is_transient() {
            return false;
        }
        match self {
            ActionKind::Deploy | ActionKind::Sync | ActionKind::Delete => true,
            ActionKind::Start => matches!(
                status,
                DeploymentStatus::Success | DeploymentStatus::Stopped | DeploymentStatus::StartFailed
            ),
            ActionKind::Stop => {
                matches!(status, DeploymentStatus::Success | DeploymentStatus::Running)
            }
        }
    }

    /// Status applied optimistically once the action is issued.
    /// `None` for delete, which removes the record.
    pub fn transient_status(&self) -> Option<DeploymentStatus> {
        match self {
            ActionKind::Deploy => Some(DeploymentStatus::Pending),
            ActionKind::Sync => Some(DeploymentStatus::Syncing),
            ActionKind::Start => Some(DeploymentStatus::Starting),
            ActionKind::Stop => Some(DeploymentStatus::Stopping),
            ActionKind::Delete => None,
        }
    }

    /// Whether the action runs commands on the target machine
    pub fn requires_remote_execution(&self) -> bool {
        !matches!(self, ActionKind::Delete)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A user action with its payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// First deploy, or deploy to a new path/environment.
    /// Falls back to the recorded path when `deploy_path` is `None`.
    Deploy {
        deploy_path: Option<String>,
        environment: Environment,
    },

    /// Deploy again with the recorded path and environment
    Redeploy,

    /// Pull the latest code without restarting
    Sync,

    Start,

    Stop,

    /// Remove the deployment record (deployed files stay on the machine)
    Delete,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::Deploy { .. } | Action::Redeploy => ActionKind::Deploy,
            Action::Sync => ActionKind::Sync,
            Action::Start => ActionKind::Start,
            Action::Stop => ActionKind::Stop,
            Action::Delete => ActionKind::Delete,
        }
    }

    /// Segment of `POST /deployments/{id}/{segment}`; delete has none
    pub fn endpoint(&self) -> Option<&'static str> {
        match self {
            Action::Deploy { .. } => Some("deploy"),
            Action::Redeploy => Some("redeploy"),
            Action::Sync => Some("sync"),
            Action::Start => Some("start"),
            Action::Stop => Some("stop"),
            Action::Delete => None,
        }
    }

    /// Parse a CLI action name; `deploy` takes its payload separately
    pub fn parse(
        name: &str,
        deploy_path: Option<String>,
        environment: Environment,
    ) -> Result<Self, String> {
        match name.to_lowercase().as_str() {
            "deploy" => Ok(Action::Deploy {
                deploy_path,
                environment,
            }),
            "redeploy" => Ok(Action::Redeploy),
            "sync" => Ok(Action::Sync),
            "start" => Ok(Action::Start),
            "stop" => Ok(Action::Stop),
            "delete" => Ok(Action::Delete),
            _ => Err(format!("Unknown action: {}", name)),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Action::Redeploy => f.write_str("redeploy"),
            other => f.write_str(other.kind().as_str()),
        }
    }
}
