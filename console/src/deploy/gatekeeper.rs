//! Action gatekeeper: which actions may be issued right now

use std::collections::BTreeSet;

use crate::deploy::fsm::{Action, ActionKind};
use crate::errors::ConsoleError;
use crate::models::deployment::{Deployment, DeploymentStatus};

/// Set of enabled actions for one status
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActionSet(BTreeSet<ActionKind>);

impl ActionSet {
    pub fn contains(&self, kind: ActionKind) -> bool {
        self.0.contains(&kind)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = ActionKind> + '_ {
        self.0.iter().copied()
    }
}

impl FromIterator<ActionKind> for ActionSet {
    fn from_iter<I: IntoIterator<Item = ActionKind>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Actions enabled from `status`. Evaluate on every status change.
pub fn enabled_actions(status: DeploymentStatus) -> ActionSet {
    ActionKind::ALL
        .into_iter()
        .filter(|kind| kind.allowed_from(status))
        .collect()
}

/// Reject an action before anything is sent to the backend
pub fn validate(action: &Action, deployment: &Deployment) -> Result<(), ConsoleError> {
    let kind = action.kind();
    if !enabled_actions(deployment.status).contains(kind) {
        return Err(ConsoleError::ValidationError(format!(
            "cannot {} deployment {} while it is {}",
            action, deployment.id, deployment.status
        )));
    }

    if kind.requires_remote_execution() && effective_deploy_path(action, deployment).is_none() {
        return Err(ConsoleError::ValidationError(format!(
            "deployment {} has no deploy path; {} needs one",
            deployment.id, action
        )));
    }

    Ok(())
}

/// Path the action will run against: the explicit deploy path if given,
/// otherwise the one recorded on the deployment
pub fn effective_deploy_path<'a>(action: &'a Action, deployment: &'a Deployment) -> Option<&'a str> {
    let explicit = match action {
        Action::Deploy { deploy_path, .. } => deploy_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty()),
        _ => None,
    };
    explicit.or_else(|| deployment.deploy_path())
}
