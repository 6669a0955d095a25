//! Deployment controller
//!
//! Owns one view per observed deployment: the observation, its status
//! refresher and, during a sync, its progress session. All lifecycle
//! actions go through [`DeploymentController::issue`].

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::{error, info};

use crate::deploy::fsm::{Action, ActionKind};
use crate::deploy::gatekeeper::{enabled_actions, ActionSet};
use crate::deploy::observation::Observation;
use crate::errors::ConsoleError;
use crate::http::deployments::DeploymentFetcher;
use crate::http::gateway::Gateway;
use crate::models::deployment::{Deployment, DeploymentId};
use crate::models::progress::ProgressRecord;
use crate::workers::progress::{self, ProgressChannel, ProgressConnection, ProgressSession};
use crate::workers::refresher::{self, RefreshSession};

/// Controller options
#[derive(Debug, Clone, Default)]
pub struct ControllerOptions {
    pub refresher: refresher::Options,
}

/// Receivers for the observed state of one deployment
pub struct Subscription {
    pub deployment: watch::Receiver<Option<Deployment>>,
    pub progress: watch::Receiver<ProgressRecord>,
}

struct View {
    observation: Arc<Observation>,
    refresher: Option<RefreshSession>,
    progress: Option<ProgressSession>,
}

impl View {
    fn new(deployment_id: DeploymentId) -> Self {
        Self {
            observation: Arc::new(Observation::new(deployment_id)),
            refresher: None,
            progress: None,
        }
    }
}

pub struct DeploymentController {
    gateway: Arc<Gateway>,
    channel: Arc<dyn ProgressChannel>,
    options: ControllerOptions,
    views: Mutex<HashMap<DeploymentId, View>>,
}

impl DeploymentController {
    pub fn new(
        gateway: Arc<Gateway>,
        channel: Arc<dyn ProgressChannel>,
        options: ControllerOptions,
    ) -> Self {
        Self {
            gateway,
            channel,
            options,
            views: Mutex::new(HashMap::new()),
        }
    }

    /// Fetch a deployment and start observing it. Polling starts when the
    /// reported status is transient.
    pub async fn load(&self, deployment_id: DeploymentId) -> Result<Deployment, ConsoleError> {
        let deployment = self.gateway.get_deployment(deployment_id).await?;
        let observation = self.observe(deployment_id);
        observation.publish_reported(deployment.clone());
        if deployment.status.is_transient() {
            self.ensure_polling(deployment_id);
        }
        Ok(deployment)
    }

    /// Validate and send an action.
    ///
    /// The transient status is shown before the request goes out and rolled
    /// back to the last reported status if it fails. For a sync the progress
    /// channel is opened before the request so no early frame is missed.
    pub async fn issue(&self, action: Action, deployment_id: DeploymentId) -> Result<(), ConsoleError> {
        let observation = match self.loaded(deployment_id) {
            Some(observation) => observation,
            None => {
                self.load(deployment_id).await?;
                self.loaded(deployment_id).ok_or_else(|| {
                    ConsoleError::Internal(format!(
                        "deployment {} was released while loading",
                        deployment_id
                    ))
                })?
            }
        };

        let deployment = observation.begin_action(&action)?;
        let kind = action.kind();
        info!("Issuing {} for deployment {}", action, deployment_id);

        let connection = if kind == ActionKind::Sync {
            progress::open(self.channel.as_ref(), deployment_id, &observation).await
        } else {
            None
        };

        if let Err(e) = self.gateway.send_action(&action, &deployment).await {
            error!("{} for deployment {} failed: {}", action, deployment_id, e);
            if let Some(mut connection) = connection {
                connection.close().await;
            }
            if kind == ActionKind::Sync {
                observation.update_progress(|p| p.fail_connection(format!("Sync failed: {}", e)));
            }
            observation.rollback();
            return Err(e);
        }

        if kind == ActionKind::Delete {
            info!("Deployment {} deleted", deployment_id);
            self.teardown(deployment_id);
            return Ok(());
        }

        self.restart_polling(deployment_id);
        if let Some(connection) = connection {
            self.attach_progress(deployment_id, connection);
        }
        Ok(())
    }

    /// Stop observing a deployment. Once this returns the refresher and the
    /// progress session are stopped and the observed state no longer changes.
    pub fn teardown(&self, deployment_id: DeploymentId) {
        let view = self.views.lock().remove(&deployment_id);
        if let Some(view) = view {
            view.observation.close();
            drop(view.refresher);
            drop(view.progress);
            info!("Stopped observing deployment {}", deployment_id);
        }
    }

    /// Tear down every view
    pub fn shutdown(&self) {
        let ids: Vec<DeploymentId> = self.views.lock().keys().copied().collect();
        for id in ids {
            self.teardown(id);
        }
    }

    pub fn subscribe(&self, deployment_id: DeploymentId) -> Option<Subscription> {
        let views = self.views.lock();
        views.get(&deployment_id).map(|view| Subscription {
            deployment: view.observation.subscribe_deployment(),
            progress: view.observation.subscribe_progress(),
        })
    }

    pub fn current(&self, deployment_id: DeploymentId) -> Option<Deployment> {
        self.views
            .lock()
            .get(&deployment_id)
            .and_then(|view| view.observation.current())
    }

    pub fn progress(&self, deployment_id: DeploymentId) -> Option<ProgressRecord> {
        self.views
            .lock()
            .get(&deployment_id)
            .map(|view| view.observation.progress())
    }

    /// Actions enabled for the observed status; empty when nothing is loaded
    pub fn enabled_actions(&self, deployment_id: DeploymentId) -> ActionSet {
        self.views
            .lock()
            .get(&deployment_id)
            .and_then(|view| view.observation.status())
            .map(enabled_actions)
            .unwrap_or_default()
    }

    pub async fn logs(&self, deployment_id: DeploymentId) -> Result<String, ConsoleError> {
        self.gateway.get_deployment_logs(deployment_id).await
    }

    pub fn is_polling(&self, deployment_id: DeploymentId) -> bool {
        self.views
            .lock()
            .get(&deployment_id)
            .and_then(|view| view.refresher.as_ref())
            .is_some_and(RefreshSession::is_active)
    }

    pub fn is_streaming(&self, deployment_id: DeploymentId) -> bool {
        self.views
            .lock()
            .get(&deployment_id)
            .and_then(|view| view.progress.as_ref())
            .is_some_and(ProgressSession::is_active)
    }

    fn observe(&self, deployment_id: DeploymentId) -> Arc<Observation> {
        let mut views = self.views.lock();
        views
            .entry(deployment_id)
            .or_insert_with(|| View::new(deployment_id))
            .observation
            .clone()
    }

    fn loaded(&self, deployment_id: DeploymentId) -> Option<Arc<Observation>> {
        self.views
            .lock()
            .get(&deployment_id)
            .filter(|view| view.observation.current().is_some())
            .map(|view| view.observation.clone())
    }

    fn fetcher(&self) -> Arc<dyn DeploymentFetcher> {
        self.gateway.clone()
    }

    /// Start a refresher unless one is already running. No-op for a view
    /// that has been torn down.
    fn ensure_polling(&self, deployment_id: DeploymentId) {
        self.spawn_refresher(deployment_id, false);
    }

    /// Replace any running refresher, whose fetch in flight belongs to the
    /// state before the action.
    fn restart_polling(&self, deployment_id: DeploymentId) {
        self.spawn_refresher(deployment_id, true);
    }

    fn spawn_refresher(&self, deployment_id: DeploymentId, replace: bool) {
        let fetcher = self.fetcher();
        let mut views = self.views.lock();
        let Some(view) = views.get_mut(&deployment_id) else {
            return;
        };
        if !replace && view.refresher.as_ref().is_some_and(RefreshSession::is_active) {
            return;
        }
        view.refresher = Some(RefreshSession::spawn(
            self.options.refresher.clone(),
            deployment_id,
            fetcher,
            view.observation.clone(),
        ));
    }

    fn attach_progress(&self, deployment_id: DeploymentId, connection: Box<dyn ProgressConnection>) {
        let fetcher = self.fetcher();
        let mut views = self.views.lock();
        let Some(view) = views.get_mut(&deployment_id) else {
            return;
        };
        view.progress = Some(ProgressSession::spawn(
            deployment_id,
            connection,
            fetcher,
            view.observation.clone(),
        ));
    }
}
