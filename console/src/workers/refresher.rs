//! Status refresher for deployments in a transient state

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::deploy::observation::{Observation, Publish};
use crate::http::deployments::DeploymentFetcher;
use crate::models::deployment::{Deployment, DeploymentId};

/// Refresher options
#[derive(Debug, Clone)]
pub struct Options {
    /// Delay between two status fetches
    pub interval: Duration,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
        }
    }
}

/// Run the refresher until the observed status is stable.
///
/// Fetches are sequential, so a slow request delays the next tick instead of
/// overlapping with it. Failed fetches are logged and polling continues, and
/// so do fetches overtaken by a newly issued action.
pub async fn run<S, F>(
    options: &Options,
    deployment_id: DeploymentId,
    fetcher: &dyn DeploymentFetcher,
    observation: &Observation,
    sleep_fn: S,
) where
    S: Fn(Duration) -> F,
    F: Future<Output = ()>,
{
    info!("Refresher starting for deployment {}", deployment_id);

    let mut updates = observation.subscribe_deployment();

    loop {
        tokio::select! {
            _ = settled(&mut updates) => {
                info!(
                    "Deployment {} settled elsewhere, refresher stopping",
                    deployment_id
                );
                return;
            }
            _ = sleep_fn(options.interval) => {}
        }

        debug!("Refreshing deployment {}...", deployment_id);

        let generation = observation.generation();
        match fetcher.fetch_deployment(deployment_id).await {
            Ok(deployment) => {
                let status = deployment.status;
                match observation.publish_fetched(generation, deployment) {
                    Publish::Applied => {}
                    Publish::Stale => continue,
                    Publish::Closed => {
                        debug!("Deployment {} no longer observed", deployment_id);
                        return;
                    }
                }
                if status.is_stable() {
                    info!(
                        "Deployment {} reached {}, refresher stopping",
                        deployment_id, status
                    );
                    return;
                }
            }
            Err(e) => {
                warn!("Failed to refresh deployment {}: {}", deployment_id, e);
            }
        }
    }
}

/// Resolves once the observed deployment holds a stable status
async fn settled(updates: &mut watch::Receiver<Option<Deployment>>) {
    let stable = updates
        .wait_for(|d| matches!(d, Some(d) if d.status.is_stable()))
        .await
        .is_ok();
    if !stable {
        futures::future::pending::<()>().await;
    }
}

/// Handle to a running refresher. Dropping it stops the refresher.
pub struct RefreshSession {
    handle: JoinHandle<()>,
}

impl RefreshSession {
    pub fn spawn(
        options: Options,
        deployment_id: DeploymentId,
        fetcher: Arc<dyn DeploymentFetcher>,
        observation: Arc<Observation>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            run(
                &options,
                deployment_id,
                fetcher.as_ref(),
                &observation,
                tokio::time::sleep,
            )
            .await;
        });
        Self { handle }
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for RefreshSession {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
