//! Sync progress consumer
//!
//! A progress session reads frames from the per-deployment progress channel
//! and folds them into the observed [`ProgressRecord`]. It ends on a terminal
//! frame or when the channel breaks, then fetches the deployment once so the
//! final status comes from the backend rather than from the stream.

use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::deploy::observation::Observation;
use crate::errors::ConsoleError;
use crate::http::deployments::DeploymentFetcher;
use crate::models::deployment::DeploymentId;
use crate::models::progress::{ProgressEvent, ProgressRecord};
use crate::utils::websocket_base;

/// Message shown when the channel breaks before a terminal frame
pub const CONNECTION_FAILED: &str = "Sync connection failed";

/// An open progress channel for one deployment
#[async_trait]
pub trait ProgressConnection: Send {
    /// Next frame, or `None` once the peer has closed the channel
    async fn next_event(&mut self) -> Option<Result<ProgressEvent, ConsoleError>>;

    async fn close(&mut self);
}

/// Opens progress channels
#[async_trait]
pub trait ProgressChannel: Send + Sync {
    async fn connect(
        &self,
        deployment_id: DeploymentId,
    ) -> Result<Box<dyn ProgressConnection>, ConsoleError>;
}

/// Progress channel over a websocket next to the REST API
pub struct WsProgressChannel {
    base: Url,
    path_template: String,
}

impl WsProgressChannel {
    pub fn new(base_url: &str, path_template: &str) -> Result<Self, ConsoleError> {
        let base = websocket_base(base_url).map_err(ConsoleError::ConfigError)?;
        if !path_template.contains("{id}") {
            return Err(ConsoleError::ConfigError(format!(
                "progress path {} has no {{id}} placeholder",
                path_template
            )));
        }
        Ok(Self {
            base,
            path_template: path_template.to_string(),
        })
    }

    pub fn url_for(&self, deployment_id: DeploymentId) -> Url {
        let mut url = self.base.clone();
        let path = self
            .path_template
            .replace("{id}", &deployment_id.to_string());
        url.set_path(&format!(
            "{}/{}",
            url.path().trim_end_matches('/'),
            path.trim_start_matches('/')
        ));
        url
    }
}

#[async_trait]
impl ProgressChannel for WsProgressChannel {
    async fn connect(
        &self,
        deployment_id: DeploymentId,
    ) -> Result<Box<dyn ProgressConnection>, ConsoleError> {
        let url = self.url_for(deployment_id);
        info!("Connecting to progress channel: {}", url);
        let (stream, _) = connect_async(url.as_str()).await?;
        Ok(Box::new(WsProgressConnection { stream }))
    }
}

struct WsProgressConnection {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

#[async_trait]
impl ProgressConnection for WsProgressConnection {
    async fn next_event(&mut self) -> Option<Result<ProgressEvent, ConsoleError>> {
        loop {
            match self.stream.next().await? {
                Ok(Message::Text(text)) => {
                    return Some(serde_json::from_str(text.as_str()).map_err(|e| {
                        ConsoleError::StreamError(format!("malformed progress frame: {}", e))
                    }));
                }
                Ok(Message::Close(_)) => return None,
                Ok(_) => {}
                Err(e) => return Some(Err(e.into())),
            }
        }
    }

    async fn close(&mut self) {
        if let Err(e) = self.stream.close(None).await {
            debug!("Progress channel close: {}", e);
        }
    }
}

/// Open the progress channel for a sync. On failure the record shows the
/// broken connection and `None` is returned; the sync itself may proceed.
pub async fn open(
    channel: &dyn ProgressChannel,
    deployment_id: DeploymentId,
    observation: &Observation,
) -> Option<Box<dyn ProgressConnection>> {
    observation.update_progress(|p| *p = ProgressRecord::preparing());
    match channel.connect(deployment_id).await {
        Ok(connection) => Some(connection),
        Err(e) => {
            error!(
                "Failed to open progress channel for deployment {}: {}",
                deployment_id, e
            );
            observation.update_progress(|p| p.fail_connection(CONNECTION_FAILED));
            None
        }
    }
}

/// Consume a progress connection until it ends, then fetch the final status.
/// The final status is dropped if another action began in the meantime.
pub async fn run(
    deployment_id: DeploymentId,
    mut connection: Box<dyn ProgressConnection>,
    fetcher: &dyn DeploymentFetcher,
    observation: &Observation,
) {
    info!("Progress session starting for deployment {}", deployment_id);
    let generation = observation.generation();

    loop {
        match connection.next_event().await {
            Some(Ok(event)) => {
                debug!(
                    "Deployment {} progress {:?} {}%: {}",
                    deployment_id, event.status, event.progress, event.message
                );
                if !observation.update_progress(|p| p.apply(&event)) {
                    connection.close().await;
                    return;
                }
                if event.status.is_terminal() {
                    info!(
                        "Progress session for deployment {} ended with {:?}",
                        deployment_id, event.status
                    );
                    break;
                }
            }
            Some(Err(e)) => {
                error!("Progress channel for deployment {} failed: {}", deployment_id, e);
                observation.update_progress(|p| p.fail_connection(CONNECTION_FAILED));
                break;
            }
            None => {
                warn!(
                    "Progress channel for deployment {} closed before completion",
                    deployment_id
                );
                observation.update_progress(|p| p.fail_connection(CONNECTION_FAILED));
                break;
            }
        }
    }

    connection.close().await;

    match fetcher.fetch_deployment(deployment_id).await {
        Ok(deployment) => {
            observation.publish_fetched(generation, deployment);
        }
        Err(e) => {
            warn!(
                "Final status fetch for deployment {} failed: {}",
                deployment_id, e
            );
        }
    }
}

/// Handle to a running progress session. Dropping it stops the session.
pub struct ProgressSession {
    handle: JoinHandle<()>,
}

impl ProgressSession {
    pub fn spawn(
        deployment_id: DeploymentId,
        connection: Box<dyn ProgressConnection>,
        fetcher: Arc<dyn DeploymentFetcher>,
        observation: Arc<Observation>,
    ) -> Self {
        let handle = tokio::spawn(async move {
            run(deployment_id, connection, fetcher.as_ref(), &observation).await;
        });
        Self { handle }
    }

    pub fn is_active(&self) -> bool {
        !self.handle.is_finished()
    }
}

impl Drop for ProgressSession {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
