//! Deployment API client

use async_trait::async_trait;
use tracing::debug;

use openapi_client::models::{DeployRequest, LogsResponse, MessageResponse};

use crate::deploy::fsm::Action;
use crate::deploy::gatekeeper::effective_deploy_path;
use crate::errors::ConsoleError;
use crate::http::gateway::{ApiCall, Gateway};
use crate::http::transport::RequestBody;
use crate::models::deployment::{Deployment, DeploymentId};

/// Source of authoritative deployment state, used by the refresher and the
/// progress consumer
#[async_trait]
pub trait DeploymentFetcher: Send + Sync {
    async fn fetch_deployment(&self, id: DeploymentId) -> Result<Deployment, ConsoleError>;
}

fn deployment_path(id: DeploymentId) -> String {
    format!("/deployments/{}", id)
}

impl Gateway {
    /// Get a deployment
    pub async fn get_deployment(&self, id: DeploymentId) -> Result<Deployment, ConsoleError> {
        self.execute_json(ApiCall::get(deployment_path(id))).await
    }

    /// Send an action request. The backend only acknowledges; the outcome is
    /// observed later through polling or the progress channel.
    pub async fn send_action(
        &self,
        action: &Action,
        deployment: &Deployment,
    ) -> Result<(), ConsoleError> {
        let base = deployment_path(deployment.id);
        let call = match action {
            Action::Deploy { environment, .. } => {
                let deploy_path = effective_deploy_path(action, deployment)
                    .ok_or_else(|| {
                        ConsoleError::ValidationError("deploy path is required".to_string())
                    })?
                    .to_string();
                let body = DeployRequest {
                    deploy_path,
                    environment: environment.as_str().to_string(),
                };
                ApiCall::post(format!("{}/deploy", base))
                    .with_body(RequestBody::Json(serde_json::to_value(body)?))
            }
            Action::Redeploy | Action::Sync | Action::Start | Action::Stop => {
                let segment = action.endpoint().unwrap_or_default();
                ApiCall::post(format!("{}/{}", base, segment))
            }
            Action::Delete => {
                if let Some(message) = self.delete_deployment(deployment.id).await? {
                    debug!("Deployment {} deleted: {}", deployment.id, message);
                }
                return Ok(());
            }
        };

        self.execute(call).await?;
        Ok(())
    }

    /// Delete a deployment record
    pub async fn delete_deployment(&self, id: DeploymentId) -> Result<Option<String>, ConsoleError> {
        let response: MessageResponse = self.execute_json(ApiCall::delete(deployment_path(id))).await?;
        Ok(response.message)
    }

    /// Get the accumulated log text of a deployment
    pub async fn get_deployment_logs(&self, id: DeploymentId) -> Result<String, ConsoleError> {
        let response: LogsResponse = self
            .execute_json(ApiCall::get(format!("{}/logs", deployment_path(id))))
            .await?;
        Ok(response.log.unwrap_or_default())
    }
}

#[async_trait]
impl DeploymentFetcher for Gateway {
    async fn fetch_deployment(&self, id: DeploymentId) -> Result<Deployment, ConsoleError> {
        self.get_deployment(id).await
    }
}
