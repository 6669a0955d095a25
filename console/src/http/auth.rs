//! Login and logout

use tracing::info;

use openapi_client::models::TokenResponse;

use crate::authn::session::SessionStore;
use crate::authn::token::{inspect, CredentialState};
use crate::errors::ConsoleError;
use crate::http::gateway::{ApiCall, Gateway};
use crate::http::transport::RequestBody;
use crate::storage::session::Session;

impl Gateway {
    /// Exchange a username and password for a bearer token
    pub async fn request_token(&self, username: &str, password: &str) -> Result<String, ConsoleError> {
        let call = ApiCall::post("/auth/login").with_body(RequestBody::Form(vec![
            ("username".to_string(), username.to_string()),
            ("password".to_string(), password.to_string()),
        ]));
        let response: TokenResponse = self.execute_json(call).await?;
        Ok(response.access_token)
    }
}

/// Log in and persist the session
pub async fn login(
    gateway: &Gateway,
    store: &SessionStore,
    username: &str,
    password: &str,
) -> Result<Session, ConsoleError> {
    let token = gateway.request_token(username, password).await?;
    let state = inspect(Some(&token));
    if state != CredentialState::Valid {
        info!("Login returned a {} token", state.as_str());
    }
    let session = Session::new(token, username.to_string());
    store.login(session.clone()).await?;
    Ok(session)
}

/// Log out and remove the persisted session
pub async fn logout(store: &SessionStore) -> Result<(), ConsoleError> {
    store.logout().await
}
