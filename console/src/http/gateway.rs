//! Request gateway: credentials, status mapping and the fallback retry
//!
//! Every backend call goes through [`Gateway::execute`]. A bearer token is
//! attached when the session holds a well-formed one. A 401 on a read
//! request is retried exactly once with the fallback parameter set instead
//! of the bearer header; the retry is flagged in its [`RequestMeta`] so a
//! second 401 is returned to the caller instead of looping.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use http::Method;
use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use openapi_client::models::ErrorResponse;

use crate::authn::session::SessionProvider;
use crate::authn::token::{inspect, CredentialState};
use crate::errors::ConsoleError;
use crate::http::transport::{ApiRequest, ApiResponse, RequestBody, RequestMeta, Transport};
use crate::utils::request_id;

const UNAUTHORIZED: u16 = 401;
const NOT_FOUND: u16 = 404;

/// A logical request, before credentials are attached
#[derive(Debug, Clone)]
pub struct ApiCall {
    pub method: Method,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiCall {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }
}

/// Fallback authentication parameters accepted by the backend in place of a
/// bearer token
#[derive(Debug)]
pub struct FallbackCredentials {
    pub username: String,
    pub password: SecretString,
}

/// Which rejected requests get the fallback retry
#[derive(Debug)]
pub struct FallbackPolicy {
    pub enabled: bool,
    pub credentials: FallbackCredentials,
}

impl FallbackPolicy {
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            credentials: FallbackCredentials {
                username: String::new(),
                password: SecretString::from(String::new()),
            },
        }
    }

    /// Reads outside `/auth/` that are not themselves a retry
    pub fn allows_retry(&self, request: &ApiRequest) -> bool {
        self.enabled
            && !request.meta.is_retry
            && request.method == Method::GET
            && !is_auth_path(&request.path)
    }

    fn params(&self) -> [(String, String); 3] {
        [
            ("bypass_auth".to_string(), "true".to_string()),
            (
                "mock_username".to_string(),
                self.credentials.username.clone(),
            ),
            (
                "mock_password".to_string(),
                self.credentials.password.expose_secret().to_string(),
            ),
        ]
    }

    /// Same logical request, fallback parameters instead of the bearer
    fn retry_of(&self, request: ApiRequest) -> ApiRequest {
        let mut query = request.query;
        query.extend(self.params());
        ApiRequest {
            method: request.method,
            path: request.path,
            query,
            body: request.body,
            bearer: None,
            meta: RequestMeta {
                request_id: request.meta.request_id,
                is_retry: true,
            },
        }
    }
}

/// Shared, stateless (apart from counters) front door to the backend
pub struct Gateway {
    transport: Arc<dyn Transport>,
    session: Arc<dyn SessionProvider>,
    fallback: FallbackPolicy,
    fallback_retries: AtomicU64,
}

impl Gateway {
    pub fn new(
        transport: Arc<dyn Transport>,
        session: Arc<dyn SessionProvider>,
        fallback: FallbackPolicy,
    ) -> Self {
        Self {
            transport,
            session,
            fallback,
            fallback_retries: AtomicU64::new(0),
        }
    }

    /// Number of fallback retries performed so far
    pub fn fallback_retries(&self) -> u64 {
        self.fallback_retries.load(Ordering::SeqCst)
    }

    /// Send a call and map the response status
    pub async fn execute(&self, call: ApiCall) -> Result<ApiResponse, ConsoleError> {
        let bearer = self.session.bearer().await;
        let credential = inspect(bearer.as_ref().map(|b| b.expose_secret()));
        let mut request = ApiRequest {
            method: call.method,
            path: call.path,
            query: call.query,
            body: call.body,
            bearer: bearer.filter(|_| credential.is_attachable()),
            meta: RequestMeta {
                request_id: request_id(),
                is_retry: false,
            },
        };

        if request.bearer.is_none() {
            info!(
                endpoint = %request.endpoint(),
                request_id = %request.meta.request_id,
                credential = credential.as_str(),
                "Sending request without bearer credential"
            );
        }

        loop {
            let response = self.send_logged(&request, credential).await?;
            if response.status != UNAUTHORIZED {
                return check_status(&request, response);
            }

            if self.fallback.allows_retry(&request) {
                self.fallback_retries.fetch_add(1, Ordering::SeqCst);
                warn!(
                    endpoint = %request.endpoint(),
                    request_id = %request.meta.request_id,
                    credential = credential.as_str(),
                    "Request rejected with 401, retrying once with fallback credentials"
                );
                request = self.fallback.retry_of(request);
                continue;
            }

            let message = error_detail(&response);
            warn!(
                endpoint = %request.endpoint(),
                request_id = %request.meta.request_id,
                retry = request.meta.is_retry,
                credential = credential.as_str(),
                "Request rejected with 401: {}",
                message
            );
            // a rejected login says nothing about the stored credential
            if !is_auth_path(&request.path) {
                self.session
                    .invalidate(&format!("{} rejected the credential", request.endpoint()))
                    .await;
            }
            return Err(ConsoleError::Unauthorized {
                endpoint: request.endpoint(),
                message,
            });
        }
    }

    /// Send a call and decode the JSON body
    pub async fn execute_json<T: DeserializeOwned>(&self, call: ApiCall) -> Result<T, ConsoleError> {
        self.execute(call).await?.json()
    }

    async fn send_logged(
        &self,
        request: &ApiRequest,
        credential: CredentialState,
    ) -> Result<ApiResponse, ConsoleError> {
        let attached = request.bearer.is_some();
        match self.transport.send(request).await {
            Ok(response) => {
                debug!(
                    endpoint = %request.endpoint(),
                    request_id = %request.meta.request_id,
                    retry = request.meta.is_retry,
                    credential_attached = attached,
                    credential = credential.as_str(),
                    status = response.status,
                    "Response received"
                );
                Ok(response)
            }
            Err(e) => {
                warn!(
                    endpoint = %request.endpoint(),
                    request_id = %request.meta.request_id,
                    retry = request.meta.is_retry,
                    credential_attached = attached,
                    credential = credential.as_str(),
                    "Request failed: {}",
                    e
                );
                Err(e)
            }
        }
    }
}

fn is_auth_path(path: &str) -> bool {
    path.starts_with("/auth/")
}

fn check_status(request: &ApiRequest, response: ApiResponse) -> Result<ApiResponse, ConsoleError> {
    if response.is_success() {
        return Ok(response);
    }
    let detail = error_detail(&response);
    if response.status == NOT_FOUND {
        return Err(ConsoleError::NotFound(format!(
            "{}: {}",
            request.endpoint(),
            detail
        )));
    }
    Err(ConsoleError::ApiError {
        status: response.status,
        detail,
    })
}

fn error_detail(response: &ApiResponse) -> String {
    serde_json::from_str::<ErrorResponse>(&response.body)
        .ok()
        .and_then(|err| err.message())
        .unwrap_or_else(|| {
            let body = response.body.trim();
            if body.is_empty() {
                format!("HTTP {}", response.status)
            } else {
                body.chars().take(200).collect()
            }
        })
}
