//! HTTP transport: one request out, one response back, no policy

use std::time::Duration;

use async_trait::async_trait;
use http::Method;
use reqwest::{header, Client};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::errors::ConsoleError;

/// Header marking a request as the fallback retry of an earlier one
pub const RETRY_HEADER: &str = "X-Auth-Fallback-Retry";

/// Request body
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Empty,
    Json(serde_json::Value),
    Form(Vec<(String, String)>),
}

/// Per-request bookkeeping carried alongside the request
#[derive(Debug, Clone, Default)]
pub struct RequestMeta {
    /// Correlates the log lines of one logical request across attempts
    pub request_id: String,

    /// Set on the fallback retry; a retry is never retried again
    pub is_retry: bool,
}

/// A fully prepared request
#[derive(Debug)]
pub struct ApiRequest {
    pub method: Method,

    /// Path below the API base URL, starting with `/`
    pub path: String,

    pub query: Vec<(String, String)>,

    pub body: RequestBody,

    /// Bearer credential, if one is attached
    pub bearer: Option<SecretString>,

    pub meta: RequestMeta,
}

impl ApiRequest {
    /// `METHOD /path` for logs and errors
    pub fn endpoint(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

/// Raw response
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, ConsoleError> {
        Ok(serde_json::from_str(&self.body)?)
    }
}

/// Sends prepared requests to the backend
#[async_trait]
pub trait Transport: Send + Sync {
    /// Send the request. Any HTTP status is a successful send; only failures
    /// to get a response (connect errors, timeouts) are errors.
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ConsoleError>;
}

/// reqwest-backed transport
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a new transport with a fixed per-request timeout
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, ConsoleError> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ConsoleError> {
        let url = format!("{}{}", self.base_url, request.path);
        debug!("{} {}", request.method, url);

        let mut builder = self.client.request(request.method.clone(), &url);
        if !request.query.is_empty() {
            builder = builder.query(&request.query);
        }
        if let Some(token) = &request.bearer {
            builder = builder.header(
                header::AUTHORIZATION,
                format!("Bearer {}", token.expose_secret()),
            );
        }
        if request.meta.is_retry {
            builder = builder.header(RETRY_HEADER, "1");
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Form(fields) => builder.form(fields),
        };

        let response = builder.send().await.map_err(|e| classify(request, e))?;
        let status = response.status().as_u16();
        let body = response.text().await.map_err(|e| classify(request, e))?;

        Ok(ApiResponse { status, body })
    }
}

fn classify(request: &ApiRequest, err: reqwest::Error) -> ConsoleError {
    if err.is_timeout() {
        ConsoleError::Timeout {
            endpoint: request.endpoint(),
        }
    } else {
        ConsoleError::Network {
            endpoint: request.endpoint(),
            message: err.to_string(),
        }
    }
}
