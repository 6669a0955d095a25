//! In-memory transport and progress channel used by the unit tests

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc;
use futures::StreamExt;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Notify;

use deployctl::authn::session::SessionStore;
use deployctl::deploy::controller::{ControllerOptions, DeploymentController};
use deployctl::errors::ConsoleError;
use deployctl::http::gateway::{FallbackCredentials, FallbackPolicy, Gateway};
use deployctl::http::transport::{ApiRequest, ApiResponse, Transport};
use deployctl::models::deployment::{Deployment, DeploymentId, DeploymentStatus, Environment};
use deployctl::models::progress::ProgressEvent;
use deployctl::storage::session::Session;
use deployctl::workers::progress::{ProgressChannel, ProgressConnection};
use deployctl::workers::refresher;

/// Ordered record of what the fakes saw, shared between them
pub type Journal = Arc<Mutex<Vec<String>>>;

#[derive(Debug, Clone)]
pub enum Reply {
    Status(u16, String),
    Network,
}

impl Reply {
    pub fn ok(body: impl Into<String>) -> Self {
        Reply::Status(200, body.into())
    }

    pub fn status(status: DeploymentStatus) -> Self {
        Reply::ok(deployment_json(1, status))
    }
}

/// What a request looked like when it reached the transport
#[derive(Debug, Clone)]
pub struct Recorded {
    pub endpoint: String,
    pub query: Vec<(String, String)>,
    pub bearer: Option<String>,
    pub is_retry: bool,
    pub request_id: String,
}

impl Recorded {
    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

/// Transport answering from scripted replies per `METHOD /path`. The last
/// reply of a script repeats; unscripted endpoints answer 404.
#[derive(Default)]
pub struct FakeTransport {
    scripts: Mutex<HashMap<String, VecDeque<Reply>>>,
    gates: Mutex<HashMap<String, Arc<Notify>>>,
    requests: Mutex<Vec<Recorded>>,
    journal: Journal,
}

impl FakeTransport {
    pub fn new(journal: Journal) -> Self {
        Self {
            journal,
            ..Default::default()
        }
    }

    pub fn script(&self, endpoint: &str, replies: impl IntoIterator<Item = Reply>) {
        self.scripts
            .lock()
            .unwrap()
            .entry(endpoint.to_string())
            .or_default()
            .extend(replies);
    }

    /// Hold the next request to `endpoint` after its reply is picked, until
    /// the returned handle is notified
    pub fn gate(&self, endpoint: &str) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        self.gates
            .lock()
            .unwrap()
            .insert(endpoint.to_string(), gate.clone());
        gate
    }

    pub fn requests(&self) -> Vec<Recorded> {
        self.requests.lock().unwrap().clone()
    }

    pub fn count(&self, endpoint: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.endpoint == endpoint)
            .count()
    }

    fn next_reply(&self, endpoint: &str) -> Reply {
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(endpoint) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) if !queue.is_empty() => queue[0].clone(),
            _ => Reply::Status(404, r#"{"detail": "Not found"}"#.to_string()),
        }
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse, ConsoleError> {
        let endpoint = request.endpoint();
        self.journal.lock().unwrap().push(endpoint.clone());
        self.requests.lock().unwrap().push(Recorded {
            endpoint: endpoint.clone(),
            query: request.query.clone(),
            bearer: request.bearer.as_ref().map(|b| b.expose_secret().to_string()),
            is_retry: request.meta.is_retry,
            request_id: request.meta.request_id.clone(),
        });
        let reply = self.next_reply(&endpoint);
        let gate = self.gates.lock().unwrap().remove(&endpoint);
        if let Some(gate) = gate {
            gate.notified().await;
        }
        match reply {
            Reply::Status(status, body) => Ok(ApiResponse::new(status, body)),
            Reply::Network => Err(ConsoleError::Network {
                endpoint,
                message: "connection reset".to_string(),
            }),
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<Result<ProgressEvent, ConsoleError>>;

/// Progress channel handing out one scripted connection
pub struct FakeProgressChannel {
    pending: Mutex<Option<mpsc::UnboundedReceiver<Result<ProgressEvent, ConsoleError>>>>,
    fail_connect: bool,
    connects: AtomicUsize,
    closes: Arc<AtomicUsize>,
    journal: Journal,
}

impl FakeProgressChannel {
    pub fn new(journal: Journal) -> (Self, EventSender) {
        let (tx, rx) = mpsc::unbounded();
        let channel = Self {
            pending: Mutex::new(Some(rx)),
            fail_connect: false,
            connects: AtomicUsize::new(0),
            closes: Arc::new(AtomicUsize::new(0)),
            journal,
        };
        (channel, tx)
    }

    pub fn refusing(journal: Journal) -> Self {
        let (mut channel, _) = Self::new(journal);
        channel.fail_connect = true;
        channel
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn closes(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ProgressChannel for FakeProgressChannel {
    async fn connect(
        &self,
        deployment_id: DeploymentId,
    ) -> Result<Box<dyn ProgressConnection>, ConsoleError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.journal
            .lock()
            .unwrap()
            .push(format!("CONNECT {}", deployment_id));
        if self.fail_connect {
            return Err(ConsoleError::StreamError("connection refused".to_string()));
        }
        let events = self
            .pending
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ConsoleError::StreamError("already connected".to_string()))?;
        Ok(Box::new(FakeConnection {
            events,
            closes: self.closes.clone(),
        }))
    }
}

struct FakeConnection {
    events: mpsc::UnboundedReceiver<Result<ProgressEvent, ConsoleError>>,
    closes: Arc<AtomicUsize>,
}

#[async_trait]
impl ProgressConnection for FakeConnection {
    async fn next_event(&mut self) -> Option<Result<ProgressEvent, ConsoleError>> {
        self.events.next().await
    }

    async fn close(&mut self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.events.close();
    }
}

pub fn deployment(id: DeploymentId, status: DeploymentStatus) -> Deployment {
    Deployment {
        id,
        project_id: 10,
        machine_id: 20,
        environment: Environment::Production,
        deploy_path: Some("/srv/app".to_string()),
        status,
        log: None,
        updated_at: None,
    }
}

pub fn deployment_json(id: DeploymentId, status: DeploymentStatus) -> String {
    serde_json::to_string(&deployment(id, status)).unwrap()
}

pub fn fallback(enabled: bool) -> FallbackPolicy {
    FallbackPolicy {
        enabled,
        credentials: FallbackCredentials {
            username: "admin".to_string(),
            password: SecretString::from("password".to_string()),
        },
    }
}

pub fn session_store(token: Option<&str>) -> Arc<SessionStore> {
    Arc::new(SessionStore::in_memory(
        token.map(|t| Session::new(t.to_string(), "alice".to_string())),
    ))
}

pub fn gateway(transport: Arc<FakeTransport>, store: Arc<SessionStore>, fallback_enabled: bool) -> Arc<Gateway> {
    Arc::new(Gateway::new(transport, store, fallback(fallback_enabled)))
}

/// Controller over the fakes, polling every 3 seconds
pub struct Harness {
    pub journal: Journal,
    pub transport: Arc<FakeTransport>,
    pub channel: Arc<FakeProgressChannel>,
    pub events: Option<EventSender>,
    pub controller: DeploymentController,
}

impl Harness {
    pub fn new() -> Self {
        let journal = Journal::default();
        let (channel, events) = FakeProgressChannel::new(journal.clone());
        Self::with_channel(journal, channel, Some(events))
    }

    pub fn refusing_progress() -> Self {
        let journal = Journal::default();
        let channel = FakeProgressChannel::refusing(journal.clone());
        Self::with_channel(journal, channel, None)
    }

    fn with_channel(journal: Journal, channel: FakeProgressChannel, events: Option<EventSender>) -> Self {
        let transport = Arc::new(FakeTransport::new(journal.clone()));
        let channel = Arc::new(channel);
        let controller = DeploymentController::new(
            gateway(transport.clone(), session_store(None), true),
            channel.clone(),
            ControllerOptions {
                refresher: refresher::Options {
                    interval: Duration::from_secs(3),
                },
            },
        );
        Self {
            journal,
            transport,
            channel,
            events,
            controller,
        }
    }

    pub fn send(&self, event: ProgressEvent) {
        if let Some(events) = &self.events {
            let _ = events.unbounded_send(Ok(event));
        }
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().unwrap().clone()
    }
}

/// Let spawned tasks run without moving the clock far
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
