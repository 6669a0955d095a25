//! Observed state of one deployment view
//!
//! Holds the reactive deployment entity and progress record. Every write
//! goes through this type and takes its lock, and [`Observation::close`]
//! takes the same lock, so once `close` returns no writer can land.
//!
//! Each issued action starts a new generation. Fetch results carry the
//! generation they were requested in and are dropped if an action began
//! after they went out.

use parking_lot::Mutex;
use tokio::sync::watch;
use tracing::debug;

use crate::deploy::fsm::Action;
use crate::deploy::gatekeeper;
use crate::errors::ConsoleError;
use crate::models::deployment::{Deployment, DeploymentId, DeploymentStatus};
use crate::models::progress::ProgressRecord;

/// Outcome of publishing a fetched deployment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Publish {
    Applied,
    /// Requested before the latest action began
    Stale,
    Closed,
}

struct Inner {
    closed: bool,
    generation: u64,

    /// Last state reported by the backend, restored when an action fails
    last_reported: Option<Deployment>,
}

pub struct Observation {
    deployment_id: DeploymentId,
    deployment: watch::Sender<Option<Deployment>>,
    progress: watch::Sender<ProgressRecord>,
    inner: Mutex<Inner>,
}

impl Observation {
    pub fn new(deployment_id: DeploymentId) -> Self {
        let (deployment, _) = watch::channel(None);
        let (progress, _) = watch::channel(ProgressRecord::default());
        Self {
            deployment_id,
            deployment,
            progress,
            inner: Mutex::new(Inner {
                closed: false,
                generation: 0,
                last_reported: None,
            }),
        }
    }

    pub fn subscribe_deployment(&self) -> watch::Receiver<Option<Deployment>> {
        self.deployment.subscribe()
    }

    pub fn subscribe_progress(&self) -> watch::Receiver<ProgressRecord> {
        self.progress.subscribe()
    }

    pub fn current(&self) -> Option<Deployment> {
        self.deployment.borrow().clone()
    }

    pub fn status(&self) -> Option<DeploymentStatus> {
        self.deployment.borrow().as_ref().map(|d| d.status)
    }

    pub fn progress(&self) -> ProgressRecord {
        self.progress.borrow().clone()
    }

    /// Generation to tag a fetch with before sending it
    pub fn generation(&self) -> u64 {
        self.inner.lock().generation
    }

    /// Mirror a state reported by the backend. Returns false once closed.
    pub fn publish_reported(&self, deployment: Deployment) -> bool {
        let generation = self.generation();
        self.publish_fetched(generation, deployment) == Publish::Applied
    }

    /// Mirror a state fetched during `generation`
    pub fn publish_fetched(&self, generation: u64, deployment: Deployment) -> Publish {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Publish::Closed;
        }
        if generation < inner.generation {
            debug!(
                "Dropping {} for deployment {} fetched before the last action",
                deployment.status, self.deployment_id
            );
            return Publish::Stale;
        }
        debug!(
            "Deployment {} reported as {}",
            self.deployment_id, deployment.status
        );
        inner.last_reported = Some(deployment.clone());
        self.deployment.send_replace(Some(deployment));
        Publish::Applied
    }

    /// Validate `action` against the current state and apply its transient
    /// status in one step, so two concurrent issuers cannot both pass.
    /// Returns the state the action was validated against.
    pub fn begin_action(&self, action: &Action) -> Result<Deployment, ConsoleError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(ConsoleError::ValidationError(format!(
                "deployment {} is no longer observed",
                self.deployment_id
            )));
        }
        let current = self.current().ok_or_else(|| {
            ConsoleError::ValidationError(format!(
                "deployment {} has not been loaded",
                self.deployment_id
            ))
        })?;

        gatekeeper::validate(action, &current)?;
        inner.generation += 1;

        if let Some(transient) = action.kind().transient_status() {
            self.deployment.send_modify(|d| {
                if let Some(d) = d {
                    d.status = transient;
                }
            });
        }
        drop(inner);
        Ok(current)
    }

    /// Undo an optimistic status after the action request failed
    pub fn rollback(&self) -> bool {
        let inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        if let Some(reported) = &inner.last_reported {
            debug!(
                "Rolling deployment {} back to {}",
                self.deployment_id, reported.status
            );
            self.deployment.send_replace(Some(reported.clone()));
        }
        true
    }

    /// Change the progress record. Returns false once closed.
    pub fn update_progress(&self, f: impl FnOnce(&mut ProgressRecord)) -> bool {
        let inner = self.inner.lock();
        if inner.closed {
            return false;
        }
        self.progress.send_modify(f);
        true
    }

    /// Stop accepting writes
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }
}
