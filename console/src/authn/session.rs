//! Session store: the one owner of the bearer credential

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::errors::ConsoleError;
use crate::filesys::file::File;
use crate::storage::session::{clear_session, load_session, save_session, Session};

/// Read access to the current credential, injected into the gateway
#[async_trait]
pub trait SessionProvider: Send + Sync {
    /// Current bearer token, if logged in
    async fn bearer(&self) -> Option<SecretString>;

    /// The backend rejected the credential for good; drop it
    async fn invalidate(&self, reason: &str);
}

/// Session store backed by the session file
pub struct SessionStore {
    session_file: Option<Arc<File>>,
    current: RwLock<Option<Session>>,
}

impl SessionStore {
    /// Store that never touches disk
    pub fn in_memory(session: Option<Session>) -> Self {
        Self {
            session_file: None,
            current: RwLock::new(session),
        }
    }

    /// Load the persisted session, if any
    pub async fn load(session_file: Arc<File>) -> Result<Self, ConsoleError> {
        let session = load_session(&session_file).await?;
        if let Some(session) = &session {
            info!("Loaded session for {}", session.username);
        }
        Ok(Self {
            session_file: Some(session_file),
            current: RwLock::new(session),
        })
    }

    /// Current session
    pub async fn current(&self) -> Option<Session> {
        self.current.read().await.clone()
    }

    /// Store a freshly issued session
    pub async fn login(&self, session: Session) -> Result<(), ConsoleError> {
        if let Some(file) = &self.session_file {
            save_session(file, &session).await?;
        }
        info!("Logged in as {}", session.username);
        *self.current.write().await = Some(session);
        Ok(())
    }

    /// Forget the session
    pub async fn logout(&self) -> Result<(), ConsoleError> {
        let previous = self.current.write().await.take();
        if let Some(file) = &self.session_file {
            clear_session(file).await?;
        }
        if let Some(session) = previous {
            info!("Logged out {}", session.username);
        }
        Ok(())
    }
}

#[async_trait]
impl SessionProvider for SessionStore {
    async fn bearer(&self) -> Option<SecretString> {
        self.current
            .read()
            .await
            .as_ref()
            .map(|session| SecretString::from(session.access_token.clone()))
    }

    async fn invalidate(&self, reason: &str) {
        if self.current.read().await.is_none() {
            return;
        }
        warn!("Clearing session credential: {}", reason);
        if let Err(e) = self.logout().await {
            error!("Failed to clear session file: {}", e);
        }
    }
}
