//! Session file management

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::ConsoleError;
use crate::filesys::file::File;

/// Login session stored locally
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Bearer token issued by `/auth/login`
    pub access_token: String,

    pub username: String,

    pub logged_in_at: DateTime<Utc>,
}

impl Session {
    pub fn new(access_token: String, username: String) -> Self {
        Self {
            access_token,
            username,
            logged_in_at: Utc::now(),
        }
    }
}

/// Load the session, `None` when logged out
pub async fn load_session(session_file: &File) -> Result<Option<Session>, ConsoleError> {
    session_file.read_json_opt().await
}

/// Save the session, readable by the owner only
pub async fn save_session(session_file: &File, session: &Session) -> Result<(), ConsoleError> {
    session_file.write_json_private(session).await
}

/// Remove the session file
pub async fn clear_session(session_file: &File) -> Result<(), ConsoleError> {
    session_file.delete().await
}
