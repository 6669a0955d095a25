//! Application configuration options

use std::time::Duration;

use crate::deploy::controller::ControllerOptions;
use crate::http::gateway::{FallbackCredentials, FallbackPolicy};
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;
use crate::workers::refresher;

/// Main application options
#[derive(Debug)]
pub struct AppOptions {
    /// Backend API base URL
    pub backend_base_url: String,

    /// Timeout applied to every backend request
    pub request_timeout: Duration,

    /// Progress channel path template, see [`crate::storage::settings::BackendSettings`]
    pub progress_path: String,

    /// Storage layout paths
    pub storage: StorageLayout,

    /// Refresher and progress settings
    pub controller: ControllerOptions,

    /// Fallback retry for rejected reads
    pub fallback: FallbackPolicy,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self::from_settings(Settings::default(), StorageLayout::default())
    }
}

impl AppOptions {
    pub fn from_settings(settings: Settings, storage: StorageLayout) -> Self {
        let fallback = FallbackPolicy {
            enabled: settings.fallback_auth.enabled,
            credentials: FallbackCredentials {
                username: settings.fallback_auth.username,
                password: settings.fallback_auth.password,
            },
        };
        Self {
            backend_base_url: settings.backend.base_url,
            request_timeout: Duration::from_secs(settings.backend.request_timeout_secs.max(1)),
            progress_path: settings.backend.progress_path,
            storage,
            controller: ControllerOptions {
                refresher: refresher::Options {
                    interval: Duration::from_secs(settings.polling.interval_secs.max(1)),
                },
            },
            fallback,
        }
    }
}
