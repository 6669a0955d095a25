//! Utility functions

use serde::{Deserialize, Serialize};

/// Version information for the console
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Get version information
pub fn version_info() -> VersionInfo {
    VersionInfo {
        version: env!("CARGO_PKG_VERSION").to_string(),
        git_hash: option_env!("DEPLOYCTL_GIT_HASH").unwrap_or("unknown").to_string(),
        build_time: option_env!("DEPLOYCTL_BUILD_TIME").unwrap_or("unknown").to_string(),
    }
}

/// Short id correlating the log lines of one logical request
pub fn request_id() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    id[..8].to_string()
}

/// Turn an `http(s)://` base URL into the matching `ws(s)://` URL
pub fn websocket_base(base_url: &str) -> Result<url::Url, String> {
    let mut url = url::Url::parse(base_url).map_err(|e| e.to_string())?;
    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(format!("unsupported URL scheme: {}", other)),
    };
    url.set_scheme(scheme)
        .map_err(|_| "failed to set scheme".to_string())?;
    Ok(url)
}
