//! Remote endpoints and network settings.
//! Defaults point at the published resource release; hosts override them
//! through CLI flags or environment variables.

use crate::core::FetchOptions;
use crate::error::{EngineError, Result};
use std::time::Duration;
use url::Url;

pub const REQUEST_TIMEOUT_SECS: u64 = 120;

// URL Constants
pub const RESOURCES_METADATA_URL: &str =
    "https://api.github.com/repos/raphtlw/m1necraft/releases/tags/resources";
pub const RESOURCES_ARTIFACT_URL: &str =
    "https://github.com/raphtlw/m1necraft/releases/download/resources/";

pub const METADATA_URL_ENV: &str = "M1NECRAFT_METADATA_URL";
pub const ARTIFACT_URL_ENV: &str = "M1NECRAFT_RESOURCES_URL";

/// Host launcher installer image in the bundle store
pub const LAUNCHER_IMAGE_NAME: &str = "Minecraft.dmg";

#[derive(Debug, Clone)]
pub struct ResourceConfig {
    pub metadata_url: String,
    pub artifact_base_url: String,
    pub request_timeout: Duration,
    pub fetch: FetchOptions,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            metadata_url: RESOURCES_METADATA_URL.to_string(),
            artifact_base_url: RESOURCES_ARTIFACT_URL.to_string(),
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            fetch: FetchOptions::default(),
        }
    }
}

impl ResourceConfig {
    /// Defaults with `M1NECRAFT_METADATA_URL` / `M1NECRAFT_RESOURCES_URL` applied
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var(METADATA_URL_ENV) {
            log::debug!("Using metadata URL from environment: {}", url);
            config.metadata_url = url;
        }
        if let Ok(url) = std::env::var(ARTIFACT_URL_ENV) {
            log::debug!("Using resources URL from environment: {}", url);
            config.artifact_base_url = url;
        }
        config
    }

    /// Both endpoints served from one base URL, as in tests against a local server
    pub fn with_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            metadata_url: format!("{}/metadata.json", base),
            artifact_base_url: format!("{}/", base),
            ..Self::default()
        }
    }

    /// Location of a named archive in the bundle store
    pub fn artifact_url(&self, file_name: &str) -> Result<Url> {
        let mut base = self.artifact_base_url.clone();
        if !base.ends_with('/') {
            base.push('/');
        }
        Url::parse(&base)
            .and_then(|base| base.join(file_name))
            .map_err(|e| EngineError::Fetch {
                url: format!("{}{}", base, file_name),
                message: format!("Invalid resource URL: {}", e),
            })
    }
}
