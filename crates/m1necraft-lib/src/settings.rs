//! Persisted engine state that has to survive restarts.

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Publish time of the resource release the local bundles were synced from
    #[serde(default, rename = "lastResourcesPublishedAt")]
    pub last_known_published_at: Option<DateTime<Utc>>,
}

/// JSON-backed settings file in the private data root
#[derive(Debug, Clone)]
pub struct SettingsStore {
    path: PathBuf,
}

impl SettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load settings, treating a missing or unreadable file as defaults
    pub async fn load(&self) -> Settings {
        match load_settings(&self.path).await {
            Ok(Some(settings)) => settings,
            Ok(None) => Settings::default(),
            Err(e) => {
                log::warn!("Ignoring unreadable settings file {:?}: {:#}", self.path, e);
                Settings::default()
            }
        }
    }

    pub async fn last_known_published_at(&self) -> Option<DateTime<Utc>> {
        self.load().await.last_known_published_at
    }

    pub async fn set_last_known_published_at(&self, published_at: DateTime<Utc>) -> Result<()> {
        let mut settings = self.load().await;
        settings.last_known_published_at = Some(published_at);
        self.save(&settings).await
    }

    pub async fn save(&self, settings: &Settings) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)
                .await
                .context("Failed to create settings directory")?;
        }

        let json =
            serde_json::to_string_pretty(settings).context("Failed to serialize settings")?;
        fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write settings file {:?}", self.path))?;

        log::debug!("Saved settings to {:?}", self.path);
        Ok(())
    }
}

async fn load_settings(path: &Path) -> anyhow::Result<Option<Settings>> {
    let contents = match fs::read_to_string(path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e).context("Failed to read settings file"),
    };
    let settings = serde_json::from_str(&contents).context("Failed to parse settings JSON")?;
    Ok(Some(settings))
}
