//! Shared resource bundles: staleness check against the release metadata,
//! and the concurrent download + extract of every bundle.

pub mod bundle;
pub mod java;

pub use bundle::{BundleKind, ResourceBundle};

use crate::config::ResourceConfig;
use crate::core::{
    build_client, download_json_with_client, download_to_path, extract_archive, CancelToken,
    ProgressReporter, ScaledReporter,
};
use crate::error::{EngineError, Result};
use crate::paths::PathLayout;
use crate::settings::SettingsStore;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;

/// The part of the release metadata the synchronizer reads
#[derive(Debug, Clone, Deserialize)]
pub struct ReleaseMetadata {
    pub published_at: DateTime<Utc>,
}

/// Outcome of a bundle download pass
#[derive(Debug, Default)]
pub struct SyncReport {
    /// Publish time recorded by this pass, if it completed
    pub published_at: Option<DateTime<Utc>>,
    pub succeeded: Vec<BundleKind>,
    pub failed: Vec<(BundleKind, EngineError)>,
}

impl SyncReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct ResourceSynchronizer {
    layout: Arc<PathLayout>,
    config: ResourceConfig,
    client: reqwest::Client,
    settings: SettingsStore,
    bundles: Vec<ResourceBundle>,
    cancel_tx: watch::Sender<bool>,
}

impl ResourceSynchronizer {
    pub fn new(layout: Arc<PathLayout>, config: ResourceConfig) -> Result<Self> {
        let client = build_client(config.request_timeout)?;
        let bundles = BundleKind::all()
            .into_iter()
            .filter_map(|kind| kind.root(&layout).map(|root| ResourceBundle::new(kind, root)))
            .collect();
        let (cancel_tx, _) = watch::channel(false);

        Ok(Self {
            settings: SettingsStore::new(layout.settings_file.clone()),
            layout,
            config,
            client,
            bundles,
            cancel_tx,
        })
    }

    pub fn bundles(&self) -> &[ResourceBundle] {
        &self.bundles
    }

    pub fn bundle(&self, kind: BundleKind) -> Option<&ResourceBundle> {
        self.bundles.iter().find(|b| b.kind == kind)
    }

    /// Per-bundle progress receiver
    pub fn progress(&self, kind: BundleKind) -> Option<watch::Receiver<f64>> {
        self.bundle(kind).map(ResourceBundle::subscribe)
    }

    /// Mean of all bundle fractions
    pub fn overall_progress(&self) -> f64 {
        if self.bundles.is_empty() {
            return 0.0;
        }
        self.bundles.iter().map(ResourceBundle::progress).sum::<f64>() / self.bundles.len() as f64
    }

    pub fn settings(&self) -> &SettingsStore {
        &self.settings
    }

    /// Abort in-flight downloads; partial files are removed
    pub fn cancel(&self) {
        self.cancel_tx.send_replace(true);
    }

    pub async fn fetch_metadata(&self) -> Result<ReleaseMetadata> {
        download_json_with_client(&self.client, &self.config.metadata_url).await
    }

    /// True when the remote release is newer than the recorded one.
    /// Never changes the recorded value.
    pub async fn check_for_update(&self) -> Result<bool> {
        let remote = self.fetch_metadata().await?.published_at;
        let stale = match self.settings.last_known_published_at().await {
            Some(known) => remote > known,
            None => true,
        };
        log::info!(
            "Resources published at {}, stale: {}",
            remote.to_rfc3339(),
            stale
        );
        Ok(stale)
    }

    /// True when every bundle the installer reads from is present locally
    pub fn resources_present(&self) -> bool {
        let java_ready = self.bundles.iter().all(|bundle| match bundle.kind {
            BundleKind::Java(_) => java::locate_runtime_dir(&bundle.root).is_ok(),
            _ => true,
        });
        self.layout.profiles_bundle_dir.is_dir()
            && self.layout.res_lwjgl_natives_dir.is_dir()
            && self.layout.res_lwjgl_jar.is_file()
            && java_ready
    }

    /// Delete every bundle and fetch + extract them again, concurrently.
    ///
    /// A failing bundle does not stop its siblings. The publish time is
    /// recorded only when all bundles succeed; if none succeed the first
    /// failure is returned as a setup failure.
    pub async fn download(&self) -> Result<SyncReport> {
        self.cancel_tx.send_replace(false);
        let cancel = CancelToken::new(self.cancel_tx.subscribe());

        let published_at = match self.fetch_metadata().await {
            Ok(meta) => Some(meta.published_at),
            Err(e) => {
                log::warn!("Could not read release metadata, bundles stay marked stale: {}", e);
                None
            }
        };

        for bundle in &self.bundles {
            bundle.reset_progress();
            remove_bundle_root(bundle).await?;
        }

        log::info!("Downloading {} resource bundles", self.bundles.len());
        let results = futures::future::join_all(
            self.bundles
                .iter()
                .map(|bundle| self.sync_bundle(bundle, cancel.clone())),
        )
        .await;

        let mut report = SyncReport::default();
        for (bundle, result) in self.bundles.iter().zip(results) {
            match result {
                Ok(()) => report.succeeded.push(bundle.kind),
                Err(e) => {
                    log::error!("Failed to set up {}: {}", bundle.kind, e);
                    report.failed.push((bundle.kind, e));
                }
            }
        }

        if report.succeeded.is_empty() && !report.failed.is_empty() {
            let (_, first) = report.failed.remove(0);
            return Err(EngineError::setup(first));
        }

        if report.is_complete() {
            if let Some(ts) = published_at {
                self.settings.set_last_known_published_at(ts).await?;
                report.published_at = Some(ts);
            }
            log::info!("All resource bundles are up to date");
        } else {
            log::warn!(
                "{} of {} resource bundles failed",
                report.failed.len(),
                self.bundles.len()
            );
        }
        Ok(report)
    }

    /// `check_for_update`, then `download` when stale
    pub async fn sync(&self) -> Result<Option<SyncReport>> {
        if self.check_for_update().await? || !self.resources_present() {
            return self.download().await.map(Some);
        }
        log::info!("Resources are up to date, skipping download");
        Ok(None)
    }

    /// Fetch a single named archive into the downloads directory
    pub async fn download_artifact(
        &self,
        file_name: &str,
        reporter: &dyn ProgressReporter,
    ) -> Result<PathBuf> {
        let url = self.config.artifact_url(file_name)?;
        let dest = self.layout.downloads_dir.join(file_name);
        download_to_path(&self.client, url.as_str(), &dest, self.config.fetch, reporter).await?;
        Ok(dest)
    }

    async fn sync_bundle(&self, bundle: &ResourceBundle, cancel: CancelToken) -> Result<()> {
        let reporter: Arc<dyn ProgressReporter> = Arc::new(bundle.reporter(cancel));
        let url = self.config.artifact_url(&bundle.archive_name)?;
        let archive = self.layout.downloads_dir.join(&bundle.archive_name);

        log::info!("[{}] downloading {}", bundle.kind, url);
        let fetch_progress = ScaledReporter::half(reporter.clone(), false);
        download_to_path(
            &self.client,
            url.as_str(),
            &archive,
            self.config.fetch,
            &fetch_progress,
        )
        .await?;

        log::info!("[{}] extracting to {:?}", bundle.kind, bundle.root);
        let extract_progress: Arc<dyn ProgressReporter> =
            Arc::new(ScaledReporter::half(reporter.clone(), true));
        let extracted = extract_archive(&archive, &bundle.root, extract_progress).await;
        if let Err(e) = tokio::fs::remove_file(&archive).await {
            log::debug!("Could not remove downloaded archive {:?}: {}", archive, e);
        }
        extracted?;

        if let BundleKind::Java(_) = bundle.kind {
            let root = bundle.root.clone();
            tokio::task::spawn_blocking(move || {
                let runtime = java::locate_runtime_dir(&root)?;
                java::mark_binaries_executable(&runtime)
            })
            .await
            .map_err(|e| EngineError::Other(anyhow::anyhow!("Java setup task failed: {}", e)))??;
        }

        reporter.set_fraction(1.0);
        log::info!("[{}] ready", bundle.kind);
        Ok(())
    }
}

async fn remove_bundle_root(bundle: &ResourceBundle) -> Result<()> {
    match tokio::fs::remove_dir_all(&bundle.root).await {
        Ok(()) => {
            log::debug!("Removed old {:?}", bundle.root);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}
