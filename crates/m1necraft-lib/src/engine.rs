use crate::config::{ResourceConfig, LAUNCHER_IMAGE_NAME};
use crate::core::ProgressReporter;
use crate::error::Result;
use crate::guard::TerminationSignal;
use crate::install::{GameVersion, InstallOutcome, InstallState, InstallStep, VersionInstaller};
use crate::launcher::{self, LaunchResult, ProfilePatcher};
use crate::paths::PathLayout;
use crate::resources::{ResourceSynchronizer, SyncReport};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 64;

/// Notifications for hosts that render version state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    StateChanged { version: String, state: InstallState },
    StepStarted { version: String, step: InstallStep },
}

/// Entry point for hosts: setup, version listing, install, reset and launch
pub struct Engine {
    layout: Arc<PathLayout>,
    resources: ResourceSynchronizer,
    profiles: Arc<ProfilePatcher>,
    installer: VersionInstaller,
    termination: TerminationSignal,
    events: broadcast::Sender<EngineEvent>,
    known_versions: Mutex<Option<Vec<String>>>,
}

impl Engine {
    pub fn new(layout: PathLayout, config: ResourceConfig) -> Result<Self> {
        let layout = Arc::new(layout);
        let profiles = Arc::new(ProfilePatcher::new(layout.host.launcher_profiles.clone()));
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            resources: ResourceSynchronizer::new(Arc::clone(&layout), config)?,
            installer: VersionInstaller::new(Arc::clone(&layout), Arc::clone(&profiles)),
            profiles,
            layout,
            termination: TerminationSignal::new(),
            events,
            known_versions: Mutex::new(None),
        })
    }

    /// System data directory, default launcher location, env-configured endpoints
    pub fn from_system() -> Result<Self> {
        Self::new(PathLayout::from_system()?, ResourceConfig::from_env())
    }

    pub fn layout(&self) -> &PathLayout {
        &self.layout
    }

    pub fn resources(&self) -> &ResourceSynchronizer {
        &self.resources
    }

    pub fn profiles(&self) -> &ProfilePatcher {
        &self.profiles
    }

    pub fn termination_signal(&self) -> TerminationSignal {
        self.termination.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// True when a required resource bundle is missing locally
    pub fn needs_setup(&self) -> bool {
        !self.resources.resources_present()
    }

    /// True when the host launcher has been run at least once
    pub fn host_launcher_ready(&self) -> bool {
        self.layout.host.required_exists()
    }

    pub async fn check_for_update(&self) -> Result<bool> {
        self.resources.check_for_update().await
    }

    pub async fn download(&self) -> Result<SyncReport> {
        let _guard = self.termination.begin_critical("download");
        let report = self.resources.download().await;
        self.forget_versions();
        report
    }

    /// Download only when the remote release is newer or bundles are missing
    pub async fn sync(&self) -> Result<Option<SyncReport>> {
        let _guard = self.termination.begin_critical("sync");
        let report = self.resources.sync().await;
        self.forget_versions();
        report
    }

    /// Known versions, newest first, with fresh install states.
    /// The set itself is read once from the profiles bundle and cached.
    pub fn versions(&self) -> Result<Vec<GameVersion>> {
        let mut cached = self
            .known_versions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(names) = cached.as_ref() {
            return Ok(names
                .iter()
                .map(|name| GameVersion {
                    name: name.clone(),
                    state: self.installer.current_state(name),
                })
                .collect());
        }

        let versions = self.installer.known_versions()?;
        *cached = Some(versions.iter().map(|v| v.name.clone()).collect());
        Ok(versions)
    }

    /// Re-check every version on disk and publish its state
    pub fn refresh_states(&self) -> Result<Vec<GameVersion>> {
        let versions = self.versions()?;
        for version in &versions {
            self.publish_state(&version.name, version.state.clone());
        }
        Ok(versions)
    }

    pub fn probe_state(&self, version_name: &str) -> InstallState {
        self.installer.probe_state(version_name)
    }

    pub async fn install(&self, version_name: &str) -> Result<InstallOutcome> {
        self.install_with(version_name, |_| {}).await
    }

    /// Install with a callback invoked before each step, in addition to the
    /// `StepStarted` event
    pub async fn install_with<F>(&self, version_name: &str, mut on_step: F) -> Result<InstallOutcome>
    where
        F: FnMut(InstallStep) + Send,
    {
        let _guard = self.termination.begin_critical("install");
        let events = self.events.clone();
        let name = version_name.to_string();

        let outcome = self
            .installer
            .install(version_name, |step| {
                let _ = events.send(EngineEvent::StepStarted {
                    version: name.clone(),
                    step,
                });
                let _ = events.send(EngineEvent::StateChanged {
                    version: name.clone(),
                    state: InstallState::Installing(step),
                });
                on_step(step);
            })
            .await;

        if !matches!(outcome, Ok(InstallOutcome::AlreadyInProgress)) {
            self.publish_state(version_name, self.installer.probe_state(version_name));
        }
        if let Err(e) = &outcome {
            log::error!("Install of {} failed: {}", version_name, e);
        }
        outcome
    }

    /// Undo everything this engine put into the launcher tree, then wipe the private root.
    ///
    /// Versions to remove are the bundled ones plus whatever the owned
    /// profiles point at, so installs survive a missing profiles bundle.
    /// Profiles go first so the profile file never lists a version whose
    /// directory is already gone.
    pub async fn reset(&self) -> Result<()> {
        let _guard = self.termination.begin_critical("reset");
        log::info!("Resetting all data");

        let mut names: Vec<String> = self.versions()?.into_iter().map(|v| v.name).collect();
        if let Some(doc) = self.profiles.read().await? {
            for name in doc.owned_version_names() {
                if !names.contains(&name) {
                    names.push(name);
                }
            }
        }

        self.profiles.remove_owned_profiles().await?;
        self.installer.remove_installed(&names).await?;

        let layout = Arc::clone(&self.layout);
        tokio::task::spawn_blocking(move || layout.reset_root())
            .await
            .map_err(|e| anyhow::anyhow!("Reset task failed: {}", e))??;

        for name in &names {
            self.publish_state(name, InstallState::NotInstalled);
        }
        self.forget_versions();
        Ok(())
    }

    pub async fn launch(&self) -> Result<LaunchResult> {
        launcher::launch(&self.layout).await
    }

    /// Fetch the launcher disk image and copy the app into the private root
    pub async fn install_launcher(&self, reporter: &dyn ProgressReporter) -> Result<PathBuf> {
        let _guard = self.termination.begin_critical("install-launcher");
        let image = self
            .resources
            .download_artifact(LAUNCHER_IMAGE_NAME, reporter)
            .await?;
        let app = launcher::install_from_image(&self.layout, &image).await;
        if let Err(e) = tokio::fs::remove_file(&image).await {
            log::debug!("Could not remove {:?}: {}", image, e);
        }
        app
    }

    fn publish_state(&self, version_name: &str, state: InstallState) {
        // No subscribers is fine
        let _ = self.events.send(EngineEvent::StateChanged {
            version: version_name.to_string(),
            state,
        });
    }

    fn forget_versions(&self) {
        *self
            .known_versions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
    }
}
