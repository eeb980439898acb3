//! Per-version install state machine.
//!
//! `probe_state` reads the filesystem every time; nothing is cached. An
//! install copies the shared LWJGL files, the version's profile template
//! and the matching Java runtime into the launcher tree through a
//! [`StagedInstall`], then adds the launcher profile. A failed profile step
//! rolls the copied files back.
//!
//! Staging runs in parallel across versions. Swapping into the launcher
//! tree, the profile step and the commit or rollback hold one lock, since
//! the LWJGL files and Java runtimes are shared by every version and a
//! rollback restores the backup taken at its own swap.

pub mod types;

pub use types::{
    compare_versions, java_major_for, sort_descending, GameVersion, InstallOutcome, InstallState,
    InstallStep,
};

use crate::core::StagedInstall;
use crate::error::{EngineError, Result};
use crate::launcher::profiles::{ensure_host_skeleton, ProfilePatcher};
use crate::paths::{version_name_from_dir, PathLayout};
use crate::resources::java;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

type InFlightMap = Mutex<HashMap<String, InstallStep>>;

pub struct VersionInstaller {
    layout: Arc<PathLayout>,
    profiles: Arc<ProfilePatcher>,
    in_flight: Arc<InFlightMap>,
    host_lock: tokio::sync::Mutex<()>,
}

/// Removes the version from the in-flight set when the install ends
struct InFlight {
    map: Arc<InFlightMap>,
    name: String,
}

impl InFlight {
    fn set_step(&self, step: InstallStep) {
        lock(&self.map).insert(self.name.clone(), step);
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        lock(&self.map).remove(&self.name);
    }
}

fn lock(map: &InFlightMap) -> MutexGuard<'_, HashMap<String, InstallStep>> {
    map.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl VersionInstaller {
    pub fn new(layout: Arc<PathLayout>, profiles: Arc<ProfilePatcher>) -> Self {
        Self {
            layout,
            profiles,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            host_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// `Installed` iff `<name>-arm` exists in the launcher's versions dir
    pub fn probe_state(&self, version_name: &str) -> InstallState {
        let dir = self.layout.host.version_dir(version_name);
        if dir.is_dir() {
            InstallState::Installed(dir)
        } else {
            InstallState::NotInstalled
        }
    }

    /// On-disk state, overlaid with the step of an install in flight
    pub fn current_state(&self, version_name: &str) -> InstallState {
        match lock(&self.in_flight).get(version_name) {
            Some(step) => InstallState::Installing(*step),
            None => self.probe_state(version_name),
        }
    }

    pub fn is_installing(&self, version_name: &str) -> bool {
        lock(&self.in_flight).contains_key(version_name)
    }

    /// Versions with a bundled profile template, newest first
    pub fn known_versions(&self) -> Result<Vec<GameVersion>> {
        let entries = match std::fs::read_dir(&self.layout.profiles_bundle_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let file_name = entry.file_name();
            if let Some(name) = file_name.to_str().and_then(version_name_from_dir) {
                let mut version = GameVersion::new(name);
                version.state = self.current_state(name);
                versions.push(version);
            }
        }
        sort_descending(&mut versions);
        Ok(versions)
    }

    /// Install a version. `on_step` is called before each step runs.
    ///
    /// Returns `AlreadyInProgress` without calling `on_step` when another
    /// install of the same version is running, and `AlreadyInstalled` when
    /// the version directory already exists.
    pub async fn install<F>(&self, version_name: &str, mut on_step: F) -> Result<InstallOutcome>
    where
        F: FnMut(InstallStep) + Send,
    {
        let Some(in_flight) = self.begin(version_name) else {
            log::info!("Install of {} already in progress", version_name);
            return Ok(InstallOutcome::AlreadyInProgress);
        };

        if let InstallState::Installed(path) = self.probe_state(version_name) {
            log::info!("{} is already installed at {:?}", version_name, path);
            return Ok(InstallOutcome::AlreadyInstalled(path));
        }

        let template = self.layout.profile_template_dir(version_name);
        if !template.is_dir() {
            return Err(EngineError::UnknownVersion(version_name.to_string()));
        }

        let mut report = |step: InstallStep| {
            log::info!("[install:{}] {}", version_name, step);
            in_flight.set_step(step);
            on_step(step);
        };

        // 1. Starting
        report(InstallStep::Starting);
        let java_major = java_major_for(version_name);
        let java_bundle = self
            .layout
            .java_bundle_dir(java_major)
            .cloned()
            .ok_or_else(|| EngineError::UnknownVersion(version_name.to_string()))?;
        let host_jre = self
            .layout
            .host
            .jre_dir(java_major)
            .cloned()
            .ok_or_else(|| EngineError::UnknownVersion(version_name.to_string()))?;

        // 2. Copying
        report(InstallStep::Copying);
        ensure_host_skeleton(&self.layout.host).await?;
        let runtime_dir = java::locate_runtime_dir(&java_bundle)?;
        let java_relative = java::relative_java_executable(&runtime_dir).ok_or_else(|| {
            EngineError::GlobMismatch {
                dir: runtime_dir.clone(),
                expected: "a bin/java executable".to_string(),
                found: 0,
            }
        })?;

        let host = &self.layout.host;
        let copies: Vec<(PathBuf, PathBuf)> = vec![
            (
                self.layout.res_lwjgl_natives_dir.clone(),
                host.lwjgl_natives_dir.clone(),
            ),
            (self.layout.res_lwjgl_jar.clone(), host.lwjgl_jar.clone()),
            (template, host.version_dir(version_name)),
            (runtime_dir, host_jre.clone()),
        ];
        let txn = self.stage_copies(version_name, copies).await?;

        let _host = self.host_lock.lock().await;
        log::debug!("[install:{}] swapping into {:?}", version_name, host.root);
        let mut txn = blocking(move || {
            let mut txn = txn;
            txn.swap()?;
            Ok(txn)
        })
        .await?;

        // 3. AddingProfile
        report(InstallStep::AddingProfile);
        let java_executable = host_jre.join(java_relative);
        if let Err(e) = self
            .profiles
            .add_profile(version_name, &java_executable)
            .await
        {
            let reason = e.to_string();
            blocking(move || txn.rollback(&reason)).await?;
            return Err(e);
        }

        // 4. Finishing
        report(InstallStep::Finishing);
        blocking(move || txn.commit()).await?;

        match self.probe_state(version_name) {
            InstallState::Installed(path) => {
                log::info!("Installed {} at {:?}", version_name, path);
                Ok(InstallOutcome::Installed(path))
            }
            _ => Err(EngineError::Other(anyhow::anyhow!(
                "{} is missing after install",
                version_name
            ))),
        }
    }

    /// Delete the `-arm` directories of the given versions. Returns how many existed.
    pub async fn remove_installed(&self, version_names: &[String]) -> Result<usize> {
        let _host = self.host_lock.lock().await;
        let mut removed = 0;
        for name in version_names {
            let dir = self.layout.host.version_dir(name);
            match tokio::fs::remove_dir_all(&dir).await {
                Ok(()) => {
                    log::info!("Removed {:?}", dir);
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(removed)
    }

    fn begin(&self, version_name: &str) -> Option<InFlight> {
        let mut map = lock(&self.in_flight);
        if map.contains_key(version_name) {
            return None;
        }
        map.insert(version_name.to_string(), InstallStep::Starting);
        Some(InFlight {
            map: Arc::clone(&self.in_flight),
            name: version_name.to_string(),
        })
    }

    /// Copy every source into the staging area; the launcher tree is not touched
    async fn stage_copies(
        &self,
        version_name: &str,
        copies: Vec<(PathBuf, PathBuf)>,
    ) -> Result<StagedInstall> {
        let mut txn = StagedInstall::new(version_name, &self.layout.host.staging_dir);
        blocking(move || {
            txn.begin()?;
            for (source, target) in &copies {
                if let Err(e) = txn.stage(source, target) {
                    txn.rollback(&e.to_string())?;
                    return Err(e);
                }
            }
            Ok(txn)
        })
        .await
    }
}

async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| EngineError::Other(anyhow::anyhow!("Install task failed: {}", e)))?
}
