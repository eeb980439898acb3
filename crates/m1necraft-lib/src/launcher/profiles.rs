//! Read-modify-write of the host launcher's `launcher_profiles.json`.
//!
//! Only keys starting with [`PROFILE_KEY_PREFIX`] are ever created or
//! removed. Profile entries are kept as raw JSON, so foreign entries and
//! every field this crate does not model round-trip in their original order.

use crate::error::{EngineError, Result};
use crate::paths::{version_name_from_dir, HostLayout, VERSION_DIR_SUFFIX};
use chrono::{Local, SecondsFormat};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha1::{Digest, Sha1};
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

pub const PROFILE_KEY_PREFIX: &str = "m1necraft-";
pub const PROFILE_NAME: &str = "M1necraft";
pub const PROFILE_ICON: &str = "Grass";
pub const PROFILE_TYPE: &str = "custom";
pub const PROFILE_SCHEMA_VERSION: i64 = 3;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LauncherProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_version_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub profile_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub java_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_used: Option<String>,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

impl LauncherProfile {
    /// Profile entry pointing the launcher at an installed `-arm` version
    pub fn for_version(version_name: &str, java_executable: &Path) -> Self {
        Self {
            created: Some(Local::now().to_rfc3339_opts(SecondsFormat::Millis, false)),
            icon: Some(PROFILE_ICON.to_string()),
            last_version_id: Some(format!("{version_name}{VERSION_DIR_SUFFIX}")),
            name: Some(PROFILE_NAME.to_string()),
            profile_type: Some(PROFILE_TYPE.to_string()),
            java_dir: Some(java_executable.to_string_lossy().into_owned()),
            last_used: None,
            extra: IndexMap::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LauncherProfileFile {
    #[serde(default)]
    pub profiles: IndexMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settings: Option<Value>,
    #[serde(default = "default_schema_version")]
    pub version: i64,
    #[serde(flatten)]
    pub extra: IndexMap<String, Value>,
}

fn default_schema_version() -> i64 {
    PROFILE_SCHEMA_VERSION
}

impl Default for LauncherProfileFile {
    fn default() -> Self {
        Self {
            profiles: IndexMap::new(),
            settings: None,
            version: PROFILE_SCHEMA_VERSION,
            extra: IndexMap::new(),
        }
    }
}

impl LauncherProfileFile {
    pub fn owned_keys(&self) -> impl Iterator<Item = &String> {
        self.profiles
            .keys()
            .filter(|key| key.starts_with(PROFILE_KEY_PREFIX))
    }

    /// Typed view of one entry; `None` when absent or not an object
    pub fn profile(&self, key: &str) -> Option<LauncherProfile> {
        let entry = self.profiles.get(key)?;
        serde_json::from_value(entry.clone()).ok()
    }

    /// Version names of the owned profiles, from `lastVersionId` or else the key
    pub fn owned_version_names(&self) -> Vec<String> {
        self.owned_keys()
            .filter_map(|key| {
                let from_last_version = self
                    .profile(key)
                    .and_then(|p| p.last_version_id)
                    .and_then(|id| version_name_from_dir(&id).map(str::to_string));
                from_last_version.or_else(|| {
                    key.strip_prefix(PROFILE_KEY_PREFIX)
                        .filter(|name| !name.is_empty())
                        .map(str::to_string)
                })
            })
            .collect()
    }
}

pub fn profile_key(version_name: &str) -> String {
    format!("{PROFILE_KEY_PREFIX}{version_name}")
}

/// Create versions/, libraries/, runtime/ and an empty profile document when absent
pub async fn ensure_host_skeleton(host: &HostLayout) -> Result<()> {
    use tokio::io::AsyncWriteExt;

    for dir in [&host.versions_dir, &host.libraries_dir, &host.runtime_dir] {
        tokio::fs::create_dir_all(dir).await?;
    }
    if host.launcher_profiles.exists() {
        return Ok(());
    }

    let json = serde_json::to_vec_pretty(&LauncherProfileFile::default())
        .map_err(|e| EngineError::Other(e.into()))?;
    // create_new: a concurrent install may have written profiles in the meantime
    let mut file = match tokio::fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(&host.launcher_profiles)
        .await
    {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(()),
        Err(e) => return Err(e.into()),
    };
    log::info!("Creating default launcher profiles at {:?}", host.launcher_profiles);
    file.write_all(&json).await?;
    file.flush().await?;
    Ok(())
}

/// Single writer of the profile file within this process
#[derive(Debug)]
pub struct ProfilePatcher {
    path: PathBuf,
    lock: Mutex<()>,
}

impl ProfilePatcher {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn read(&self) -> Result<Option<LauncherProfileFile>> {
        let _held = self.lock.lock().await;
        Ok(self.load().await?.map(|(doc, _)| doc))
    }

    /// Insert the profile for a version. An existing key is left alone.
    /// Returns whether a profile was added.
    pub async fn add_profile(&self, version_name: &str, java_executable: &Path) -> Result<bool> {
        let key = profile_key(version_name);
        let entry = serde_json::to_value(LauncherProfile::for_version(version_name, java_executable))
            .map_err(|e| EngineError::Other(e.into()))?;
        let added = self
            .modify(|doc| {
                if doc.profiles.contains_key(&key) {
                    log::debug!("Launcher profile {} already present", key);
                    return false;
                }
                doc.profiles.insert(key.clone(), entry);
                true
            })
            .await?;

        match added {
            Some(added) => {
                if added {
                    log::info!("Added launcher profile {}", key);
                }
                Ok(added)
            }
            None => Err(EngineError::HostLauncherMissing {
                path: self.path.clone(),
            }),
        }
    }

    /// Drop every profile this engine created. A missing file is a no-op.
    pub async fn remove_owned_profiles(&self) -> Result<usize> {
        let removed = self
            .modify(|doc| {
                let before = doc.profiles.len();
                doc.profiles
                    .retain(|key, _| !key.starts_with(PROFILE_KEY_PREFIX));
                before - doc.profiles.len()
            })
            .await?
            .unwrap_or(0);
        if removed > 0 {
            log::info!("Removed {} launcher profiles", removed);
        }
        Ok(removed)
    }

    /// Drop the profile of one version
    pub async fn remove_profile(&self, version_name: &str) -> Result<bool> {
        let key = profile_key(version_name);
        Ok(self
            .modify(|doc| doc.profiles.shift_remove(&key).is_some())
            .await?
            .unwrap_or(false))
    }

    /// Apply `change` under the lock. The returned value tells whether the
    /// document changed; `None` means the file does not exist.
    async fn modify<R, F>(&self, change: F) -> Result<Option<R>>
    where
        R: Changed,
        F: FnOnce(&mut LauncherProfileFile) -> R,
    {
        let _held = self.lock.lock().await;
        let Some((mut doc, digest)) = self.load().await? else {
            return Ok(None);
        };

        let outcome = change(&mut doc);
        if outcome.changed() {
            self.store(&doc, &digest).await?;
        }
        Ok(Some(outcome))
    }

    async fn load(&self) -> Result<Option<(LauncherProfileFile, Vec<u8>)>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let doc = serde_json::from_slice(&bytes).map_err(|source| EngineError::ProfileDecode {
            path: self.path.clone(),
            source,
        })?;
        Ok(Some((doc, digest(&bytes))))
    }

    async fn store(&self, doc: &LauncherProfileFile, read_digest: &[u8]) -> Result<()> {
        let json = serde_json::to_vec_pretty(doc).map_err(|e| EngineError::Other(e.into()))?;

        // The host launcher may have rewritten the file since it was read
        let current = match tokio::fs::read(&self.path).await {
            Ok(bytes) => Some(digest(&bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };
        if current.as_deref() != Some(read_digest) {
            log::warn!("Launcher profiles changed on disk during update: {:?}", self.path);
            return Err(EngineError::ProfileConflict {
                path: self.path.clone(),
            });
        }

        let path = self.path.clone();
        tokio::task::spawn_blocking(move || write_replace(&path, &json))
            .await
            .map_err(|e| EngineError::Other(anyhow::anyhow!("Profile write task failed: {}", e)))??;
        log::debug!("Wrote launcher profiles {:?}", self.path);
        Ok(())
    }
}

fn digest(bytes: &[u8]) -> Vec<u8> {
    Sha1::digest(bytes).to_vec()
}

/// Write to a sibling temp file and rename it over `path`
fn write_replace(path: &Path, contents: &[u8]) -> Result<()> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".launcher_profiles")
        .suffix(".tmp")
        .tempfile_in(dir)?;
    tmp.write_all(contents)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| EngineError::Io(e.error))?;
    Ok(())
}

trait Changed {
    fn changed(&self) -> bool;
}

impl Changed for bool {
    fn changed(&self) -> bool {
        *self
    }
}

impl Changed for usize {
    fn changed(&self) -> bool {
        *self > 0
    }
}
