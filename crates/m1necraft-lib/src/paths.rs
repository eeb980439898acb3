//! Fixed directory layout of the engine's private data area and of the
//! Minecraft Launcher installation it patches.
//!
//! Every path here is computed, never discovered. A missing launcher
//! installation shows up as a failed existence check rather than as an I/O
//! error deep inside an install.

use crate::error::{EngineError, Result};
use directories::BaseDirs;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Directory name of the private data root inside the OS data directory
pub const APP_DIR_NAME: &str = "com.raphtlw.m1necraft";

/// Java runtimes shipped as resource bundles
pub const SUPPORTED_JAVA_MAJORS: [u32; 2] = [8, 17];

/// Suffix of every version directory this engine installs
pub const VERSION_DIR_SUFFIX: &str = "-arm";

/// Prefix of runtime directories this engine owns inside the launcher tree
pub const RUNTIME_DIR_PREFIX: &str = "m1necraft-java-";

const SETTINGS_FILENAME: &str = "settings.json";
const LAUNCHER_PROFILES_FILENAME: &str = "launcher_profiles.json";
const LWJGL_NATIVES_DIRNAME: &str = "lwjglnatives";
const LWJGL_JAR_FILENAME: &str = "lwjglfat.jar";

/// Paths inside the Minecraft Launcher's own data directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostLayout {
    pub root: PathBuf,
    pub launcher_profiles: PathBuf,
    pub versions_dir: PathBuf,
    pub libraries_dir: PathBuf,
    pub runtime_dir: PathBuf,
    pub lwjgl_natives_dir: PathBuf,
    pub lwjgl_jar: PathBuf,
    /// Scratch area for all-or-nothing installs; lives on the same volume as
    /// the targets so the final swap is a rename.
    pub staging_dir: PathBuf,
    jre_dirs: BTreeMap<u32, PathBuf>,
}

impl HostLayout {
    pub fn new(root: PathBuf) -> Self {
        let libraries_dir = root.join("libraries");
        let runtime_dir = root.join("runtime");
        let jre_dirs = SUPPORTED_JAVA_MAJORS
            .iter()
            .map(|major| (*major, runtime_dir.join(format!("{RUNTIME_DIR_PREFIX}{major}"))))
            .collect();

        Self {
            launcher_profiles: root.join(LAUNCHER_PROFILES_FILENAME),
            versions_dir: root.join("versions"),
            lwjgl_natives_dir: libraries_dir.join(LWJGL_NATIVES_DIRNAME),
            lwjgl_jar: libraries_dir.join(LWJGL_JAR_FILENAME),
            staging_dir: root.join(".m1necraft-staging"),
            libraries_dir,
            runtime_dir,
            jre_dirs,
            root,
        }
    }

    /// Runtime root for a Java major version, if that major is supported
    pub fn jre_dir(&self, major: u32) -> Option<&PathBuf> {
        self.jre_dirs.get(&major)
    }

    /// Directory the launcher reads a version from
    pub fn version_dir(&self, version_name: &str) -> PathBuf {
        self.versions_dir
            .join(format!("{version_name}{VERSION_DIR_SUFFIX}"))
    }

    /// True when the launcher has been run at least once
    pub fn required_exists(&self) -> bool {
        self.root.is_dir() && self.launcher_profiles.is_file() && self.versions_dir.is_dir()
    }
}

/// Computed once per process, then shared read-only
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathLayout {
    pub data_dir: PathBuf,
    pub settings_file: PathBuf,
    pub downloads_dir: PathBuf,

    pub profiles_bundle_dir: PathBuf,
    pub lwjgl_bundle_dir: PathBuf,
    pub res_lwjgl_natives_dir: PathBuf,
    pub res_lwjgl_jar: PathBuf,
    java_bundle_dirs: BTreeMap<u32, PathBuf>,

    pub launcher_app: PathBuf,
    pub launcher_lock_dir: PathBuf,

    pub host: HostLayout,
}

impl PathLayout {
    /// Build the layout and make sure the private root exists.
    ///
    /// The root is created non-recursively: a missing parent means the OS
    /// data directory itself is absent, which is reported as `PathInit`.
    pub fn new(data_dir: PathBuf, host_root: PathBuf) -> Result<Self> {
        let layout = Self::compute(data_dir, host_root);
        layout.ensure_data_dir()?;
        log::debug!("Data directory: {:?}", layout.data_dir);
        log::debug!("Minecraft directory: {:?}", layout.host.root);
        Ok(layout)
    }

    /// Resolve the OS data directory and the launcher's default location
    pub fn from_system() -> Result<Self> {
        Self::resolve(None, None)
    }

    /// Like `from_system`, with either root replaced by an explicit path
    pub fn resolve(data_dir: Option<PathBuf>, host_root: Option<PathBuf>) -> Result<Self> {
        if let (Some(data_dir), Some(host_root)) = (&data_dir, &host_root) {
            return Self::new(data_dir.clone(), host_root.clone());
        }

        let base_dirs = BaseDirs::new().ok_or_else(|| EngineError::PathInit {
            path: PathBuf::from("~"),
            source: std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "Failed to determine user's home directory",
            ),
        })?;

        let data_dir = data_dir.unwrap_or_else(|| base_dirs.data_dir().join(APP_DIR_NAME));
        let host_root = host_root.unwrap_or_else(|| default_minecraft_dir(&base_dirs));
        Self::new(data_dir, host_root)
    }

    fn compute(data_dir: PathBuf, host_root: PathBuf) -> Self {
        let lwjgl_bundle_dir = data_dir.join("lwjgl");
        let java_bundle_dirs = SUPPORTED_JAVA_MAJORS
            .iter()
            .map(|major| (*major, data_dir.join(format!("java-{major}"))))
            .collect();

        Self {
            settings_file: data_dir.join(SETTINGS_FILENAME),
            downloads_dir: data_dir.join("downloads"),
            profiles_bundle_dir: data_dir.join("mcl_profiles"),
            res_lwjgl_natives_dir: lwjgl_bundle_dir.join(LWJGL_NATIVES_DIRNAME),
            res_lwjgl_jar: lwjgl_bundle_dir.join(LWJGL_JAR_FILENAME),
            lwjgl_bundle_dir,
            java_bundle_dirs,
            launcher_app: data_dir.join("Minecraft.app"),
            launcher_lock_dir: data_dir.join("launcher-lock"),
            host: HostLayout::new(host_root),
            data_dir,
        }
    }

    fn ensure_data_dir(&self) -> Result<()> {
        if self.data_dir.is_dir() {
            return Ok(());
        }
        log::debug!("Data directory does not exist, creating...");
        std::fs::create_dir(&self.data_dir).map_err(|source| EngineError::PathInit {
            path: self.data_dir.clone(),
            source,
        })
    }

    /// Extraction root of a Java runtime bundle
    pub fn java_bundle_dir(&self, major: u32) -> Option<&PathBuf> {
        self.java_bundle_dirs.get(&major)
    }

    /// Bundled launcher profile template for a version
    pub fn profile_template_dir(&self, version_name: &str) -> PathBuf {
        self.profiles_bundle_dir
            .join(format!("{version_name}{VERSION_DIR_SUFFIX}"))
    }

    /// Executable inside the launcher application bundle
    pub fn launcher_executable(&self) -> PathBuf {
        self.launcher_app.join("Contents").join("MacOS").join("launcher")
    }

    /// Delete the private root entirely and recreate it empty
    pub fn reset_root(&self) -> Result<()> {
        match std::fs::remove_dir_all(&self.data_dir) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        log::info!("Reset data directory {:?}", self.data_dir);
        self.ensure_data_dir()
    }
}

fn default_minecraft_dir(base_dirs: &BaseDirs) -> PathBuf {
    if cfg!(target_os = "macos") {
        base_dirs.data_dir().join("minecraft")
    } else if cfg!(windows) {
        base_dirs.data_dir().join(".minecraft")
    } else {
        base_dirs.home_dir().join(".minecraft")
    }
}

/// Strip the `-arm` suffix from a directory name
pub fn version_name_from_dir(dir_name: &str) -> Option<&str> {
    dir_name
        .strip_suffix(VERSION_DIR_SUFFIX)
        .filter(|name| !name.is_empty())
}
