use crate::core::transaction::{copy_path, remove_path};
use crate::error::{EngineError, Result};
use crate::paths::PathLayout;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

const HDIUTIL: &str = "hdiutil";
const LAUNCHER_APP_NAME: &str = "Minecraft.app";

/// Handle to a started host launcher
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchResult {
    pub pid: Option<u32>,
    pub executable: PathBuf,
}

/// Arguments that point the host launcher at its data dir and our lock dir
pub fn launch_arguments(layout: &PathLayout) -> Vec<String> {
    vec![
        "--workDir".to_string(),
        layout.host.root.to_string_lossy().into_owned(),
        "--lockDir".to_string(),
        layout.launcher_lock_dir.to_string_lossy().into_owned(),
    ]
}

/// Start the host launcher detached from this process
pub async fn launch(layout: &PathLayout) -> Result<LaunchResult> {
    let executable = layout.launcher_executable();
    if !executable.is_file() {
        return Err(EngineError::HostLauncherMissing { path: executable });
    }
    tokio::fs::create_dir_all(&layout.launcher_lock_dir).await?;

    let args = launch_arguments(layout);
    log::info!("Launching {:?} {}", executable, args.join(" "));

    let child = Command::new(&executable)
        .args(&args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map_err(|e| {
            EngineError::Other(anyhow::anyhow!("Failed to start {:?}: {}", executable, e))
        })?;

    let pid = child.id();
    log::info!("Launcher started (pid {:?})", pid);
    Ok(LaunchResult { pid, executable })
}

/// Copy the launcher application out of a disk image into the private root.
///
/// The image is attached at a private mount point, `Minecraft.app` is copied
/// over any previous copy, and the image is detached again even when the
/// copy fails.
pub async fn install_from_image(layout: &PathLayout, image: &Path) -> Result<PathBuf> {
    let mount_point = layout.data_dir.join("mnt");
    tokio::fs::create_dir_all(&mount_point).await?;

    log::info!("Mounting {:?} at {:?}", image, mount_point);
    run_hdiutil(&[
        OsStr::new("attach"),
        OsStr::new("-nobrowse"),
        OsStr::new("-readonly"),
        OsStr::new("-mountpoint"),
        mount_point.as_os_str(),
        image.as_os_str(),
    ])
    .await?;

    let copied = copy_app(&mount_point, &layout.launcher_app).await;

    log::info!("Unmounting {:?}", mount_point);
    if let Err(e) = run_hdiutil(&[OsStr::new("detach"), mount_point.as_os_str()]).await {
        log::warn!("Failed to detach {:?}: {}", mount_point, e);
    }
    copied?;

    if let Err(e) = tokio::fs::remove_dir(&mount_point).await {
        log::debug!("Leaving mount point {:?}: {}", mount_point, e);
    }
    Ok(layout.launcher_app.clone())
}

async fn copy_app(mount_point: &Path, dest: &Path) -> Result<()> {
    let source = mount_point.join(LAUNCHER_APP_NAME);
    if !source.is_dir() {
        return Err(EngineError::VolumeNotMounted {
            mount_point: mount_point.to_path_buf(),
        });
    }

    let dest = dest.to_path_buf();
    log::info!("Copying {:?} -> {:?}", source, dest);
    tokio::task::spawn_blocking(move || -> Result<()> {
        remove_path(&dest)?;
        copy_path(&source, &dest).map_err(|e| EngineError::Copy {
            from: source.clone(),
            to: dest.clone(),
            message: format!("{:#}", e),
        })
    })
    .await
    .map_err(|e| EngineError::Other(anyhow::anyhow!("Copy task failed: {}", e)))?
}

async fn run_hdiutil(args: &[&OsStr]) -> Result<()> {
    let output = Command::new(HDIUTIL)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .map_err(|e| EngineError::Other(anyhow::anyhow!("Failed to run {}: {}", HDIUTIL, e)))?;

    if !output.status.success() {
        return Err(EngineError::Other(anyhow::anyhow!(
            "{} {:?} failed: {}",
            HDIUTIL,
            args,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_arguments_use_host_root_and_lock_dir() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = PathLayout::new(tmp.path().join("data"), tmp.path().join("mc")).unwrap();
        let args = launch_arguments(&layout);

        assert_eq!(args[0], "--workDir");
        assert_eq!(args[1], tmp.path().join("mc").to_string_lossy());
        assert_eq!(args[2], "--lockDir");
        assert_eq!(args[3], tmp.path().join("data/launcher-lock").to_string_lossy());
    }

    #[tokio::test]
    async fn launch_without_app_reports_missing_launcher() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = PathLayout::new(tmp.path().join("data"), tmp.path().join("mc")).unwrap();
        let err = launch(&layout).await.unwrap_err();
        assert!(matches!(err, EngineError::HostLauncherMissing { .. }));
    }

    #[tokio::test]
    async fn empty_mount_point_is_not_mounted() {
        let tmp = tempfile::tempdir().unwrap();
        let err = copy_app(tmp.path(), &tmp.path().join("dest.app"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::VolumeNotMounted { .. }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn copies_app_bundle_over_previous_copy() {
        let tmp = tempfile::tempdir().unwrap();
        let volume = tmp.path().join("volume");
        let macos = volume.join("Minecraft.app/Contents/MacOS");
        std::fs::create_dir_all(&macos).unwrap();
        std::fs::write(macos.join("launcher"), b"new").unwrap();

        let dest = tmp.path().join("data/Minecraft.app");
        std::fs::create_dir_all(dest.join("stale")).unwrap();

        copy_app(&volume, &dest).await.unwrap();
        assert_eq!(
            std::fs::read(dest.join("Contents/MacOS/launcher")).unwrap(),
            b"new"
        );
        assert!(!dest.join("stale").exists());
    }
}
