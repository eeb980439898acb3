use crate::error::{EngineError, Result};
use anyhow::Context;
use std::fs;
use std::path::{Path, PathBuf};

struct StagedItem {
    source: PathBuf,
    target: PathBuf,
    staged: PathBuf,
    backup: PathBuf,
    swapped: bool,
}

/// StagedInstall copies every source into a scratch area first and only
/// touches the targets once all copies succeeded.
///
/// Targets are replaced, never merged: an existing target is moved into a
/// backup during `swap` and restored by `rollback`.
pub struct StagedInstall {
    label: String,
    root: PathBuf,
    staged_dir: PathBuf,
    backup_dir: PathBuf,
    items: Vec<StagedItem>,
}

impl StagedInstall {
    /// `staging_root` must be on the same volume as the targets
    pub fn new(label: &str, staging_root: &Path) -> Self {
        let root = staging_root.join(label);
        Self {
            label: label.to_string(),
            staged_dir: root.join("staged"),
            backup_dir: root.join("backup"),
            root,
            items: Vec::new(),
        }
    }

    pub fn begin(&self) -> Result<()> {
        if self.root.exists() {
            log::warn!("[txn:{}] removing stale staging area {:?}", self.label, self.root);
            fs::remove_dir_all(&self.root)
                .with_context(|| format!("Remove stale staging area {:?}", self.root))?;
        }
        fs::create_dir_all(&self.staged_dir)
            .with_context(|| format!("Create staging dir {:?}", self.staged_dir))?;
        fs::create_dir_all(&self.backup_dir)
            .with_context(|| format!("Create backup dir {:?}", self.backup_dir))?;
        log::info!("[txn:{}] begin", self.label);
        Ok(())
    }

    /// Copy `source` (file or directory) into the staging area, to be placed at `target`
    pub fn stage(&mut self, source: &Path, target: &Path) -> Result<()> {
        let slot = format!(
            "{}-{}",
            self.items.len(),
            target
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("item")
        );
        let staged = self.staged_dir.join(&slot);
        let backup = self.backup_dir.join(&slot);

        log::debug!("[txn:{}] staging {:?} -> {:?}", self.label, source, target);
        copy_path(source, &staged).map_err(|e| EngineError::Copy {
            from: source.to_path_buf(),
            to: target.to_path_buf(),
            message: format!("{:#}", e),
        })?;

        self.items.push(StagedItem {
            source: source.to_path_buf(),
            target: target.to_path_buf(),
            staged,
            backup,
            swapped: false,
        });
        Ok(())
    }

    /// Move every staged copy into place. A failure part-way restores the
    /// targets already swapped before returning the error.
    pub fn swap(&mut self) -> Result<()> {
        for i in 0..self.items.len() {
            if let Err(e) = swap_item(&mut self.items[i]) {
                let item = &self.items[i];
                let err = EngineError::Copy {
                    from: item.source.clone(),
                    to: item.target.clone(),
                    message: format!("{:#}", e),
                };
                self.rollback(&err.to_string())?;
                return Err(err);
            }
        }
        log::debug!("[txn:{}] swapped {} targets", self.label, self.items.len());
        Ok(())
    }

    pub fn commit(&self) -> Result<()> {
        if self.root.exists() {
            fs::remove_dir_all(&self.root)
                .with_context(|| format!("Remove staging area {:?}", self.root))?;
        }
        remove_if_empty(self.root.parent());
        log::info!("[txn:{}] commit", self.label);
        Ok(())
    }

    pub fn rollback(&mut self, reason: &str) -> Result<()> {
        log::warn!("[txn:{}] rollback: {}", self.label, reason);
        for item in self.items.iter_mut().rev().filter(|item| item.swapped) {
            remove_path(&item.target)
                .with_context(|| format!("Remove failed install {:?}", item.target))?;
            if item.backup.exists() {
                move_dir(&item.backup, &item.target).with_context(|| {
                    format!(
                        "Restore from backup {:?} -> {:?}",
                        item.backup, item.target
                    )
                })?;
            }
            item.swapped = false;
        }
        if self.root.exists() {
            fs::remove_dir_all(&self.root)
                .with_context(|| format!("Clean staging area {:?}", self.root))?;
        }
        remove_if_empty(self.root.parent());
        Ok(())
    }
}

fn swap_item(item: &mut StagedItem) -> anyhow::Result<()> {
    if let Some(parent) = item.target.parent() {
        fs::create_dir_all(parent).with_context(|| format!("Create target parent {:?}", parent))?;
    }
    if fs::symlink_metadata(&item.target).is_ok() {
        move_dir(&item.target, &item.backup).with_context(|| {
            format!(
                "Move existing target into backup {:?} -> {:?}",
                item.target, item.backup
            )
        })?;
    }
    // Marked before the rename so a failed rename still restores the backup
    item.swapped = true;
    move_dir(&item.staged, &item.target)
        .with_context(|| format!("Move staged copy into {:?}", item.target))?;
    Ok(())
}

fn remove_if_empty(dir: Option<&Path>) {
    if let Some(dir) = dir {
        // Fails harmlessly while other installs still use the directory
        let _ = fs::remove_dir(dir);
    }
}

/// Remove a file, symlink or directory tree; missing paths are fine
pub fn remove_path(path: &Path) -> std::io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Copy a file or a directory tree to `dest`
pub fn copy_path(src: &Path, dest: &Path) -> anyhow::Result<()> {
    let meta = fs::symlink_metadata(src).with_context(|| format!("Stat source {:?}", src))?;
    if meta.is_dir() {
        copy_dir_recursive(src, dest)
    } else {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Create copy dest parent {:?}", parent))?;
        }
        fs::copy(src, dest).with_context(|| format!("Copy file {:?} -> {:?}", src, dest))?;
        Ok(())
    }
}

pub fn move_dir(src: &Path, dest: &Path) -> anyhow::Result<()> {
    match fs::rename(src, dest) {
        Ok(_) => Ok(()),
        Err(err) if is_cross_device_link(&err) => {
            copy_path(src, dest)?;
            remove_path(src).with_context(|| format!("Remove source {:?}", src))?;
            Ok(())
        }
        Err(err) => Err(err).with_context(|| format!("Move {:?} -> {:?}", src, dest)),
    }
}

fn copy_dir_recursive(src: &Path, dest: &Path) -> anyhow::Result<()> {
    fs::create_dir_all(dest).with_context(|| format!("Create copy dest {:?}", dest))?;
    for entry in fs::read_dir(src).with_context(|| format!("Read dir {:?}", src))? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let target_path = dest.join(entry.file_name());
        if file_type.is_dir() {
            copy_dir_recursive(&entry.path(), &target_path)?;
        } else if file_type.is_symlink() {
            copy_symlink(&entry.path(), &target_path)?;
        } else {
            fs::copy(entry.path(), &target_path)
                .with_context(|| format!("Copy file {:?} -> {:?}", entry.path(), target_path))?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dest: &Path) -> anyhow::Result<()> {
    let link = fs::read_link(src).with_context(|| format!("Read link {:?}", src))?;
    std::os::unix::fs::symlink(&link, dest)
        .with_context(|| format!("Create link {:?} -> {:?}", dest, link))?;
    Ok(())
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dest: &Path) -> anyhow::Result<()> {
    fs::copy(src, dest).with_context(|| format!("Copy file {:?} -> {:?}", src, dest))?;
    Ok(())
}

fn is_cross_device_link(err: &std::io::Error) -> bool {
    #[cfg(target_family = "unix")]
    {
        // EXDEV
        err.raw_os_error() == Some(18)
    }

    #[cfg(not(target_family = "unix"))]
    {
        let _ = err;
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixture {
        _tmp: tempfile::TempDir,
        src: PathBuf,
        host: PathBuf,
    }

    fn fixture() -> Fixture {
        let tmp = tempfile::tempdir().unwrap();
        let src = tmp.path().join("src");
        let host = tmp.path().join("host");
        fs::create_dir_all(src.join("natives/sub")).unwrap();
        fs::write(src.join("natives/sub/lib.dylib"), b"new-native").unwrap();
        fs::write(src.join("fat.jar"), b"new-jar").unwrap();
        fs::create_dir_all(host.join("libraries/natives")).unwrap();
        fs::write(host.join("libraries/natives/old.dylib"), b"old").unwrap();
        Fixture {
            _tmp: tmp,
            src,
            host,
        }
    }

    #[test]
    fn swap_replaces_instead_of_merging() {
        let f = fixture();
        let mut txn = StagedInstall::new("1.16.5", &f.host.join(".staging"));
        txn.begin().unwrap();
        txn.stage(&f.src.join("natives"), &f.host.join("libraries/natives"))
            .unwrap();
        txn.stage(&f.src.join("fat.jar"), &f.host.join("libraries/fat.jar"))
            .unwrap();
        txn.swap().unwrap();
        txn.commit().unwrap();

        assert!(!f.host.join("libraries/natives/old.dylib").exists());
        assert_eq!(
            fs::read(f.host.join("libraries/natives/sub/lib.dylib")).unwrap(),
            b"new-native"
        );
        assert_eq!(fs::read(f.host.join("libraries/fat.jar")).unwrap(), b"new-jar");
        assert!(!f.host.join(".staging").exists());
    }

    #[test]
    fn failed_stage_leaves_targets_untouched() {
        let f = fixture();
        let mut txn = StagedInstall::new("1.16.5", &f.host.join(".staging"));
        txn.begin().unwrap();
        txn.stage(&f.src.join("natives"), &f.host.join("libraries/natives"))
            .unwrap();
        let err = txn
            .stage(&f.src.join("missing"), &f.host.join("runtime/java"))
            .unwrap_err();
        assert!(matches!(err, EngineError::Copy { .. }));
        txn.rollback("copy failed").unwrap();

        assert_eq!(
            fs::read(f.host.join("libraries/natives/old.dylib")).unwrap(),
            b"old"
        );
        assert!(!f.host.join("runtime").exists());
        assert!(!f.host.join(".staging").exists());
    }

    #[test]
    fn rollback_after_swap_restores_previous_targets() {
        let f = fixture();
        let mut txn = StagedInstall::new("1.16.5", &f.host.join(".staging"));
        txn.begin().unwrap();
        txn.stage(&f.src.join("natives"), &f.host.join("libraries/natives"))
            .unwrap();
        txn.stage(&f.src.join("fat.jar"), &f.host.join("libraries/fat.jar"))
            .unwrap();
        txn.swap().unwrap();
        txn.rollback("profile step failed").unwrap();

        assert_eq!(
            fs::read(f.host.join("libraries/natives/old.dylib")).unwrap(),
            b"old"
        );
        assert!(!f.host.join("libraries/natives/sub").exists());
        assert!(!f.host.join("libraries/fat.jar").exists());
    }

    #[test]
    fn remove_path_handles_files_dirs_and_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.txt");
        let dir = tmp.path().join("d/e");
        fs::write(&file, b"x").unwrap();
        fs::create_dir_all(&dir).unwrap();

        remove_path(&file).unwrap();
        remove_path(&tmp.path().join("d")).unwrap();
        remove_path(&tmp.path().join("nope")).unwrap();
        assert!(!file.exists());
        assert!(!tmp.path().join("d").exists());
    }
}
