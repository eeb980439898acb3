use crate::core::types::ProgressReporter;
use crate::error::{EngineError, Result};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Folder macOS zip tools add next to the real content
const MACOS_METADATA_DIR: &str = "__MACOSX";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArchiveFormat {
    Zip,
    TarGz,
}

impl ArchiveFormat {
    fn detect(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".zip") {
            Some(ArchiveFormat::Zip)
        } else if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            Some(ArchiveFormat::TarGz)
        } else {
            None
        }
    }
}

/// Extract a zip or tar.gz archive into `dest_dir`.
///
/// Progress is reported by entry count. Entries written before a failure
/// are left in place. Runs on the blocking pool.
pub async fn extract_archive(
    archive: &Path,
    dest_dir: &Path,
    reporter: Arc<dyn ProgressReporter>,
) -> Result<()> {
    let archive = archive.to_path_buf();
    let dest_dir = dest_dir.to_path_buf();
    tokio::task::spawn_blocking(move || extract_archive_blocking(&archive, &dest_dir, &*reporter))
        .await
        .map_err(|e| EngineError::Other(anyhow::anyhow!("Extraction task failed: {}", e)))?
}

fn extract_archive_blocking(
    archive: &Path,
    dest_dir: &Path,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    log::debug!("Extracting {:?} to: {:?}", archive, dest_dir);
    fs::create_dir_all(dest_dir)?;

    let format = ArchiveFormat::detect(archive)
        .ok_or_else(|| extraction_error(archive, "unsupported archive format"))?;
    let count = match format {
        ArchiveFormat::Zip => extract_zip(archive, dest_dir, reporter)?,
        ArchiveFormat::TarGz => extract_tar_gz(archive, dest_dir, reporter)?,
    };

    remove_macos_metadata(dest_dir)?;
    reporter.set_fraction(1.0);
    log::debug!("Extracted {} entries from {:?}", count, archive);
    Ok(())
}

fn extract_zip(archive: &Path, dest_dir: &Path, reporter: &dyn ProgressReporter) -> Result<usize> {
    let file = fs::File::open(archive)?;
    let mut zip =
        zip::ZipArchive::new(file).map_err(|e| extraction_error(archive, &e.to_string()))?;
    let total = zip.len();

    for i in 0..total {
        let mut entry = zip
            .by_index(i)
            .map_err(|e| extraction_error(archive, &e.to_string()))?;
        let relative = entry.enclosed_name().ok_or_else(|| {
            extraction_error(
                archive,
                &format!("entry {:?} escapes the destination", entry.name()),
            )
        })?;
        let outpath = dest_dir.join(relative);

        if entry.is_dir() {
            fs::create_dir_all(&outpath)?;
        } else {
            if let Some(p) = outpath.parent() {
                if !p.exists() {
                    fs::create_dir_all(p)?;
                }
            }
            if is_symlink_mode(entry.unix_mode()) {
                let mut target = String::new();
                entry
                    .read_to_string(&mut target)
                    .map_err(|e| extraction_error(archive, &e.to_string()))?;
                write_symlink(archive, &target, &outpath)?;
                reporter.set_fraction((i + 1) as f64 / total as f64);
                continue;
            }
            let mut outfile = fs::File::create(&outpath)?;
            std::io::copy(&mut entry, &mut outfile)
                .map_err(|e| extraction_error(archive, &e.to_string()))?;
        }

        // Set permissions on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                fs::set_permissions(&outpath, fs::Permissions::from_mode(mode))?;
            }
        }

        reporter.set_fraction((i + 1) as f64 / total as f64);
    }

    Ok(total)
}

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

fn is_symlink_mode(mode: Option<u32>) -> bool {
    mode.is_some_and(|mode| mode & S_IFMT == S_IFLNK)
}

/// Recreate a symlink entry. Absolute targets are rejected.
fn write_symlink(archive: &Path, target: &str, link: &Path) -> Result<()> {
    if Path::new(target).is_absolute() {
        return Err(extraction_error(
            archive,
            &format!("link {:?} points outside the archive: {}", link, target),
        ));
    }
    if fs::symlink_metadata(link).is_ok() {
        fs::remove_file(link)?;
    }

    #[cfg(unix)]
    std::os::unix::fs::symlink(target, link)?;

    // No portable symlinks; keep the link text like other unzip tools do
    #[cfg(not(unix))]
    fs::write(link, target)?;

    Ok(())
}

fn open_tar_gz(archive: &Path) -> Result<tar::Archive<flate2::read::GzDecoder<fs::File>>> {
    let file = fs::File::open(archive)?;
    Ok(tar::Archive::new(flate2::read::GzDecoder::new(file)))
}

fn extract_tar_gz(
    archive: &Path,
    dest_dir: &Path,
    reporter: &dyn ProgressReporter,
) -> Result<usize> {
    // First pass only counts, so progress can be reported per entry
    let mut total = 0usize;
    let mut counting = open_tar_gz(archive)?;
    for entry in counting
        .entries()
        .map_err(|e| extraction_error(archive, &e.to_string()))?
    {
        entry.map_err(|e| extraction_error(archive, &e.to_string()))?;
        total += 1;
    }

    let mut unpacking = open_tar_gz(archive)?;
    unpacking.set_preserve_permissions(true);
    let entries = unpacking
        .entries()
        .map_err(|e| extraction_error(archive, &e.to_string()))?;
    for (i, entry) in entries.enumerate() {
        let mut entry = entry.map_err(|e| extraction_error(archive, &e.to_string()))?;
        let unpacked = entry
            .unpack_in(dest_dir)
            .map_err(|e| extraction_error(archive, &e.to_string()))?;
        if !unpacked {
            let name = entry
                .path()
                .map(|p| p.display().to_string())
                .unwrap_or_default();
            return Err(extraction_error(
                archive,
                &format!("entry {:?} escapes the destination", name),
            ));
        }
        reporter.set_fraction((i + 1) as f64 / total.max(1) as f64);
    }

    Ok(total)
}

/// Remove `__MACOSX` folders anywhere below `dir`
pub fn remove_macos_metadata(dir: &Path) -> Result<()> {
    let mut pending: Vec<PathBuf> = vec![dir.to_path_buf()];
    while let Some(current) = pending.pop() {
        for entry in fs::read_dir(&current)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            if entry.file_name() == MACOS_METADATA_DIR {
                log::debug!("Removing {:?}", entry.path());
                fs::remove_dir_all(entry.path())?;
            } else {
                pending.push(entry.path());
            }
        }
    }
    Ok(())
}

fn extraction_error(archive: &Path, message: &str) -> EngineError {
    EngineError::Extraction {
        archive: archive.to_path_buf(),
        message: message.to_string(),
    }
}
