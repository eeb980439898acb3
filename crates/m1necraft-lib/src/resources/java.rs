//! Java runtime bundles: locating the runtime inside an extracted bundle and
//! making its binaries executable.

use crate::error::{EngineError, Result};
use std::path::{Path, PathBuf};

/// Layouts of the runtimes shipped in the Java bundles, relative to the runtime dir
const JAVA_EXECUTABLE_LAYOUTS: [&str; 2] = ["Contents/Home/bin/java", "bin/java"];

/// Java executable inside a runtime directory
pub fn find_java_executable(runtime_dir: &Path) -> Option<PathBuf> {
    JAVA_EXECUTABLE_LAYOUTS
        .iter()
        .map(|layout| runtime_dir.join(layout))
        .find(|exe| exe.is_file())
}

/// The single runtime directory an extracted Java bundle must contain
pub fn locate_runtime_dir(bundle_root: &Path) -> Result<PathBuf> {
    let mut found = Vec::new();
    for entry in std::fs::read_dir(bundle_root)? {
        let entry = entry?;
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        if entry.file_type()?.is_dir() && !hidden {
            found.push(entry.path());
        }
    }

    if found.len() != 1 {
        return Err(EngineError::GlobMismatch {
            dir: bundle_root.to_path_buf(),
            expected: "exactly one Java runtime directory".to_string(),
            found: found.len(),
        });
    }
    Ok(found.remove(0))
}

/// Path of the java binary relative to its runtime directory
pub fn relative_java_executable(runtime_dir: &Path) -> Option<PathBuf> {
    let exe = find_java_executable(runtime_dir)?;
    exe.strip_prefix(runtime_dir).ok().map(Path::to_path_buf)
}

/// Set 0o755 on every file in the runtime's `bin` directory
pub fn mark_binaries_executable(runtime_dir: &Path) -> Result<usize> {
    let bin_dir = find_java_executable(runtime_dir)
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
        .ok_or_else(|| EngineError::GlobMismatch {
            dir: runtime_dir.to_path_buf(),
            expected: "a bin/java executable".to_string(),
            found: 0,
        })?;

    let mut marked = 0;
    for entry in std::fs::read_dir(&bin_dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(entry.path(), std::fs::Permissions::from_mode(0o755))?;
        }
        marked += 1;
    }
    log::debug!("Marked {} binaries executable in {:?}", marked, bin_dir);
    Ok(marked)
}
