use crate::core::ProgressReporter;
use crate::paths::{PathLayout, SUPPORTED_JAVA_MAJORS};
use std::fmt;
use std::path::PathBuf;
use tokio::sync::watch;

/// Logical name of a shared resource bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BundleKind {
    LauncherProfiles,
    Lwjgl,
    Java(u32),
}

impl BundleKind {
    /// Every bundle a complete setup needs
    pub fn all() -> Vec<BundleKind> {
        let mut kinds = vec![BundleKind::LauncherProfiles, BundleKind::Lwjgl];
        kinds.extend(SUPPORTED_JAVA_MAJORS.iter().map(|major| BundleKind::Java(*major)));
        kinds
    }

    /// File name in the remote bundle store
    pub fn archive_name(&self) -> String {
        match self {
            BundleKind::LauncherProfiles => "mcl_profiles.zip".to_string(),
            BundleKind::Lwjgl => "lwjgl.zip".to_string(),
            BundleKind::Java(major) => format!("java-{}.zip", major),
        }
    }

    /// Local extraction root
    pub fn root(&self, layout: &PathLayout) -> Option<PathBuf> {
        match self {
            BundleKind::LauncherProfiles => Some(layout.profiles_bundle_dir.clone()),
            BundleKind::Lwjgl => Some(layout.lwjgl_bundle_dir.clone()),
            BundleKind::Java(major) => layout.java_bundle_dir(*major).cloned(),
        }
    }
}

impl fmt::Display for BundleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BundleKind::LauncherProfiles => write!(f, "Minecraft profiles"),
            BundleKind::Lwjgl => write!(f, "LWJGL"),
            BundleKind::Java(major) => write!(f, "Java {}", major),
        }
    }
}

/// One bundle plus its progress cell
#[derive(Debug)]
pub struct ResourceBundle {
    pub kind: BundleKind,
    pub archive_name: String,
    pub root: PathBuf,
    progress: watch::Sender<f64>,
}

impl ResourceBundle {
    pub fn new(kind: BundleKind, root: PathBuf) -> Self {
        let (progress, _) = watch::channel(0.0);
        Self {
            archive_name: kind.archive_name(),
            kind,
            root,
            progress,
        }
    }

    pub fn progress(&self) -> f64 {
        *self.progress.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<f64> {
        self.progress.subscribe()
    }

    pub(crate) fn reset_progress(&self) {
        self.progress.send_replace(0.0);
    }

    pub(crate) fn reporter(&self, cancel: crate::core::CancelToken) -> BundleProgress {
        BundleProgress {
            tx: self.progress.clone(),
            cancel,
        }
    }
}

/// Writes into a bundle's progress cell, never moving it backwards
pub(crate) struct BundleProgress {
    tx: watch::Sender<f64>,
    cancel: crate::core::CancelToken,
}

impl ProgressReporter for BundleProgress {
    fn set_fraction(&self, fraction: f64) {
        let fraction = fraction.clamp(0.0, 1.0);
        self.tx.send_if_modified(|current| {
            if fraction > *current {
                *current = fraction;
                true
            } else {
                false
            }
        });
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::CancelToken;

    #[test]
    fn archive_names_and_roots() {
        let tmp = tempfile::tempdir().unwrap();
        let layout = PathLayout::new(tmp.path().join("data"), tmp.path().join("mc")).unwrap();

        let kinds = BundleKind::all();
        assert_eq!(kinds.len(), 4);
        assert_eq!(BundleKind::Java(17).archive_name(), "java-17.zip");
        assert_eq!(
            BundleKind::LauncherProfiles.root(&layout),
            Some(tmp.path().join("data/mcl_profiles"))
        );
        assert_eq!(
            BundleKind::Java(8).root(&layout),
            Some(tmp.path().join("data/java-8"))
        );
        assert_eq!(BundleKind::Java(11).root(&layout), None);
    }

    #[test]
    fn progress_cell_is_monotonic() {
        let bundle = ResourceBundle::new(BundleKind::Lwjgl, PathBuf::from("/tmp/lwjgl"));
        let rx = bundle.subscribe();
        let reporter = bundle.reporter(CancelToken::never());

        reporter.set_fraction(0.4);
        reporter.set_fraction(0.2);
        assert_eq!(*rx.borrow(), 0.4);
        reporter.set_fraction(3.0);
        assert_eq!(bundle.progress(), 1.0);

        bundle.reset_progress();
        assert_eq!(bundle.progress(), 0.0);
    }
}
