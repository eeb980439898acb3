use std::path::PathBuf;

/// Errors surfaced by the engine to its host
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The private data root could not be established. The process cannot continue.
    #[error("Could not initialize data directory {path:?}: {source}")]
    PathInit {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Expected {expected} in {dir:?}, found {found}")]
    GlobMismatch {
        dir: PathBuf,
        expected: String,
        found: usize,
    },

    #[error("Volume is not mounted at {mount_point:?}")]
    VolumeNotMounted { mount_point: PathBuf },

    #[error("Failed to extract {archive:?}: {message}")]
    Extraction { archive: PathBuf, message: String },

    #[error("Failed to download {url}: {message}")]
    Fetch { url: String, message: String },

    #[error("Download cancelled: {url}")]
    Cancelled { url: String },

    #[error("Setup failed: {0}")]
    SetupFailure(#[source] Box<EngineError>),

    #[error("Could not decode launcher profiles {path:?}: {source}")]
    ProfileDecode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Launcher profiles {path:?} changed while being updated")]
    ProfileConflict { path: PathBuf },

    #[error("Minecraft Launcher not found at {path:?}")]
    HostLauncherMissing { path: PathBuf },

    #[error("Unknown game version: {0}")]
    UnknownVersion(String),

    #[error("Copying {from:?} -> {to:?} failed: {message}")]
    Copy {
        from: PathBuf,
        to: PathBuf,
        message: String,
    },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl EngineError {
    pub fn setup(cause: EngineError) -> Self {
        match cause {
            EngineError::SetupFailure(_) => cause,
            other => EngineError::SetupFailure(Box::new(other)),
        }
    }

    /// Whether the host should offer a retry for this failure
    pub fn is_retryable(&self) -> bool {
        match self {
            EngineError::PathInit { .. } => false,
            EngineError::SetupFailure(inner) => inner.is_retryable(),
            EngineError::GlobMismatch { .. }
            | EngineError::VolumeNotMounted { .. }
            | EngineError::Extraction { .. }
            | EngineError::Fetch { .. }
            | EngineError::Cancelled { .. }
            | EngineError::ProfileConflict { .. }
            | EngineError::HostLauncherMissing { .. } => true,
            EngineError::ProfileDecode { .. }
            | EngineError::UnknownVersion(_)
            | EngineError::Copy { .. }
            | EngineError::Io(_)
            | EngineError::Other(_) => false,
        }
    }

    /// Whether the process has to quit
    pub fn is_fatal(&self) -> bool {
        matches!(self, EngineError::PathInit { .. })
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
