use std::cmp::Ordering;
use std::fmt;
use std::path::PathBuf;

/// Step of an in-flight install, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InstallStep {
    Starting,
    Copying,
    AddingProfile,
    Finishing,
}

impl InstallStep {
    pub const COUNT: u32 = 4;
    pub const ALL: [InstallStep; 4] = [
        InstallStep::Starting,
        InstallStep::Copying,
        InstallStep::AddingProfile,
        InstallStep::Finishing,
    ];

    /// 1-based position
    pub fn number(&self) -> u32 {
        match self {
            InstallStep::Starting => 1,
            InstallStep::Copying => 2,
            InstallStep::AddingProfile => 3,
            InstallStep::Finishing => 4,
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            InstallStep::Starting => "Starting",
            InstallStep::Copying => "Copying files",
            InstallStep::AddingProfile => "Adding launcher profile",
            InstallStep::Finishing => "Finishing",
        }
    }
}

impl fmt::Display for InstallStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}/{}) {}", self.number(), Self::COUNT, self.message())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallState {
    NotInstalled,
    Installing(InstallStep),
    Installed(PathBuf),
}

impl InstallState {
    pub fn is_installed(&self) -> bool {
        matches!(self, InstallState::Installed(_))
    }
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InstallState::NotInstalled => write!(f, "not installed"),
            InstallState::Installing(step) => write!(f, "installing {}", step),
            InstallState::Installed(path) => write!(f, "installed at {}", path.display()),
        }
    }
}

/// How an `install` call ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    Installed(PathBuf),
    AlreadyInstalled(PathBuf),
    /// Another call is installing this version right now
    AlreadyInProgress,
}

/// A game version this engine can patch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameVersion {
    pub name: String,
    pub state: InstallState,
}

impl GameVersion {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: InstallState::NotInstalled,
        }
    }

    pub fn java_major(&self) -> u32 {
        java_major_for(&self.name)
    }
}

/// Java runtime major for a `1.<minor>[.<patch>]` version name
pub fn java_major_for(version_name: &str) -> u32 {
    match version_name
        .split('.')
        .nth(1)
        .and_then(|minor| minor.parse::<u32>().ok())
    {
        Some(minor) if minor >= 17 => 17,
        _ => 8,
    }
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Part<'a> {
    Text(&'a str),
    Numeric(u64),
}

fn parts(name: &str) -> Vec<Part<'_>> {
    name.split(['.', '-'])
        .filter(|s| !s.is_empty())
        .map(|s| s.parse().map(Part::Numeric).unwrap_or(Part::Text(s)))
        .collect()
}

/// Component-wise numeric comparison; "1.16" < "1.16.5" < "1.17"
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    parts(a).cmp(&parts(b))
}

/// Newest first
pub fn sort_descending(versions: &mut [GameVersion]) {
    versions.sort_by(|a, b| compare_versions(&b.name, &a.name));
}
