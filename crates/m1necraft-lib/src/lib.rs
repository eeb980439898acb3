//! Engine that patches the official Minecraft Launcher so game versions run
//! natively on arm64: shared resource bundles, per-version installs into the
//! launcher tree, launcher profile patching and reset.

pub mod config;
pub mod core;
pub mod engine;
pub mod error;
pub mod guard;
pub mod install;
pub mod launcher;
pub mod paths;
pub mod resources;
pub mod settings;

pub use config::ResourceConfig;
pub use engine::{Engine, EngineEvent};
pub use error::{EngineError, Result};
pub use guard::{CriticalGuard, TerminationSignal};
pub use install::{GameVersion, InstallOutcome, InstallState, InstallStep};
pub use paths::PathLayout;
pub use resources::{BundleKind, SyncReport};
