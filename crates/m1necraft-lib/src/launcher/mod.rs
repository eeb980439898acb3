pub mod process;
pub mod profiles;

pub use process::{install_from_image, launch, launch_arguments, LaunchResult};
pub use profiles::{
    ensure_host_skeleton, profile_key, LauncherProfile, LauncherProfileFile, ProfilePatcher,
    PROFILE_KEY_PREFIX,
};
