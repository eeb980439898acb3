pub mod downloader;
pub mod extractor;
pub mod transaction;
pub mod types;

pub use downloader::{build_client, download_json_with_client, download_to_path, FetchOptions};
pub use extractor::extract_archive;
pub use transaction::StagedInstall;
pub use types::{CancelToken, ProgressReporter, ScaledReporter, SilentProgressReporter};
