use crate::core::types::ProgressReporter;
use crate::error::{EngineError, Result};
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tokio::fs::{create_dir_all, File};
use tokio::io::AsyncWriteExt;

/// Retry policy for archive downloads.
/// Retry delay is a base value; attempts back off linearly (delay * attempt).
#[derive(Debug, Clone, Copy)]
pub struct FetchOptions {
    pub attempts: u32,
    pub retry_delay: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            attempts: 3,
            retry_delay: Duration::from_millis(1000),
        }
    }
}

enum AttemptError {
    Cancelled,
    /// Not worth retrying (e.g. 404 for a missing archive)
    Permanent(anyhow::Error),
    Transient(anyhow::Error),
}

impl From<std::io::Error> for AttemptError {
    fn from(e: std::io::Error) -> Self {
        AttemptError::Transient(e.into())
    }
}

impl From<reqwest::Error> for AttemptError {
    fn from(e: reqwest::Error) -> Self {
        AttemptError::Transient(e.into())
    }
}

/// Build the HTTP client shared by all resource requests
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("m1necraft/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| EngineError::Other(e.into()))
}

/// Download a file to a path with progress reporting and retry logic.
///
/// Data is streamed into `<path>.part` and renamed over `path` once complete,
/// so a failed or cancelled download never leaves a truncated destination.
pub async fn download_to_path(
    client: &Client,
    url: &str,
    path: &Path,
    options: FetchOptions,
    reporter: &dyn ProgressReporter,
) -> Result<()> {
    log::debug!("Downloading: {} -> {:?}", url, path);

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        create_dir_all(parent).await?;
    }

    let attempts = options.attempts.max(1);
    let mut retries = 0;
    loop {
        let tmp_path = part_path(path);
        let outcome = download_once(client, url, path, &tmp_path, reporter).await;
        if outcome.is_err() {
            remove_partial(&tmp_path).await;
        }

        match outcome {
            Ok(()) => {
                log::debug!("Download complete: {:?}", path);
                reporter.set_fraction(1.0);
                return Ok(());
            }
            Err(AttemptError::Cancelled) => {
                log::warn!("Download cancelled: {:?}", path);
                return Err(EngineError::Cancelled {
                    url: url.to_string(),
                });
            }
            Err(AttemptError::Permanent(e)) => {
                log::error!("Download failed: {:#}", e);
                return Err(fetch_error(url, e));
            }
            Err(AttemptError::Transient(e)) => {
                retries += 1;
                if retries >= attempts {
                    log::error!("Download failed after {} attempts: {:#}", attempts, e);
                    return Err(fetch_error(url, e));
                }
                log::warn!(
                    "Download failed (attempt {}/{}) : {:#}. Retrying...",
                    retries,
                    attempts,
                    e
                );
                tokio::time::sleep(options.retry_delay * retries).await;
            }
        }
    }
}

async fn download_once(
    client: &Client,
    url: &str,
    path: &Path,
    tmp_path: &Path,
    reporter: &dyn ProgressReporter,
) -> std::result::Result<(), AttemptError> {
    if reporter.is_cancelled() {
        return Err(AttemptError::Cancelled);
    }

    let start = Instant::now();
    let response = client.get(url).send().await?;

    let status = response.status();
    if !status.is_success() {
        let err = anyhow::anyhow!("HTTP error {}: {}", status, url);
        return Err(if status.is_client_error() {
            AttemptError::Permanent(err)
        } else {
            AttemptError::Transient(err)
        });
    }

    let total_size = response.content_length();
    log::debug!("Download size: {:?} bytes", total_size);

    let mut file = File::create(tmp_path).await?;
    let mut downloaded: u64 = 0;

    let mut stream = response.bytes_stream();
    use futures::StreamExt;

    while let Some(chunk_result) = stream.next().await {
        if reporter.is_cancelled() {
            return Err(AttemptError::Cancelled);
        }

        let chunk = chunk_result?;
        file.write_all(&chunk).await?;

        downloaded += chunk.len() as u64;
        reporter.update_bytes(downloaded, total_size);
    }
    file.flush().await?;
    // Ensure data is flushed to disk
    file.sync_all().await?;
    drop(file);

    if let Some(expected) = total_size {
        if downloaded != expected {
            return Err(AttemptError::Transient(anyhow::anyhow!(
                "Truncated download of {}: {} of {} bytes",
                url,
                downloaded,
                expected
            )));
        }
    }

    // Replace, never append to, an earlier copy
    match tokio::fs::remove_file(path).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e.into()),
    }
    tokio::fs::rename(tmp_path, path).await?;

    let secs = start.elapsed().as_secs_f64();
    let throughput = (downloaded as f64 / 1024.0 / 1024.0) / secs.max(0.001); // MB/s
    log::info!(
        "Download stats: url={}, size={} bytes, time={:.2}s, throughput={:.2} MB/s",
        url,
        downloaded,
        secs,
        throughput
    );

    Ok(())
}

/// Download JSON using an existing Client and deserialize
pub async fn download_json_with_client<T: serde::de::DeserializeOwned>(
    client: &Client,
    url: &str,
) -> Result<T> {
    log::debug!("Downloading JSON (reused client): {}", url);
    let response = client
        .get(url)
        .header(reqwest::header::ACCEPT, "application/json")
        .send()
        .await
        .map_err(|e| fetch_error(url, e.into()))?;

    if !response.status().is_success() {
        return Err(fetch_error(
            url,
            anyhow::anyhow!("HTTP error {}", response.status()),
        ));
    }

    response.json().await.map_err(|e| fetch_error(url, e.into()))
}

fn part_path(path: &Path) -> PathBuf {
    let tmp_name = format!(
        "{}.part",
        path.file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("download")
    );
    path.with_file_name(tmp_name)
}

async fn remove_partial(tmp_path: &Path) {
    match tokio::fs::remove_file(tmp_path).await {
        Ok(()) => log::debug!("Removed partial download {:?}", tmp_path),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => log::warn!("Failed to remove partial download {:?}: {}", tmp_path, e),
    }
}

fn fetch_error(url: &str, e: anyhow::Error) -> EngineError {
    EngineError::Fetch {
        url: url.to_string(),
        message: format!("{:#}", e),
    }
}
