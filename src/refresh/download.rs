//! Database file downloads.
//!
//! Each database is fetched into a per-attempt temporary file next to its
//! live path (same filesystem, so the later promotion is an atomic rename).
//! Transport failures are classified into transient and permanent so the
//! retry policy only repeats attempts that can plausibly succeed.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use futures::StreamExt;
use tokio::io::AsyncWriteExt;
use url::Url;

use crate::catalog::DatabaseDescriptor;
use crate::error_handling::DownloadError;
use crate::retry::{RetryPolicy, Retryable};

impl Retryable for DownloadError {
    fn is_retriable(&self) -> bool {
        DownloadError::is_retriable(self)
    }
}

/// Where fresh database files come from.
///
/// The engine only needs "stream the current remote copy of this descriptor
/// to this local path"; how the URL is obtained (static mirror, presigned
/// URLs, ...) is the implementor's concern.
#[async_trait]
pub trait DatabaseSource: Send + Sync {
    /// Downloads the remote copy of `descriptor` into `dest`, returning the
    /// number of bytes written.
    async fn fetch(
        &self,
        descriptor: &DatabaseDescriptor,
        dest: &Path,
    ) -> Result<u64, DownloadError>;
}

/// HTTP(S) source serving the catalog layout under a base URL.
pub struct HttpSource {
    client: reqwest::Client,
    base_url: Url,
}

impl HttpSource {
    /// Creates a source rooted at `base_url`.
    ///
    /// The client is expected to carry the connect and total-transfer
    /// timeouts (see `initialization::init_client`).
    pub fn new(client: reqwest::Client, mut base_url: Url) -> Self {
        // Url::join drops the last path segment unless the base ends in '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Self { client, base_url }
    }

    fn url_for(&self, descriptor: &DatabaseDescriptor) -> Result<Url, DownloadError> {
        self.base_url
            .join(descriptor.relative_path)
            .map_err(|e| DownloadError::Permanent(format!("invalid database URL: {}", e)))
    }
}

#[async_trait]
impl DatabaseSource for HttpSource {
    async fn fetch(
        &self,
        descriptor: &DatabaseDescriptor,
        dest: &Path,
    ) -> Result<u64, DownloadError> {
        let url = self.url_for(descriptor)?;
        log::debug!("Fetching {} from {}", descriptor.name, url);

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(classify_request_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("HTTP {} fetching {}", status, url);
            return Err(if status.is_server_error() {
                DownloadError::Transient(message)
            } else if status.as_u16() == 429 {
                DownloadError::Transient(message)
            } else {
                DownloadError::Permanent(message)
            });
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut stream = response.bytes_stream();
        let mut written: u64 = 0;
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(classify_request_error)?;
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}

/// Maps a transport-level error onto the retriability taxonomy.
///
/// Unknown failures default to transient, matching the "might be a passing
/// network problem" stance the download path takes everywhere else.
fn classify_request_error(error: reqwest::Error) -> DownloadError {
    if let Some(status) = error.status() {
        let code = status.as_u16();
        if code == 429 || status.is_server_error() {
            return DownloadError::Transient(error.to_string());
        }
        if status.is_client_error() {
            return DownloadError::Permanent(error.to_string());
        }
    }

    if error.is_timeout() || error.is_connect() || error.is_request() {
        return DownloadError::Transient(error.to_string());
    }
    if error.is_redirect() || error.is_decode() {
        return DownloadError::Permanent(error.to_string());
    }

    DownloadError::Transient(error.to_string())
}

/// Temp path for one download attempt, kept next to the live file so the
/// final rename never crosses a filesystem boundary.
pub(crate) fn temp_path(live_path: &Path, attempt: usize) -> PathBuf {
    let file_name = live_path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "database".to_string());
    live_path.with_file_name(format!("{}.tmp.{}", file_name, attempt))
}

/// Downloads one database under the given retry policy.
///
/// Every attempt writes to its own temp file; failed attempts remove theirs.
/// A download below `min_file_size` counts as a failed attempt (error pages
/// and truncated transfers must never be promoted). On success the temp file
/// is left in place and returned for validation.
pub(crate) async fn download_with_retry(
    source: &dyn DatabaseSource,
    descriptor: &'static DatabaseDescriptor,
    live_path: &Path,
    policy: RetryPolicy,
    min_file_size: u64,
) -> Result<(PathBuf, u64), DownloadError> {
    if let Some(parent) = live_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let attempt_count = AtomicUsize::new(0);
    policy
        .run(descriptor.name, || {
            let attempt = attempt_count.fetch_add(1, Ordering::SeqCst) + 1;
            let temp = temp_path(live_path, attempt);
            async move {
                log::info!(
                    "Downloading {} (attempt {}/{})",
                    descriptor.name,
                    attempt,
                    policy.max_attempts
                );

                let bytes = match source.fetch(descriptor, &temp).await {
                    Ok(bytes) => bytes,
                    Err(e) => {
                        let _ = tokio::fs::remove_file(&temp).await;
                        return Err(e);
                    }
                };

                if bytes < min_file_size {
                    let _ = tokio::fs::remove_file(&temp).await;
                    return Err(DownloadError::TooSmall { size: bytes });
                }

                log::info!("Downloaded {}: {} bytes", descriptor.name, bytes);
                Ok((temp, bytes))
            }
        })
        .await
}
