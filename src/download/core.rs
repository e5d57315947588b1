//! Asset transfer with progress tracking and archive-aware dispatch

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use log::debug;
use tokio::io::AsyncWriteExt;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::extract::{TAR_GZ_SUFFIX, extract_tar_gz_stripped, extract_zip};
use super::github::client_builder;
use super::progress::{DownloadProgress, ProgressSink};
use crate::error::{FetchError, IoContext, Result};

// Download timeouts: connect is bounded, the body only by inactivity.
const DOWNLOAD_CONNECT_TIMEOUT: Duration = Duration::from_secs(30); // Initial connection
const DOWNLOAD_INACTIVITY_TIMEOUT: Duration = Duration::from_secs(300); // 5 min no data

/// Emit a progress update every 256KB.
const PROGRESS_CHUNK_THRESHOLD: u64 = 256 * 1024;

/// How the fetch engine treats the fetched bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Engine decides: archives it understands are unpacked, anything else
    /// is saved under its file name.
    Any,
    /// Save the raw bytes as `<dest>/<basename>`; never extract.
    File,
}

/// Transfers a URL into a destination directory.
pub trait Fetcher: Send + Sync {
    fn fetch(
        &self,
        url: &str,
        dest_dir: &Path,
        mode: FetchMode,
    ) -> impl Future<Output = Result<()>> + Send;
}

/// Last path segment of `url`, without query or fragment.
pub fn file_name_from_url(url: &str) -> Result<&str> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => Ok(name),
        _ => Err(FetchError::InvalidConfig(format!("URL has no file name: {url}"))),
    }
}

/// Removes a file when dropped, on every exit path.
struct RemoveOnDrop(PathBuf);

impl Drop for RemoveOnDrop {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.0)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            debug!("failed to remove {}: {e}", self.0.display());
        }
    }
}

async fn run_blocking<T, F>(what: &str, f: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FetchError::io(what.to_owned(), std::io::Error::other(e)))?
}

/// Fetch a release asset into `dest_dir`.
///
/// `.tar.gz` URLs are fetched raw into a temporary file inside `dest_dir`,
/// replayed onto disk with the wrapper directory stripped, and the temporary
/// file is removed whether or not extraction succeeds. Every other URL goes
/// through the engine's own [`FetchMode::Any`].
pub async fn fetch_asset<F: Fetcher>(fetcher: &F, url: &str, dest_dir: &Path) -> Result<()> {
    if !url.ends_with(TAR_GZ_SUFFIX) {
        return fetcher.fetch(url, dest_dir, FetchMode::Any).await;
    }

    let download_file = dest_dir.join(file_name_from_url(url)?);
    let guard = RemoveOnDrop(download_file.clone());
    fetcher.fetch(url, dest_dir, FetchMode::File).await?;

    let dest = dest_dir.to_path_buf();
    let written = run_blocking("tar extraction task failed", move || {
        let _guard = guard;
        extract_tar_gz_stripped(&download_file, &dest)
    })
    .await?;

    debug!("extracted {written} entries from {url} into {}", dest_dir.display());
    Ok(())
}

/// reqwest-backed [`Fetcher`].
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    progress: Option<Arc<dyn ProgressSink>>,
    cancel: Option<CancellationToken>,
}

impl std::fmt::Debug for HttpFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpFetcher")
            .field("progress", &self.progress.is_some())
            .field("cancellable", &self.cancel.is_some())
            .finish()
    }
}

impl HttpFetcher {
    pub fn new(proxy: Option<&str>, progress: Option<Arc<dyn ProgressSink>>) -> Result<Self> {
        let client = client_builder(proxy)?
            .connect_timeout(DOWNLOAD_CONNECT_TIMEOUT)
            .build()
            .map_err(|e| FetchError::InvalidConfig(format!("cannot build HTTP client: {e}")))?;

        Ok(Self {
            client,
            progress,
            cancel: None,
        })
    }

    /// Abort in-flight transfers when `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    fn report(&self, progress: DownloadProgress) {
        if let Some(sink) = &self.progress {
            sink.report(&progress);
        }
    }

    async fn next_chunk<S, B>(&self, url: &str, stream: &mut S) -> Result<Option<B>>
    where
        S: futures_util::Stream<Item = reqwest::Result<B>> + Unpin,
    {
        let next = async {
            match timeout(DOWNLOAD_INACTIVITY_TIMEOUT, stream.next()).await {
                Ok(Some(Ok(chunk))) => Ok(Some(chunk)),
                Ok(Some(Err(e))) => Err(FetchError::Http {
                    url: url.to_owned(),
                    reason: e.to_string(),
                }),
                Ok(None) => Ok(None), // Stream ended normally
                Err(_) => Err(FetchError::Http {
                    url: url.to_owned(),
                    reason: format!(
                        "no data received for {} seconds",
                        DOWNLOAD_INACTIVITY_TIMEOUT.as_secs()
                    ),
                }),
            }
        };

        match &self.cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(FetchError::Cancelled { url: url.to_owned() }),
                chunk = next => chunk,
            },
            None => next.await,
        }
    }

    /// Stream `url` into `path`, returning the number of bytes written. A
    /// partially written file is removed on failure.
    async fn download_to(&self, url: &str, path: &Path) -> Result<u64> {
        let result = self.stream_to(url, path).await;
        if result.is_err() {
            drop(RemoveOnDrop(path.to_path_buf()));
        }
        result
    }

    async fn stream_to(&self, url: &str, path: &Path) -> Result<u64> {
        debug!("downloading {url} -> {}", path.display());

        if let Some(token) = &self.cancel
            && token.is_cancelled()
        {
            return Err(FetchError::Cancelled { url: url.to_owned() });
        }

        let response = self.client.get(url).send().await.map_err(|e| FetchError::Http {
            url: url.to_owned(),
            reason: e.to_string(),
        })?;

        if !response.status().is_success() {
            return Err(FetchError::Status {
                url: url.to_owned(),
                status: response.status().as_u16(),
            });
        }

        let total_bytes = response.content_length();
        let mut file = tokio::fs::File::create(path)
            .await
            .io_context(|| format!("failed to create {}", path.display()))?;

        let mut stream = std::pin::pin!(response.bytes_stream());
        let mut downloaded: u64 = 0;
        let mut last_progress_bytes = 0u64;

        while let Some(chunk) = self.next_chunk(url, &mut stream).await? {
            file.write_all(&chunk)
                .await
                .io_context(|| format!("failed to write {}", path.display()))?;
            downloaded += chunk.len() as u64;

            // Emit progress every 256KB
            if downloaded - last_progress_bytes >= PROGRESS_CHUNK_THRESHOLD {
                self.report(DownloadProgress::downloading(url, downloaded, total_bytes));
                last_progress_bytes = downloaded;
            }
        }

        file.flush()
            .await
            .io_context(|| format!("failed to flush {}", path.display()))?;

        // Ensure final progress at 100%
        if last_progress_bytes != downloaded {
            self.report(DownloadProgress::downloading(url, downloaded, total_bytes));
        }
        Ok(downloaded)
    }
}

impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &str, dest_dir: &Path, mode: FetchMode) -> Result<()> {
        tokio::fs::create_dir_all(dest_dir)
            .await
            .io_context(|| format!("failed to create directory {}", dest_dir.display()))?;

        let target = dest_dir.join(file_name_from_url(url)?);
        let downloaded = self.download_to(url, &target).await?;

        if mode == FetchMode::Any && url.ends_with(".zip") {
            self.report(DownloadProgress::extracting(url, downloaded));
            let guard = RemoveOnDrop(target.clone());
            let dest = dest_dir.to_path_buf();
            let written = run_blocking("zip extraction task failed", move || {
                let _guard = guard;
                extract_zip(&target, &dest)
            })
            .await?;
            debug!("extracted {written} entries from {url}");
        }

        self.report(DownloadProgress::complete(url, downloaded));
        Ok(())
    }
}
