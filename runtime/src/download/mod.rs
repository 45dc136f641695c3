//! Batched, bounded-concurrency image downloader.
//!
//! Descriptors are cut into fixed-size batches processed one after another.
//! Inside a batch up to `concurrency` downloads run at once; the first item
//! that exhausts its attempts aborts the batch (in-flight siblings are
//! dropped) and the whole call. Files written by earlier batches stay on disk
//! and are picked up without network traffic on the next run.

pub mod candidates;

use crate::acquisition::http_client::HttpClient;
use crate::config::RetryPolicy;
use crate::error::{Error, Result};
use crate::manifest::{DownloadedAsset, ImageDescriptor};
use crate::progress::{Phase, PhaseCounter, ProgressEventKind, ProgressReporter};
use candidates::alternate_urls;
use futures::stream::{self, StreamExt, TryStreamExt};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Knobs for one download phase.
#[derive(Debug, Clone)]
pub struct DownloadOptions {
    pub concurrency: usize,
    pub batch_size: usize,
    pub output_dir: PathBuf,
    pub retry: RetryPolicy,
}

/// Why one attempt failed.
#[derive(Debug)]
enum AttemptError {
    Transport(String),
    Status(u16),
    Write(std::io::Error),
}

impl fmt::Display for AttemptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AttemptError::Transport(e) => write!(f, "{e}"),
            AttemptError::Status(status) => write!(f, "HTTP status {status}"),
            AttemptError::Write(e) => write!(f, "write failed: {e}"),
        }
    }
}

/// Downloads image descriptors into a directory.
pub struct AssetDownloader {
    client: HttpClient,
    options: DownloadOptions,
}

impl AssetDownloader {
    pub fn new(client: HttpClient, options: DownloadOptions) -> Self {
        Self { client, options }
    }

    /// Download every descriptor, batch by batch.
    ///
    /// Returns one asset per descriptor, sorted by global sequence number.
    pub async fn download_all(
        &self,
        descriptors: &[ImageDescriptor],
        progress: &ProgressReporter,
    ) -> Result<Vec<DownloadedAsset>> {
        if descriptors.is_empty() {
            return Ok(Vec::new());
        }

        tokio::fs::create_dir_all(&self.options.output_dir).await?;

        let started = Instant::now();
        let batch_size = self.options.batch_size.max(1);
        let concurrency = self.options.concurrency.max(1);
        let batches = descriptors.len().div_ceil(batch_size);
        let counter = PhaseCounter::new(Phase::Download, descriptors.len() as u32);
        let mut results: Vec<DownloadedAsset> = Vec::with_capacity(descriptors.len());

        info!(
            images = descriptors.len(),
            batches, concurrency, "downloading images"
        );
        progress.emit(ProgressEventKind::PhaseStarted {
            phase: Phase::Download,
            total: descriptors.len() as u32,
            message: format!(
                "Downloading {} images in {} batches",
                descriptors.len(),
                batches
            ),
        });

        for (i, batch) in descriptors.chunks(batch_size).enumerate() {
            progress.emit(ProgressEventKind::BatchStarted {
                phase: Phase::Download,
                batch: i as u32 + 1,
                batches: batches as u32,
                size: batch.len() as u32,
            });
            debug!(batch = i + 1, batches, size = batch.len(), "download batch");

            let downloaded: Vec<DownloadedAsset> = stream::iter(batch)
                .map(|descriptor| self.download_counted(descriptor, &counter, progress))
                .buffer_unordered(concurrency)
                .try_collect()
                .await
                .map_err(|e| Error::BatchDownloadFailed {
                    batch: i + 1,
                    batches,
                    source: Box::new(e),
                })?;

            results.extend(downloaded);
        }

        results.sort_by_key(|asset| asset.sequence);

        let elapsed = started.elapsed();
        info!(
            images = results.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "images downloaded"
        );
        progress.emit(ProgressEventKind::PhaseCompleted {
            phase: Phase::Download,
            message: format!("Downloaded {} images", results.len()),
            duration_ms: elapsed.as_millis() as u64,
        });

        Ok(results)
    }

    async fn download_counted(
        &self,
        descriptor: &ImageDescriptor,
        counter: &PhaseCounter,
        progress: &ProgressReporter,
    ) -> Result<DownloadedAsset> {
        let asset = self.download_one(descriptor, progress).await?;
        counter.tick(progress);
        Ok(asset)
    }

    /// Fetch one descriptor, or pick it up from disk if already present.
    pub async fn download_one(
        &self,
        descriptor: &ImageDescriptor,
        progress: &ProgressReporter,
    ) -> Result<DownloadedAsset> {
        let path = self.options.output_dir.join(descriptor.file_name());
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            debug!(sequence = descriptor.sequence, "already on disk");
            progress.emit(ProgressEventKind::ItemSkipped {
                phase: Phase::Download,
                key: descriptor.sequence,
            });
            return Ok(asset(descriptor, descriptor.url.clone(), path));
        }

        let retry = self.options.retry;
        let mut url = descriptor.url.clone();
        let mut last_error: Option<AttemptError> = None;

        for attempt in 0..retry.max_attempts {
            if let Some(delay) = retry.delay_before(attempt) {
                tokio::time::sleep(delay).await;
            }

            let result = match self.fetch_with_fallback(&url).await {
                Ok((served_by, body)) => {
                    url = served_by;
                    write_file(&path, &body).await.map_err(AttemptError::Write)
                }
                Err(e) => Err(e),
            };

            match result {
                Ok(()) => return Ok(asset(descriptor, url, path)),
                Err(e) => {
                    warn!(
                        sequence = descriptor.sequence,
                        page = descriptor.page,
                        attempt = attempt + 1,
                        max_attempts = retry.max_attempts,
                        error = %e,
                        "image download attempt failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(Error::ItemDownloadFailed {
            page: descriptor.page,
            index: descriptor.index,
            sequence: descriptor.sequence,
            url,
            attempts: retry.max_attempts,
            cause: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no attempts made".to_string()),
        })
    }

    /// One request to `url`; on an error status, walk the alternate candidates.
    ///
    /// Returns the URL that served the body.
    async fn fetch_with_fallback(
        &self,
        url: &str,
    ) -> std::result::Result<(String, Vec<u8>), AttemptError> {
        let resp = self
            .client
            .get_image(url)
            .await
            .map_err(|e| AttemptError::Transport(format!("{e:#}")))?;
        if resp.is_success() {
            return Ok((url.to_string(), resp.body));
        }

        for candidate in alternate_urls(url) {
            match self.client.get_image(&candidate).await {
                Ok(alt) if alt.is_success() => {
                    debug!(original = url, fallback = %candidate, "using alternate URL");
                    return Ok((candidate, alt.body));
                }
                Ok(alt) => debug!(url = %candidate, status = alt.status, "alternate rejected"),
                Err(e) => debug!(url = %candidate, "alternate failed: {e:#}"),
            }
        }

        Err(AttemptError::Status(resp.status))
    }
}

fn asset(descriptor: &ImageDescriptor, url: String, path: PathBuf) -> DownloadedAsset {
    DownloadedAsset {
        page: descriptor.page,
        index: descriptor.index,
        sequence: descriptor.sequence,
        url,
        path,
    }
}

/// Write through a sibling `.part` file so a crash never leaves a truncated
/// file under the final name.
pub(crate) async fn write_file(path: &Path, body: &[u8]) -> std::io::Result<()> {
    let mut partial = path.as_os_str().to_owned();
    partial.push(".part");
    let partial = PathBuf::from(partial);

    if let Err(e) = tokio::fs::write(&partial, body).await {
        let _ = tokio::fs::remove_file(&partial).await;
        return Err(e);
    }
    tokio::fs::rename(&partial, path).await
}
