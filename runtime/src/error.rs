//! Error types for the acquisition and assembly pipeline.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the pipeline.
///
/// Every variant that decides whether the run continues carries enough
/// context (page, image, attempt count, cause) to diagnose the failure.
#[derive(Debug, Error)]
pub enum Error {
    /// Input is neither an `account/book` identifier nor a viewer URL.
    #[error("invalid publication ID or URL: {0}")]
    InvalidIdentifier(String),

    /// The manifest could not be fetched.
    #[error("manifest for {id} unavailable: {reason}")]
    ManifestUnavailable { id: String, reason: String },

    /// The manifest was fetched but could not be decoded.
    #[error("manifest for {id} is malformed: {reason}")]
    ManifestMalformed { id: String, reason: String },

    /// A single image could not be downloaded after all attempts and fallbacks.
    #[error(
        "image #{sequence} (page {page}, image {index}) failed after {attempts} attempts from {url}: {cause}"
    )]
    ItemDownloadFailed {
        page: u32,
        index: u32,
        sequence: u32,
        url: String,
        attempts: u32,
        cause: String,
    },

    /// A download batch was aborted by an unrecovered item failure.
    #[error("download batch {batch}/{batches} failed")]
    BatchDownloadFailed {
        batch: usize,
        batches: usize,
        #[source]
        source: Box<Error>,
    },

    /// One page could not be rendered. Recorded, not fatal on its own.
    #[error("capture of page {page} failed after {attempts} attempts: {cause}")]
    PageCaptureFailed {
        page: u32,
        attempts: u32,
        cause: String,
    },

    /// The capture phase produced nothing at all.
    #[error("no interactive pages were captured ({} pages failed)", failed_pages.len())]
    NoCapturesProduced { failed_pages: Vec<u32> },

    /// The target artifact exists and overwriting was not requested.
    #[error("{} already exists, use --force to overwrite", path.display())]
    ArtifactAlreadyExists { path: PathBuf },

    /// The document encoder rejected the input or failed to write.
    #[error("failed to encode {}: {reason}", path.display())]
    EncodingFailed { path: PathBuf, reason: String },

    /// No browser could be launched for the capture phase.
    #[error("browser unavailable: {0}")]
    BrowserUnavailable(String),

    /// A configuration value is out of range.
    #[error("invalid configuration for {key}: {message}")]
    InvalidConfig { key: String, message: String },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether retrying the same operation later could succeed.
    ///
    /// Identifier, manifest, configuration and artifact errors are permanent.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::ItemDownloadFailed { .. }
            | Error::PageCaptureFailed { .. }
            | Error::BrowserUnavailable(_) => true,
            Error::BatchDownloadFailed { source, .. } => source.is_retryable(),
            Error::Io(e) => matches!(
                e.kind(),
                std::io::ErrorKind::TimedOut
                    | std::io::ErrorKind::Interrupted
                    | std::io::ErrorKind::ConnectionReset
                    | std::io::ErrorKind::ConnectionAborted
            ),
            Error::InvalidIdentifier(_)
            | Error::ManifestUnavailable { .. }
            | Error::ManifestMalformed { .. }
            | Error::NoCapturesProduced { .. }
            | Error::ArtifactAlreadyExists { .. }
            | Error::EncodingFailed { .. }
            | Error::InvalidConfig { .. } => false,
        }
    }
}
