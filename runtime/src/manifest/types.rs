//! Publication data model shared by every pipeline phase.
//!
//! All records here are plain, read-only values. Phases pass them forward by
//! reference and never mutate a record produced by an earlier phase.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

// ─── Identity ─────────────────────────────────────────────────────────────────

/// Normalized `account/book` identifier, stable across runs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PublicationId(String);

impl PublicationId {
    pub(crate) fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Identifier with the segment separator replaced, safe as a path component.
    pub fn as_slug(&self) -> String {
        self.0.replace('/', "-")
    }
}

impl fmt::Display for PublicationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ─── Manifest model ───────────────────────────────────────────────────────────

/// A resolved publication. Created once by the resolver, immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Publication {
    pub id: PublicationId,
    /// Canonical viewer URL, always ending in `/`.
    pub url: String,
    pub title: String,
    pub pages: Vec<Page>,
}

/// One page of the publication, in manifest order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    /// 1-based, dense, contiguous.
    pub number: u32,
    pub thumbnail_url: String,
    /// Absolute image URLs. Multiple entries are sub-regions of the page,
    /// not alternates.
    pub image_urls: Vec<String>,
}

impl Publication {
    pub fn page_count(&self) -> u32 {
        self.pages.len() as u32
    }

    /// Deep link into the viewer for a single page.
    pub fn page_url(&self, page: u32) -> String {
        format!("{}#p={}", self.url, page)
    }

    /// Flatten every page's images in page-then-index order.
    ///
    /// The assigned sequence numbers start at 1 and are dense; they are the
    /// only ordering key used downstream.
    pub fn image_descriptors(&self) -> Vec<ImageDescriptor> {
        let mut descriptors = Vec::new();
        let mut sequence = 1u32;
        for page in &self.pages {
            for (i, url) in page.image_urls.iter().enumerate() {
                descriptors.push(ImageDescriptor {
                    page: page.number,
                    index: i as u32 + 1,
                    sequence,
                    url: url.clone(),
                });
                sequence += 1;
            }
        }
        descriptors
    }
}

// ─── Asset records ────────────────────────────────────────────────────────────

/// One image to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageDescriptor {
    pub page: u32,
    /// 1-based position within the page.
    pub index: u32,
    /// Global position over the whole publication.
    pub sequence: u32,
    pub url: String,
}

impl ImageDescriptor {
    /// File name used for this image inside the image output directory.
    pub fn file_name(&self) -> String {
        format!("{}-{}.jpg", self.page, self.index)
    }
}

/// A successfully retrieved image, or one recognized as already on disk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DownloadedAsset {
    pub page: u32,
    pub index: u32,
    pub sequence: u32,
    /// URL that actually served the bytes (may be a fallback candidate).
    pub url: String,
    pub path: PathBuf,
}

/// A rendered page screenshot.
///
/// An even-page spread render yields two of these (even page and its odd
/// successor) pointing at the same `path`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedAsset {
    pub page: u32,
    /// Equal to `page`; captures are one per page.
    pub sequence: u32,
    pub url: String,
    pub path: PathBuf,
}
