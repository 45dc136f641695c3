//! Identifier resolution and manifest retrieval.
//!
//! The viewer publishes each book's configuration as a script assignment
//! (`var htmlConfig = {...};`). We fetch it once, cut out the JSON object
//! between the first `{` and the last `}`, and decode it into [`Publication`].

use super::types::{Page, Publication, PublicationId};
use crate::acquisition::http_client::HttpClient;
use crate::error::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;
use tracing::{debug, info};

/// Path prefix a manifest filename may already carry.
const FILES_PREFIX: &str = "files/";

/// Sub-path inserted before bare filenames.
const LARGE_PREFIX: &str = "files/large/";

fn entity_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"&#?[A-Za-z0-9]+;").expect("static regex"))
}

fn id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^(\w+/\w+)/?").expect("static regex"))
}

/// Turn a raw `account/book` identifier or a viewer URL into a [`PublicationId`].
///
/// A raw input only needs to *start* with the two-segment pattern; for a URL
/// the first two path segments must match it.
pub fn resolve_identifier(input: &str) -> Result<PublicationId> {
    let input = input.trim();

    if let Some(m) = id_pattern().captures(input).and_then(|c| c.get(1)) {
        return Ok(PublicationId::new(m.as_str()));
    }

    if let Ok(parsed) = url::Url::parse(input) {
        if parsed.host_str().is_some_and(|h| !h.is_empty()) {
            let trimmed = parsed.path().trim_matches('/');
            if let Some(m) = id_pattern().captures(trimmed).and_then(|c| c.get(1)) {
                return Ok(PublicationId::new(m.as_str()));
            }
        }
    }

    Err(Error::InvalidIdentifier(input.to_string()))
}

// ─── Wire format ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(rename = "fliphtml5_pages", default)]
    pages: Vec<RawPage>,
    #[serde(default)]
    meta: Option<RawMeta>,
}

#[derive(Debug, Default, Deserialize)]
struct RawMeta {
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawPage {
    #[serde(rename = "n", default)]
    images: ImageField,
    #[serde(rename = "t", default)]
    thumbnail: Option<String>,
}

/// The manifest's image field is either one filename or a list of them.
#[derive(Debug, Default, Deserialize)]
#[serde(untagged)]
enum ImageField {
    One(String),
    Many(Vec<String>),
    #[default]
    Missing,
}

impl ImageField {
    fn into_list(self) -> Vec<String> {
        match self {
            ImageField::One(name) => vec![name],
            ImageField::Many(names) => names,
            ImageField::Missing => Vec::new(),
        }
    }
}

// ─── Decoding ─────────────────────────────────────────────────────────────────

/// Cut the JSON object out of a script payload.
pub(crate) fn extract_json_object(payload: &str) -> Option<&str> {
    let start = payload.find('{')?;
    let end = payload.rfind('}')?;
    (end > start).then(|| &payload[start..=end])
}

/// Resolve a manifest filename against the publication's file root.
pub fn normalize_image_url(file_root: &str, raw: &str) -> String {
    let trimmed = raw.strip_prefix("./").unwrap_or(raw);
    if trimmed.starts_with(FILES_PREFIX) {
        format!("{file_root}{trimmed}")
    } else {
        format!("{file_root}{LARGE_PREFIX}{trimmed}")
    }
}

/// Decode every recognizable entity in `raw`; stray `&` and unknown entities stay as written.
fn unescape_title(raw: &str) -> String {
    entity_pattern()
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            let entity = &caps[0];
            match quick_xml::escape::unescape(entity) {
                Ok(decoded) => decoded.into_owned(),
                Err(e) => {
                    debug!(entity, "leaving entity escaped: {e}");
                    entity.to_string()
                }
            }
        })
        .into_owned()
}

/// Decode a fetched script payload into a publication rooted at `viewer_base`.
pub fn parse_manifest(id: &PublicationId, viewer_base: &str, payload: &str) -> Result<Publication> {
    let malformed = |reason: String| Error::ManifestMalformed {
        id: id.to_string(),
        reason,
    };

    let json = extract_json_object(payload)
        .ok_or_else(|| malformed("no JSON object in payload".to_string()))?;
    let config: RawConfig =
        serde_json::from_str(json).map_err(|e| malformed(format!("JSON decode failed: {e}")))?;

    let url = format!("{}/{}/", viewer_base.trim_end_matches('/'), id);
    let pages = config
        .pages
        .into_iter()
        .enumerate()
        .map(|(i, raw)| Page {
            number: i as u32 + 1,
            thumbnail_url: raw.thumbnail.unwrap_or_default(),
            image_urls: raw
                .images
                .into_list()
                .iter()
                .map(|name| normalize_image_url(&url, name))
                .collect(),
        })
        .collect();

    Ok(Publication {
        id: id.clone(),
        url,
        title: unescape_title(
            &config
                .meta
                .and_then(|meta| meta.title)
                .unwrap_or_default(),
        ),
        pages,
    })
}

/// URL of the script-embedded configuration for a publication.
pub fn manifest_url(viewer_base: &str, id: &PublicationId) -> String {
    format!(
        "{}/{}/javascript/config.js",
        viewer_base.trim_end_matches('/'),
        id
    )
}

/// Fetches and decodes publication manifests.
#[derive(Clone)]
pub struct ManifestResolver {
    client: HttpClient,
    viewer_base: String,
}

impl ManifestResolver {
    pub fn new(client: HttpClient, viewer_base: impl Into<String>) -> Self {
        Self {
            client,
            viewer_base: viewer_base.into(),
        }
    }

    /// Resolve `input` and fetch its manifest in one step.
    pub async fn resolve(&self, input: &str) -> Result<Publication> {
        let id = resolve_identifier(input)?;
        self.fetch_manifest(&id).await
    }

    /// Issue one request for the publication's configuration and decode it.
    pub async fn fetch_manifest(&self, id: &PublicationId) -> Result<Publication> {
        let url = manifest_url(&self.viewer_base, id);
        debug!(%url, "fetching manifest");

        let resp = self
            .client
            .get(&url)
            .await
            .map_err(|e| Error::ManifestUnavailable {
                id: id.to_string(),
                reason: format!("{e:#}"),
            })?;

        if resp.status != 200 {
            return Err(Error::ManifestUnavailable {
                id: id.to_string(),
                reason: format!("HTTP status {}", resp.status),
            });
        }

        if resp.final_url != url {
            debug!(final_url = %resp.final_url, "manifest request was redirected");
        }

        let publication = parse_manifest(id, &self.viewer_base, &resp.text())?;
        info!(
            id = %publication.id,
            pages = publication.pages.len(),
            "resolved \"{}\"",
            publication.title
        );
        Ok(publication)
    }
}
