//! Publication manifests: identifier resolution, remote configuration
//! decoding, and the data model every later phase consumes.

pub mod resolver;
pub mod types;

pub use resolver::{resolve_identifier, ManifestResolver};
pub use types::{CapturedAsset, DownloadedAsset, ImageDescriptor, Page, Publication, PublicationId};
