//! Merge downloaded and captured assets into one page-ordered document.

pub mod pdf;

use crate::error::{Error, Result};
use crate::manifest::{CapturedAsset, DownloadedAsset};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

pub use pdf::PdfEncoder;

/// Turns an ordered list of image files into a single document.
pub trait DocumentEncoder: Send + Sync {
    /// Write one page per image, in input order, to `output`.
    fn encode(&self, images: &[PathBuf], output: &Path) -> Result<()>;
}

/// Page-ordered content paths.
///
/// Downloaded images are keyed by page (a later image of the same page
/// replaces an earlier one); captures then replace downloads page by page.
pub fn assemble(downloaded: &[DownloadedAsset], captured: &[CapturedAsset]) -> Vec<PathBuf> {
    let mut by_page: BTreeMap<u32, &Path> = BTreeMap::new();
    for asset in downloaded {
        by_page.insert(asset.page, &asset.path);
    }
    for asset in captured {
        by_page.insert(asset.page, &asset.path);
    }
    by_page.into_values().map(Path::to_path_buf).collect()
}

/// Hand `paths` to `encoder`, refusing to replace an existing artifact
/// unless `overwrite` is set.
pub fn encode(
    paths: &[PathBuf],
    output: &Path,
    overwrite: bool,
    encoder: &dyn DocumentEncoder,
) -> Result<()> {
    if !overwrite && output.exists() {
        return Err(Error::ArtifactAlreadyExists {
            path: output.to_path_buf(),
        });
    }
    encoder.encode(paths, output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn downloaded(page: u32, index: u32, sequence: u32) -> DownloadedAsset {
        DownloadedAsset {
            page,
            index,
            sequence,
            url: format!("https://h/{page}-{index}.jpg"),
            path: PathBuf::from(format!("/img/{page}-{index}.jpg")),
        }
    }

    fn captured(page: u32, rendered: u32) -> CapturedAsset {
        CapturedAsset {
            page,
            sequence: page,
            url: format!("https://h/#p={rendered}"),
            path: PathBuf::from(format!("/img/interactive/interactive-{rendered}.png")),
        }
    }

    #[derive(Default)]
    struct RecordingEncoder {
        calls: Mutex<Vec<Vec<PathBuf>>>,
    }

    impl DocumentEncoder for RecordingEncoder {
        fn encode(&self, images: &[PathBuf], _output: &Path) -> Result<()> {
            self.calls.lock().unwrap().push(images.to_vec());
            Ok(())
        }
    }

    #[test]
    fn test_capture_overrides_download_for_same_page() {
        let paths = assemble(
            &[downloaded(1, 1, 1), downloaded(2, 1, 2), downloaded(3, 1, 3)],
            &[captured(3, 2)],
        );
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/img/1-1.jpg"),
                PathBuf::from("/img/2-1.jpg"),
                PathBuf::from("/img/interactive/interactive-2.png"),
            ]
        );
    }

    #[test]
    fn test_later_image_of_page_wins() {
        let paths = assemble(&[downloaded(1, 1, 1), downloaded(1, 2, 2)], &[]);
        assert_eq!(paths, vec![PathBuf::from("/img/1-2.jpg")]);
    }

    #[test]
    fn test_output_sorted_by_page_regardless_of_input_order() {
        let paths = assemble(
            &[downloaded(3, 1, 3), downloaded(1, 1, 1)],
            &[captured(2, 2)],
        );
        assert_eq!(
            paths,
            vec![
                PathBuf::from("/img/1-1.jpg"),
                PathBuf::from("/img/interactive/interactive-2.png"),
                PathBuf::from("/img/3-1.jpg"),
            ]
        );
    }

    #[test]
    fn test_shared_spread_path_appears_for_both_pages() {
        let paths = assemble(&[], &[captured(4, 4), captured(5, 4)]);
        assert_eq!(paths.len(), 2);
        assert_eq!(paths[0], paths[1]);
    }

    #[test]
    fn test_existing_artifact_refused_without_overwrite() {
        let dir = tempfile::TempDir::new().unwrap();
        let output = dir.path().join("book.pdf");
        std::fs::write(&output, b"%PDF").unwrap();
        let encoder = RecordingEncoder::default();

        let err = encode(&[PathBuf::from("/img/1-1.jpg")], &output, false, &encoder).unwrap_err();
        assert!(matches!(err, Error::ArtifactAlreadyExists { .. }));
        assert!(encoder.calls.lock().unwrap().is_empty());

        encode(&[PathBuf::from("/img/1-1.jpg")], &output, true, &encoder).unwrap();
        assert_eq!(encoder.calls.lock().unwrap().len(), 1);
    }
}
