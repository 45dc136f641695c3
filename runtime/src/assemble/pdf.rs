//! PDF document encoder: one full-bleed page per image.

use super::DocumentEncoder;
use crate::error::{Error, Result};
use image::codecs::jpeg::{JpegDecoder, JpegEncoder};
use image::{ColorType, ImageDecoder, ImageFormat};
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, ObjectId, Stream};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Quality used when a non-JPEG image has to be re-encoded.
const REENCODE_QUALITY: u8 = 92;

/// Image bytes ready to embed as a `DCTDecode` XObject.
struct EmbeddedJpeg {
    width: u32,
    height: u32,
    color_space: &'static str,
    bytes: Vec<u8>,
}

/// Writes images into a PDF with lopdf.
///
/// Each page's media box is the image's pixel size in points. JPEG input is
/// embedded untouched; anything else is decoded and re-encoded as JPEG.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfEncoder;

impl DocumentEncoder for PdfEncoder {
    fn encode(&self, images: &[PathBuf], output: &Path) -> Result<()> {
        let failed = |reason: String| Error::EncodingFailed {
            path: output.to_path_buf(),
            reason,
        };

        if images.is_empty() {
            return Err(failed("no images to encode".to_string()));
        }

        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let mut kids: Vec<Object> = Vec::with_capacity(images.len());

        for path in images {
            let image = load_embeddable(path)
                .map_err(|e| failed(format!("{}: {e}", path.display())))?;
            let page_id = add_image_page(&mut doc, pages_id, image)
                .map_err(|e| failed(format!("{}: {e}", path.display())))?;
            kids.push(page_id.into());
        }

        let count = kids.len() as i64;
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => kids,
                "Count" => count,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut partial = output.as_os_str().to_owned();
        partial.push(".part");
        let partial = PathBuf::from(partial);

        doc.save(&partial)
            .map_err(|e| failed(format!("write failed: {e}")))?;
        std::fs::rename(&partial, output).map_err(|e| failed(format!("rename failed: {e}")))?;

        debug!(pages = count, path = %output.display(), "PDF written");
        Ok(())
    }
}

fn add_image_page(
    doc: &mut Document,
    pages_id: ObjectId,
    image: EmbeddedJpeg,
) -> std::result::Result<ObjectId, lopdf::Error> {
    let width = image.width as i64;
    let height = image.height as i64;

    let image_id = doc.add_object(Stream::new(
        dictionary! {
            "Type" => "XObject",
            "Subtype" => "Image",
            "Width" => width,
            "Height" => height,
            "ColorSpace" => image.color_space,
            "BitsPerComponent" => 8,
            "Filter" => "DCTDecode",
        },
        image.bytes,
    ));

    let content = Content {
        operations: vec![
            Operation::new("q", vec![]),
            Operation::new(
                "cm",
                vec![
                    width.into(),
                    0.into(),
                    0.into(),
                    height.into(),
                    0.into(),
                    0.into(),
                ],
            ),
            Operation::new("Do", vec![Object::Name(b"Im0".to_vec())]),
            Operation::new("Q", vec![]),
        ],
    };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));

    Ok(doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "MediaBox" => vec![0.into(), 0.into(), width.into(), height.into()],
        "Contents" => content_id,
        "Resources" => dictionary! {
            "XObject" => dictionary! {
                "Im0" => image_id,
            },
        },
    }))
}

/// Read an image file and turn it into JPEG bytes the PDF can embed.
fn load_embeddable(path: &Path) -> std::result::Result<EmbeddedJpeg, String> {
    let bytes = std::fs::read(path).map_err(|e| e.to_string())?;
    let format = image::guess_format(&bytes).map_err(|e| e.to_string())?;

    if format == ImageFormat::Jpeg {
        let decoder = JpegDecoder::new(Cursor::new(&bytes)).map_err(|e| e.to_string())?;
        let (width, height) = decoder.dimensions();
        let color_space = match decoder.color_type() {
            ColorType::L8 => Some("DeviceGray"),
            ColorType::Rgb8 => Some("DeviceRGB"),
            _ => None,
        };
        if let Some(color_space) = color_space {
            return Ok(EmbeddedJpeg {
                width,
                height,
                color_space,
                bytes,
            });
        }
    }

    let decoded = image::load_from_memory_with_format(&bytes, format).map_err(|e| e.to_string())?;
    let rgb = decoded.to_rgb8();
    let mut buf = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut buf), REENCODE_QUALITY);
    rgb.write_with_encoder(encoder).map_err(|e| e.to_string())?;

    Ok(EmbeddedJpeg {
        width: rgb.width(),
        height: rgb.height(),
        color_space: "DeviceRGB",
        bytes: buf,
    })
}
