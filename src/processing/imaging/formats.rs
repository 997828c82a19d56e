//! Decoding of source files and encoding of final results.

use std::io::Cursor;
use std::path::Path;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageError};
use tracing::trace;
use crate::core::{MediaKind, SourceItem};
use crate::processing::media::{IntermediateResult, PdfDocument, RasterSet};
use crate::processing::transform::EncodedOutput;
use crate::utils::{ImageFormat, TransformError, extension_of};

type Result<T> = std::result::Result<T, TransformError>;

/// Decodes a source file into its first intermediate result
pub fn decode_source(source: &SourceItem, bytes: Vec<u8>) -> Result<IntermediateResult> {
    match source.kind {
        MediaKind::Pdf => {
            if !bytes.starts_with(b"%PDF-") {
                return Err(TransformError::corrupt(format!(
                    "{} is not a PDF document",
                    source.path.display()
                )));
            }
            Ok(IntermediateResult::Document(PdfDocument { bytes }))
        }
        MediaKind::Image => {
            let (image, codec) = decode_image(&source.path, &bytes)?;
            trace!("Decoded {} ({}x{})", source.path.display(), image.width(), image.height());
            Ok(IntermediateResult::Raster(RasterSet::single(
                image,
                ImageFormat::from_codec(codec),
            )))
        }
    }
}

/// Decodes raster bytes.
///
/// When the extension names a known codec any decode failure means the file
/// is corrupt. Without a usable extension the content is sniffed, and an
/// unrecognised signature is an unsupported format.
pub fn decode_image(path: &Path, bytes: &[u8]) -> Result<(DynamicImage, image::ImageFormat)> {
    let declared = extension_of(path).and_then(|ext| image::ImageFormat::from_extension(ext.as_str()));
    let codec = match declared {
        Some(codec) => codec,
        None => image::guess_format(bytes).map_err(|_| {
            TransformError::unsupported(format!("Unrecognised image data in {}", path.display()))
        })?,
    };

    let image = image::load_from_memory_with_format(bytes, codec).map_err(|e| match e {
        ImageError::Limits(limit) => TransformError::exhausted(format!(
            "Decoding {} exceeds decoder limits: {}",
            path.display(),
            limit
        )),
        ImageError::Unsupported(e) if declared.is_none() => TransformError::unsupported(e.to_string()),
        other => TransformError::corrupt(format!("Failed to decode {}: {}", path.display(), other)),
    })?;
    Ok((image, codec))
}

/// Encodes one page in `format`; `quality` only affects lossy formats
pub fn encode_page(image: &DynamicImage, format: ImageFormat, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    match format {
        ImageFormat::Jpeg => {
            let rgb = image.to_rgb8();
            JpegEncoder::new_with_quality(&mut buf, quality.clamp(1, 100)).write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ExtendedColorType::Rgb8,
            )?;
        }
        ImageFormat::Png => {
            let rgba = image.to_rgba8();
            PngEncoder::new_with_quality(&mut buf, CompressionType::Best, FilterType::Adaptive)
                .write_image(rgba.as_raw(), rgba.width(), rgba.height(), ExtendedColorType::Rgba8)?;
        }
        ImageFormat::WebP | ImageFormat::Bmp | ImageFormat::Tiff => {
            let rgba = DynamicImage::ImageRgba8(image.to_rgba8());
            rgba.write_to(&mut Cursor::new(&mut buf), format.codec())?;
        }
    }
    Ok(buf)
}

/// Encodes the final result into one artifact per page.
///
/// Bytes pinned by a size-targeting step are written as they are.
pub fn encode_result(result: &IntermediateResult) -> Result<Vec<EncodedOutput>> {
    match result {
        IntermediateResult::Document(doc) => Ok(vec![EncodedOutput {
            bytes: doc.bytes.clone(),
            extension: "pdf".to_string(),
        }]),
        IntermediateResult::Raster(set) => {
            if set.pages.is_empty() {
                return Err(TransformError::invalid("Nothing to encode: result has no pages"));
            }
            let extension = set.format.primary_extension().to_string();
            match &set.encoded {
                Some(encoded) if encoded.len() == set.pages.len() => Ok(encoded
                    .iter()
                    .map(|bytes| EncodedOutput { bytes: bytes.clone(), extension: extension.clone() })
                    .collect()),
                _ => set
                    .pages
                    .iter()
                    .map(|page| {
                        Ok(EncodedOutput {
                            bytes: encode_page(page, set.format, set.quality)?,
                            extension: extension.clone(),
                        })
                    })
                    .collect(),
            }
        }
    }
}
