//! Default [`Transform`] implementation backed by the `image` crate.

use std::sync::Arc;
use tracing::trace;
use crate::core::{Action, ActionKind, UpscalerConfig};
use crate::processing::media::{IntermediateResult, PdfDocument, RasterSet};
use crate::processing::transform::Transform;
use crate::utils::{ImageFormat, TransformError};
use super::pdf::PdfCodec;
use super::resize::apply_resize;
use super::target_size::reduce_file_size;
use super::upscale::{ResampleUpscaler, Upscaler, Waifu2xUpscaler};
use super::watermark::{WatermarkSpec, apply_watermark, decode_watermark};

type Result<T> = std::result::Result<T, TransformError>;

#[cfg(feature = "pdfium")]
fn default_pdf_codec() -> Arc<dyn PdfCodec> {
    Arc::new(super::pdf::PdfiumCodec)
}

#[cfg(not(feature = "pdfium"))]
fn default_pdf_codec() -> Arc<dyn PdfCodec> {
    Arc::new(super::pdf::BuiltinPdfCodec)
}

/// Applies actions to decoded pages in memory.
///
/// Holds no mutable state, so one instance serves every worker.
#[derive(Clone)]
pub struct ImageTransformer {
    pdf: Arc<dyn PdfCodec>,
    upscaler: Arc<dyn Upscaler>,
}

impl ImageTransformer {
    pub fn new() -> Self {
        Self {
            pdf: default_pdf_codec(),
            upscaler: Arc::new(ResampleUpscaler),
        }
    }

    /// Builds a transformer with the upscaling backend named in the config
    pub fn from_config(upscaler: &UpscalerConfig) -> Self {
        let transformer = Self::new();
        match upscaler {
            UpscalerConfig::Resample => transformer,
            UpscalerConfig::Waifu2x { binary } => {
                transformer.with_upscaler(Arc::new(Waifu2xUpscaler::new(binary.clone())))
            }
        }
    }

    pub fn with_pdf_codec(mut self, pdf: Arc<dyn PdfCodec>) -> Self {
        self.pdf = pdf;
        self
    }

    pub fn with_upscaler(mut self, upscaler: Arc<dyn Upscaler>) -> Self {
        self.upscaler = upscaler;
        self
    }
}

impl Default for ImageTransformer {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ImageTransformer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageTransformer").finish_non_exhaustive()
    }
}

impl Transform for ImageTransformer {
    fn apply(&self, action: &Action, input: IntermediateResult) -> Result<IntermediateResult> {
        let name = action.name();
        trace!("Applying {}", action);

        match action.kind() {
            ActionKind::EnhanceQuality { quality, sharpen } => {
                let mut set = input.into_raster(name)?;
                if let Some(sigma) = *sharpen {
                    set.pages = set.pages.into_iter().map(|p| p.unsharpen(sigma, 1)).collect();
                }
                set.quality = *quality;
                set.encoded = None;
                Ok(IntermediateResult::Raster(set))
            }

            ActionKind::Resize { mode, enlarge } => {
                input.map_pages(name, |page| Ok(apply_resize(page, mode, *enlarge)))
            }

            ActionKind::TargetFileSize { target_bytes, min_quality, max_iterations } => {
                let set = input.into_raster(name)?;
                let reduced = reduce_file_size(set, *target_bytes, *min_quality, *max_iterations)?;
                Ok(IntermediateResult::Raster(reduced))
            }

            ActionKind::Rotate { degrees } => match degrees.rem_euclid(360) {
                0 => Ok(input),
                90 => input.map_pages(name, |page| Ok(page.rotate90())),
                180 => input.map_pages(name, |page| Ok(page.rotate180())),
                270 => input.map_pages(name, |page| Ok(page.rotate270())),
                other => Err(TransformError::invalid(format!("Cannot rotate by {other} degrees"))),
            },

            ActionKind::Watermark { image, position, opacity, scale, margin } => {
                let set = input.into_raster(name)?;
                let bytes = action.asset().ok_or_else(|| {
                    TransformError::invalid(format!(
                        "Watermark {} was not loaded for this batch",
                        image.display()
                    ))
                })?;
                let mark = decode_watermark(image, bytes)?;
                let spec = WatermarkSpec {
                    position: *position,
                    opacity: *opacity,
                    scale: *scale,
                    margin: *margin,
                };
                IntermediateResult::Raster(set)
                    .map_pages(name, |page| Ok(apply_watermark(page, &mark, &spec)))
            }

            ActionKind::ConvertFormat { format, quality } => {
                let mut set = input.into_raster(name)?;
                set.format = *format;
                set.quality = quality.unwrap_or_else(|| format.default_quality());
                set.encoded = None;
                Ok(IntermediateResult::Raster(set))
            }

            ActionKind::ImagesToPdf { layout } => {
                let set = input.into_raster(name)?;
                let bytes = self.pdf.compose(&set.pages, layout)?;
                Ok(IntermediateResult::Document(PdfDocument { bytes }))
            }

            ActionKind::PdfToImages { dpi } => match input {
                IntermediateResult::Document(doc) => {
                    let pages = self.pdf.rasterize(&doc.bytes, *dpi)?;
                    Ok(IntermediateResult::Raster(RasterSet {
                        pages,
                        format: ImageFormat::Png,
                        quality: ImageFormat::Png.default_quality(),
                        encoded: None,
                    }))
                }
                IntermediateResult::Raster(_) => Err(TransformError::unsupported(
                    "PDF to Images needs a PDF document as input",
                )),
            },

            ActionKind::Upscale { factor, noise } => {
                input.map_pages(name, |page| self.upscaler.upscale(&page, *factor, *noise))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{PdfLayout, ResizeMode, WatermarkPosition};
    use image::{DynamicImage, Rgb, RgbImage};

    fn raster(width: u32, height: u32) -> IntermediateResult {
        IntermediateResult::Raster(RasterSet::single(DynamicImage::new_rgb8(width, height), ImageFormat::Jpeg))
    }

    fn apply(kind: ActionKind, input: IntermediateResult) -> Result<IntermediateResult> {
        ImageTransformer::new().apply(&Action::new(kind).unwrap(), input)
    }

    fn dims(result: &IntermediateResult) -> (u32, u32) {
        match result {
            IntermediateResult::Raster(set) => set.dimensions().unwrap(),
            IntermediateResult::Document(_) => panic!("expected raster"),
        }
    }

    #[test]
    fn rotate_swaps_dimensions() {
        let out = apply(ActionKind::Rotate { degrees: -90 }, raster(8, 2)).unwrap();
        assert_eq!(dims(&out), (2, 8));
        let out = apply(ActionKind::Rotate { degrees: 180 }, raster(8, 2)).unwrap();
        assert_eq!(dims(&out), (8, 2));
    }

    #[test]
    fn resize_then_convert() {
        let out = apply(
            ActionKind::Resize { mode: ResizeMode::Scale(50.0), enlarge: false },
            raster(20, 10),
        )
        .unwrap();
        let out = apply(ActionKind::ConvertFormat { format: ImageFormat::Png, quality: None }, out).unwrap();
        match out {
            IntermediateResult::Raster(set) => {
                assert_eq!(set.dimensions(), Some((10, 5)));
                assert_eq!(set.format, ImageFormat::Png);
            }
            IntermediateResult::Document(_) => panic!("expected raster"),
        }
    }

    #[test]
    fn images_to_pdf_and_back() {
        let pdf = apply(ActionKind::ImagesToPdf { layout: PdfLayout::default() }, raster(12, 6)).unwrap();
        assert!(matches!(pdf, IntermediateResult::Document(_)));
        let pages = apply(ActionKind::PdfToImages { dpi: 150 }, pdf).unwrap();
        assert_eq!(dims(&pages), (12, 6));
    }

    #[test]
    fn raster_action_on_document_is_unsupported() {
        let doc = IntermediateResult::Document(PdfDocument { bytes: b"%PDF-1.4".to_vec() });
        let err = apply(ActionKind::Rotate { degrees: 90 }, doc).unwrap_err();
        assert!(matches!(err, TransformError::UnsupportedFormat(_)));
    }

    fn watermark_action() -> Action {
        Action::new(ActionKind::Watermark {
            image: "mark.png".into(),
            position: WatermarkPosition::TopLeft,
            opacity: 1.0,
            scale: 1.0,
            margin: 0,
        })
        .unwrap()
    }

    #[test]
    fn watermark_needs_loaded_contents() {
        let err = ImageTransformer::new().apply(&watermark_action(), raster(4, 4)).unwrap_err();
        assert!(matches!(err, TransformError::InvalidParameters(_)));
    }

    #[test]
    fn watermark_uses_loaded_contents() {
        let mark = DynamicImage::ImageRgb8(RgbImage::from_pixel(2, 2, Rgb([0, 0, 255])));
        let mut png = std::io::Cursor::new(Vec::new());
        mark.write_to(&mut png, image::ImageFormat::Png).unwrap();
        let action = watermark_action().with_asset(png.into_inner().into());

        let out = ImageTransformer::new().apply(&action, raster(4, 4)).unwrap();
        match out {
            IntermediateResult::Raster(set) => {
                let px = set.pages[0].to_rgb8().get_pixel(1, 1).0;
                assert!(px[2] > 240 && px[0] < 15, "pixel {px:?}");
            }
            IntermediateResult::Document(_) => panic!("expected raster"),
        }
    }

    #[test]
    fn upscale_uses_the_configured_backend() {
        let out = apply(ActionKind::Upscale { factor: 2, noise: 0 }, raster(3, 4)).unwrap();
        assert_eq!(dims(&out), (6, 8));
    }
}
