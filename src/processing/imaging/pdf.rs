//! PDF composition and rasterization.
//!
//! [`BuiltinPdfCodec`] writes documents itself, embedding every image as a
//! JPEG stream, and can recover the JPEG images embedded in a document. Full
//! page rendering needs the `pdfium` feature.

use image::DynamicImage;
use tracing::debug;
use crate::core::{FitMode, PageOrientation, PdfLayout, PdfQuality};
use crate::utils::{ImageFormat, TransformError};
use super::formats::encode_page;

type Result<T> = std::result::Result<T, TransformError>;

/// US Letter in points
const LETTER: (f32, f32) = (612.0, 792.0);

/// Turns raster pages into a PDF document and back.
pub trait PdfCodec: Send + Sync {
    fn compose(&self, pages: &[DynamicImage], layout: &PdfLayout) -> Result<Vec<u8>>;
    fn rasterize(&self, document: &[u8], dpi: u16) -> Result<Vec<DynamicImage>>;
}

/// Cell rectangles as fractions of the page (x1, y1, x2, y2), origin top-left
fn grid(count: usize) -> &'static [(f32, f32, f32, f32)] {
    static ONE: [(f32, f32, f32, f32); 1] = [(0.0, 0.0, 1.0, 1.0)];
    static TWO: [(f32, f32, f32, f32); 2] = [(0.0, 0.0, 0.5, 1.0), (0.5, 0.0, 1.0, 1.0)];
    static FOUR: [(f32, f32, f32, f32); 4] = [
        (0.0, 0.0, 0.5, 0.5),
        (0.5, 0.0, 1.0, 0.5),
        (0.0, 0.5, 0.5, 1.0),
        (0.5, 0.5, 1.0, 1.0),
    ];
    static SIX: [(f32, f32, f32, f32); 6] = [
        (0.0, 0.0, 0.33, 0.5),
        (0.33, 0.0, 0.66, 0.5),
        (0.66, 0.0, 1.0, 0.5),
        (0.0, 0.5, 0.33, 1.0),
        (0.33, 0.5, 0.66, 1.0),
        (0.66, 0.5, 1.0, 1.0),
    ];
    match count {
        0 | 1 => &ONE,
        2 => &TWO,
        3 | 4 => &FOUR[..count.max(1)],
        _ => &SIX[..count.min(6)],
    }
}

/// Placement of one image on a page, in points with origin top-left
#[derive(Debug, Clone, Copy, PartialEq)]
struct Placement {
    x: f32,
    y: f32,
    w: f32,
    h: f32,
}

fn place_in_cell(cell: (f32, f32, f32, f32), page: (f32, f32), image: (u32, u32), fit: FitMode, quality: PdfQuality) -> Placement {
    let (x1, y1, x2, y2) = cell;
    let rect_w = (x2 - x1) * page.0;
    let rect_h = (y2 - y1) * page.1;
    let (img_w, img_h) = (image.0.max(1) as f32, image.1.max(1) as f32);

    let (mut w, mut h) = match fit {
        FitMode::Stretch => (rect_w, rect_h),
        FitMode::Actual => (rect_w.min(img_w), rect_h.min(img_h)),
        FitMode::Fit => {
            let img_ratio = img_w / img_h;
            if img_ratio > rect_w / rect_h {
                (rect_w, rect_w / img_ratio)
            } else {
                (rect_h * img_ratio, rect_h)
            }
        }
    };
    if quality == PdfQuality::Low {
        w *= 0.75;
        h *= 0.75;
    }

    Placement {
        x: x1 * page.0 + (rect_w - w) / 2.0,
        y: y1 * page.1 + (rect_h - h) / 2.0,
        w,
        h,
    }
}

fn page_size(orientation: PageOrientation, first: &DynamicImage) -> (f32, f32) {
    let landscape = match orientation {
        PageOrientation::Auto => first.width() > first.height(),
        PageOrientation::Portrait => false,
        PageOrientation::Landscape => true,
    };
    if landscape { (LETTER.1, LETTER.0) } else { LETTER }
}

/// Minimal PDF 1.4 writer.
struct PdfWriter {
    objects: Vec<Vec<u8>>,
}

impl PdfWriter {
    fn new() -> Self {
        // 1 = catalog, 2 = page tree, filled in by finish()
        Self { objects: vec![Vec::new(), Vec::new()] }
    }

    fn add(&mut self, body: Vec<u8>) -> usize {
        self.objects.push(body);
        self.objects.len()
    }

    fn stream(dict: &str, data: &[u8]) -> Vec<u8> {
        let mut body = format!("<< {dict} /Length {} >>\nstream\n", data.len()).into_bytes();
        body.extend_from_slice(data);
        body.extend_from_slice(b"\nendstream");
        body
    }

    fn finish(mut self, pages: &[usize]) -> Vec<u8> {
        let kids = pages.iter().map(|id| format!("{id} 0 R")).collect::<Vec<_>>().join(" ");
        self.objects[0] = b"<< /Type /Catalog /Pages 2 0 R >>".to_vec();
        self.objects[1] = format!("<< /Type /Pages /Kids [{kids}] /Count {} >>", pages.len()).into_bytes();

        let mut out = b"%PDF-1.4\n%\xE2\xE3\xCF\xD3\n".to_vec();
        let mut offsets = Vec::with_capacity(self.objects.len());
        for (i, body) in self.objects.iter().enumerate() {
            offsets.push(out.len());
            out.extend_from_slice(format!("{} 0 obj\n", i + 1).as_bytes());
            out.extend_from_slice(body);
            out.extend_from_slice(b"\nendobj\n");
        }

        let xref = out.len();
        out.extend_from_slice(format!("xref\n0 {}\n0000000000 65535 f \n", self.objects.len() + 1).as_bytes());
        for offset in offsets {
            out.extend_from_slice(format!("{offset:010} 00000 n \n").as_bytes());
        }
        out.extend_from_slice(
            format!(
                "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
                self.objects.len() + 1,
                xref
            )
            .as_bytes(),
        );
        out
    }
}

/// Pure Rust codec: DCT-encoded pages in, embedded JPEG images out.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinPdfCodec;

impl PdfCodec for BuiltinPdfCodec {
    fn compose(&self, pages: &[DynamicImage], layout: &PdfLayout) -> Result<Vec<u8>> {
        if pages.is_empty() {
            return Err(TransformError::invalid("Cannot build a PDF from zero images"));
        }
        let per_page = layout.images_per_page.max(1) as usize;
        let jpeg_quality = layout.quality.jpeg_quality();
        let mut writer = PdfWriter::new();
        let mut page_ids = Vec::new();

        for chunk in pages.chunks(per_page) {
            let size = page_size(layout.orientation, &chunk[0]);
            let mut content = String::new();
            let mut xobjects = Vec::new();

            for (k, (image, cell)) in chunk.iter().zip(grid(chunk.len())).enumerate() {
                let jpeg = encode_page(image, ImageFormat::Jpeg, jpeg_quality)?;
                let id = writer.add(PdfWriter::stream(
                    &format!(
                        "/Type /XObject /Subtype /Image /Width {} /Height {} /ColorSpace /DeviceRGB /BitsPerComponent 8 /Filter /DCTDecode",
                        image.width(),
                        image.height()
                    ),
                    &jpeg,
                ));
                xobjects.push(format!("/Im{k} {id} 0 R"));

                let at = place_in_cell(*cell, size, (image.width(), image.height()), layout.fit, layout.quality);
                // PDF user space has its origin at the bottom-left
                let y = size.1 - at.y - at.h;
                content.push_str(&format!(
                    "q {:.2} 0 0 {:.2} {:.2} {:.2} cm /Im{k} Do Q\n",
                    at.w, at.h, at.x, y
                ));
            }

            let contents = writer.add(PdfWriter::stream("", content.as_bytes()));
            let page = writer.add(
                format!(
                    "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 {:.0} {:.0}] /Resources << /XObject << {} >> >> /Contents {} 0 R >>",
                    size.0,
                    size.1,
                    xobjects.join(" "),
                    contents
                )
                .into_bytes(),
            );
            page_ids.push(page);
        }

        debug!("Composed {} images onto {} PDF pages", pages.len(), page_ids.len());
        Ok(writer.finish(&page_ids))
    }

    fn rasterize(&self, document: &[u8], _dpi: u16) -> Result<Vec<DynamicImage>> {
        let images = extract_jpeg_streams(document)
            .into_iter()
            .map(|data| image::load_from_memory_with_format(data, image::ImageFormat::Jpeg))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| TransformError::corrupt(format!("Embedded page image is unreadable: {e}")))?;
        if images.is_empty() {
            return Err(TransformError::unsupported(
                "Document has no embedded JPEG pages; rendering it requires the pdfium feature",
            ));
        }
        Ok(images)
    }
}

fn find(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|w| w == needle)
        .map(|pos| pos + from)
}

/// Data of every `/DCTDecode` stream, in document order
fn extract_jpeg_streams(document: &[u8]) -> Vec<&[u8]> {
    let mut streams = Vec::new();
    let mut cursor = 0;
    while let Some(filter) = find(document, b"/DCTDecode", cursor) {
        let Some(start) = find(document, b"stream", filter) else { break };
        let mut data_start = start + b"stream".len();
        if document.get(data_start) == Some(&b'\r') {
            data_start += 1;
        }
        if document.get(data_start) == Some(&b'\n') {
            data_start += 1;
        }
        let Some(end) = find(document, b"endstream", data_start) else { break };
        let mut data = &document[data_start..end];
        while let Some((last, rest)) = data.split_last() {
            if *last == b'\n' || *last == b'\r' {
                data = rest;
            } else {
                break;
            }
        }
        streams.push(data);
        cursor = end + b"endstream".len();
    }
    streams
}

#[cfg(feature = "pdfium")]
pub use pdfium::PdfiumCodec;

#[cfg(feature = "pdfium")]
mod pdfium {
    use image::DynamicImage;
    use lazy_static::lazy_static;
    use pdfium_render::prelude::{PdfRenderConfig, Pdfium};
    use tracing::error;
    use crate::core::PdfLayout;
    use crate::utils::TransformError;
    use super::{BuiltinPdfCodec, PdfCodec, Result};

    lazy_static! {
        static ref PDFIUM: Option<Pdfium> = Pdfium::bind_to_system_library()
            .map(Pdfium::new)
            .map_err(|err| error!("Failed to bind pdfium: {err:#?}"))
            .ok();
    }

    /// Renders pages through the system pdfium library; composing stays builtin.
    #[derive(Debug, Default, Clone, Copy)]
    pub struct PdfiumCodec;

    impl PdfCodec for PdfiumCodec {
        fn compose(&self, pages: &[DynamicImage], layout: &PdfLayout) -> Result<Vec<u8>> {
            BuiltinPdfCodec.compose(pages, layout)
        }

        fn rasterize(&self, document: &[u8], dpi: u16) -> Result<Vec<DynamicImage>> {
            let pdfium = PDFIUM
                .as_ref()
                .ok_or_else(|| TransformError::unsupported("pdfium library is not available"))?;
            let doc = pdfium
                .load_pdf_from_byte_slice(document, None)
                .map_err(|e| TransformError::corrupt(format!("Failed to open PDF: {e}")))?;

            let mut images = Vec::new();
            for page in doc.pages().iter() {
                let width_px = (page.width().value / 72.0 * dpi as f32).round() as i32;
                let config = PdfRenderConfig::new().set_target_width(width_px.max(1));
                let bitmap = page
                    .render_with_config(&config)
                    .map_err(|e| TransformError::corrupt(format!("Failed to render page: {e}")))?;
                images.push(bitmap.as_image());
            }
            Ok(images)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn page(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([200, 10, 10])))
    }

    #[test]
    fn composes_one_pdf_page_per_chunk() {
        let layout = PdfLayout { images_per_page: 4, ..PdfLayout::default() };
        let pages: Vec<_> = (0..5).map(|_| page(20, 10)).collect();
        let pdf = BuiltinPdfCodec.compose(&pages, &layout).unwrap();
        assert!(pdf.starts_with(b"%PDF-1.4"));
        let text = String::from_utf8_lossy(&pdf);
        assert!(text.contains("/Count 2"));
        assert!(text.ends_with("%%EOF\n"));
    }

    #[test]
    fn embedded_images_come_back_out() {
        let pages = vec![page(30, 20), page(10, 40)];
        let pdf = BuiltinPdfCodec.compose(&pages, &PdfLayout::default()).unwrap();
        let images = BuiltinPdfCodec.rasterize(&pdf, 150).unwrap();
        let sizes: Vec<_> = images.iter().map(|i| (i.width(), i.height())).collect();
        assert_eq!(sizes, vec![(30, 20), (10, 40)]);
    }

    #[test]
    fn fit_mode_preserves_aspect_ratio() {
        let at = place_in_cell((0.0, 0.0, 1.0, 1.0), LETTER, (200, 100), FitMode::Fit, PdfQuality::High);
        assert!((at.w - 612.0).abs() < 0.01);
        assert!((at.h - 306.0).abs() < 0.01);
        assert!((at.y - (792.0 - 306.0) / 2.0).abs() < 0.01);
    }

    #[test]
    fn auto_orientation_follows_first_image() {
        assert_eq!(page_size(PageOrientation::Auto, &page(30, 10)), (792.0, 612.0));
        assert_eq!(page_size(PageOrientation::Auto, &page(10, 30)), LETTER);
    }

    #[test]
    fn document_without_images_needs_pdfium() {
        let err = BuiltinPdfCodec.rasterize(b"%PDF-1.4\n%%EOF\n", 150).unwrap_err();
        assert!(matches!(err, TransformError::UnsupportedFormat(_)));
    }
}
