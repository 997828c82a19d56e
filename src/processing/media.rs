//! In-memory representation of a Job between actions.

use image::DynamicImage;
use crate::utils::{ImageFormat, TransformError};

/// One or more decoded raster pages plus the encoding they will be written with.
#[derive(Debug, Clone)]
pub struct RasterSet {
    pub pages: Vec<DynamicImage>,
    pub format: ImageFormat,
    pub quality: u8,
    /// Encoded bytes pinned by a size-targeting step, one entry per page.
    ///
    /// Cleared by every later step that changes pixels or encoding.
    pub encoded: Option<Vec<Vec<u8>>>,
}

impl RasterSet {
    pub fn single(image: DynamicImage, format: ImageFormat) -> Self {
        Self {
            pages: vec![image],
            format,
            quality: format.default_quality(),
            encoded: None,
        }
    }

    /// Dimensions of the first page
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        self.pages.first().map(|page| (page.width(), page.height()))
    }
}

/// A PDF document held as its encoded bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfDocument {
    pub bytes: Vec<u8>,
}

/// Value flowing from one action to the next inside a Job.
#[derive(Debug, Clone)]
pub enum IntermediateResult {
    Raster(RasterSet),
    Document(PdfDocument),
}

impl IntermediateResult {
    /// Approximate heap footprint, used for cache accounting
    pub fn size_bytes(&self) -> u64 {
        match self {
            Self::Raster(set) => {
                let pixels: u64 = set.pages.iter().map(|p| p.as_bytes().len() as u64).sum();
                let pinned: u64 = set
                    .encoded
                    .iter()
                    .flatten()
                    .map(|bytes| bytes.len() as u64)
                    .sum();
                pixels + pinned
            }
            Self::Document(doc) => doc.bytes.len() as u64,
        }
    }

    pub fn page_count(&self) -> usize {
        match self {
            Self::Raster(set) => set.pages.len(),
            Self::Document(_) => 1,
        }
    }

    pub fn into_raster(self, action: &str) -> Result<RasterSet, TransformError> {
        match self {
            Self::Raster(set) => Ok(set),
            Self::Document(_) => Err(TransformError::unsupported(format!(
                "{action} needs raster input, got a PDF document"
            ))),
        }
    }

    /// Applies `f` to every page, dropping pinned encodings
    pub fn map_pages<F>(self, action: &str, mut f: F) -> Result<Self, TransformError>
    where
        F: FnMut(DynamicImage) -> Result<DynamicImage, TransformError>,
    {
        let mut set = self.into_raster(action)?;
        set.pages = set.pages.into_iter().map(&mut f).collect::<Result<_, _>>()?;
        set.encoded = None;
        Ok(Self::Raster(set))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::RgbaImage;

    #[test]
    fn size_counts_pixels_and_pinned_bytes() {
        let mut set = RasterSet::single(DynamicImage::ImageRgba8(RgbaImage::new(4, 4)), ImageFormat::Png);
        set.encoded = Some(vec![vec![0u8; 10]]);
        assert_eq!(IntermediateResult::Raster(set).size_bytes(), 4 * 4 * 4 + 10);
    }

    #[test]
    fn raster_steps_reject_documents() {
        let doc = IntermediateResult::Document(PdfDocument { bytes: b"%PDF-1.4".to_vec() });
        let err = doc.map_pages("Rotate", Ok).unwrap_err();
        assert!(matches!(err, TransformError::UnsupportedFormat(_)));
    }

    #[test]
    fn mapping_clears_pinned_encoding() {
        let mut set = RasterSet::single(DynamicImage::ImageRgba8(RgbaImage::new(2, 2)), ImageFormat::Jpeg);
        set.encoded = Some(vec![vec![1, 2, 3]]);
        let mapped = IntermediateResult::Raster(set).map_pages("Rotate", |p| Ok(p.rotate90())).unwrap();
        match mapped {
            IntermediateResult::Raster(set) => assert!(set.encoded.is_none()),
            IntermediateResult::Document(_) => panic!("expected raster"),
        }
    }
}
