//! Watermark overlay.

use std::path::Path;
use image::imageops::{self, FilterType};
use image::{DynamicImage, RgbaImage};
use crate::core::WatermarkPosition;
use crate::utils::TransformError;

/// Overlay parameters, already validated.
#[derive(Debug, Clone, Copy)]
pub struct WatermarkSpec {
    pub position: WatermarkPosition,
    pub opacity: f32,
    /// Watermark width as a fraction of the page width
    pub scale: f32,
    pub margin: u32,
}

/// Decodes the watermark contents loaded for the batch
pub fn decode_watermark(path: &Path, bytes: &[u8]) -> Result<RgbaImage, TransformError> {
    let image = image::load_from_memory(bytes).map_err(|e| {
        TransformError::corrupt(format!("Cannot decode watermark {}: {}", path.display(), e))
    })?;
    Ok(image.to_rgba8())
}

fn place(position: WatermarkPosition, base: (u32, u32), mark: (u32, u32), margin: u32) -> (i64, i64) {
    let (bw, bh) = (base.0 as i64, base.1 as i64);
    let (mw, mh) = (mark.0 as i64, mark.1 as i64);
    let m = margin as i64;
    match position {
        WatermarkPosition::TopLeft => (m, m),
        WatermarkPosition::TopRight => (bw - mw - m, m),
        WatermarkPosition::Center => ((bw - mw) / 2, (bh - mh) / 2),
        WatermarkPosition::BottomLeft => (m, bh - mh - m),
        WatermarkPosition::BottomRight => (bw - mw - m, bh - mh - m),
    }
}

/// Composites `mark` onto `page`, scaled relative to the page width
pub fn apply_watermark(page: DynamicImage, mark: &RgbaImage, spec: &WatermarkSpec) -> DynamicImage {
    if mark.width() == 0 || mark.height() == 0 {
        return page;
    }
    let target_w = ((page.width() as f32 * spec.scale).round() as u32).max(1);
    let target_h = ((mark.height() as f32 * target_w as f32 / mark.width() as f32).round() as u32).max(1);
    let mut scaled = imageops::resize(mark, target_w, target_h, FilterType::Lanczos3);

    let opacity = spec.opacity.clamp(0.0, 1.0);
    for pixel in scaled.pixels_mut() {
        pixel.0[3] = (pixel.0[3] as f32 * opacity).round() as u8;
    }

    let had_alpha = page.color().has_alpha();
    let mut base = page.to_rgba8();
    let (x, y) = place(spec.position, base.dimensions(), scaled.dimensions(), spec.margin);
    imageops::overlay(&mut base, &scaled, x, y);

    let composed = DynamicImage::ImageRgba8(base);
    if had_alpha {
        composed
    } else {
        DynamicImage::ImageRgb8(composed.to_rgb8())
    }
}
