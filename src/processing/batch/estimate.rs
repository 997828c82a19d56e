//! Peak memory estimate per Job, used for budget admission.

use crate::core::{ActionKind, MediaKind, PipelineStep, SourceItem};
use crate::processing::imaging::target_dimensions;

/// Decoded RGBA8
const BYTES_PER_PIXEL: u64 = 4;
/// Input page, output page and one scratch buffer alive during a step
const WORKING_SET_FACTOR: u64 = 3;
/// Decoded-to-encoded size ratio assumed when the header gave no dimensions
const UNKNOWN_EXPANSION: u64 = 10;
/// Letter page in inches, for rasterized PDF pages
const PAGE_INCHES: (f64, f64) = (8.5, 11.0);

fn pixels(dims: Option<(u32, u32)>) -> u64 {
    dims.map(|(w, h)| w as u64 * h as u64).unwrap_or(0)
}

/// Estimates the peak bytes a Job holds while running its pipeline.
///
/// Walks the steps tracking page dimensions and takes the largest raster the
/// pipeline produces. Sources without known dimensions fall back to a
/// multiple of their encoded size.
pub fn estimate_peak_bytes(source: &SourceItem, steps: &[PipelineStep]) -> u64 {
    let mut dims = source.dimensions;
    let mut peak = pixels(dims);

    for step in steps {
        dims = match step.action.kind() {
            ActionKind::Resize { mode, enlarge } => {
                dims.map(|(w, h)| target_dimensions(w, h, mode, *enlarge))
            }
            ActionKind::Upscale { factor, .. } => {
                let f = *factor as u32;
                dims.map(|(w, h)| (w.saturating_mul(f), h.saturating_mul(f)))
            }
            ActionKind::Rotate { degrees } if degrees.rem_euclid(180) == 90 => {
                dims.map(|(w, h)| (h, w))
            }
            ActionKind::PdfToImages { dpi } => Some((
                (PAGE_INCHES.0 * *dpi as f64).round() as u32,
                (PAGE_INCHES.1 * *dpi as f64).round() as u32,
            )),
            _ => dims,
        };
        peak = peak.max(pixels(dims));
    }

    let raster = peak
        .saturating_mul(BYTES_PER_PIXEL)
        .saturating_mul(WORKING_SET_FACTOR);
    let encoded = match (source.kind, source.dimensions) {
        (MediaKind::Image, Some(_)) => source.byte_len,
        _ => source.byte_len.saturating_mul(UNKNOWN_EXPANSION),
    };
    raster.saturating_add(encoded).max(1)
}
