//! Iterative JPEG quality search for a target file size.

use image::DynamicImage;
use tracing::debug;
use crate::core::TARGET_SIZE_MAX_QUALITY;
use crate::processing::media::RasterSet;
use crate::utils::{ImageFormat, TransformError};
use super::formats::encode_page;

/// Finds the highest quality in `[min_quality, 95]` whose encoding fits `target_bytes`.
///
/// Binary search bounded by `max_iterations` encodes. If no probe fit, the
/// floor is tried last; failing that, the target is unreachable.
pub fn search_quality(
    page: &DynamicImage,
    target_bytes: u64,
    min_quality: u8,
    max_iterations: u8,
) -> Result<(u8, Vec<u8>), TransformError> {
    let mut lo = min_quality;
    let mut hi = TARGET_SIZE_MAX_QUALITY;
    let mut best: Option<(u8, Vec<u8>)> = None;
    let mut tried_floor = false;

    for _ in 0..max_iterations {
        if lo > hi {
            break;
        }
        let mid = lo + (hi - lo) / 2;
        let bytes = encode_page(page, ImageFormat::Jpeg, mid)?;
        tried_floor |= mid == min_quality;
        if bytes.len() as u64 <= target_bytes {
            best = Some((mid, bytes));
            lo = mid + 1;
        } else if mid == min_quality {
            break;
        } else {
            hi = mid - 1;
        }
    }

    if let Some(found) = best {
        return Ok(found);
    }
    if !tried_floor {
        let bytes = encode_page(page, ImageFormat::Jpeg, min_quality)?;
        if bytes.len() as u64 <= target_bytes {
            return Ok((min_quality, bytes));
        }
    }
    Err(TransformError::exhausted(format!(
        "Cannot reach {} bytes at quality {} or above",
        target_bytes, min_quality
    )))
}

/// Re-encodes every page as JPEG under the target size and pins the bytes
pub fn reduce_file_size(
    mut set: RasterSet,
    target_bytes: u64,
    min_quality: u8,
    max_iterations: u8,
) -> Result<RasterSet, TransformError> {
    let mut encoded = Vec::with_capacity(set.pages.len());
    let mut quality = TARGET_SIZE_MAX_QUALITY;
    for page in &set.pages {
        let (q, bytes) = search_quality(page, target_bytes, min_quality, max_iterations)?;
        debug!("Target {} bytes reached at quality {} ({} bytes)", target_bytes, q, bytes.len());
        quality = quality.min(q);
        encoded.push(bytes);
    }
    set.format = ImageFormat::Jpeg;
    set.quality = quality;
    set.encoded = Some(encoded);
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn noisy(size: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(size, size, |x, y| {
            let v = (x.wrapping_mul(2654435761) ^ y.wrapping_mul(40503)) as u8;
            Rgb([v, v.wrapping_mul(3), v.wrapping_add(91)])
        }))
    }

    #[test]
    fn result_fits_the_target() {
        let page = noisy(64);
        let max = encode_page(&page, ImageFormat::Jpeg, TARGET_SIZE_MAX_QUALITY).unwrap();
        let target = max.len() as u64 / 2;
        let (quality, bytes) = search_quality(&page, target, 5, 12).unwrap();
        assert!(bytes.len() as u64 <= target);
        assert!(quality < TARGET_SIZE_MAX_QUALITY);
    }

    #[test]
    fn generous_target_keeps_max_quality() {
        let (quality, _) = search_quality(&noisy(16), 10 * 1024 * 1024, 10, 12).unwrap();
        assert_eq!(quality, TARGET_SIZE_MAX_QUALITY);
    }

    #[test]
    fn unreachable_target_is_exhausted() {
        let err = search_quality(&noisy(64), 10, 50, 12).unwrap_err();
        assert!(matches!(err, TransformError::ResourceExhausted(_)));
    }

    #[test]
    fn pins_jpeg_bytes() {
        let set = RasterSet::single(noisy(32), ImageFormat::Png);
        let reduced = reduce_file_size(set, 1024 * 1024, 10, 8).unwrap();
        assert_eq!(reduced.format, ImageFormat::Jpeg);
        assert_eq!(reduced.encoded.as_ref().map(Vec::len), Some(1));
    }
}
