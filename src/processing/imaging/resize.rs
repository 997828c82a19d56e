//! Resize logic mapping resize modes to `image` operations.

use image::DynamicImage;
use image::imageops::FilterType;
use crate::core::ResizeMode;

/// Computes the output size of a resize.
///
/// Width, height, longest and shortest modes preserve the aspect ratio and
/// never enlarge unless `enlarge` is set. Exact and scale modes state the
/// output size directly and always apply.
pub fn target_dimensions(width: u32, height: u32, mode: &ResizeMode, enlarge: bool) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }
    match *mode {
        ResizeMode::Exact { width: w, height: h } => (w, h),
        ResizeMode::Scale(percent) => (
            scaled(width, percent as f64 / 100.0),
            scaled(height, percent as f64 / 100.0),
        ),
        ResizeMode::Width(target) => by_width(width, height, target, enlarge),
        ResizeMode::Height(target) => by_height(width, height, target, enlarge),
        ResizeMode::Longest(target) => {
            if width >= height {
                by_width(width, height, target, enlarge)
            } else {
                by_height(width, height, target, enlarge)
            }
        }
        ResizeMode::Shortest(target) => {
            if width <= height {
                by_width(width, height, target, enlarge)
            } else {
                by_height(width, height, target, enlarge)
            }
        }
    }
}

fn scaled(side: u32, factor: f64) -> u32 {
    ((side as f64 * factor).round() as u32).max(1)
}

fn by_width(width: u32, height: u32, target: u32, enlarge: bool) -> (u32, u32) {
    if target >= width && !enlarge {
        return (width, height);
    }
    (target, scaled(height, target as f64 / width as f64))
}

fn by_height(width: u32, height: u32, target: u32, enlarge: bool) -> (u32, u32) {
    if target >= height && !enlarge {
        return (width, height);
    }
    (scaled(width, target as f64 / height as f64), target)
}

/// Applies the resize to `image` with a Lanczos3 filter.
///
/// Returns the image unchanged when the target size equals the current one.
pub fn apply_resize(image: DynamicImage, mode: &ResizeMode, enlarge: bool) -> DynamicImage {
    let (width, height) = target_dimensions(image.width(), image.height(), mode, enlarge);
    if (width, height) == (image.width(), image.height()) {
        return image;
    }
    image.resize_exact(width, height, FilterType::Lanczos3)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn width_mode_keeps_aspect_ratio() {
        assert_eq!(target_dimensions(400, 200, &ResizeMode::Width(100), false), (100, 50));
    }

    #[test]
    fn does_not_enlarge_by_default() {
        assert_eq!(target_dimensions(100, 50, &ResizeMode::Width(400), false), (100, 50));
        assert_eq!(target_dimensions(100, 50, &ResizeMode::Width(400), true), (400, 200));
    }

    #[test]
    fn longest_and_shortest_pick_the_right_side() {
        assert_eq!(target_dimensions(300, 600, &ResizeMode::Longest(100), false), (50, 100));
        assert_eq!(target_dimensions(300, 600, &ResizeMode::Shortest(100), false), (100, 200));
    }

    #[test]
    fn scale_and_exact_always_apply() {
        assert_eq!(target_dimensions(10, 10, &ResizeMode::Scale(50.0), false), (5, 5));
        assert_eq!(target_dimensions(10, 10, &ResizeMode::Scale(250.0), false), (25, 25));
        assert_eq!(
            target_dimensions(10, 10, &ResizeMode::Exact { width: 30, height: 7 }, false),
            (30, 7)
        );
    }

    #[test]
    fn tiny_scale_never_reaches_zero() {
        assert_eq!(target_dimensions(3, 3, &ResizeMode::Scale(1.0), false), (1, 1));
    }

    #[test]
    fn apply_matches_computed_size() {
        let image = DynamicImage::new_rgb8(40, 20);
        let resized = apply_resize(image, &ResizeMode::Height(10), false);
        assert_eq!((resized.width(), resized.height()), (20, 10));
    }
}
