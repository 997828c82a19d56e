//! Upscaling backends.

use std::path::PathBuf;
use std::process::Command;
use image::DynamicImage;
use image::imageops::FilterType;
use tracing::{debug, info};
use crate::utils::TransformError;

type Result<T> = std::result::Result<T, TransformError>;

/// Enlarges one page by an integer factor with optional noise reduction.
pub trait Upscaler: Send + Sync {
    fn upscale(&self, page: &DynamicImage, factor: u8, noise: u8) -> Result<DynamicImage>;
}

fn checked_size(page: &DynamicImage, factor: u8) -> Result<(u32, u32)> {
    let factor = factor as u32;
    match (page.width().checked_mul(factor), page.height().checked_mul(factor)) {
        (Some(w), Some(h)) => Ok((w, h)),
        _ => Err(TransformError::exhausted(format!(
            "Upscaling {}x{} by {} overflows the image size",
            page.width(),
            page.height(),
            factor
        ))),
    }
}

/// Lanczos3 resampling; noise levels map to a light Gaussian blur.
#[derive(Debug, Default, Clone, Copy)]
pub struct ResampleUpscaler;

impl Upscaler for ResampleUpscaler {
    fn upscale(&self, page: &DynamicImage, factor: u8, noise: u8) -> Result<DynamicImage> {
        let (width, height) = checked_size(page, factor)?;
        let upscaled = page.resize_exact(width, height, FilterType::Lanczos3);
        if noise == 0 {
            return Ok(upscaled);
        }
        Ok(upscaled.blur(noise as f32 * 0.4))
    }
}

/// Runs an external `waifu2x-converter-cpp` compatible binary per page.
#[derive(Debug, Clone)]
pub struct Waifu2xUpscaler {
    binary: PathBuf,
}

impl Waifu2xUpscaler {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self { binary: binary.into() }
    }
}

impl Upscaler for Waifu2xUpscaler {
    fn upscale(&self, page: &DynamicImage, factor: u8, noise: u8) -> Result<DynamicImage> {
        checked_size(page, factor)?;
        let workdir = tempfile::tempdir()
            .map_err(|e| TransformError::io(format!("Failed to create temp directory: {e}")))?;
        let input = workdir.path().join("input.png");
        let output = workdir.path().join("output.png");
        page.save_with_format(&input, image::ImageFormat::Png)?;

        info!("Executing {} for a {}x upscale", self.binary.display(), factor);
        let result = Command::new(&self.binary)
            .arg("-i")
            .arg(&input)
            .arg("-o")
            .arg(&output)
            .args(["-s", &factor.to_string(), "-n", &noise.to_string()])
            .output()
            .map_err(|e| {
                TransformError::io(format!("Failed to execute {}: {}", self.binary.display(), e))
            })?;

        if !result.status.success() {
            return Err(TransformError::io(format!(
                "{} failed with exit code {:?}: {}",
                self.binary.display(),
                result.status.code(),
                String::from_utf8_lossy(&result.stderr).trim()
            )));
        }
        debug!("waifu2x output: {}", String::from_utf8_lossy(&result.stdout).trim());

        image::open(&output).map_err(|e| {
            TransformError::corrupt(format!("Upscaler produced an unreadable image: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_multiplies_dimensions() {
        let page = DynamicImage::new_rgb8(7, 3);
        let out = ResampleUpscaler.upscale(&page, 3, 1).unwrap();
        assert_eq!((out.width(), out.height()), (21, 9));
    }

    #[test]
    fn missing_binary_is_io_failure() {
        let upscaler = Waifu2xUpscaler::new("/nonexistent/waifu2x-converter-cpp");
        let err = upscaler.upscale(&DynamicImage::new_rgb8(2, 2), 2, 0).unwrap_err();
        assert!(matches!(err, TransformError::IoFailure(_)));
    }
}
