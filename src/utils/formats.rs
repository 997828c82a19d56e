use serde::{Deserialize, Serialize};
use std::str::FromStr;
use crate::utils::TransformError;

/// Raster formats the output writer can encode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    WebP,
    Bmp,
    Tiff,
}

impl ImageFormat {
    /// Get the default quality value for this format
    pub fn default_quality(&self) -> u8 {
        match self {
            Self::Jpeg => 92,
            // Lossless encoders ignore quality
            Self::Png | Self::WebP | Self::Bmp | Self::Tiff => 100,
        }
    }

    /// Whether the quality setting has any effect on the encoded bytes
    pub fn is_lossy(&self) -> bool {
        matches!(self, Self::Jpeg)
    }

    /// Get file extensions associated with this format
    pub fn extensions(&self) -> &[&str] {
        match self {
            Self::Jpeg => &["jpg", "jpeg"],
            Self::Png => &["png"],
            Self::WebP => &["webp"],
            Self::Bmp => &["bmp"],
            Self::Tiff => &["tif", "tiff"],
        }
    }

    /// Check if the extension matches this format
    pub fn matches_extension(&self, ext: &str) -> bool {
        let ext = ext.to_lowercase();
        self.extensions().contains(&ext.as_str())
    }

    /// Get the primary extension for this format
    pub fn primary_extension(&self) -> &str {
        self.extensions()[0]
    }

    /// The matching codec identifier in the `image` crate
    pub fn codec(&self) -> image::ImageFormat {
        match self {
            Self::Jpeg => image::ImageFormat::Jpeg,
            Self::Png => image::ImageFormat::Png,
            Self::WebP => image::ImageFormat::WebP,
            Self::Bmp => image::ImageFormat::Bmp,
            Self::Tiff => image::ImageFormat::Tiff,
        }
    }

    /// Maps a decoded format back to an encodable one.
    ///
    /// Formats the writer cannot produce (GIF, ICO, ...) fall back to PNG so a
    /// pipeline without a `ConvertFormat` step still has somewhere to go.
    pub fn from_codec(format: image::ImageFormat) -> Self {
        match format {
            image::ImageFormat::Jpeg => Self::Jpeg,
            image::ImageFormat::WebP => Self::WebP,
            image::ImageFormat::Bmp => Self::Bmp,
            image::ImageFormat::Tiff => Self::Tiff,
            _ => Self::Png,
        }
    }
}

impl FromStr for ImageFormat {
    type Err = TransformError;

    fn from_str(ext: &str) -> Result<Self, Self::Err> {
        let ext = ext.to_lowercase();
        match ext.as_str() {
            "jpg" | "jpeg" => Ok(Self::Jpeg),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::WebP),
            "bmp" => Ok(Self::Bmp),
            "tif" | "tiff" => Ok(Self::Tiff),
            _ => Err(TransformError::unsupported(format!(
                "Unsupported image format: {}", ext
            ))),
        }
    }
}

/// Extensions accepted as decodable image sources
pub const SOURCE_IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "webp", "bmp", "tif", "tiff", "gif",
];

/// Get the lowercase extension of a path, if any
pub fn extension_of(path: &std::path::Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
}
