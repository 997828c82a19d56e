//! Action definitions: the atomic, validated unit of work.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use serde::{Deserialize, Serialize};
use crate::utils::{ImageFormat, QueueError};
use crate::utils::validation::{
    ensure_in_range, ensure_one_of, ensure_positive_dimension, ensure_positive_finite,
};

/// Highest JPEG quality the file-size search will try.
pub const TARGET_SIZE_MAX_QUALITY: u8 = 95;

/// How the target dimensions of a resize are expressed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResizeMode {
    /// Target width in pixels, height follows the aspect ratio
    Width(u32),
    /// Target height in pixels, width follows the aspect ratio
    Height(u32),
    /// Exact output size, aspect ratio is not preserved
    Exact { width: u32, height: u32 },
    /// Scale both sides by a percentage
    Scale(f32),
    /// Longest side becomes this many pixels
    Longest(u32),
    /// Shortest side becomes this many pixels
    Shortest(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum WatermarkPosition {
    TopLeft,
    TopRight,
    Center,
    BottomLeft,
    #[default]
    BottomRight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PageOrientation {
    /// Landscape when the first image on the page is wider than tall
    #[default]
    Auto,
    Portrait,
    Landscape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FitMode {
    /// Scale to fit the cell, preserving aspect ratio
    #[default]
    Fit,
    /// Fill the cell, ignoring aspect ratio
    Stretch,
    /// One pixel per point, clipped to the cell
    Actual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PdfQuality {
    #[default]
    High,
    Medium,
    Low,
}

impl PdfQuality {
    /// JPEG quality used for images embedded in the document
    pub fn jpeg_quality(&self) -> u8 {
        match self {
            Self::High => 95,
            Self::Medium => 80,
            Self::Low => 60,
        }
    }
}

/// Page layout for `ImagesToPdf`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PdfLayout {
    pub orientation: PageOrientation,
    pub fit: FitMode,
    pub images_per_page: u8,
    pub quality: PdfQuality,
}

impl Default for PdfLayout {
    fn default() -> Self {
        Self {
            orientation: PageOrientation::Auto,
            fit: FitMode::Fit,
            images_per_page: 1,
            quality: PdfQuality::High,
        }
    }
}

fn default_enhance_quality() -> u8 { 100 }
fn default_min_quality() -> u8 { 10 }
fn default_max_iterations() -> u8 { 12 }
fn default_opacity() -> f32 { 0.5 }
fn default_watermark_scale() -> f32 { 0.2 }
fn default_margin() -> u32 { 16 }
fn default_dpi() -> u16 { 150 }
fn default_noise() -> u8 { 1 }

/// The closed set of transformations, each with its own parameter schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ActionKind {
    #[serde(rename_all = "camelCase")]
    EnhanceQuality {
        #[serde(default = "default_enhance_quality")]
        quality: u8,
        /// Unsharp-mask sigma, no sharpening when absent
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sharpen: Option<f32>,
    },
    #[serde(rename_all = "camelCase")]
    Resize {
        mode: ResizeMode,
        #[serde(default)]
        enlarge: bool,
    },
    #[serde(rename_all = "camelCase")]
    TargetFileSize {
        target_bytes: u64,
        #[serde(default = "default_min_quality")]
        min_quality: u8,
        #[serde(default = "default_max_iterations")]
        max_iterations: u8,
    },
    #[serde(rename_all = "camelCase")]
    Rotate { degrees: i32 },
    #[serde(rename_all = "camelCase")]
    Watermark {
        image: PathBuf,
        #[serde(default)]
        position: WatermarkPosition,
        #[serde(default = "default_opacity")]
        opacity: f32,
        #[serde(default = "default_watermark_scale")]
        scale: f32,
        #[serde(default = "default_margin")]
        margin: u32,
    },
    #[serde(rename_all = "camelCase")]
    ConvertFormat {
        format: ImageFormat,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        quality: Option<u8>,
    },
    #[serde(rename_all = "camelCase")]
    ImagesToPdf {
        #[serde(default)]
        layout: PdfLayout,
    },
    #[serde(rename_all = "camelCase")]
    PdfToImages {
        #[serde(default = "default_dpi")]
        dpi: u16,
    },
    #[serde(rename_all = "camelCase")]
    Upscale {
        factor: u8,
        #[serde(default = "default_noise")]
        noise: u8,
    },
}

impl ActionKind {
    /// Human readable name, used in logs and progress messages
    pub fn name(&self) -> &'static str {
        match self {
            Self::EnhanceQuality { .. } => "Enhance Quality",
            Self::Resize { .. } => "Resize",
            Self::TargetFileSize { .. } => "Reduce File Size",
            Self::Rotate { .. } => "Rotate",
            Self::Watermark { .. } => "Watermark",
            Self::ConvertFormat { .. } => "Convert Format",
            Self::ImagesToPdf { .. } => "Images to PDF",
            Self::PdfToImages { .. } => "PDF to Images",
            Self::Upscale { .. } => "Upscale",
        }
    }

    /// Checks the parameters against this kind's schema
    pub fn validate(&self) -> Result<(), QueueError> {
        match self {
            Self::EnhanceQuality { quality, sharpen } => {
                ensure_in_range("quality", *quality, 1..=100)?;
                if let Some(sigma) = sharpen {
                    ensure_positive_finite("sharpen", *sigma)?;
                }
            }
            Self::Resize { mode, .. } => match mode {
                ResizeMode::Width(px)
                | ResizeMode::Height(px)
                | ResizeMode::Longest(px)
                | ResizeMode::Shortest(px) => ensure_positive_dimension("Size", *px)?,
                ResizeMode::Exact { width, height } => {
                    ensure_positive_dimension("Width", *width)?;
                    ensure_positive_dimension("Height", *height)?;
                }
                ResizeMode::Scale(percent) => ensure_positive_finite("scale", *percent)?,
            },
            Self::TargetFileSize { target_bytes, min_quality, max_iterations } => {
                if *target_bytes == 0 {
                    return Err(QueueError::invalid("Target size cannot be 0 bytes"));
                }
                ensure_in_range("minimum quality", *min_quality, 1..=TARGET_SIZE_MAX_QUALITY)?;
                ensure_in_range("iteration count", *max_iterations, 1..=32)?;
            }
            Self::Rotate { degrees } => {
                if degrees % 90 != 0 {
                    return Err(QueueError::invalid(format!(
                        "Invalid rotation: {}. Must be a multiple of 90 degrees", degrees
                    )));
                }
            }
            Self::Watermark { image, opacity, scale, .. } => {
                if image.as_os_str().is_empty() {
                    return Err(QueueError::invalid("Watermark image path cannot be empty"));
                }
                ensure_in_range("opacity", *opacity, 0.0..=1.0)?;
                ensure_positive_finite("watermark scale", *scale)?;
                ensure_in_range("watermark scale", *scale, 0.0..=1.0)?;
            }
            Self::ConvertFormat { quality, .. } => {
                if let Some(q) = quality {
                    ensure_in_range("quality", *q, 1..=100)?;
                }
            }
            Self::ImagesToPdf { layout } => {
                ensure_one_of("images per page", layout.images_per_page, &[1, 2, 4, 6])?;
            }
            Self::PdfToImages { dpi } => ensure_in_range("dpi", *dpi, 36..=600)?,
            Self::Upscale { factor, noise } => {
                ensure_in_range("upscale factor", *factor, 2..=4)?;
                ensure_in_range("noise level", *noise, 0..=3)?;
            }
        }
        Ok(())
    }
}

/// A validated action with its enabled flag.
///
/// Actions are plain specifications and the only way to obtain one is through
/// validation. Inside a batch snapshot an action may also carry the contents
/// of the file it references (see [`asset_path`](Self::asset_path)).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawAction")]
pub struct Action {
    kind: ActionKind,
    enabled: bool,
    #[serde(skip)]
    asset: Option<Arc<[u8]>>,
}

/// Unvalidated wire form of [`Action`]
#[derive(Deserialize)]
struct RawAction {
    kind: ActionKind,
    #[serde(default = "enabled_by_default")]
    enabled: bool,
}

fn enabled_by_default() -> bool { true }

impl TryFrom<RawAction> for Action {
    type Error = QueueError;

    fn try_from(raw: RawAction) -> Result<Self, Self::Error> {
        let mut action = Action::new(raw.kind)?;
        action.enabled = raw.enabled;
        Ok(action)
    }
}

impl Action {
    /// Creates an enabled action after validating its parameters
    pub fn new(kind: ActionKind) -> Result<Self, QueueError> {
        kind.validate()?;
        Ok(Self { kind, enabled: true, asset: None })
    }

    pub fn kind(&self) -> &ActionKind {
        &self.kind
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    /// Returns a copy with the enabled flag set
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub(crate) fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// File the action reads besides its input
    pub fn asset_path(&self) -> Option<&Path> {
        match &self.kind {
            ActionKind::Watermark { image, .. } => Some(image),
            _ => None,
        }
    }

    /// Contents of [`asset_path`](Self::asset_path), once loaded for a batch
    pub fn asset(&self) -> Option<&[u8]> {
        self.asset.as_deref()
    }

    pub fn with_asset(mut self, bytes: Arc<[u8]>) -> Self {
        self.asset = Some(bytes);
        self
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params = serde_json::to_value(&self.kind)
            .ok()
            .and_then(|v| v.as_object().cloned())
            .map(|map| {
                map.iter()
                    .filter(|(k, _)| k.as_str() != "type")
                    .map(|(k, v)| format!("{k}={v}"))
                    .collect::<Vec<_>>()
                    .join(", ")
            })
            .unwrap_or_default();
        write!(f, "{} ({})", self.kind.name(), params)?;
        if !self.enabled {
            write!(f, " [disabled]")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resize_requires_positive_dimensions() {
        let err = Action::new(ActionKind::Resize { mode: ResizeMode::Width(0), enlarge: false });
        assert!(matches!(err, Err(QueueError::InvalidParameters(_))));

        let err = Action::new(ActionKind::Resize { mode: ResizeMode::Scale(-50.0), enlarge: false });
        assert!(err.is_err());

        assert!(Action::new(ActionKind::Resize { mode: ResizeMode::Scale(50.0), enlarge: false }).is_ok());
    }

    #[test]
    fn target_size_requires_positive_bytes() {
        let kind = ActionKind::TargetFileSize { target_bytes: 0, min_quality: 10, max_iterations: 8 };
        assert!(Action::new(kind).is_err());
    }

    #[test]
    fn rotation_must_be_quarter_turns() {
        assert!(Action::new(ActionKind::Rotate { degrees: 45 }).is_err());
        assert!(Action::new(ActionKind::Rotate { degrees: -90 }).is_ok());
    }

    #[test]
    fn pdf_layout_accepts_known_grids_only() {
        let layout = PdfLayout { images_per_page: 3, ..PdfLayout::default() };
        assert!(Action::new(ActionKind::ImagesToPdf { layout }).is_err());
    }

    #[test]
    fn deserialization_runs_validation() {
        let ok: Action = serde_json::from_str(
            r#"{"kind":{"type":"upscale","factor":2},"enabled":false}"#,
        )
        .unwrap();
        assert!(!ok.is_enabled());
        assert_eq!(ok.kind(), &ActionKind::Upscale { factor: 2, noise: 1 });

        let bad = serde_json::from_str::<Action>(r#"{"kind":{"type":"upscale","factor":9}}"#);
        assert!(bad.is_err());
    }

    #[test]
    fn display_lists_parameters() {
        let action = Action::new(ActionKind::Rotate { degrees: 90 }).unwrap().with_enabled(false);
        assert_eq!(action.to_string(), "Rotate (degrees=90) [disabled]");
    }
}
