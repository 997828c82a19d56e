use std::io::Cursor;
use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use crate::core::Fingerprint;
use crate::utils::{FileIo, TransformError, SOURCE_IMAGE_EXTENSIONS, extension_of};

/// What a source file decodes into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Image,
    Pdf,
}

impl MediaKind {
    /// Classifies by extension first, then by magic bytes
    pub fn detect(path: &Path, bytes: &[u8]) -> Result<Self, TransformError> {
        match extension_of(path).as_deref() {
            Some("pdf") => return Ok(Self::Pdf),
            Some(ext) if SOURCE_IMAGE_EXTENSIONS.contains(&ext) => return Ok(Self::Image),
            _ => {}
        }
        if bytes.starts_with(b"%PDF-") {
            return Ok(Self::Pdf);
        }
        if image::guess_format(bytes).is_ok() {
            return Ok(Self::Image);
        }
        Err(TransformError::unsupported(format!(
            "Unrecognised source file: {}",
            path.display()
        )))
    }
}

/// One input file, read-only once enqueued into a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceItem {
    pub path: PathBuf,
    pub fingerprint: Fingerprint,
    pub kind: MediaKind,
    /// Size of the encoded file in bytes
    pub byte_len: u64,
    /// Pixel dimensions read from the image header, when available
    pub dimensions: Option<(u32, u32)>,
}

impl SourceItem {
    /// Builds a source description from the file's contents.
    ///
    /// Only the image header is parsed. A file whose header cannot be read is
    /// still accepted with unknown dimensions; it fails later, in its own Job.
    pub fn from_bytes(path: impl Into<PathBuf>, bytes: &[u8]) -> Result<Self, TransformError> {
        let path = path.into();
        let kind = MediaKind::detect(&path, bytes)?;
        let dimensions = match kind {
            MediaKind::Image => image::ImageReader::new(Cursor::new(bytes))
                .with_guessed_format()
                .ok()
                .and_then(|reader| reader.into_dimensions().ok()),
            MediaKind::Pdf => None,
        };

        Ok(Self {
            fingerprint: Fingerprint::of_bytes(bytes),
            kind,
            byte_len: bytes.len() as u64,
            dimensions,
            path,
        })
    }

    /// Reads the file through `io` and describes it
    pub fn probe(io: &dyn FileIo, path: impl Into<PathBuf>) -> Result<Self, TransformError> {
        let path = path.into();
        let bytes = io.read_source(&path)?;
        Self::from_bytes(path, &bytes)
    }

    pub fn file_name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }
}
