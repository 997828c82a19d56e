//! File I/O collaborator and output path resolution.

use std::path::{Path, PathBuf};
use serde::{Deserialize, Serialize};
use sysinfo::Disks;
use tracing::debug;
use crate::utils::TransformError;

/// Reads sources and writes finished artifacts.
///
/// Called from blocking worker threads, never from the async runtime.
pub trait FileIo: Send + Sync {
    fn read_source(&self, path: &Path) -> Result<Vec<u8>, TransformError>;
    fn write_output(&self, path: &Path, bytes: &[u8]) -> Result<(), TransformError>;
}

/// `FileIo` backed by the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct FsIo;

impl FileIo for FsIo {
    fn read_source(&self, path: &Path) -> Result<Vec<u8>, TransformError> {
        std::fs::read(path).map_err(|e| {
            TransformError::io(format!("Cannot read '{}': {}", path.display(), e))
        })
    }

    fn write_output(&self, path: &Path, bytes: &[u8]) -> Result<(), TransformError> {
        let parent = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
        std::fs::create_dir_all(parent).map_err(|e| {
            TransformError::io(format!("Cannot create output directory: {e}"))
        })?;
        ensure_free_space(parent, bytes.len() as u64)?;
        std::fs::write(path, bytes).map_err(|e| {
            TransformError::io(format!("Cannot write '{}': {}", path.display(), e))
        })?;
        debug!("Wrote {} bytes to {}", bytes.len(), path.display());
        Ok(())
    }
}

/// Free bytes on the volume holding `dir`, picked by the longest matching mount point
fn free_space_on(dir: &Path, volumes: &[(PathBuf, u64)]) -> Option<u64> {
    volumes
        .iter()
        .filter(|(mount, _)| dir.starts_with(mount))
        .max_by_key(|(mount, _)| mount.components().count())
        .map(|(_, free)| *free)
}

/// Refuses a write that would not fit on the target volume.
///
/// Volumes the system does not report are not checked.
fn ensure_free_space(dir: &Path, needed: u64) -> Result<(), TransformError> {
    let Ok(dir) = dir.canonicalize() else {
        return Ok(());
    };
    let disks = Disks::new_with_refreshed_list();
    let volumes: Vec<(PathBuf, u64)> = disks
        .list()
        .iter()
        .map(|disk| (disk.mount_point().to_path_buf(), disk.available_space()))
        .collect();

    match free_space_on(&dir, &volumes) {
        Some(free) if free < needed => Err(TransformError::io(format!(
            "Insufficient disk space in {}: {} bytes needed, {} available",
            dir.display(),
            needed,
            free
        ))),
        Some(_) => Ok(()),
        None => {
            debug!("No volume information for {}", dir.display());
            Ok(())
        }
    }
}

/// How output files are named relative to their source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(tag = "scheme", content = "value", rename_all = "camelCase")]
pub enum NamingScheme {
    /// Keep the source file name (extension follows the output format)
    #[default]
    Same,
    /// `{stem}_{suffix}.{ext}`
    Suffix(String),
    /// `{stem}_{n}.{ext}` with the 1-based submission index
    Sequential,
}

/// Where and under which names a batch writes its outputs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub directory: PathBuf,
    pub naming: NamingScheme,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
            naming: NamingScheme::Same,
        }
    }
}

impl OutputSettings {
    /// Resolves the output path for one encoded artifact.
    ///
    /// `sequence` is the 1-based submission index of the Job, `page` the 1-based
    /// page number when a Job produces more than one file.
    pub fn resolve(
        &self,
        source: &Path,
        sequence: usize,
        page: Option<usize>,
        extension: &str,
    ) -> Result<PathBuf, TransformError> {
        let stem = source
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or("output");

        let mut name = match &self.naming {
            NamingScheme::Same => stem.to_string(),
            NamingScheme::Suffix(suffix) => format!("{stem}_{suffix}"),
            NamingScheme::Sequential => format!("{stem}_{sequence}"),
        };
        if let Some(page) = page {
            name.push_str(&format!("_page_{page}"));
        }

        let path = self.directory.join(format!("{name}.{extension}"));
        if path == source {
            return Err(TransformError::io(format!(
                "Refusing to overwrite source file {}",
                source.display()
            )));
        }
        Ok(path)
    }
}
