//! Shared test harness for integration tests.
//!
//! Provides [`TestHarness`], an [`Engine`] wired to an in-memory [`MemoryIo`],
//! plus generators for tiny source images.

#![allow(dead_code)]

use std::collections::HashMap;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use image::{DynamicImage, Rgb, RgbImage};
use parking_lot::Mutex;
use tokio::sync::broadcast;

use image_batch_lib::core::{
    Action, ActionKind, ActionQueue, Engine, EngineConfig, JobId, ProgressEvent, SourceItem,
};
use image_batch_lib::utils::{FileIo, OutputSettings, TransformError};

/// `FileIo` double keeping every file in memory.
#[derive(Default)]
pub struct MemoryIo {
    files: Mutex<HashMap<PathBuf, Vec<u8>>>,
}

impl MemoryIo {
    pub fn insert(&self, path: impl Into<PathBuf>, bytes: Vec<u8>) {
        self.files.lock().insert(path.into(), bytes);
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.files.lock().get(path.as_ref()).cloned()
    }

    /// Paths under `dir`, sorted
    pub fn files_in(&self, dir: impl AsRef<Path>) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self
            .files
            .lock()
            .keys()
            .filter(|p| p.starts_with(dir.as_ref()))
            .cloned()
            .collect();
        paths.sort();
        paths
    }
}

impl FileIo for MemoryIo {
    fn read_source(&self, path: &Path) -> Result<Vec<u8>, TransformError> {
        self.get(path)
            .ok_or_else(|| TransformError::io(format!("No such file: {}", path.display())))
    }

    fn write_output(&self, path: &Path, bytes: &[u8]) -> Result<(), TransformError> {
        self.insert(path, bytes.to_vec());
        Ok(())
    }
}

/// A small image whose pixels depend on `seed`, so distinct seeds fingerprint differently
pub fn test_image(width: u32, height: u32, seed: u8) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
        Rgb([
            (x as u8).wrapping_mul(31).wrapping_add(seed),
            (y as u8).wrapping_mul(17),
            seed.wrapping_mul(7),
        ])
    }))
}

pub fn encode(image: &DynamicImage, format: image::ImageFormat) -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    image.write_to(&mut out, format).expect("encode test image");
    out.into_inner()
}

pub fn jpeg_bytes(width: u32, height: u32, seed: u8) -> Vec<u8> {
    encode(&test_image(width, height, seed), image::ImageFormat::Jpeg)
}

pub fn png_bytes(width: u32, height: u32, seed: u8) -> Vec<u8> {
    encode(&test_image(width, height, seed), image::ImageFormat::Png)
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        parallelism: 4,
        output: OutputSettings {
            directory: PathBuf::from("out"),
            ..OutputSettings::default()
        },
        ..EngineConfig::default()
    }
}

pub fn queue(kinds: Vec<ActionKind>) -> ActionQueue {
    let mut queue = ActionQueue::new();
    for kind in kinds {
        queue.push(Action::new(kind).expect("valid test action"));
    }
    queue
}

/// Everything currently buffered on the receiver
pub fn drain(rx: &mut broadcast::Receiver<ProgressEvent>) -> Vec<ProgressEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn events_for(events: &[ProgressEvent], job: JobId) -> Vec<&ProgressEvent> {
    events.iter().filter(|e| e.job_id == Some(job)).collect()
}

/// Engine plus the in-memory file system behind it.
pub struct TestHarness {
    pub engine: Engine,
    pub io: Arc<MemoryIo>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: EngineConfig) -> Self {
        let io = Arc::new(MemoryIo::default());
        let engine = Engine::new(config)
            .expect("valid test config")
            .with_io(io.clone());
        Self { engine, io }
    }

    /// Stores `bytes` at `in/{name}` and probes it
    pub fn add_source(&self, name: &str, bytes: Vec<u8>) -> SourceItem {
        let path = PathBuf::from("in").join(name);
        self.io.insert(&path, bytes.clone());
        SourceItem::from_bytes(path, &bytes).expect("probe test source")
    }
}
