//! Core domain types and engine state.
//!
//! This module contains the fundamental types used throughout the engine:
//! - [`Action`] and [`ActionQueue`]: validated transformations and their editable sequence
//! - [`SourceItem`] and [`Job`]: inputs and their pairing with a queue snapshot
//! - [`Engine`]: entry point owning the cache and progress bus
//! - [`ProgressEvent`]: push-based progress reporting
//! - [`EngineConfig`] and [`PresetStore`]: persisted settings

mod action;
mod config;
mod fingerprint;
mod preset;
mod progress;
mod queue;
mod source;
mod state;
mod task;
mod types;

pub use action::{
    Action, ActionKind, FitMode, PageOrientation, PdfLayout, PdfQuality, ResizeMode,
    TARGET_SIZE_MAX_QUALITY, WatermarkPosition,
};
pub use config::{EngineConfig, UpscalerConfig};
pub use fingerprint::Fingerprint;
pub use preset::{PresetStore, load_preset_file};
pub use progress::{ProgressBus, ProgressEvent, ProgressState};
pub use queue::{ActionQueue, PRESET_VERSION, PipelineStep, QueueSnapshot, SerializableQueue};
pub use source::{MediaKind, SourceItem};
pub use state::Engine;
pub use task::Job;
pub use types::{
    BatchId, BatchReport, BatchState, BudgetMetrics, JobId, JobOutcome, JobReport, JobState,
};
