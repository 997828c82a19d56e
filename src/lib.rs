// Module declarations in dependency order
pub mod core;
pub mod processing;
pub mod utils;

// Public exports for external consumers
pub use crate::core::{
    Action, ActionKind, ActionQueue, BatchReport, Engine, EngineConfig, JobOutcome, JobState,
    ProgressEvent, SourceItem,
};
pub use crate::processing::{BatchRunHandle, ImageTransformer, Transform};
pub use crate::utils::{EngineError, EngineResult, TransformError};
