//! Error types for the batch engine.
//!
//! Provides a hierarchy of error types using `thiserror` for ergonomic error handling.

use std::io;
use thiserror::Error;
use serde::{Deserialize, Serialize};

/// Failure of a single transform step, decode or output write.
///
/// A `TransformError` is always scoped to one Job: it becomes that Job's
/// terminal `Failed` outcome and never touches sibling Jobs.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "camelCase")]
pub enum TransformError {
    /// The input or the requested output is in a format nothing can handle
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Action parameters were rejected
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// The source file could not be decoded
    #[error("Corrupt source: {0}")]
    CorruptSource(String),

    /// A budget or limit was exceeded (memory, quality floor, decoder limits)
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// Reading the source or writing the output failed
    #[error("IO failure: {0}")]
    IoFailure(String),
}

// Helper methods for error creation
impl TransformError {
    pub fn unsupported<T: Into<String>>(msg: T) -> Self {
        Self::UnsupportedFormat(msg.into())
    }

    pub fn invalid<T: Into<String>>(msg: T) -> Self {
        Self::InvalidParameters(msg.into())
    }

    pub fn corrupt<T: Into<String>>(msg: T) -> Self {
        Self::CorruptSource(msg.into())
    }

    pub fn exhausted<T: Into<String>>(msg: T) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    pub fn io<T: Into<String>>(msg: T) -> Self {
        Self::IoFailure(msg.into())
    }
}

/// Errors raised while editing an action queue.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize)]
pub enum QueueError {
    /// An action failed its parameter schema
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// A position does not exist in the queue
    #[error("Position {index} is out of range for a queue of {len} actions")]
    OutOfRange { index: usize, len: usize },
}

impl QueueError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidParameters(msg.into())
    }
}

/// Main error type for the engine outside of per-job processing.
#[derive(Error, Debug, Serialize)]
pub enum EngineError {
    /// Queue construction or editing failed
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// Configuration could not be loaded or is inconsistent
    #[error("Config error: {0}")]
    Config(String),

    /// A preset could not be read, parsed or written
    #[error("Preset error: {0}")]
    Preset(String),

    /// File IO error
    #[error("IO error: {0}")]
    Io(String),
}

/// Convenience result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

impl EngineError {
    pub fn config<T: Into<String>>(msg: T) -> Self {
        Self::Config(msg.into())
    }

    pub fn preset<T: Into<String>>(msg: T) -> Self {
        Self::Preset(msg.into())
    }
}

// Convert std::io::Error to TransformError
impl From<io::Error> for TransformError {
    fn from(err: io::Error) -> Self {
        Self::IoFailure(err.to_string())
    }
}

// Convert std::io::Error to EngineError
impl From<io::Error> for EngineError {
    fn from(err: io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<image::ImageError> for TransformError {
    fn from(err: image::ImageError) -> Self {
        use image::ImageError;
        match err {
            ImageError::Decoding(e) => Self::CorruptSource(e.to_string()),
            ImageError::Unsupported(e) => Self::UnsupportedFormat(e.to_string()),
            ImageError::Limits(e) => Self::ResourceExhausted(e.to_string()),
            ImageError::IoError(e) => Self::IoFailure(e.to_string()),
            ImageError::Parameter(e) => Self::InvalidParameters(e.to_string()),
            ImageError::Encoding(e) => Self::UnsupportedFormat(e.to_string()),
        }
    }
}

impl From<QueueError> for TransformError {
    fn from(err: QueueError) -> Self {
        Self::InvalidParameters(err.to_string())
    }
}
