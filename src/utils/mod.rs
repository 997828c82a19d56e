pub mod error;
pub mod validation;
pub mod formats;
pub mod fs;

pub use error::{EngineError, EngineResult, QueueError, TransformError};
pub use formats::{ImageFormat, SOURCE_IMAGE_EXTENSIONS, extension_of};
pub use fs::{FileIo, FsIo, NamingScheme, OutputSettings};
