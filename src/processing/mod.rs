//! Execution side of the engine: transforms, caching and batch scheduling.

pub mod batch;
pub mod cache;
pub mod imaging;
pub mod media;
pub mod transform;

pub use batch::BatchRunHandle;
pub use cache::{CacheKey, CacheStats, ResultCache};
pub use imaging::ImageTransformer;
pub use media::{IntermediateResult, PdfDocument, RasterSet};
pub use transform::{EncodedOutput, Transform};
