//! In-process image operations using the `image` crate.

mod executor;
mod formats;
mod pdf;
mod resize;
mod target_size;
mod upscale;
mod watermark;

pub use executor::ImageTransformer;
pub use formats::{decode_image, decode_source, encode_page, encode_result};
pub use pdf::{BuiltinPdfCodec, PdfCodec};
#[cfg(feature = "pdfium")]
pub use pdf::PdfiumCodec;
pub use resize::{apply_resize, target_dimensions};
pub use target_size::search_quality;
pub use upscale::{ResampleUpscaler, Upscaler, Waifu2xUpscaler};
