use crate::core::{Action, SourceItem};
use crate::processing::imaging;
use crate::processing::media::IntermediateResult;
use crate::utils::TransformError;

/// One encoded artifact ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedOutput {
    pub bytes: Vec<u8>,
    /// Extension of the output file, without the dot
    pub extension: String,
}

/// Pure transformation seam between the scheduler and the image code.
///
/// Implementations must be free of shared mutable state: the same input and
/// action always produce the same output, which is what makes results
/// cacheable. All methods run on blocking worker threads.
pub trait Transform: Send + Sync {
    /// Applies one action to the current intermediate result
    fn apply(
        &self,
        action: &Action,
        input: IntermediateResult,
    ) -> Result<IntermediateResult, TransformError>;

    /// Decodes a source file into the first intermediate result
    fn decode(
        &self,
        source: &SourceItem,
        bytes: Vec<u8>,
    ) -> Result<IntermediateResult, TransformError> {
        imaging::decode_source(source, bytes)
    }

    /// Encodes the final result into one artifact per page
    fn encode(&self, result: &IntermediateResult) -> Result<Vec<EncodedOutput>, TransformError> {
        imaging::encode_result(result)
    }
}
