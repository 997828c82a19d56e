//! Job definition.

use crate::core::{JobId, QueueSnapshot, SourceItem};

/// One source item paired with the queue snapshot it is processed through.
///
/// Immutable once its batch starts; the scheduler tracks its state separately.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: JobId,
    pub source: SourceItem,
    pub snapshot: QueueSnapshot,
    /// Estimated peak memory, reserved against the batch budget on admission
    pub estimate_bytes: u64,
}

impl Job {
    pub fn action_count(&self) -> usize {
        self.snapshot.len()
    }
}
