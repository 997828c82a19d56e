//! Content-addressed fingerprints for sources and queue prefixes.

use std::fmt;
use serde::{Deserialize, Serialize};
use crate::core::Action;

/// A 256-bit blake3 digest.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Fingerprint([u8; 32]);

impl Fingerprint {
    /// Fingerprint of an arbitrary byte string
    pub fn of_bytes(bytes: &[u8]) -> Self {
        Self(*blake3::hash(bytes).as_bytes())
    }

    /// Fingerprint of a queue prefix with no actions in it
    pub fn empty_prefix() -> Self {
        Self::of_bytes(b"image-batch/queue/v1")
    }

    /// Extends a prefix fingerprint by one enabled action.
    ///
    /// Chaining makes every prefix fingerprint depend on the exact ordered
    /// sequence of actions before it.
    pub fn chain(&self, action: &Action) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&self.0);
        // Serialization of a validated kind cannot fail; an empty payload would
        // still be chained with the name so distinct kinds never collide.
        let params = serde_json::to_vec(action.kind()).unwrap_or_default();
        hasher.update(action.name().as_bytes());
        hasher.update(&(params.len() as u64).to_le_bytes());
        hasher.update(&params);
        // Loaded file contents count, not just the path that named them
        if let Some(asset) = action.asset() {
            hasher.update(blake3::hash(asset).as_bytes());
        }
        Self(*hasher.finalize().as_bytes())
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        blake3::Hash::from_bytes(self.0).to_hex().to_string()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form keeps logs readable
        write!(f, "Fingerprint({})", &self.to_hex()[..12])
    }
}

impl From<blake3::Hash> for Fingerprint {
    fn from(hash: blake3::Hash) -> Self {
        Self(*hash.as_bytes())
    }
}
