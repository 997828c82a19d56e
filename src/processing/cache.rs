//! Content-addressed cache of intermediate results.
//!
//! Entries are keyed by (source fingerprint, queue prefix fingerprint) and
//! evicted least-recently-used first once the byte budget is exceeded.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::trace;
use crate::core::Fingerprint;
use crate::processing::media::IntermediateResult;

/// Identifies the result of applying a queue prefix to one source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub source: Fingerprint,
    pub prefix: Fingerprint,
}

impl CacheKey {
    pub fn new(source: Fingerprint, prefix: Fingerprint) -> Self {
        Self { source, prefix }
    }
}

/// Cache counters since the cache was created.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub used_bytes: u64,
    pub budget_bytes: u64,
}

impl CacheStats {
    pub fn hit_ratio(&self) -> f64 {
        let lookups = self.hits + self.misses;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

struct CacheEntry {
    value: Arc<IntermediateResult>,
    size: u64,
    last_access: u64,
}

#[derive(Default)]
struct LruState {
    entries: HashMap<CacheKey, CacheEntry>,
    /// access tick -> key, oldest first
    recency: BTreeMap<u64, CacheKey>,
    tick: u64,
    used: u64,
}

impl LruState {
    fn touch(&mut self, key: CacheKey) {
        self.tick += 1;
        let tick = self.tick;
        if let Some(entry) = self.entries.get_mut(&key) {
            self.recency.remove(&entry.last_access);
            entry.last_access = tick;
            self.recency.insert(tick, key);
        }
    }

    fn remove(&mut self, key: &CacheKey) {
        if let Some(entry) = self.entries.remove(key) {
            self.recency.remove(&entry.last_access);
            self.used -= entry.size;
        }
    }

    fn evict_oldest(&mut self) -> bool {
        let oldest = self.recency.first_key_value().map(|(_, key)| *key);
        match oldest {
            Some(key) => {
                trace!("Evicting cache entry for prefix {}", key.prefix);
                self.remove(&key);
                true
            }
            None => false,
        }
    }
}

/// Thread-safe, byte-bounded result cache shared by every job of an engine.
///
/// Lookups hand out independent copies so a Job can never mutate a cached
/// value in place.
pub struct ResultCache {
    state: Mutex<LruState>,
    budget_bytes: u64,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResultCache {
    /// Create a cache holding at most `budget_bytes`; 0 disables it
    pub fn new(budget_bytes: u64) -> Self {
        Self {
            state: Mutex::new(LruState::default()),
            budget_bytes,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.budget_bytes > 0
    }

    /// Returns a fresh copy of the cached result, if present
    pub fn get(&self, key: &CacheKey) -> Option<IntermediateResult> {
        let shared = {
            let mut state = self.state.lock();
            let found = state.entries.get(key).map(|entry| Arc::clone(&entry.value));
            if found.is_some() {
                state.touch(*key);
            }
            found
        };

        match shared {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                // Deep copy outside the lock
                Some(IntermediateResult::clone(&value))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Stores `value` under `key`, evicting least recently used entries to fit
    /// Whether a result of `size` bytes would be stored by [`put`](Self::put)
    pub fn admits(&self, size: u64) -> bool {
        self.is_enabled() && size <= self.budget_bytes
    }

    pub fn put(&self, key: CacheKey, value: IntermediateResult) {
        let size = value.size_bytes();
        if !self.admits(size) {
            trace!("Not caching {} byte result, larger than the cache budget", size);
            return;
        }

        let mut state = self.state.lock();
        state.remove(&key);
        while state.used + size > self.budget_bytes {
            if !state.evict_oldest() {
                break;
            }
        }

        state.tick += 1;
        let tick = state.tick;
        state.entries.insert(key, CacheEntry { value: Arc::new(value), size, last_access: tick });
        state.recency.insert(tick, key);
        state.used += size;
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Clear all entries, keeping the counters
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.entries.clear();
        state.recency.clear();
        state.used = 0;
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: state.entries.len(),
            used_bytes: state.used,
            budget_bytes: self.budget_bytes,
        }
    }
}

impl std::fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultCache").field("stats", &self.stats()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::processing::media::PdfDocument;

    fn doc(len: usize) -> IntermediateResult {
        IntermediateResult::Document(PdfDocument { bytes: vec![7u8; len] })
    }

    fn key(n: u8) -> CacheKey {
        CacheKey::new(Fingerprint::of_bytes(&[n]), Fingerprint::empty_prefix())
    }

    #[test]
    fn test_cache_insert_and_get() {
        let cache = ResultCache::new(1024);
        cache.put(key(1), doc(100));

        assert!(cache.get(&key(1)).is_some());
        assert!(cache.get(&key(2)).is_none());

        let stats = cache.stats();
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(stats.used_bytes, 100);
        assert!((stats.hit_ratio() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_cache_evicts_least_recently_used() {
        let cache = ResultCache::new(300);
        cache.put(key(1), doc(100));
        cache.put(key(2), doc(100));
        cache.put(key(3), doc(100));

        // Touch 1 so 2 becomes the oldest
        cache.get(&key(1));
        cache.put(key(4), doc(100));

        assert!(cache.get(&key(2)).is_none());
        assert!(cache.get(&key(1)).is_some());
        assert!(cache.get(&key(3)).is_some());
        assert!(cache.get(&key(4)).is_some());
        assert!(cache.stats().used_bytes <= 300);
    }

    #[test]
    fn test_cache_replaces_existing_key() {
        let cache = ResultCache::new(1000);
        cache.put(key(1), doc(100));
        cache.put(key(1), doc(400));
        let stats = cache.stats();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.used_bytes, 400);
    }

    #[test]
    fn test_oversized_and_disabled() {
        let cache = ResultCache::new(50);
        assert!(cache.admits(50));
        assert!(!cache.admits(51));
        cache.put(key(1), doc(51));
        assert!(cache.is_empty());

        let disabled = ResultCache::new(0);
        assert!(!disabled.admits(0));
        disabled.put(key(1), doc(0));
        assert!(disabled.is_empty());
        assert!(!disabled.is_enabled());
        assert!(disabled.get(&key(1)).is_none());
    }

    #[test]
    fn test_lookups_return_independent_copies() {
        let cache = ResultCache::new(1000);
        cache.put(key(1), doc(10));
        if let Some(IntermediateResult::Document(mut copy)) = cache.get(&key(1)) {
            copy.bytes.clear();
        }
        match cache.get(&key(1)) {
            Some(IntermediateResult::Document(doc)) => assert_eq!(doc.bytes.len(), 10),
            _ => panic!("expected cached document"),
        }
    }
}
