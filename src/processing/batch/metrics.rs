use tracing::debug;
use crate::core::BudgetMetrics;

/// Tracks reservations against a batch memory budget.
///
/// Only mutated while the batch state lock is held, so reservation and
/// release are atomic with respect to admission decisions.
#[derive(Debug, Clone)]
pub struct BudgetTracker {
    reserved: u64,
    metrics: BudgetMetrics,
}

impl BudgetTracker {
    pub fn new(budget_bytes: u64) -> Self {
        Self {
            reserved: 0,
            metrics: BudgetMetrics { budget_bytes, ..BudgetMetrics::default() },
        }
    }

    pub fn budget(&self) -> u64 {
        self.metrics.budget_bytes
    }

    pub fn reserved(&self) -> u64 {
        self.reserved
    }

    pub fn free(&self) -> u64 {
        self.metrics.budget_bytes - self.reserved
    }

    pub fn fits(&self, bytes: u64) -> bool {
        bytes <= self.free()
    }

    /// Reserves `bytes`; callers check [`fits`](Self::fits) first
    pub fn reserve(&mut self, bytes: u64) {
        debug_assert!(self.fits(bytes));
        self.reserved = (self.reserved + bytes).min(self.metrics.budget_bytes);
        self.metrics.peak_reserved_bytes = self.metrics.peak_reserved_bytes.max(self.reserved);
        self.metrics.admissions += 1;

        let usage_pct = self.reserved as f64 / self.metrics.budget_bytes.max(1) as f64 * 100.0;
        debug!(
            "Memory reserved - Job: {}KB, Reserved: {}MB, Free: {}MB, Usage: {:.1}%",
            bytes / 1024,
            self.reserved / (1024 * 1024),
            self.free() / (1024 * 1024),
            usage_pct
        );
    }

    pub fn release(&mut self, bytes: u64) {
        self.reserved = self.reserved.saturating_sub(bytes);
    }

    /// Records jobs passed over because they did not fit the free budget
    pub fn defer(&mut self, skipped: usize) {
        self.metrics.deferrals += skipped;
    }

    pub fn snapshot(&self) -> BudgetMetrics {
        self.metrics.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reserve_and_release_track_peak() {
        let mut tracker = BudgetTracker::new(100);
        tracker.reserve(60);
        assert!(!tracker.fits(50));
        tracker.reserve(30);
        tracker.release(60);
        assert_eq!(tracker.free(), 70);

        let metrics = tracker.snapshot();
        assert_eq!(metrics.peak_reserved_bytes, 90);
        assert_eq!(metrics.admissions, 2);
    }
}
