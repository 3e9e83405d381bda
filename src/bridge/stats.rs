//! Per-partition bridge statistics

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of a partition's bridge counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeStats {
    /// Objects handed out by successful dequeues
    pub dequeued: u64,
    /// Dequeue calls that failed with a shortfall
    pub dequeue_failures: u64,
    /// Buffers returned to the partition while rolling back a failed dequeue
    pub rolled_back: u64,
    /// Objects returned through the exclusive path
    pub enqueued: u64,
    /// Shared-release calls
    pub shared_releases: u64,
    /// Shared releases that were the last holder and freed the buffer
    pub shared_frees: u64,
}

impl BridgeStats {
    /// Objects currently outside the partition according to these counters
    pub fn outstanding(&self) -> u64 {
        self.dequeued
            .saturating_sub(self.enqueued)
            .saturating_sub(self.shared_frees)
    }

    /// Get a summary string of the statistics
    pub fn summary(&self) -> String {
        format!(
            "BridgeStats {{ dequeued: {}, failures: {}, rolled_back: {}, enqueued: {}, \
             shared: {}/{} freed, outstanding: {} }}",
            self.dequeued,
            self.dequeue_failures,
            self.rolled_back,
            self.enqueued,
            self.shared_frees,
            self.shared_releases,
            self.outstanding()
        )
    }
}

/// Thread-safe counters behind `BridgeStats`
#[derive(Debug, Default)]
pub struct AtomicBridgeStats {
    dequeued: AtomicU64,
    dequeue_failures: AtomicU64,
    rolled_back: AtomicU64,
    enqueued: AtomicU64,
    shared_releases: AtomicU64,
    shared_frees: AtomicU64,
}

impl AtomicBridgeStats {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a successful dequeue of `n` objects
    pub fn record_dequeue(&self, n: usize) {
        self.dequeued.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Record a failed dequeue that gave back `rolled_back` buffers
    pub fn record_dequeue_failure(&self, rolled_back: usize) {
        self.dequeue_failures.fetch_add(1, Ordering::Relaxed);
        self.rolled_back.fetch_add(rolled_back as u64, Ordering::Relaxed);
    }

    /// Record an exclusive enqueue of `n` objects
    pub fn record_enqueue(&self, n: usize) {
        self.enqueued.fetch_add(n as u64, Ordering::Relaxed);
    }

    /// Record `released` shared releases of which `freed` freed their buffer
    pub fn record_shared_release(&self, released: usize, freed: usize) {
        self.shared_releases
            .fetch_add(released as u64, Ordering::Relaxed);
        self.shared_frees.fetch_add(freed as u64, Ordering::Relaxed);
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self) -> BridgeStats {
        BridgeStats {
            dequeued: self.dequeued.load(Ordering::Relaxed),
            dequeue_failures: self.dequeue_failures.load(Ordering::Relaxed),
            rolled_back: self.rolled_back.load(Ordering::Relaxed),
            enqueued: self.enqueued.load(Ordering::Relaxed),
            shared_releases: self.shared_releases.load(Ordering::Relaxed),
            shared_frees: self.shared_frees.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let stats = AtomicBridgeStats::new();
        stats.record_dequeue(40);
        stats.record_dequeue_failure(32);
        stats.record_enqueue(30);
        stats.record_shared_release(3, 1);

        let snap = stats.snapshot();
        assert_eq!(snap.dequeued, 40);
        assert_eq!(snap.dequeue_failures, 1);
        assert_eq!(snap.rolled_back, 32);
        assert_eq!(snap.outstanding(), 9);
        assert!(snap.summary().contains("shared: 1/3 freed"));
    }
}
