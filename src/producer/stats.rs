//! Producer statistics tracking

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of producer counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProducerStatsSnapshot {
    pub dequeues: u64,
    pub reallocations: u64,
    pub requests: u64,
    pub queues: u64,
    pub cancels: u64,
    pub failures: u64,
}

impl ProducerStatsSnapshot {
    /// Fraction of completed dequeues that needed at least one reallocation
    pub fn reallocation_rate(&self) -> f64 {
        if self.dequeues == 0 {
            return 0.0;
        }
        self.reallocations as f64 / self.dequeues as f64
    }

    /// Get a summary string of the statistics
    pub fn summary(&self) -> String {
        format!(
            "ProducerStats {{ dequeues: {}, reallocations: {}, requests: {}, \
             queues: {}, cancels: {}, failures: {} }}",
            self.dequeues, self.reallocations, self.requests, self.queues, self.cancels, self.failures
        )
    }
}

/// Thread-safe producer counters
#[derive(Debug, Default)]
pub struct ProducerStats {
    dequeues: AtomicU64,
    reallocations: AtomicU64,
    requests: AtomicU64,
    queues: AtomicU64,
    cancels: AtomicU64,
    failures: AtomicU64,
}

impl ProducerStats {
    pub fn record_dequeue(&self) {
        self.dequeues.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reallocation(&self) {
        self.reallocations.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_request(&self) {
        self.requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_queue(&self) {
        self.queues.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_cancel(&self) {
        self.cancels.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self) -> ProducerStatsSnapshot {
        ProducerStatsSnapshot {
            dequeues: self.dequeues.load(Ordering::Relaxed),
            reallocations: self.reallocations.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            queues: self.queues.load(Ordering::Relaxed),
            cancels: self.cancels.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}
