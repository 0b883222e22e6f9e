//! Broker statistics tracking

use std::sync::atomic::{AtomicU64, Ordering};

/// Snapshot of broker counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerStatsSnapshot {
    pub buffers_allocated: u64,
    pub buffers_detached: u64,
    pub buffers_dequeued: u64,
    pub buffers_posted: u64,
    pub buffers_released: u64,
    pub dequeue_timeouts: u64,
}

/// Thread-safe counters for a broker
#[derive(Debug, Default)]
pub struct BrokerStats {
    buffers_allocated: AtomicU64,
    buffers_detached: AtomicU64,
    buffers_dequeued: AtomicU64,
    buffers_posted: AtomicU64,
    buffers_released: AtomicU64,
    dequeue_timeouts: AtomicU64,
}

impl BrokerStats {
    pub fn record_allocation(&self) {
        self.buffers_allocated.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_detach(&self) {
        self.buffers_detached.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_dequeue(&self) {
        self.buffers_dequeued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_post(&self) {
        self.buffers_posted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_release(&self) {
        self.buffers_released.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_timeout(&self) {
        self.dequeue_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current statistics snapshot
    pub fn snapshot(&self) -> BrokerStatsSnapshot {
        BrokerStatsSnapshot {
            buffers_allocated: self.buffers_allocated.load(Ordering::Relaxed),
            buffers_detached: self.buffers_detached.load(Ordering::Relaxed),
            buffers_dequeued: self.buffers_dequeued.load(Ordering::Relaxed),
            buffers_posted: self.buffers_posted.load(Ordering::Relaxed),
            buffers_released: self.buffers_released.load(Ordering::Relaxed),
            dequeue_timeouts: self.dequeue_timeouts.load(Ordering::Relaxed),
        }
    }
}
