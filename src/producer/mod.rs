//! The producer protocol
//!
//! `QueueProducer` is the client-facing operation set. Every operation takes
//! the queue lock for its whole duration, including the bounded broker wait
//! inside `dequeue`, so no two operations ever observe each other's partial
//! updates.

pub mod admin;
pub mod buffers;
pub mod stats;
pub mod types;

use std::sync::Arc;

use crate::{
    broker::{BrokerConfig, BufferBroker, LocalBroker},
    error::{QueueError, Result},
    queue::{QueueConfig, QueueCore},
};

pub use stats::{ProducerStats, ProducerStatsSnapshot};
pub use types::{DequeueOutput, QueueBufferInput, QueueBufferOutput};

/// Producer end of a broker-backed buffer queue
#[derive(Debug, Clone)]
pub struct QueueProducer {
    core: Arc<QueueCore>,
    stats: Arc<ProducerStats>,
}

impl QueueProducer {
    /// Create a producer over an existing core
    pub fn new(core: Arc<QueueCore>) -> Self {
        Self {
            core,
            stats: Arc::new(ProducerStats::default()),
        }
    }

    /// Create a core over `broker` and a producer for it
    pub fn with_broker(config: QueueConfig, broker: Arc<dyn BufferBroker>) -> Result<Self> {
        Ok(Self::new(Arc::new(QueueCore::new(config, broker)?)))
    }

    pub fn core(&self) -> &Arc<QueueCore> {
        &self.core
    }

    pub fn stats(&self) -> ProducerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Count failed calls on the way out
    fn tracked<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            self.stats.record_failure();
        }
        result
    }
}

/// Wire a [`LocalBroker`] and a producer together.
///
/// The broker's capacity must match the queue's slot table size so every
/// slot index the broker hands out is addressable.
pub fn create_local_queue(
    queue_config: QueueConfig,
    broker_config: BrokerConfig,
) -> Result<(QueueProducer, Arc<LocalBroker>)> {
    if broker_config.capacity != queue_config.max_buffer_count {
        return Err(QueueError::invalid_argument(
            "capacity",
            format!(
                "broker capacity {} differs from queue size {}",
                broker_config.capacity, queue_config.max_buffer_count
            ),
        ));
    }

    let broker = Arc::new(LocalBroker::new(broker_config)?);
    let producer = QueueProducer::with_broker(
        queue_config,
        Arc::clone(&broker) as Arc<dyn BufferBroker>,
    )?;
    Ok((producer, broker))
}
