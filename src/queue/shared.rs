//! The lock-protected core: slot table plus queue-wide counters

use std::{
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use log::error;

use crate::{
    broker::BufferBroker,
    error::{QueueError, Result},
    graphics::ClientApi,
    slots::{SlotStateKind, SlotTable},
};

use super::config::QueueConfig;

/// Generate an id unique across queues of all processes on the host
fn next_unique_id() -> u64 {
    static QUEUE_COUNTER: std::sync::atomic::AtomicU32 = std::sync::atomic::AtomicU32::new(0);
    let counter = QUEUE_COUNTER.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
    ((std::process::id() as u64) << 32) | counter as u64
}

/// Everything guarded by the queue lock
#[derive(Debug)]
pub struct CoreState {
    pub(crate) slots: SlotTable,
    pub(crate) connected_api: Option<ClientApi>,
    pub(crate) max_dequeued_buffer_count: usize,
    pub(crate) dequeue_timeout: Duration,
    pub(crate) generation_number: u32,
    /// Set once an invariant violation was observed
    abandoned: Option<String>,
}

impl CoreState {
    fn new(config: &QueueConfig) -> Self {
        Self {
            slots: SlotTable::new(config.max_buffer_count),
            connected_api: None,
            max_dequeued_buffer_count: config.max_dequeued_buffer_count,
            dequeue_timeout: config.dequeue_timeout,
            generation_number: 0,
            abandoned: None,
        }
    }

    pub fn slots(&self) -> &SlotTable {
        &self.slots
    }

    /// Total slot capacity
    pub fn max_buffer_count(&self) -> usize {
        self.slots.capacity()
    }

    /// Fail if an earlier invariant violation left the queue unusable
    pub fn ensure_usable(&self) -> Result<()> {
        match &self.abandoned {
            Some(reason) => Err(QueueError::invariant(format!(
                "queue abandoned after invariant violation: {}",
                reason
            ))),
            None => Ok(()),
        }
    }

    /// Fail unless a client API is connected
    pub fn ensure_connected(&self, operation: &'static str) -> Result<ClientApi> {
        self.ensure_usable()?;
        self.connected_api.ok_or_else(|| {
            error!("{}: queue has no connected producer", operation);
            QueueError::not_connected(operation)
        })
    }

    /// Record a fatal divergence; every later operation will refuse to run
    pub fn abandon(&mut self, message: impl Into<String>) -> QueueError {
        let message = message.into();
        error!("invariant violation, abandoning queue: {}", message);
        if self.abandoned.is_none() {
            self.abandoned = Some(message.clone());
        }
        QueueError::invariant(message)
    }

    pub fn is_abandoned(&self) -> bool {
        self.abandoned.is_some()
    }

    pub fn dequeued_count(&self) -> usize {
        self.slots.count_in_state(SlotStateKind::Dequeued)
    }
}

/// Slot table, queue-wide state and the broker, behind one coarse lock
#[derive(Debug)]
pub struct QueueCore {
    name: String,
    unique_id: u64,
    state: Mutex<CoreState>,
    broker: Arc<dyn BufferBroker>,
}

impl QueueCore {
    /// Create a core over `broker`
    pub fn new(config: QueueConfig, broker: Arc<dyn BufferBroker>) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            state: Mutex::new(CoreState::new(&config)),
            name: config.name,
            unique_id: next_unique_id(),
            broker,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Opaque id of this queue, fixed at construction
    pub fn unique_id(&self) -> u64 {
        self.unique_id
    }

    pub fn broker(&self) -> &Arc<dyn BufferBroker> {
        &self.broker
    }

    /// Acquire the queue lock
    pub fn lock(&self) -> Result<MutexGuard<'_, CoreState>> {
        self.state
            .lock()
            .map_err(|_| QueueError::invariant("queue lock poisoned"))
    }
}
