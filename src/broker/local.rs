//! In-process reference broker
//!
//! `LocalBroker` keeps one buffer per slot and circulates slot indices
//! between a free pool (producer side) and a posted queue (consumer side).
//! Both blocking waits use a condition variable on the broker's own lock,
//! never the slot table's.

use std::{
    collections::VecDeque,
    sync::{Arc, Condvar, Mutex, MutexGuard},
    time::Duration,
};

use log::{debug, error};

use crate::{
    error::{QueueError, Result},
    graphics::{Fence, PixelFormat},
    memory::{RegionConfig, SharedMemoryRegion},
};

use super::{
    buffer::{next_buffer_id, BrokerBuffer, BufferDescriptor},
    config::BrokerConfig,
    metadata::BufferMetadata,
    stats::{BrokerStats, BrokerStatsSnapshot},
    BufferBroker, FetchedBuffer,
};

/// Who currently holds a broker slot's buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ownership {
    /// In the free pool, ready for the producer
    Available,
    /// Held by the producer
    Gained,
    /// Waiting for the consumer
    Posted,
    /// Held by the consumer
    Acquired,
}

#[derive(Debug)]
struct BrokerSlot {
    buffer: Arc<BrokerBuffer>,
    ownership: Ownership,
    fence: Fence,
    metadata: Vec<u8>,
}

#[derive(Debug, Default)]
struct BrokerState {
    slots: Vec<Option<BrokerSlot>>,
    available: VecDeque<(usize, Fence)>,
    posted: VecDeque<usize>,
}

impl BrokerState {
    fn occupied(&mut self, slot: usize) -> Result<&mut BrokerSlot> {
        let max = self.slots.len();
        self.slots
            .get_mut(slot)
            .ok_or_else(|| QueueError::out_of_range(slot, max))?
            .as_mut()
            .ok_or_else(|| QueueError::invalid_state(format!("broker slot {} is empty", slot)))
    }
}

/// A buffer the consumer side has acquired
#[derive(Debug, Clone)]
pub struct AcquiredBuffer {
    pub slot: usize,
    pub buffer: Arc<BrokerBuffer>,
    /// Acquire fence supplied by the producer on queue
    pub fence: Fence,
    pub metadata: BufferMetadata,
}

/// Broker that allocates buffers in shared memory regions of this process
#[derive(Debug)]
pub struct LocalBroker {
    config: BrokerConfig,
    state: Mutex<BrokerState>,
    /// Signalled when the free pool gains a buffer
    available_cv: Condvar,
    /// Signalled when a buffer is posted
    posted_cv: Condvar,
    stats: BrokerStats,
}

impl LocalBroker {
    /// Create a broker with no buffers allocated
    pub fn new(config: BrokerConfig) -> Result<Self> {
        config.validate()?;

        let mut state = BrokerState::default();
        state.slots.resize_with(config.capacity, || None);

        Ok(Self {
            config,
            state: Mutex::new(state),
            available_cv: Condvar::new(),
            posted_cv: Condvar::new(),
            stats: BrokerStats::default(),
        })
    }

    pub fn config(&self) -> &BrokerConfig {
        &self.config
    }

    /// Largest number of buffers this broker can hold
    pub fn max_capacity(&self) -> usize {
        self.config.capacity
    }

    pub fn stats(&self) -> BrokerStatsSnapshot {
        self.stats.snapshot()
    }

    /// Number of buffers in the free pool
    pub fn available_count(&self) -> usize {
        self.lock().map(|state| state.available.len()).unwrap_or(0)
    }

    /// Number of posted buffers the consumer has not acquired yet
    pub fn posted_count(&self) -> usize {
        self.lock().map(|state| state.posted.len()).unwrap_or(0)
    }

    /// Current holder of a slot's buffer, if the slot is populated
    pub fn ownership(&self, slot: usize) -> Option<Ownership> {
        let state = self.lock().ok()?;
        state.slots.get(slot)?.as_ref().map(|s| s.ownership)
    }

    /// Acquire the oldest posted buffer, waiting up to `timeout`.
    ///
    /// Returns `Ok(None)` if nothing was posted in time.
    pub fn acquire(&self, timeout: Duration) -> Result<Option<AcquiredBuffer>> {
        let state = self.lock()?;
        let (mut state, _) = self
            .posted_cv
            .wait_timeout_while(state, timeout, |s| s.posted.is_empty())
            .map_err(|_| QueueError::invariant("broker lock poisoned"))?;

        let Some(slot) = state.posted.pop_front() else {
            return Ok(None);
        };

        let entry = state.occupied(slot)?;
        entry.ownership = Ownership::Acquired;
        let metadata = BufferMetadata::decode(&entry.metadata)?;
        let acquired = AcquiredBuffer {
            slot,
            buffer: Arc::clone(&entry.buffer),
            fence: entry.fence.clone(),
            metadata,
        };
        debug!("acquire: slot={} buffer={}", slot, acquired.buffer.id());
        Ok(Some(acquired))
    }

    /// Give an acquired buffer back to the producer's free pool
    pub fn release(&self, slot: usize, fence: Fence) -> Result<()> {
        let mut state = self.lock()?;
        let entry = state.occupied(slot)?;
        if entry.ownership != Ownership::Acquired {
            error!("release: slot {} is not acquired ({:?})", slot, entry.ownership);
            return Err(QueueError::invalid_state(format!(
                "broker slot {} is {:?}, not acquired",
                slot, entry.ownership
            )));
        }
        entry.ownership = Ownership::Available;
        entry.metadata.clear();
        state.available.push_back((slot, fence));
        self.stats.record_release();
        self.available_cv.notify_all();
        Ok(())
    }

    fn lock(&self) -> Result<MutexGuard<'_, BrokerState>> {
        self.state
            .lock()
            .map_err(|_| QueueError::invariant("broker lock poisoned"))
    }

    fn allocate_one(&self, state: &mut BrokerState, descriptor: BufferDescriptor) -> Result<usize> {
        let slot = state
            .slots
            .iter()
            .position(Option::is_none)
            .ok_or_else(|| {
                QueueError::out_of_memory(format!(
                    "broker capacity {} exhausted",
                    self.config.capacity
                ))
            })?;

        let id = next_buffer_id();
        let mut region_config = RegionConfig::new(
            format!("{}-{}-{}", self.config.name, std::process::id(), id),
            descriptor.byte_size(),
        )
        .with_backing_type(self.config.backing_type);
        if let Some(dir) = &self.config.file_dir {
            region_config = region_config.with_file_dir(dir);
        }
        let memory = Arc::new(SharedMemoryRegion::new(region_config)?);

        state.slots[slot] = Some(BrokerSlot {
            buffer: Arc::new(BrokerBuffer::new(id, descriptor, memory)),
            ownership: Ownership::Available,
            fence: Fence::no_fence(),
            metadata: Vec::new(),
        });
        state.available.push_back((slot, Fence::no_fence()));
        self.stats.record_allocation();
        Ok(slot)
    }
}

impl BufferBroker for LocalBroker {
    fn allocate(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        usage: u64,
        count: usize,
    ) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(QueueError::invalid_argument(
                "geometry",
                format!("cannot allocate a {}x{} buffer", width, height),
            ));
        }

        let descriptor = BufferDescriptor::new(width, height, format, usage)?;
        let mut state = self.lock()?;
        for _ in 0..count {
            let slot = self.allocate_one(&mut state, descriptor)?;
            debug!(
                "allocate: slot={} w={} h={} format={}",
                slot,
                width,
                height,
                format.name()
            );
        }
        self.available_cv.notify_all();
        Ok(())
    }

    fn dequeue(&self, timeout: Duration) -> Result<FetchedBuffer> {
        let state = self.lock()?;
        let (mut state, _) = self
            .available_cv
            .wait_timeout_while(state, timeout, |s| s.available.is_empty())
            .map_err(|_| QueueError::invariant("broker lock poisoned"))?;

        let Some((slot, fence)) = state.available.pop_front() else {
            self.stats.record_timeout();
            return Err(QueueError::out_of_memory(format!(
                "no free buffer within {:?}",
                timeout
            )));
        };

        let entry = state.occupied(slot)?;
        entry.ownership = Ownership::Gained;
        self.stats.record_dequeue();
        Ok(FetchedBuffer {
            slot,
            buffer: Arc::clone(&entry.buffer),
            fence,
        })
    }

    fn enqueue(&self, buffer: Arc<BrokerBuffer>, slot: usize) -> Result<()> {
        let mut state = self.lock()?;
        let entry = state.occupied(slot)?;
        if entry.ownership != Ownership::Gained || !Arc::ptr_eq(&entry.buffer, &buffer) {
            return Err(QueueError::invalid_state(format!(
                "buffer {} is not held by the producer at slot {}",
                buffer.id(),
                slot
            )));
        }
        entry.ownership = Ownership::Available;
        state.available.push_back((slot, Fence::no_fence()));
        self.available_cv.notify_all();
        Ok(())
    }

    fn detach(&self, slot: usize) -> Result<()> {
        let mut state = self.lock()?;
        let entry = state.occupied(slot)?;
        debug!("detach: slot={} buffer={}", slot, entry.buffer.id());

        state.slots[slot] = None;
        state.available.retain(|(s, _)| *s != slot);
        state.posted.retain(|s| *s != slot);
        self.stats.record_detach();
        Ok(())
    }

    fn post(
        &self,
        slot: usize,
        buffer: &Arc<BrokerBuffer>,
        fence: Fence,
        metadata: &[u8],
    ) -> Result<()> {
        let mut state = self.lock()?;
        let entry = state.occupied(slot)?;
        if entry.ownership != Ownership::Gained || !Arc::ptr_eq(&entry.buffer, buffer) {
            return Err(QueueError::invalid_state(format!(
                "buffer {} is not held by the producer at slot {}",
                buffer.id(),
                slot
            )));
        }
        entry.ownership = Ownership::Posted;
        entry.fence = fence;
        entry.metadata = metadata.to_vec();
        state.posted.push_back(slot);
        self.stats.record_post();
        self.posted_cv.notify_all();
        Ok(())
    }

    fn capacity(&self) -> usize {
        self.lock()
            .map(|state| state.slots.iter().filter(|s| s.is_some()).count())
            .unwrap_or(0)
    }

    fn default_width(&self) -> u32 {
        self.config.default_width
    }

    fn default_height(&self) -> u32 {
        self.config.default_height
    }

    fn default_format(&self) -> PixelFormat {
        self.config.default_format
    }
}
