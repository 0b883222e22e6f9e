//! Buffer circulation: request, dequeue, queue and cancel

use std::sync::Arc;

use log::{debug, error, info};

use crate::{
    broker::BufferMetadata,
    config::MAX_QUEUE_CAPACITY,
    error::{QueueError, Result},
    graphics::{Fence, PixelFormat, PresentationBuffer, Rect, ScalingMode},
    slots::{SlotStateKind, SlotTransition},
};

use super::{
    types::{DequeueOutput, QueueBufferInput, QueueBufferOutput},
    QueueProducer,
};

/// Report a broker failure as exhaustion, unless it is already fatal
fn exhausted(operation: &str, err: QueueError) -> QueueError {
    if err.is_fatal() {
        return err;
    }
    error!("{}: {}", operation, err);
    QueueError::out_of_memory(format!("{}: {}", operation, err))
}

impl QueueProducer {
    /// Produce the presentation wrapper for a dequeued slot
    pub fn request(&self, slot: usize) -> Result<Arc<PresentationBuffer>> {
        debug!("request: slot={}", slot);
        let result = self.request_locked(slot);
        self.tracked(result)
    }

    fn request_locked(&self, slot: usize) -> Result<Arc<PresentationBuffer>> {
        let mut state = self.core.lock()?;
        state.ensure_connected("request")?;

        let entry = state.slots.slot(slot).map_err(|e| {
            error!("request: {}", e);
            e
        })?;
        if entry.kind() != SlotStateKind::Dequeued {
            error!(
                "request: slot {} is not owned by the producer (state = {})",
                slot,
                entry.kind()
            );
            return Err(QueueError::invalid_state(format!(
                "slot {} is not owned by the producer (state = {})",
                slot,
                entry.kind()
            )));
        }
        if entry.presentation().is_some() {
            error!("request: slot {} is not empty", slot);
            return Err(QueueError::invalid_state(format!(
                "slot {} was already requested",
                slot
            )));
        }
        let Some(buffer) = entry.buffer().cloned() else {
            error!("request: slot {} has no buffer", slot);
            return Err(QueueError::invalid_state(format!("slot {} has no buffer", slot)));
        };

        let presentation = Arc::new(PresentationBuffer::from_broker_buffer(&buffer));
        if let Err(e) = presentation.validate() {
            return Err(state.abandon(format!("request: slot {}: {}", slot, e)));
        }

        state.slots.transition(
            slot,
            &[SlotStateKind::Dequeued],
            SlotTransition::Request {
                presentation: Arc::clone(&presentation),
            },
        )?;
        self.stats.record_request();
        Ok(presentation)
    }

    /// Take ownership of a slot whose buffer matches the requested geometry.
    ///
    /// Grows the broker lazily up to the dequeued bound, then fetches from
    /// the broker, detaching and reallocating mismatched buffers. The broker
    /// does not promise to return the freshly allocated buffer next, so the
    /// fetch is retried up to [`MAX_QUEUE_CAPACITY`] times.
    pub fn dequeue(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        usage: u64,
    ) -> Result<DequeueOutput> {
        debug!(
            "dequeue: w={}, h={}, format={}, usage={:#x}",
            width,
            height,
            format.name(),
            usage
        );
        let result = self.dequeue_locked(width, height, format, usage);
        self.tracked(result)
    }

    fn dequeue_locked(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        usage: u64,
    ) -> Result<DequeueOutput> {
        let mut state = self.core.lock()?;
        state.ensure_connected("dequeue")?;

        let dequeued = state.dequeued_count();
        if dequeued >= state.max_dequeued_buffer_count {
            error!(
                "dequeue: {} slots already dequeued (max {})",
                dequeued, state.max_dequeued_buffer_count
            );
            return Err(QueueError::invalid_state(format!(
                "{} slots already dequeued (max {})",
                dequeued, state.max_dequeued_buffer_count
            )));
        }

        let broker = Arc::clone(self.core.broker());
        if broker.capacity() < state.max_dequeued_buffer_count {
            broker
                .allocate(width, height, format, usage, 1)
                .map_err(|e| exhausted("dequeue: lazy allocation failed", e))?;
        }

        let attempts = MAX_QUEUE_CAPACITY;
        let mut accepted = None;
        for _ in 0..attempts {
            let fetched = broker
                .dequeue(state.dequeue_timeout)
                .map_err(|e| exhausted("dequeue: broker yielded no buffer", e))?;
            let slot = fetched.slot;

            let kind = match state.slots.slot(slot) {
                Ok(entry) => entry.kind(),
                Err(_) => {
                    return Err(state.abandon(format!(
                        "dequeue: broker returned slot {} outside the table",
                        slot
                    )))
                }
            };
            if kind == SlotStateKind::Dequeued {
                return Err(state.abandon(format!(
                    "dequeue: slot {} is not free or queued (state = {})",
                    slot, kind
                )));
            }

            if fetched.buffer.matches(width, height, format) {
                accepted = Some(fetched);
                break;
            }

            info!(
                "dequeue: requested buffer (w={}, h={}, format={}) is different from the \
                 buffer at slot {} (w={}, h={}, format={}), reallocating",
                width,
                height,
                format.name(),
                slot,
                fetched.buffer.width(),
                fetched.buffer.height(),
                fetched.buffer.format().name()
            );
            self.stats.record_reallocation();

            state.slots.slot_mut(slot)?.mark_reallocating();
            state.slots.detach(slot)?;
            broker.detach(slot)?;
            broker
                .allocate(width, height, format, usage, 1)
                .map_err(|e| exhausted("dequeue: reallocation failed", e))?;
        }

        let Some(fetched) = accepted else {
            error!(
                "dequeue: no {}x{} {} buffer after {} attempts",
                width,
                height,
                format.name(),
                attempts
            );
            return Err(QueueError::out_of_memory(format!(
                "no {}x{} {} buffer after {} attempts",
                width,
                height,
                format.name(),
                attempts
            )));
        };

        let slot = fetched.slot;
        if let Err(e) = state.slots.transition(
            slot,
            &[SlotStateKind::Free, SlotStateKind::Queued],
            SlotTransition::Dequeue {
                buffer: fetched.buffer,
            },
        ) {
            return Err(state.abandon(format!("dequeue: {}", e)));
        }
        let needs_reallocation = state.slots.slot_mut(slot)?.take_needs_reallocation();

        self.stats.record_dequeue();
        debug!(
            "dequeue: slot={} needs_reallocation={}",
            slot, needs_reallocation
        );
        Ok(DequeueOutput {
            slot,
            fence: Fence::no_fence(),
            needs_reallocation,
        })
    }

    /// Post a requested slot to the consumer
    pub fn queue(&self, slot: usize, input: &QueueBufferInput) -> Result<QueueBufferOutput> {
        debug!("queue: slot={}", slot);
        let result = self.queue_locked(slot, input);
        self.tracked(result)
    }

    fn queue_locked(&self, slot: usize, input: &QueueBufferInput) -> Result<QueueBufferOutput> {
        let Some(scaling_mode) = ScalingMode::from_raw(input.scaling_mode) else {
            error!("queue: unknown scaling mode {}", input.scaling_mode);
            return Err(QueueError::invalid_argument(
                "scaling_mode",
                format!("unknown scaling mode {}", input.scaling_mode),
            ));
        };
        let Some(fence) = input.fence.clone() else {
            error!("queue: fence is missing");
            return Err(QueueError::invalid_argument("fence", "fence is missing"));
        };

        let mut state = self.core.lock()?;
        state.ensure_connected("queue")?;

        let entry = state.slots.slot(slot).map_err(|e| {
            error!("queue: {}", e);
            e
        })?;
        if entry.kind() != SlotStateKind::Dequeued {
            error!(
                "queue: slot {} is not owned by the producer (state = {})",
                slot,
                entry.kind()
            );
            return Err(QueueError::invalid_state(format!(
                "slot {} is not owned by the producer (state = {})",
                slot,
                entry.kind()
            )));
        }
        if !entry.request_called() {
            error!("queue: slot {} is not requested", slot);
            return Err(QueueError::invalid_argument(
                "slot",
                format!("slot {} was not requested", slot),
            ));
        }
        let Some(buffer) = entry.buffer().cloned() else {
            return Err(state.abandon(format!("queue: dequeued slot {} has no buffer", slot)));
        };

        let bounds = Rect::from_size(buffer.width(), buffer.height());
        if !input.crop.fits_within(&bounds) {
            error!("queue: slot {} has out-of-boundary crop {:?}", slot, input.crop);
            return Err(QueueError::invalid_argument(
                "crop",
                format!("{:?} is not contained in {:?}", input.crop, bounds),
            ));
        }

        let metadata = BufferMetadata {
            timestamp: input.timestamp,
            is_auto_timestamp: input.is_auto_timestamp,
            dataspace: input.dataspace,
            crop: input.crop,
            scaling_mode,
            transform: input.transform,
        }
        .encode()?;
        if let Err(e) = self.core.broker().post(slot, &buffer, fence, &metadata) {
            return Err(state.abandon(format!("queue: broker refused slot {}: {}", slot, e)));
        }
        state
            .slots
            .transition(slot, &[SlotStateKind::Dequeued], SlotTransition::Queue)?;

        self.stats.record_queue();
        Ok(QueueBufferOutput {
            width: buffer.width(),
            height: buffer.height(),
            transform_hint: 0,
            pending_count: 0,
            next_frame_number: 0,
        })
    }

    /// Return a dequeued slot to the broker's free pool unused
    pub fn cancel(&self, slot: usize, fence: Option<Fence>) -> Result<()> {
        debug!("cancel: slot={}", slot);
        let result = self.cancel_locked(slot, fence);
        self.tracked(result)
    }

    fn cancel_locked(&self, slot: usize, fence: Option<Fence>) -> Result<()> {
        let mut state = self.core.lock()?;
        state.ensure_connected("cancel")?;

        let entry = state.slots.slot(slot).map_err(|e| {
            error!("cancel: {}", e);
            e
        })?;
        if entry.kind() != SlotStateKind::Dequeued {
            error!(
                "cancel: slot {} is not owned by the producer (state = {})",
                slot,
                entry.kind()
            );
            return Err(QueueError::invalid_state(format!(
                "slot {} is not owned by the producer (state = {})",
                slot,
                entry.kind()
            )));
        }
        let Some(fence) = fence else {
            error!("cancel: fence is missing");
            return Err(QueueError::invalid_argument("fence", "fence is missing"));
        };
        let Some(buffer) = entry.buffer().cloned() else {
            return Err(state.abandon(format!("cancel: dequeued slot {} has no buffer", slot)));
        };

        if let Err(e) = self.core.broker().enqueue(buffer, slot) {
            return Err(state.abandon(format!("cancel: broker refused slot {}: {}", slot, e)));
        }
        state.slots.transition(
            slot,
            &[SlotStateKind::Dequeued],
            SlotTransition::Cancel { fence },
        )?;

        self.stats.record_cancel();
        debug!("cancel: slot {} returned", slot);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::VecDeque, sync::Mutex, time::Duration};

    use super::*;
    use crate::{
        broker::{
            buffer::next_buffer_id, BrokerBuffer, BrokerConfig, BufferBroker, BufferDescriptor,
            FetchedBuffer, LocalBroker,
        },
        config,
        graphics::{usage, ClientApi, QueryKey},
        memory::{RegionConfig, SharedMemoryRegion},
        producer::create_local_queue,
        queue::QueueConfig,
    };

    /// Broker that hands out a fixed sequence of buffers, whatever their slots
    #[derive(Debug)]
    struct ScriptedBroker {
        script: Mutex<VecDeque<FetchedBuffer>>,
        capacity: usize,
    }

    impl ScriptedBroker {
        fn new(capacity: usize, script: Vec<FetchedBuffer>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                capacity,
            }
        }
    }

    impl BufferBroker for ScriptedBroker {
        fn allocate(&self, _: u32, _: u32, _: PixelFormat, _: u64, _: usize) -> Result<()> {
            Ok(())
        }

        fn dequeue(&self, _timeout: Duration) -> Result<FetchedBuffer> {
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| QueueError::out_of_memory("script exhausted"))
        }

        fn enqueue(&self, _buffer: Arc<BrokerBuffer>, _slot: usize) -> Result<()> {
            Ok(())
        }

        fn detach(&self, _slot: usize) -> Result<()> {
            Ok(())
        }

        fn post(&self, _: usize, _: &Arc<BrokerBuffer>, _: Fence, _: &[u8]) -> Result<()> {
            Ok(())
        }

        fn capacity(&self) -> usize {
            self.capacity
        }

        fn default_width(&self) -> u32 {
            config::DEFAULT_WIDTH
        }

        fn default_height(&self) -> u32 {
            config::DEFAULT_HEIGHT
        }

        fn default_format(&self) -> PixelFormat {
            config::DEFAULT_FORMAT
        }
    }

    /// A fetched buffer whose memory holds `memory_size` bytes
    fn fetched(slot: usize, width: u32, height: u32, memory_size: usize) -> FetchedBuffer {
        let id = next_buffer_id();
        let descriptor =
            BufferDescriptor::new(width, height, PixelFormat::Rgba8888, usage::DEFAULT).unwrap();
        let name = format!("scripted-{}-{}", std::process::id(), id);
        let memory =
            Arc::new(SharedMemoryRegion::new(RegionConfig::new(name, memory_size)).unwrap());
        FetchedBuffer {
            slot,
            buffer: Arc::new(BrokerBuffer::new(id, descriptor, memory)),
            fence: Fence::no_fence(),
        }
    }

    fn scripted(script: Vec<FetchedBuffer>) -> QueueProducer {
        let producer = QueueProducer::with_broker(
            QueueConfig::new("scripted")
                .with_max_buffer_count(2)
                .with_max_dequeued_buffer_count(2)
                .with_dequeue_timeout(Duration::from_millis(10)),
            Arc::new(ScriptedBroker::new(2, script)),
        )
        .unwrap();
        producer.connect(ClientApi::Cpu).unwrap();
        producer
    }

    fn assert_abandoned(producer: &QueueProducer) {
        assert!(producer.core().lock().unwrap().is_abandoned());
        assert!(producer
            .dequeue(8, 8, PixelFormat::Rgba8888, usage::DEFAULT)
            .unwrap_err()
            .is_fatal());
        assert!(producer
            .cancel(0, Some(Fence::no_fence()))
            .unwrap_err()
            .is_fatal());
        assert!(producer.query(QueryKey::Width).unwrap_err().is_fatal());
    }

    fn connected(capacity: usize) -> (QueueProducer, Arc<LocalBroker>) {
        let (producer, broker) = create_local_queue(
            QueueConfig::new("buffers-test")
                .with_max_buffer_count(capacity)
                .with_dequeue_timeout(Duration::from_millis(10)),
            BrokerConfig::new("buffers-test").with_capacity(capacity),
        )
        .unwrap();
        producer.connect(ClientApi::Cpu).unwrap();
        (producer, broker)
    }

    fn dequeue(producer: &QueueProducer, width: u32, height: u32) -> DequeueOutput {
        producer
            .dequeue(width, height, PixelFormat::Rgba8888, usage::DEFAULT)
            .unwrap()
    }

    #[test]
    fn test_operations_require_connection() {
        let (producer, _broker) = connected(2);
        producer.disconnect(ClientApi::Cpu).unwrap();

        let err = producer
            .dequeue(8, 8, PixelFormat::Rgba8888, usage::DEFAULT)
            .unwrap_err();
        assert!(matches!(err, QueueError::NotConnected { .. }));
        assert!(matches!(
            producer.request(0).unwrap_err(),
            QueueError::NotConnected { .. }
        ));
        assert!(matches!(
            producer
                .queue(0, &QueueBufferInput::new(0, Fence::no_fence()))
                .unwrap_err(),
            QueueError::NotConnected { .. }
        ));
        assert!(matches!(
            producer.cancel(0, Some(Fence::no_fence())).unwrap_err(),
            QueueError::NotConnected { .. }
        ));
    }

    #[test]
    fn test_dequeue_request_queue() {
        let (producer, broker) = connected(4);

        let output = dequeue(&producer, 64, 64);
        assert_eq!(output.slot, 0);
        assert!(!output.needs_reallocation);
        assert!(!output.fence.is_valid());

        let presentation = producer.request(0).unwrap();
        assert_eq!(presentation.width(), 64);
        assert_eq!(presentation.height(), 64);
        assert_eq!(presentation.format(), PixelFormat::Rgba8888);
        assert!(presentation.stride() >= 64);

        let input = QueueBufferInput::new(1_000, Fence::no_fence())
            .with_crop(Rect::new(0, 0, 64, 64))
            .with_scaling_mode(ScalingMode::Freeze);
        let output = producer.queue(0, &input).unwrap();
        assert_eq!(output.width, 64);
        assert_eq!(output.height, 64);
        assert_eq!(output.pending_count, 0);
        assert_eq!(output.next_frame_number, 0);

        assert_eq!(producer.slot(0).unwrap().state, SlotStateKind::Queued);
        assert_eq!(broker.posted_count(), 1);

        let acquired = broker.acquire(Duration::from_millis(10)).unwrap().unwrap();
        assert_eq!(acquired.slot, 0);
        assert_eq!(acquired.metadata.timestamp, 1_000);
        assert_eq!(acquired.metadata.crop, Rect::new(0, 0, 64, 64));
    }

    #[test]
    fn test_cancel_never_dequeued_slot() {
        let (producer, _broker) = connected(4);
        dequeue(&producer, 64, 64);

        let err = producer.cancel(1, Some(Fence::no_fence())).unwrap_err();
        assert!(matches!(err, QueueError::InvalidState { .. }));
        let err = producer.cancel(9, Some(Fence::no_fence())).unwrap_err();
        assert!(matches!(err, QueueError::OutOfRange { slot: 9, max: 4 }));
    }

    #[test]
    fn test_cancel_requires_fence() {
        let (producer, broker) = connected(2);
        let slot = dequeue(&producer, 16, 16).slot;

        let err = producer.cancel(slot, None).unwrap_err();
        assert!(matches!(err, QueueError::InvalidArgument { .. }));
        assert_eq!(producer.slot(slot).unwrap().state, SlotStateKind::Dequeued);

        producer.cancel(slot, Some(Fence::no_fence())).unwrap();
        let view = producer.slot(slot).unwrap();
        assert_eq!(view.state, SlotStateKind::Free);
        assert!(view.has_release_fence);
        assert_eq!(broker.available_count(), 1);
    }

    #[test]
    fn test_request_twice_fails() {
        let (producer, _broker) = connected(2);
        let slot = dequeue(&producer, 16, 16).slot;

        producer.request(slot).unwrap();
        let err = producer.request(slot).unwrap_err();
        assert!(matches!(err, QueueError::InvalidState { .. }));
        assert!(matches!(
            producer.request(1).unwrap_err(),
            QueueError::InvalidState { .. }
        ));
    }

    #[test]
    fn test_queue_validates_input() {
        let (producer, _broker) = connected(2);
        let slot = dequeue(&producer, 32, 32).slot;

        let unrequested = QueueBufferInput::new(0, Fence::no_fence());
        assert!(matches!(
            producer.queue(slot, &unrequested).unwrap_err(),
            QueueError::InvalidArgument { .. }
        ));
        producer.request(slot).unwrap();

        let mut bad_mode = QueueBufferInput::new(0, Fence::no_fence());
        bad_mode.scaling_mode = 17;
        assert!(matches!(
            producer.queue(slot, &bad_mode).unwrap_err(),
            QueueError::InvalidArgument { .. }
        ));

        let mut no_fence = QueueBufferInput::new(0, Fence::no_fence());
        no_fence.fence = None;
        assert!(matches!(
            producer.queue(slot, &no_fence).unwrap_err(),
            QueueError::InvalidArgument { .. }
        ));

        let overlapping =
            QueueBufferInput::new(0, Fence::no_fence()).with_crop(Rect::new(16, 16, 48, 48));
        assert!(matches!(
            producer.queue(slot, &overlapping).unwrap_err(),
            QueueError::InvalidArgument { .. }
        ));

        assert_eq!(producer.slot(slot).unwrap().state, SlotStateKind::Dequeued);
        let inner =
            QueueBufferInput::new(0, Fence::no_fence()).with_crop(Rect::new(8, 8, 24, 24));
        producer.queue(slot, &inner).unwrap();
        assert!(matches!(
            producer.queue(slot, &inner).unwrap_err(),
            QueueError::InvalidState { .. }
        ));
    }

    #[test]
    fn test_dequeue_bound_enforced() {
        let (producer, _broker) = connected(4);
        dequeue(&producer, 8, 8);

        let err = producer
            .dequeue(8, 8, PixelFormat::Rgba8888, usage::DEFAULT)
            .unwrap_err();
        assert!(matches!(err, QueueError::InvalidState { .. }));
    }

    #[test]
    fn test_dequeue_times_out_while_consumer_holds_buffers() {
        let (producer, _broker) = connected(1);
        let slot = dequeue(&producer, 8, 8).slot;
        producer.request(slot).unwrap();
        producer
            .queue(slot, &QueueBufferInput::new(0, Fence::no_fence()))
            .unwrap();

        let err = producer
            .dequeue(8, 8, PixelFormat::Rgba8888, usage::DEFAULT)
            .unwrap_err();
        assert!(matches!(err, QueueError::OutOfMemory { .. }));
        assert_eq!(producer.slot(slot).unwrap().state, SlotStateKind::Queued);
    }

    #[test]
    fn test_reallocation_reported_once() {
        let (producer, broker) = connected(2);

        let first = dequeue(&producer, 64, 64);
        assert!(!first.needs_reallocation);
        let old_id = producer.slot(first.slot).unwrap().buffer_id;
        producer.cancel(first.slot, Some(Fence::no_fence())).unwrap();

        let second = dequeue(&producer, 128, 128);
        assert!(second.needs_reallocation);
        let view = producer.slot(second.slot).unwrap();
        assert_ne!(view.buffer_id, old_id);
        assert!(!view.needs_reallocation);
        assert_eq!(producer.request(second.slot).unwrap().width(), 128);
        producer.cancel(second.slot, Some(Fence::no_fence())).unwrap();

        let third = dequeue(&producer, 128, 128);
        assert!(!third.needs_reallocation);

        assert_eq!(broker.capacity(), 1);
        assert_eq!(producer.stats().reallocations, 1);
    }

    #[test]
    fn test_queued_slot_recycles_after_release() {
        let (producer, broker) = connected(1);
        let slot = dequeue(&producer, 8, 8).slot;
        producer.request(slot).unwrap();
        producer
            .queue(slot, &QueueBufferInput::new(5, Fence::no_fence()))
            .unwrap();

        let acquired = broker.acquire(Duration::from_millis(10)).unwrap().unwrap();
        broker.release(acquired.slot, Fence::no_fence()).unwrap();

        let again = dequeue(&producer, 8, 8);
        assert_eq!(again.slot, slot);
        assert!(!again.needs_reallocation);
        let view = producer.slot(slot).unwrap();
        assert_eq!(view.state, SlotStateKind::Dequeued);
        assert!(!view.request_called);
    }

    #[test]
    fn test_stale_pool_fully_reallocated() {
        let (producer, broker) = connected(2);
        producer.set_max_dequeued_buffer_count(2).unwrap();

        let a = dequeue(&producer, 64, 64).slot;
        let b = dequeue(&producer, 64, 64).slot;
        producer.cancel(a, Some(Fence::no_fence())).unwrap();
        producer.cancel(b, Some(Fence::no_fence())).unwrap();

        // Every free buffer is stale, so the fetch loop has to swap both
        let fresh = dequeue(&producer, 128, 128);
        assert!(fresh.needs_reallocation);
        assert_eq!(producer.request(fresh.slot).unwrap().width(), 128);
        assert_eq!(broker.stats().buffers_detached, 2);
        assert_eq!(broker.capacity(), 2);
        assert_eq!(producer.stats().reallocations, 2);
    }

    #[test]
    fn test_oversized_dequeue_is_out_of_memory() {
        let (producer, _broker) = connected(2);

        let err = producer
            .dequeue(u32::MAX, 1, PixelFormat::Rgba8888, usage::DEFAULT)
            .unwrap_err();
        assert!(matches!(err, QueueError::OutOfMemory { .. }));
        assert!(!producer.core().lock().unwrap().is_abandoned());

        let output = dequeue(&producer, 8, 8);
        assert_eq!(producer.slot(output.slot).unwrap().state, SlotStateKind::Dequeued);
    }

    #[test]
    fn test_oversized_reallocation_is_out_of_memory() {
        let (producer, broker) = connected(2);
        let slot = dequeue(&producer, 8, 8).slot;
        producer.cancel(slot, Some(Fence::no_fence())).unwrap();

        let err = producer
            .dequeue(u32::MAX, 1, PixelFormat::Rgba8888, usage::DEFAULT)
            .unwrap_err();
        assert!(matches!(err, QueueError::OutOfMemory { .. }));
        assert_eq!(broker.stats().buffers_detached, 1);
        assert_eq!(broker.capacity(), 0);

        let output = dequeue(&producer, 8, 8);
        assert!(output.needs_reallocation);
        assert_eq!(producer.request(output.slot).unwrap().width(), 8);
    }

    #[test]
    fn test_broker_repeating_dequeued_slot_abandons_queue() {
        let producer = scripted(vec![fetched(0, 8, 8, 4096), fetched(0, 8, 8, 4096)]);

        assert_eq!(dequeue(&producer, 8, 8).slot, 0);
        let err = producer
            .dequeue(8, 8, PixelFormat::Rgba8888, usage::DEFAULT)
            .unwrap_err();
        assert!(matches!(err, QueueError::Invariant { .. }));
        assert_abandoned(&producer);
    }

    #[test]
    fn test_broker_slot_outside_table_abandons_queue() {
        let producer = scripted(vec![fetched(7, 8, 8, 4096)]);

        let err = producer
            .dequeue(8, 8, PixelFormat::Rgba8888, usage::DEFAULT)
            .unwrap_err();
        assert!(matches!(err, QueueError::Invariant { .. }));
        assert_abandoned(&producer);
    }

    #[test]
    fn test_undersized_broker_buffer_abandons_queue() {
        // 256x256 RGBA needs 256 KiB, the region holds one page
        let producer = scripted(vec![fetched(0, 256, 256, 4096)]);

        let slot = dequeue(&producer, 256, 256).slot;
        let err = producer.request(slot).unwrap_err();
        assert!(matches!(err, QueueError::Invariant { .. }));
        assert_abandoned(&producer);
    }
}
