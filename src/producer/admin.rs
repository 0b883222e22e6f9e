//! Connection, configuration and the refused operations

use std::{os::fd::OwnedFd, sync::Arc, time::Duration};

use log::{debug, error, info, warn};

use crate::{
    error::{QueueError, Result},
    graphics::{ClientApi, Fence, PixelFormat, PresentationBuffer, QueryKey},
    slots::SlotView,
};

use super::{types::QueueBufferOutput, QueueProducer};

/// Name reported by [`QueueProducer::consumer_name`]
pub const PLACEHOLDER_CONSUMER_NAME: &str = "BufferHubQueue::DummyConsumer";

impl QueueProducer {
    /// Bind a client API as the producer
    pub fn connect(&self, api: ClientApi) -> Result<QueueBufferOutput> {
        self.connect_raw(api.raw())
    }

    /// Bind a client API given by its numeric id
    pub fn connect_raw(&self, api: i32) -> Result<QueueBufferOutput> {
        debug!("connect: api={}", api);
        let result = self.connect_locked(api);
        self.tracked(result)
    }

    fn connect_locked(&self, api: i32) -> Result<QueueBufferOutput> {
        let mut state = self.core.lock()?;
        state.ensure_usable()?;

        if let Some(connected) = state.connected_api {
            error!("connect: already connected to {:?}", connected);
            return Err(QueueError::AlreadyConnected { api: connected });
        }
        let Some(api) = ClientApi::from_raw(api) else {
            error!("connect: unknown client API {}", api);
            return Err(QueueError::invalid_state(format!("unknown client API {}", api)));
        };

        state.connected_api = Some(api);
        info!("connect: {} connected as {:?}", self.core.name(), api);
        Ok(QueueBufferOutput::default())
    }

    /// Release the producer role held by `api`
    pub fn disconnect(&self, api: ClientApi) -> Result<()> {
        debug!("disconnect: api={:?}", api);
        let result = self.disconnect_locked(api);
        self.tracked(result)
    }

    fn disconnect_locked(&self, api: ClientApi) -> Result<()> {
        let mut state = self.core.lock()?;
        if state.connected_api != Some(api) {
            error!(
                "disconnect: {:?} is not connected (connected: {:?})",
                api, state.connected_api
            );
            return Err(QueueError::invalid_argument(
                "api",
                format!("{:?} is not the connected client API", api),
            ));
        }
        state.connected_api = None;
        info!("disconnect: {} released by {:?}", self.core.name(), api);
        Ok(())
    }

    /// Bound the number of simultaneously dequeued slots
    pub fn set_max_dequeued_buffer_count(&self, count: usize) -> Result<()> {
        debug!("set_max_dequeued_buffer_count: count={}", count);
        let result = self.set_max_dequeued_locked(count);
        self.tracked(result)
    }

    fn set_max_dequeued_locked(&self, count: usize) -> Result<()> {
        let mut state = self.core.lock()?;
        state.ensure_usable()?;

        // Table size, itself capped at MAX_QUEUE_CAPACITY by QueueConfig
        let limit = state.max_buffer_count();
        if count == 0 || count > limit {
            error!(
                "set_max_dequeued_buffer_count: {} is out of range (1..={})",
                count, limit
            );
            return Err(QueueError::invalid_argument(
                "max_dequeued_buffer_count",
                format!("{} is out of range (1..={})", count, limit),
            ));
        }
        let dequeued = state.dequeued_count();
        if count < dequeued {
            error!(
                "set_max_dequeued_buffer_count: {} is below the {} slots currently dequeued",
                count, dequeued
            );
            return Err(QueueError::invalid_argument(
                "max_dequeued_buffer_count",
                format!("{} is below the {} slots currently dequeued", count, dequeued),
            ));
        }

        state.max_dequeued_buffer_count = count;
        Ok(())
    }

    /// Accepted and ignored; the broker channel never blocks the consumer
    pub fn set_async_mode(&self, async_mode: bool) -> Result<()> {
        if async_mode {
            warn!("set_async_mode: asynchronous mode has no effect on this queue");
        }
        Ok(())
    }

    pub fn set_generation_number(&self, generation: u32) -> Result<()> {
        let mut state = self.core.lock()?;
        state.generation_number = generation;
        Ok(())
    }

    pub fn generation_number(&self) -> Result<u32> {
        Ok(self.core.lock()?.generation_number)
    }

    pub fn unique_id(&self) -> u64 {
        self.core.unique_id()
    }

    /// Set how long dequeue waits on the broker
    pub fn set_dequeue_timeout(&self, timeout: Duration) -> Result<()> {
        debug!("set_dequeue_timeout: {:?}", timeout);
        let mut state = self.core.lock()?;
        state.dequeue_timeout = timeout;
        Ok(())
    }

    pub fn dequeue_timeout(&self) -> Result<Duration> {
        Ok(self.core.lock()?.dequeue_timeout)
    }

    /// Read a queue property
    pub fn query(&self, key: QueryKey) -> Result<i32> {
        let result = self.query_locked(key);
        self.tracked(result)
    }

    /// Read a queue property given by its numeric key
    pub fn query_raw(&self, what: i32) -> Result<i32> {
        match QueryKey::from_raw(what) {
            Some(key) => self.query(key),
            None => {
                error!("query: unknown key {}", what);
                self.tracked(Err(QueueError::invalid_argument(
                    "what",
                    format!("unknown query key {}", what),
                )))
            }
        }
    }

    fn query_locked(&self, key: QueryKey) -> Result<i32> {
        let state = self.core.lock()?;
        state.ensure_usable()?;

        let broker = self.core.broker();
        let value = match key {
            QueryKey::Width => broker.default_width() as i32,
            QueryKey::Height => broker.default_height() as i32,
            QueryKey::Format => broker.default_format().raw(),
            QueryKey::MinUndequeuedBuffers => 0,
            QueryKey::BufferAge => 0,
            QueryKey::ConsumerRunningBehind => 0,
            QueryKey::ConsumerUsageBits => 0,
            QueryKey::StickyTransform | QueryKey::DefaultDataspace => {
                error!("query: key {:?} is not supported", key);
                return Err(QueueError::invalid_argument(
                    "what",
                    format!("query key {:?} is not supported", key),
                ));
            }
        };
        debug!("query: {:?} = {}", key, value);
        Ok(value)
    }

    /// Buffers stay broker-owned; handing one out is refused
    pub fn detach_buffer(&self, slot: usize) -> Result<()> {
        error!("detach_buffer: slot {} cannot leave the broker", slot);
        self.tracked(Err(QueueError::unsupported("detach_buffer")))
    }

    pub fn detach_next_buffer(&self) -> Result<(Arc<PresentationBuffer>, Fence)> {
        error!("detach_next_buffer: buffers cannot leave the broker");
        self.tracked(Err(QueueError::unsupported("detach_next_buffer")))
    }

    /// Foreign buffers can never be slotted in; the queue is abandoned
    pub fn attach_buffer(&self, buffer: &PresentationBuffer) -> Result<usize> {
        let result = self.core.lock().and_then(|mut state| {
            Err(state.abandon(format!(
                "attach_buffer: buffer {} is not owned by the broker",
                buffer.buffer_id()
            )))
        });
        self.tracked(result)
    }

    /// Only clearing the sideband stream is accepted
    pub fn set_sideband_stream(&self, stream: Option<OwnedFd>) -> Result<()> {
        match stream {
            None => Ok(()),
            Some(_) => {
                error!("set_sideband_stream: sideband streams are not supported");
                self.tracked(Err(QueueError::unsupported("set_sideband_stream")))
            }
        }
    }

    /// Buffers are allocated on demand inside dequeue
    pub fn allocate_buffers(&self, width: u32, height: u32, format: PixelFormat, usage: u64) {
        info!(
            "allocate_buffers: ignored (w={}, h={}, format={}, usage={:#x})",
            width,
            height,
            format.name(),
            usage
        );
    }

    pub fn allow_allocation(&self, allow: bool) -> Result<()> {
        error!("allow_allocation: not supported (allow={})", allow);
        self.tracked(Err(QueueError::unsupported("allow_allocation")))
    }

    pub fn set_shared_buffer_mode(&self, shared: bool) -> Result<()> {
        error!("set_shared_buffer_mode: not supported (shared={})", shared);
        self.tracked(Err(QueueError::unsupported("set_shared_buffer_mode")))
    }

    pub fn set_auto_refresh(&self, auto_refresh: bool) -> Result<()> {
        error!("set_auto_refresh: not supported (auto_refresh={})", auto_refresh);
        self.tracked(Err(QueueError::unsupported("set_auto_refresh")))
    }

    pub fn last_queued_buffer(&self) -> Result<(Arc<PresentationBuffer>, Fence)> {
        error!("last_queued_buffer: not supported");
        self.tracked(Err(QueueError::unsupported("last_queued_buffer")))
    }

    /// The broker fans out to any number of consumers, so there is no real name
    pub fn consumer_name(&self) -> String {
        error!("consumer_name: the broker has no single consumer");
        PLACEHOLDER_CONSUMER_NAME.to_string()
    }

    /// Snapshot of one slot
    pub fn slot(&self, index: usize) -> Result<SlotView> {
        self.core.lock()?.slots().get(index)
    }

    /// Snapshot of every slot
    pub fn slots(&self) -> Result<Vec<SlotView>> {
        Ok(self.core.lock()?.slots().views())
    }

    pub fn max_dequeued_buffer_count(&self) -> Result<usize> {
        Ok(self.core.lock()?.max_dequeued_buffer_count)
    }

    pub fn max_buffer_count(&self) -> Result<usize> {
        Ok(self.core.lock()?.max_buffer_count())
    }

    pub fn connected_api(&self) -> Result<Option<ClientApi>> {
        Ok(self.core.lock()?.connected_api)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        broker::BrokerConfig,
        graphics::usage,
        producer::create_local_queue,
        queue::QueueConfig,
    };

    fn producer(capacity: usize) -> QueueProducer {
        let (producer, _broker) = create_local_queue(
            QueueConfig::new("admin-test").with_max_buffer_count(capacity),
            BrokerConfig::new("admin-test")
                .with_capacity(capacity)
                .with_default_geometry(32, 16, PixelFormat::Rgb565),
        )
        .unwrap();
        producer
    }

    #[test]
    fn test_connect_once() {
        let producer = producer(4);
        assert_eq!(producer.connected_api().unwrap(), None);

        let output = producer.connect(ClientApi::Cpu).unwrap();
        assert_eq!(output, QueueBufferOutput::default());
        assert_eq!(producer.connected_api().unwrap(), Some(ClientApi::Cpu));

        let err = producer.connect(ClientApi::Egl).unwrap_err();
        assert!(matches!(err, QueueError::AlreadyConnected { api: ClientApi::Cpu }));
    }

    #[test]
    fn test_connect_unknown_api() {
        let producer = producer(4);
        let err = producer.connect_raw(42).unwrap_err();
        assert!(matches!(err, QueueError::InvalidState { .. }));
        assert_eq!(producer.connected_api().unwrap(), None);

        producer.connect_raw(3).unwrap();
        assert_eq!(producer.connected_api().unwrap(), Some(ClientApi::Media));
    }

    #[test]
    fn test_disconnect_requires_matching_api() {
        let producer = producer(4);
        let err = producer.disconnect(ClientApi::Cpu).unwrap_err();
        assert!(matches!(err, QueueError::InvalidArgument { .. }));

        producer.connect(ClientApi::Camera).unwrap();
        let err = producer.disconnect(ClientApi::Egl).unwrap_err();
        assert!(matches!(err, QueueError::InvalidArgument { .. }));

        producer.disconnect(ClientApi::Camera).unwrap();
        producer.connect(ClientApi::Egl).unwrap();
    }

    #[test]
    fn test_max_dequeued_bounds() {
        let producer = producer(4);
        assert_eq!(producer.max_dequeued_buffer_count().unwrap(), 1);

        assert!(matches!(
            producer.set_max_dequeued_buffer_count(0).unwrap_err(),
            QueueError::InvalidArgument { .. }
        ));
        assert!(matches!(
            producer.set_max_dequeued_buffer_count(5).unwrap_err(),
            QueueError::InvalidArgument { .. }
        ));
        producer.set_max_dequeued_buffer_count(4).unwrap();
        assert_eq!(producer.max_dequeued_buffer_count().unwrap(), 4);
    }

    #[test]
    fn test_max_dequeued_capped_by_table_size() {
        let full = producer(crate::config::MAX_QUEUE_CAPACITY);
        full.set_max_dequeued_buffer_count(crate::config::MAX_QUEUE_CAPACITY)
            .unwrap();
        assert!(matches!(
            full.set_max_dequeued_buffer_count(crate::config::MAX_QUEUE_CAPACITY + 1)
                .unwrap_err(),
            QueueError::InvalidArgument { .. }
        ));

        let small = producer(2);
        assert!(matches!(
            small
                .set_max_dequeued_buffer_count(crate::config::MAX_QUEUE_CAPACITY)
                .unwrap_err(),
            QueueError::InvalidArgument { .. }
        ));
        assert_eq!(small.max_dequeued_buffer_count().unwrap(), 1);
    }

    #[test]
    fn test_max_dequeued_not_below_dequeued() {
        let producer = producer(4);
        producer.connect(ClientApi::Cpu).unwrap();
        producer.set_max_dequeued_buffer_count(3).unwrap();
        for _ in 0..3 {
            producer
                .dequeue(8, 8, PixelFormat::Rgba8888, usage::DEFAULT)
                .unwrap();
        }

        let err = producer.set_max_dequeued_buffer_count(2).unwrap_err();
        assert!(matches!(err, QueueError::InvalidArgument { .. }));
        assert_eq!(producer.max_dequeued_buffer_count().unwrap(), 3);

        producer.cancel(0, Some(Fence::no_fence())).unwrap();
        producer.cancel(1, Some(Fence::no_fence())).unwrap();
        producer.set_max_dequeued_buffer_count(2).unwrap();
        assert_eq!(producer.max_dequeued_buffer_count().unwrap(), 2);
    }

    #[test]
    fn test_async_mode_is_accepted() {
        let producer = producer(2);
        producer.set_async_mode(true).unwrap();
        producer.set_async_mode(false).unwrap();
    }

    #[test]
    fn test_simple_setters() {
        let producer = producer(2);
        producer.set_generation_number(7).unwrap();
        assert_eq!(producer.generation_number().unwrap(), 7);

        producer.set_dequeue_timeout(Duration::from_millis(5)).unwrap();
        assert_eq!(producer.dequeue_timeout().unwrap(), Duration::from_millis(5));

        assert_eq!(producer.unique_id(), producer.core().unique_id());
        assert_eq!(producer.unique_id() >> 32, std::process::id() as u64);
    }

    #[test]
    fn test_query_defaults() {
        let producer = producer(2);
        assert_eq!(producer.query(QueryKey::Width).unwrap(), 32);
        assert_eq!(producer.query(QueryKey::Height).unwrap(), 16);
        assert_eq!(
            producer.query(QueryKey::Format).unwrap(),
            PixelFormat::Rgb565.raw()
        );
        assert_eq!(producer.query(QueryKey::MinUndequeuedBuffers).unwrap(), 0);
        assert_eq!(producer.query(QueryKey::BufferAge).unwrap(), 0);
        assert_eq!(producer.query(QueryKey::ConsumerRunningBehind).unwrap(), 0);
        assert_eq!(producer.query(QueryKey::ConsumerUsageBits).unwrap(), 0);
        assert_eq!(producer.query_raw(0).unwrap(), 32);
    }

    #[test]
    fn test_query_rejects_unknown_keys() {
        let producer = producer(2);
        for key in [QueryKey::StickyTransform, QueryKey::DefaultDataspace] {
            assert!(matches!(
                producer.query(key).unwrap_err(),
                QueueError::InvalidArgument { .. }
            ));
        }
        assert!(matches!(
            producer.query_raw(1000).unwrap_err(),
            QueueError::InvalidArgument { .. }
        ));
    }

    #[test]
    fn test_refused_operations() {
        let producer = producer(2);
        assert!(matches!(
            producer.detach_buffer(0).unwrap_err(),
            QueueError::Unsupported { .. }
        ));
        assert!(matches!(
            producer.detach_next_buffer().unwrap_err(),
            QueueError::Unsupported { .. }
        ));
        assert!(matches!(
            producer.allow_allocation(true).unwrap_err(),
            QueueError::Unsupported { .. }
        ));
        assert!(matches!(
            producer.set_shared_buffer_mode(true).unwrap_err(),
            QueueError::Unsupported { .. }
        ));
        assert!(matches!(
            producer.set_auto_refresh(true).unwrap_err(),
            QueueError::Unsupported { .. }
        ));
        assert!(matches!(
            producer.last_queued_buffer().unwrap_err(),
            QueueError::Unsupported { .. }
        ));
        assert_eq!(producer.consumer_name(), PLACEHOLDER_CONSUMER_NAME);
        assert_eq!(producer.stats().failures, 6);
    }

    #[test]
    fn test_sideband_stream() {
        let producer = producer(2);
        producer.set_sideband_stream(None).unwrap();

        let stream = OwnedFd::from(tempfile::tempfile().unwrap());
        assert!(matches!(
            producer.set_sideband_stream(Some(stream)).unwrap_err(),
            QueueError::Unsupported { .. }
        ));
    }

    #[test]
    fn test_attach_abandons_queue() {
        let producer = producer(2);
        producer.connect(ClientApi::Cpu).unwrap();
        producer.set_max_dequeued_buffer_count(2).unwrap();
        let slot = producer
            .dequeue(8, 8, PixelFormat::Rgba8888, usage::DEFAULT)
            .unwrap()
            .slot;
        let foreign = producer.request(slot).unwrap();

        let err = producer.attach_buffer(&foreign).unwrap_err();
        assert!(err.is_fatal());

        let err = producer
            .dequeue(8, 8, PixelFormat::Rgba8888, usage::DEFAULT)
            .unwrap_err();
        assert!(matches!(err, QueueError::Invariant { .. }));
        assert!(matches!(
            producer.query(QueryKey::Width).unwrap_err(),
            QueueError::Invariant { .. }
        ));
    }

    #[test]
    fn test_allocate_buffers_is_ignored() {
        let producer = producer(2);
        producer.allocate_buffers(64, 64, PixelFormat::Rgba8888, usage::DEFAULT);
        let broker = Arc::clone(producer.core().broker());
        assert_eq!(broker.capacity(), 0);
    }
}
