//! # Hubqueue - Producer-Side Slot Ownership for Broker-Backed Buffer Queues
//!
//! Hubqueue lets one producer client draw into graphics buffers that live in
//! shared memory owned by a buffer broker, and hand them to consumers without
//! copying. It tracks which buffers the producer currently holds, enforces
//! the legal ownership transitions, and transparently reallocates buffers
//! whose geometry no longer matches what the producer asks for.
//!
//! ## Features
//!
//! - **Closed slot state machine**: every slot is Free, Dequeued or Queued
//! - **Lazy growth**: buffers are allocated on the first dequeue that needs them
//! - **Bounded reallocation**: mismatched buffers are swapped in at most
//!   `config::MAX_QUEUE_CAPACITY` broker round-trips
//! - **Shared memory buffers**: memfd and file-backed regions
//! - **Thread-safe**: every operation runs under one coarse queue lock
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────┐
//! │              QueueProducer                      │
//! │  request / dequeue / queue / cancel / connect   │
//! ├─────────────────────────────────────────────────┤
//! │  QueueCore (one Mutex)                          │
//! │  - SlotTable        - connected API             │
//! │  - dequeued bound   - timeout / generation      │
//! └─────────────────────────────────────────────────┘
//!                        │
//!                        ▼
//! ┌─────────────────────────────────────────────────┐
//! │  BufferBroker (LocalBroker)                     │
//! │  - free pool        - posted buffers            │
//! │  - SharedMemoryRegion per buffer                │
//! └─────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use hubqueue::{
//!     create_local_queue, usage, BrokerConfig, ClientApi, Fence, PixelFormat,
//!     QueueBufferInput, QueueConfig,
//! };
//!
//! let (producer, _broker) = create_local_queue(
//!     QueueConfig::new("preview").with_max_buffer_count(4),
//!     BrokerConfig::new("preview").with_capacity(4),
//! )?;
//! producer.connect(ClientApi::Cpu)?;
//!
//! let dequeued = producer.dequeue(64, 64, PixelFormat::Rgba8888, usage::DEFAULT)?;
//! let buffer = producer.request(dequeued.slot)?;
//! assert_eq!(buffer.width(), 64);
//! producer.queue(dequeued.slot, &QueueBufferInput::new(0, Fence::no_fence()))?;
//! # Ok::<(), hubqueue::QueueError>(())
//! ```

// Core modules
pub mod error;
pub mod graphics;
pub mod memory;
pub mod slots;

// Broker collaborator and the reference in-process broker
pub mod broker;

// Lock-protected queue state and the producer protocol on top of it
pub mod queue;
pub mod producer;

// Main API re-exports
pub use error::{QueueError, Result};
pub use graphics::{
    usage, ClientApi, Fence, PixelFormat, PresentationBuffer, QueryKey, Rect, ScalingMode,
};
pub use memory::{BackingType, RegionConfig, RegionMemoryStats, SharedMemoryRegion};
pub use slots::{SlotState, SlotStateKind, SlotTable, SlotTransition, SlotView};
pub use broker::{
    AcquiredBuffer, BrokerBuffer, BrokerConfig, BrokerStatsSnapshot, BufferBroker,
    BufferDescriptor, BufferMetadata, FetchedBuffer, LocalBroker,
};
pub use queue::{QueueConfig, QueueConfigBuilder, QueueCore};
pub use producer::{
    create_local_queue, DequeueOutput, ProducerStatsSnapshot, QueueBufferInput,
    QueueBufferOutput, QueueProducer,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const VERSION_MAJOR: u32 = 0;
pub const VERSION_MINOR: u32 = 1;
pub const VERSION_PATCH: u32 = 0;

/// Default configuration constants
pub mod config {
    use std::time::Duration;

    use crate::graphics::PixelFormat;

    /// Hard upper bound on the slot table size
    pub const MAX_QUEUE_CAPACITY: usize = 64;

    /// How long dequeue waits on the broker by default
    pub const DEFAULT_DEQUEUE_TIMEOUT: Duration = Duration::from_millis(100);

    /// Geometry reported by queries before a consumer configures one
    pub const DEFAULT_WIDTH: u32 = 1;
    pub const DEFAULT_HEIGHT: u32 = 1;
    pub const DEFAULT_FORMAT: PixelFormat = PixelFormat::Rgba8888;

    /// Largest width or height the broker will allocate
    pub const MAX_BUFFER_DIMENSION: u32 = 16384;
}
