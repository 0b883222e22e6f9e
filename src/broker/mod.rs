//! The buffer broker collaborator
//!
//! The broker owns graphics memory for its whole lifetime. The producer
//! protocol only ever borrows buffers from it: it fetches a free buffer with
//! a bounded blocking dequeue, hands it back on cancel, posts it to the
//! consumer side on queue, and asks for a detach plus fresh allocation when
//! geometry does not match.

pub mod buffer;
pub mod config;
pub mod local;
pub mod metadata;
pub mod stats;

use std::{fmt, sync::Arc, time::Duration};

use crate::{
    error::Result,
    graphics::{Fence, PixelFormat},
};

pub use buffer::{BrokerBuffer, BufferDescriptor};
pub use config::BrokerConfig;
pub use local::{AcquiredBuffer, LocalBroker, Ownership};
pub use metadata::BufferMetadata;
pub use stats::{BrokerStats, BrokerStatsSnapshot};

/// A buffer fetched from the broker's free pool
#[derive(Debug, Clone)]
pub struct FetchedBuffer {
    /// Slot the broker stores this buffer in
    pub slot: usize,
    /// The broker-owned buffer object
    pub buffer: Arc<BrokerBuffer>,
    /// Release fence left by the last reader
    pub fence: Fence,
}

/// Allocation and circulation primitives a broker must provide
pub trait BufferBroker: Send + Sync + fmt::Debug {
    /// Allocate `count` buffers and add them to the free pool
    fn allocate(
        &self,
        width: u32,
        height: u32,
        format: PixelFormat,
        usage: u64,
        count: usize,
    ) -> Result<()>;

    /// Take a buffer from the free pool, blocking up to `timeout`
    fn dequeue(&self, timeout: Duration) -> Result<FetchedBuffer>;

    /// Return a producer-held buffer to the free pool, tagged with its slot
    fn enqueue(&self, buffer: Arc<BrokerBuffer>, slot: usize) -> Result<()>;

    /// Release a slot's buffer ahead of reallocation
    fn detach(&self, slot: usize) -> Result<()>;

    /// Hand a producer-held buffer to the consumer side
    fn post(&self, slot: usize, buffer: &Arc<BrokerBuffer>, fence: Fence, metadata: &[u8])
        -> Result<()>;

    /// Number of buffers currently allocated
    fn capacity(&self) -> usize;

    fn default_width(&self) -> u32;

    fn default_height(&self) -> u32;

    fn default_format(&self) -> PixelFormat;
}
