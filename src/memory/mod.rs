//! Shared memory backing for broker buffers
//!
//! Every buffer the broker hands out is a memfd (or file) backed region that
//! can be mapped by any process holding its descriptor.

pub mod config;
pub mod regions;

use std::sync::Arc;

pub use config::{BackingType, RegionConfig};
pub use regions::{page_size, RegionMemoryStats, SharedMemoryRegion};

/// Opaque handle to the memory behind a buffer
pub type MemoryHandle = Arc<SharedMemoryRegion>;
