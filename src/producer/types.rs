//! Input and output records of the producer protocol

use crate::graphics::{Fence, Rect, ScalingMode};

/// Result of a successful dequeue
#[derive(Debug, Clone)]
pub struct DequeueOutput {
    pub slot: usize,
    /// Always a no-op fence; broker fences are not exposed at this layer
    pub fence: Fence,
    /// The slot's buffer was replaced since the client last saw it
    pub needs_reallocation: bool,
}

/// Parameters of a queue call
#[derive(Debug, Clone)]
pub struct QueueBufferInput {
    /// Presentation timestamp in nanoseconds
    pub timestamp: i64,
    pub is_auto_timestamp: bool,
    pub dataspace: i32,
    /// Crop rectangle; must lie within the buffer. Empty means no crop.
    pub crop: Rect,
    /// Raw scaling mode, validated on queue
    pub scaling_mode: i32,
    pub transform: u32,
    /// Acquire fence for the consumer; required
    pub fence: Option<Fence>,
}

impl QueueBufferInput {
    /// Input with no crop, freeze scaling and no transform
    pub fn new(timestamp: i64, fence: Fence) -> Self {
        Self {
            timestamp,
            is_auto_timestamp: false,
            dataspace: 0,
            crop: Rect::EMPTY,
            scaling_mode: ScalingMode::Freeze.raw(),
            transform: 0,
            fence: Some(fence),
        }
    }

    pub fn with_crop(mut self, crop: Rect) -> Self {
        self.crop = crop;
        self
    }

    pub fn with_scaling_mode(mut self, mode: ScalingMode) -> Self {
        self.scaling_mode = mode.raw();
        self
    }

    pub fn with_transform(mut self, transform: u32) -> Self {
        self.transform = transform;
        self
    }

    pub fn with_dataspace(mut self, dataspace: i32) -> Self {
        self.dataspace = dataspace;
        self
    }
}

/// Result of a successful queue (and of connect)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueBufferOutput {
    pub width: u32,
    pub height: u32,
    pub transform_hint: u32,
    /// Always 0: the producer cannot see what the consumer has acquired
    pub pending_count: u32,
    /// Always 0: not used by this queue's consumers
    pub next_frame_number: u64,
}
