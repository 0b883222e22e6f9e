//! Broker-owned buffer objects

use crate::{
    config::MAX_BUFFER_DIMENSION,
    error::{QueueError, Result},
    graphics::PixelFormat,
    memory::MemoryHandle,
};

/// Process-wide buffer id generator
pub fn next_buffer_id() -> u64 {
    static BUFFER_ID_COUNTER: std::sync::atomic::AtomicU64 =
        std::sync::atomic::AtomicU64::new(1);
    BUFFER_ID_COUNTER.fetch_add(1, std::sync::atomic::Ordering::SeqCst)
}

/// Row alignment, in pixels, of every allocated buffer
pub const STRIDE_ALIGNMENT: u32 = 16;

/// Geometry and usage of a graphics buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub usage: u64,
    pub stride: u32,
    pub layer_count: u32,
    layer_size: usize,
}

impl BufferDescriptor {
    /// Describe a single-layer buffer with the default stride alignment
    ///
    /// Dimensions above [`MAX_BUFFER_DIMENSION`] are rejected so the stride
    /// and byte size always fit their integer types.
    pub fn new(width: u32, height: u32, format: PixelFormat, usage: u64) -> Result<Self> {
        if width > MAX_BUFFER_DIMENSION || height > MAX_BUFFER_DIMENSION {
            return Err(QueueError::invalid_argument(
                "geometry",
                format!(
                    "{}x{} exceeds the {} pixel limit",
                    width, height, MAX_BUFFER_DIMENSION
                ),
            ));
        }

        let overflow = || {
            QueueError::invalid_argument(
                "geometry",
                format!("{}x{} {} overflows the buffer size", width, height, format.name()),
            )
        };
        let stride = match format {
            PixelFormat::Blob => width,
            _ => width
                .checked_add(STRIDE_ALIGNMENT - 1)
                .ok_or_else(overflow)?
                / STRIDE_ALIGNMENT
                * STRIDE_ALIGNMENT,
        };
        let layer_size = format.buffer_bytes(stride, height).ok_or_else(overflow)?;

        Ok(Self {
            width,
            height,
            format,
            usage,
            stride,
            layer_count: 1,
            layer_size,
        })
    }

    /// Bytes of backing memory the buffer needs
    pub fn byte_size(&self) -> usize {
        self.layer_size.saturating_mul(self.layer_count as usize)
    }
}

/// A buffer allocated by the broker
#[derive(Debug)]
pub struct BrokerBuffer {
    id: u64,
    descriptor: BufferDescriptor,
    memory: MemoryHandle,
}

impl BrokerBuffer {
    pub fn new(id: u64, descriptor: BufferDescriptor, memory: MemoryHandle) -> Self {
        Self {
            id,
            descriptor,
            memory,
        }
    }

    /// Broker-wide unique buffer id
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn descriptor(&self) -> &BufferDescriptor {
        &self.descriptor
    }

    pub fn width(&self) -> u32 {
        self.descriptor.width
    }

    pub fn height(&self) -> u32 {
        self.descriptor.height
    }

    pub fn format(&self) -> PixelFormat {
        self.descriptor.format
    }

    pub fn usage(&self) -> u64 {
        self.descriptor.usage
    }

    pub fn stride(&self) -> u32 {
        self.descriptor.stride
    }

    pub fn memory(&self) -> &MemoryHandle {
        &self.memory
    }

    /// Whether the buffer can serve a request of this geometry and format
    pub fn matches(&self, width: u32, height: u32, format: PixelFormat) -> bool {
        self.descriptor.width == width
            && self.descriptor.height == height
            && self.descriptor.format == format
    }
}
