//! The externally visible buffer wrapper handed to producer clients

use std::os::fd::RawFd;

use crate::{
    broker::BrokerBuffer,
    error::{QueueError, Result},
    memory::MemoryHandle,
};

use super::{PixelFormat, Rect};

/// Metadata-bearing handle given to clients in place of the broker buffer
#[derive(Debug, Clone)]
pub struct PresentationBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    layer_count: u32,
    usage: u64,
    stride: u32,
    buffer_id: u64,
    memory: MemoryHandle,
}

impl PresentationBuffer {
    /// Build a wrapper over a broker buffer's geometry and memory
    pub fn from_broker_buffer(buffer: &BrokerBuffer) -> Self {
        let descriptor = buffer.descriptor();
        Self {
            width: descriptor.width,
            height: descriptor.height,
            format: descriptor.format,
            layer_count: descriptor.layer_count,
            usage: descriptor.usage,
            stride: descriptor.stride,
            buffer_id: buffer.id(),
            memory: MemoryHandle::clone(buffer.memory()),
        }
    }

    /// Check that the wrapper describes memory it can actually address
    pub fn validate(&self) -> Result<()> {
        if self.width == 0 || self.height == 0 || self.layer_count == 0 {
            return Err(QueueError::invariant(format!(
                "buffer {} has empty geometry {}x{}x{}",
                self.buffer_id, self.width, self.height, self.layer_count
            )));
        }

        if self.stride < self.width {
            return Err(QueueError::invariant(format!(
                "buffer {} stride {} is narrower than width {}",
                self.buffer_id, self.stride, self.width
            )));
        }

        let required = self
            .format
            .buffer_bytes(self.stride, self.height)
            .and_then(|bytes| bytes.checked_mul(self.layer_count as usize))
            .ok_or_else(|| {
                QueueError::invariant(format!(
                    "buffer {} geometry {}x{} overflows its byte size",
                    self.buffer_id, self.stride, self.height
                ))
            })?;
        if self.memory.size() < required {
            return Err(QueueError::invariant(format!(
                "buffer {} needs {} bytes but its memory holds {}",
                self.buffer_id,
                required,
                self.memory.size()
            )));
        }

        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn layer_count(&self) -> u32 {
        self.layer_count
    }

    pub fn usage(&self) -> u64 {
        self.usage
    }

    pub fn stride(&self) -> u32 {
        self.stride
    }

    /// Id of the broker buffer behind this wrapper
    pub fn buffer_id(&self) -> u64 {
        self.buffer_id
    }

    pub fn memory(&self) -> &MemoryHandle {
        &self.memory
    }

    /// Descriptor for mapping the buffer from another process
    pub fn fd(&self) -> RawFd {
        self.memory.fd()
    }

    /// Buffer bounds anchored at the origin
    pub fn bounds(&self) -> Rect {
        Rect::from_size(self.width, self.height)
    }
}
