//! Metadata record posted alongside a queued buffer

use serde::{Deserialize, Serialize};

use crate::{
    error::Result,
    graphics::{Rect, ScalingMode},
};

/// Per-frame record the consumer receives with each posted buffer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BufferMetadata {
    /// Presentation timestamp in nanoseconds
    pub timestamp: i64,
    pub is_auto_timestamp: bool,
    pub dataspace: i32,
    pub crop: Rect,
    pub scaling_mode: ScalingMode,
    pub transform: u32,
}

impl BufferMetadata {
    /// Encode into the opaque byte record the broker carries
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode a record produced by [`BufferMetadata::encode`]
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(bincode::deserialize(bytes)?)
    }
}
