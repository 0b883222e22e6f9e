//! Client API identifiers, scaling modes and query keys

use serde::{Deserialize, Serialize};

/// Client APIs that may connect as the producer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClientApi {
    Egl,
    Cpu,
    Media,
    Camera,
}

impl ClientApi {
    pub fn raw(self) -> i32 {
        match self {
            ClientApi::Egl => 1,
            ClientApi::Cpu => 2,
            ClientApi::Media => 3,
            ClientApi::Camera => 4,
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            1 => Some(ClientApi::Egl),
            2 => Some(ClientApi::Cpu),
            3 => Some(ClientApi::Media),
            4 => Some(ClientApi::Camera),
            _ => None,
        }
    }
}

/// How the consumer maps buffer content onto its window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScalingMode {
    Freeze,
    ScaleToWindow,
    ScaleCrop,
    NoScaleCrop,
}

impl ScalingMode {
    pub fn raw(self) -> i32 {
        match self {
            ScalingMode::Freeze => 0,
            ScalingMode::ScaleToWindow => 1,
            ScalingMode::ScaleCrop => 2,
            ScalingMode::NoScaleCrop => 3,
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(ScalingMode::Freeze),
            1 => Some(ScalingMode::ScaleToWindow),
            2 => Some(ScalingMode::ScaleCrop),
            3 => Some(ScalingMode::NoScaleCrop),
            _ => None,
        }
    }
}

/// Keys accepted by `QueueProducer::query`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKey {
    Width,
    Height,
    Format,
    MinUndequeuedBuffers,
    ConsumerRunningBehind,
    ConsumerUsageBits,
    BufferAge,
    /// Known key, rejected by this queue
    StickyTransform,
    /// Known key, rejected by this queue
    DefaultDataspace,
}

impl QueryKey {
    pub fn raw(self) -> i32 {
        match self {
            QueryKey::Width => 0,
            QueryKey::Height => 1,
            QueryKey::Format => 2,
            QueryKey::MinUndequeuedBuffers => 3,
            QueryKey::ConsumerRunningBehind => 9,
            QueryKey::ConsumerUsageBits => 10,
            QueryKey::StickyTransform => 11,
            QueryKey::DefaultDataspace => 12,
            QueryKey::BufferAge => 13,
        }
    }

    pub fn from_raw(raw: i32) -> Option<Self> {
        Some(match raw {
            0 => QueryKey::Width,
            1 => QueryKey::Height,
            2 => QueryKey::Format,
            3 => QueryKey::MinUndequeuedBuffers,
            9 => QueryKey::ConsumerRunningBehind,
            10 => QueryKey::ConsumerUsageBits,
            11 => QueryKey::StickyTransform,
            12 => QueryKey::DefaultDataspace,
            13 => QueryKey::BufferAge,
            _ => return None,
        })
    }
}
