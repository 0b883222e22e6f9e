//! Local broker configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{
    config::{DEFAULT_FORMAT, DEFAULT_HEIGHT, DEFAULT_WIDTH, MAX_QUEUE_CAPACITY},
    error::{QueueError, Result},
    graphics::{usage, PixelFormat},
    memory::BackingType,
};

/// Configuration for a [`LocalBroker`](super::LocalBroker)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Name used as a prefix for buffer regions
    pub name: String,
    /// Number of buffer slots the broker manages
    pub capacity: usize,
    /// Geometry reported to clients that ask for defaults
    pub default_width: u32,
    pub default_height: u32,
    pub default_format: PixelFormat,
    pub default_usage: u64,
    /// Backing for buffer memory
    pub backing_type: BackingType,
    /// Directory for file-backed buffers
    pub file_dir: Option<PathBuf>,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            name: "broker".to_string(),
            capacity: MAX_QUEUE_CAPACITY,
            default_width: DEFAULT_WIDTH,
            default_height: DEFAULT_HEIGHT,
            default_format: DEFAULT_FORMAT,
            default_usage: usage::DEFAULT,
            backing_type: BackingType::default(),
            file_dir: None,
        }
    }
}

impl BrokerConfig {
    /// Create a new configuration with custom name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set slot capacity
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the default geometry
    pub fn with_default_geometry(mut self, width: u32, height: u32, format: PixelFormat) -> Self {
        self.default_width = width;
        self.default_height = height;
        self.default_format = format;
        self
    }

    /// Set the backing type
    pub fn with_backing_type(mut self, backing_type: BackingType) -> Self {
        self.backing_type = backing_type;
        self
    }

    /// Set the directory for file-backed buffers
    pub fn with_file_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.file_dir = Some(dir.into());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(QueueError::invalid_argument("name", "Broker name cannot be empty"));
        }

        if self.capacity == 0 || self.capacity > MAX_QUEUE_CAPACITY {
            return Err(QueueError::invalid_argument(
                "capacity",
                format!("Capacity must be in (0, {}]", MAX_QUEUE_CAPACITY),
            ));
        }

        if self.default_width == 0 || self.default_height == 0 {
            return Err(QueueError::invalid_argument(
                "default_geometry",
                "Default width and height must be non-zero",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(BrokerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_capacity_bounds() {
        assert!(BrokerConfig::new("b").with_capacity(0).validate().is_err());
        assert!(BrokerConfig::new("b")
            .with_capacity(MAX_QUEUE_CAPACITY + 1)
            .validate()
            .is_err());
        assert!(BrokerConfig::new("b").with_capacity(3).validate().is_ok());
    }
}
