//! Queue configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    config::{DEFAULT_DEQUEUE_TIMEOUT, MAX_QUEUE_CAPACITY},
    error::{QueueError, Result},
};

/// Configuration for a buffer queue's slot table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Name of the queue, used in log lines
    pub name: String,
    /// Total number of slots; fixed for the lifetime of the queue
    pub max_buffer_count: usize,
    /// Initial bound on simultaneously dequeued slots
    pub max_dequeued_buffer_count: usize,
    /// How long a dequeue waits on the broker
    pub dequeue_timeout: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            max_buffer_count: MAX_QUEUE_CAPACITY,
            max_dequeued_buffer_count: 1,
            dequeue_timeout: DEFAULT_DEQUEUE_TIMEOUT,
        }
    }
}

impl QueueConfig {
    /// Create a new configuration with custom name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    /// Set the slot table size
    pub fn with_max_buffer_count(mut self, count: usize) -> Self {
        self.max_buffer_count = count;
        self
    }

    /// Set the initial dequeued-slot bound
    pub fn with_max_dequeued_buffer_count(mut self, count: usize) -> Self {
        self.max_dequeued_buffer_count = count;
        self
    }

    /// Set the dequeue timeout
    pub fn with_dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.dequeue_timeout = timeout;
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.max_buffer_count == 0 || self.max_buffer_count > MAX_QUEUE_CAPACITY {
            return Err(QueueError::invalid_argument(
                "max_buffer_count",
                format!("Buffer count must be in (0, {}]", MAX_QUEUE_CAPACITY),
            ));
        }

        if self.max_dequeued_buffer_count == 0
            || self.max_dequeued_buffer_count > self.max_buffer_count
        {
            return Err(QueueError::invalid_argument(
                "max_dequeued_buffer_count",
                format!(
                    "Dequeued bound must be in (0, {}]",
                    self.max_buffer_count
                ),
            ));
        }

        Ok(())
    }
}

/// Builder pattern for queue configuration
pub struct QueueConfigBuilder {
    config: QueueConfig,
}

impl QueueConfigBuilder {
    /// Create a new builder
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            config: QueueConfig::new(name),
        }
    }

    pub fn max_buffer_count(mut self, count: usize) -> Self {
        self.config.max_buffer_count = count;
        self
    }

    pub fn max_dequeued_buffer_count(mut self, count: usize) -> Self {
        self.config.max_dequeued_buffer_count = count;
        self
    }

    pub fn dequeue_timeout(mut self, timeout: Duration) -> Self {
        self.config.dequeue_timeout = timeout;
        self
    }

    /// Build the configuration
    pub fn build(self) -> Result<QueueConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
