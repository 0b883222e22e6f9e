//! Queue-wide state shared by every producer operation

pub mod config;
pub mod shared;

pub use config::{QueueConfig, QueueConfigBuilder};
pub use shared::{CoreState, QueueCore};
