//! Error types and handling for hubqueue

use crate::graphics::ClientApi;

/// Result type alias for hubqueue operations
pub type Result<T> = std::result::Result<T, QueueError>;

/// Error kinds surfaced by the slot table, the producer protocol and the broker
#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    /// No client API is connected to the producer
    #[error("No connected producer: {operation} requires a connected client API")]
    NotConnected { operation: &'static str },

    /// A client API is already connected
    #[error("Already connected: {api:?} holds the producer")]
    AlreadyConnected { api: ClientApi },

    /// Slot index outside of the slot table
    #[error("Slot index {slot} out of range [0, {max})")]
    OutOfRange { slot: usize, max: usize },

    /// Slot (or queue) is not in the state the operation requires
    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    /// Malformed request
    #[error("Invalid argument: {parameter} - {message}")]
    InvalidArgument { parameter: String, message: String },

    /// Broker exhausted, allocation failed or dequeue timed out
    #[error("Out of memory: {message}")]
    OutOfMemory { message: String },

    /// Operation the broker-owned buffer model cannot offer
    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: &'static str },

    /// Slot table and broker have diverged; the queue must not be used further
    #[error("Invariant violation: {message}")]
    Invariant { message: String },

    /// I/O related errors (memfd, file backing, mmap)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Metadata record encoding/decoding errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl QueueError {
    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create a not-connected error
    pub fn not_connected(operation: &'static str) -> Self {
        Self::NotConnected { operation }
    }

    /// Create an out-of-range error
    pub fn out_of_range(slot: usize, max: usize) -> Self {
        Self::OutOfRange { slot, max }
    }

    /// Create an invalid state error
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Create an invalid argument error
    pub fn invalid_argument(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create an out-of-memory error
    pub fn out_of_memory(message: impl Into<String>) -> Self {
        Self::OutOfMemory {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(operation: &'static str) -> Self {
        Self::Unsupported { operation }
    }

    /// Create an invariant violation
    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant {
            message: message.into(),
        }
    }

    /// Create a serialization error
    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    /// Whether the error leaves the queue unusable
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Invariant { .. })
    }
}

impl From<std::io::Error> for QueueError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}

impl From<bincode::Error> for QueueError {
    fn from(err: bincode::Error) -> Self {
        Self::serialization(format!("Bincode error: {}", err))
    }
}
