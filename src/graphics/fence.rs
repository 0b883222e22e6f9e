//! Opaque synchronization tokens passed through the queue

use std::{
    fmt,
    os::fd::{AsRawFd, OwnedFd, RawFd},
    sync::Arc,
};

use crate::error::{QueueError, Result};

/// A fence handed between producer, broker and consumer.
///
/// The queue never waits on a fence; it only checks presence and forwards
/// it. Cloning shares the underlying descriptor.
#[derive(Clone, Default)]
pub struct Fence {
    fd: Option<Arc<OwnedFd>>,
}

impl Fence {
    /// A fence that is already signaled
    pub fn no_fence() -> Self {
        Self { fd: None }
    }

    /// Wrap a sync file descriptor
    pub fn from_fd(fd: OwnedFd) -> Self {
        Self {
            fd: Some(Arc::new(fd)),
        }
    }

    /// Whether a descriptor backs this fence
    pub fn is_valid(&self) -> bool {
        self.fd.is_some()
    }

    pub fn raw_fd(&self) -> Option<RawFd> {
        self.fd.as_ref().map(|fd| fd.as_raw_fd())
    }

    /// Duplicate the descriptor for a receiver that needs its own copy
    pub fn dup(&self) -> Result<Option<OwnedFd>> {
        self.fd
            .as_ref()
            .map(|fd| {
                fd.try_clone()
                    .map_err(|e| QueueError::from_io(e, "Failed to duplicate fence"))
            })
            .transpose()
    }
}

impl fmt::Debug for Fence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.raw_fd() {
            Some(fd) => write!(f, "Fence(fd={})", fd),
            None => write!(f, "Fence(NO_FENCE)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_fence() {
        let fence = Fence::no_fence();
        assert!(!fence.is_valid());
        assert!(fence.dup().unwrap().is_none());
        assert_eq!(format!("{:?}", fence), "Fence(NO_FENCE)");
    }

    #[test]
    fn test_fd_fence_dup() {
        let file = tempfile::tempfile().unwrap();
        let fence = Fence::from_fd(OwnedFd::from(file));
        assert!(fence.is_valid());

        let copy = fence.dup().unwrap().unwrap();
        assert_ne!(copy.as_raw_fd(), fence.raw_fd().unwrap());
    }
}
