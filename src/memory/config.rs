//! Configuration types for shared memory regions

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Types of shared memory backing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackingType {
    /// File-backed shared memory
    FileBacked,
    /// Anonymous memory file descriptor (Linux-specific)
    #[cfg(target_os = "linux")]
    MemFd,
}

impl Default for BackingType {
    fn default() -> Self {
        #[cfg(target_os = "linux")]
        {
            Self::MemFd
        }
        #[cfg(not(target_os = "linux"))]
        {
            Self::FileBacked
        }
    }
}

impl BackingType {
    /// Get a human-readable name for the backing type
    pub fn name(&self) -> &'static str {
        match self {
            BackingType::FileBacked => "file-backed",
            #[cfg(target_os = "linux")]
            BackingType::MemFd => "memfd",
        }
    }
}

/// Configuration for creating a buffer's shared memory region
#[derive(Debug, Clone)]
pub struct RegionConfig {
    /// Name of the region (memfd name or file stem)
    pub name: String,
    /// Requested size in bytes, rounded up to the page size on creation
    pub size: usize,
    /// Backing type for the shared memory
    pub backing_type: BackingType,
    /// Directory for file-backed regions
    pub file_dir: Option<PathBuf>,
    /// Permissions for file-backed regions (Unix permissions)
    pub permissions: u32,
}

impl Default for RegionConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            size: 0,
            backing_type: BackingType::default(),
            file_dir: None,
            permissions: 0o600,
        }
    }
}

impl RegionConfig {
    /// Create a new region configuration
    pub fn new(name: impl Into<String>, size: usize) -> Self {
        Self {
            name: name.into(),
            size,
            ..Default::default()
        }
    }

    /// Set the backing type
    pub fn with_backing_type(mut self, backing_type: BackingType) -> Self {
        self.backing_type = backing_type;
        self
    }

    /// Set the directory for file-backed regions
    pub fn with_file_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.file_dir = Some(dir.into());
        self
    }

    /// Validate the configuration
    pub fn validate(&self) -> crate::Result<()> {
        use crate::error::QueueError;

        if self.name.is_empty() {
            return Err(QueueError::invalid_argument(
                "name",
                "Region name cannot be empty",
            ));
        }

        if self.name.contains('\0') || self.name.contains('/') {
            return Err(QueueError::invalid_argument(
                "name",
                "Region name cannot contain '/' or NUL",
            ));
        }

        if self.size == 0 {
            return Err(QueueError::invalid_argument(
                "size",
                "Region size must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Path of the backing file for file-backed regions
    pub fn file_path(&self) -> PathBuf {
        self.file_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
            .join(format!("hubqueue_{}", self.name))
    }
}
