//! Shared memory region implementation

use std::{
    fs::{File, OpenOptions},
    os::fd::{AsRawFd, OwnedFd, RawFd},
    os::unix::fs::OpenOptionsExt,
    path::PathBuf,
    time::SystemTime,
};

use memmap2::{MmapMut, MmapOptions};

use crate::error::{QueueError, Result};

use super::config::{BackingType, RegionConfig};

/// System page size, used to round region sizes
pub fn page_size() -> usize {
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 {
        4096
    } else {
        size as usize
    }
}

fn round_to_page(size: usize) -> usize {
    let page = page_size();
    (size + page - 1) / page * page
}

/// Descriptor that keeps the region's backing alive
#[derive(Debug)]
enum Backing {
    File { file: File, path: PathBuf },
    #[cfg(target_os = "linux")]
    MemFd(OwnedFd),
}

/// A mapped shared memory region holding one buffer's pixels
#[derive(Debug)]
pub struct SharedMemoryRegion {
    name: String,
    size: usize,
    backing_type: BackingType,
    created_at: SystemTime,
    mmap: MmapMut,
    backing: Backing,
}

impl SharedMemoryRegion {
    /// Create a new shared memory region
    pub fn new(config: RegionConfig) -> Result<Self> {
        config.validate()?;

        let size = round_to_page(config.size);
        let backing = Self::create_backing(&config, size)?;
        let mmap = Self::create_mapping(&backing, size)?;

        Ok(Self {
            name: config.name,
            size,
            backing_type: config.backing_type,
            created_at: SystemTime::now(),
            mmap,
            backing,
        })
    }

    fn create_backing(config: &RegionConfig, size: usize) -> Result<Backing> {
        match config.backing_type {
            BackingType::FileBacked => Self::create_file_backing(config, size),
            #[cfg(target_os = "linux")]
            BackingType::MemFd => Self::create_memfd_backing(config, size),
        }
    }

    fn create_file_backing(config: &RegionConfig, size: usize) -> Result<Backing> {
        let path = config.file_path();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .mode(config.permissions)
            .open(&path)
            .map_err(|e| QueueError::from_io(e, "Failed to create backing file"))?;

        file.set_len(size as u64)
            .map_err(|e| QueueError::from_io(e, "Failed to set file size"))?;

        Ok(Backing::File { file, path })
    }

    #[cfg(target_os = "linux")]
    fn create_memfd_backing(config: &RegionConfig, size: usize) -> Result<Backing> {
        use nix::{
            sys::memfd::{memfd_create, MemFdCreateFlag},
            unistd::ftruncate,
        };
        use std::ffi::CString;

        let name_cstr = CString::new(config.name.clone())
            .map_err(|_| QueueError::invalid_argument("name", "Name contains null bytes"))?;

        let owned_fd = memfd_create(&name_cstr, MemFdCreateFlag::MFD_CLOEXEC).map_err(|e| {
            QueueError::from_io(std::io::Error::from(e), "Failed to create memfd")
        })?;

        ftruncate(&owned_fd, size as libc::off_t).map_err(|e| {
            QueueError::from_io(std::io::Error::from(e), "Failed to set memfd size")
        })?;

        Ok(Backing::MemFd(owned_fd))
    }

    fn create_mapping(backing: &Backing, size: usize) -> Result<MmapMut> {
        let mapping = match backing {
            Backing::File { file, .. } => unsafe { MmapOptions::new().len(size).map_mut(file) },
            #[cfg(target_os = "linux")]
            Backing::MemFd(fd) => unsafe { MmapOptions::new().len(size).map_mut(fd) },
        };
        mapping.map_err(|e| QueueError::from_io(e, "Failed to create memory mapping"))
    }

    /// Get the raw memory slice (read-only)
    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    /// Get the raw memory slice (mutable)
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.mmap
    }

    /// Get a mutable pointer for writers sharing the region through an `Arc`
    ///
    /// # Safety
    /// Caller must hold producer ownership of the buffer (dequeued slot) so
    /// that no consumer reads the memory concurrently.
    pub unsafe fn as_mut_ptr_unsafe(&self) -> *mut u8 {
        self.mmap.as_ptr() as *mut u8
    }

    /// Mapped size in bytes (page-rounded)
    pub fn size(&self) -> usize {
        self.size
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn backing_type(&self) -> BackingType {
        self.backing_type
    }

    /// Descriptor to hand to another process
    pub fn fd(&self) -> RawFd {
        match &self.backing {
            Backing::File { file, .. } => file.as_raw_fd(),
            #[cfg(target_os = "linux")]
            Backing::MemFd(fd) => fd.as_raw_fd(),
        }
    }

    /// Get memory statistics for this region
    pub fn memory_stats(&self) -> RegionMemoryStats {
        RegionMemoryStats {
            name: self.name.clone(),
            size: self.size,
            backing_type: self.backing_type,
            created_at: self.created_at,
            fd: self.fd(),
        }
    }
}

impl Drop for SharedMemoryRegion {
    fn drop(&mut self) {
        if let Backing::File { path, .. } = &self.backing {
            if let Err(e) = std::fs::remove_file(path) {
                log::warn!("Failed to remove backing file {}: {}", path.display(), e);
            }
        }
    }
}

/// Memory statistics for a region
#[derive(Debug, Clone)]
pub struct RegionMemoryStats {
    pub name: String,
    pub size: usize,
    pub backing_type: BackingType,
    pub created_at: SystemTime,
    pub fd: RawFd,
}

impl RegionMemoryStats {
    /// Get the age of the region in seconds
    pub fn age_seconds(&self) -> Option<u64> {
        self.created_at.elapsed().ok().map(|d| d.as_secs())
    }
}
