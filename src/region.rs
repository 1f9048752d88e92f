//! Backing byte regions
//!
//! A `Region` is a flat, fixed-capacity byte array that a block pool slices
//! into blocks. It is either a memory-mapped file or a plain heap buffer;
//! the pool never resizes it.

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};

use memmap2::{MmapMut, MmapOptions};

use crate::error::{BlockKvError, Result};

/// Fixed-capacity byte region backing one block pool
pub enum Region {
    /// Read-write mapping of the first `len` bytes of a file
    Mapped { mmap: MmapMut, path: PathBuf },

    /// Heap buffer, used for tests and scratch stores
    Memory(Vec<u8>),
}

impl Region {
    /// Map `len` bytes of the file at `path`, creating it if missing.
    ///
    /// A file shorter than `len` is extended with zero bytes, which the
    /// block layout reads as free blocks. A longer file is mapped only up
    /// to `len`.
    pub fn open(path: &Path, len: usize) -> Result<Self> {
        if len == 0 {
            return Err(BlockKvError::Config(format!(
                "cannot map an empty region at {}",
                path.display()
            )));
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let current = file.metadata()?.len();
        if current < len as u64 {
            file.set_len(len as u64)?;
        }

        // Safety: the store owns this mapping for its whole lifetime and the
        // file is not resized while mapped.
        let mmap = unsafe { MmapOptions::new().len(len).map_mut(&file)? };

        tracing::debug!(
            path = %path.display(),
            len = len,
            existing_len = current,
            "Mapped region"
        );

        Ok(Region::Mapped {
            mmap,
            path: path.to_path_buf(),
        })
    }

    /// Zero-filled heap region of `len` bytes
    pub fn in_memory(len: usize) -> Self {
        Region::Memory(vec![0u8; len])
    }

    /// Heap region over existing bytes (e.g. a region taken out of a store)
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Region::Memory(bytes)
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn as_slice(&self) -> &[u8] {
        match self {
            Region::Mapped { mmap, .. } => &mmap[..],
            Region::Memory(bytes) => bytes.as_slice(),
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        match self {
            Region::Mapped { mmap, .. } => &mut mmap[..],
            Region::Memory(bytes) => bytes.as_mut_slice(),
        }
    }

    /// Backing file, if mapped
    pub fn path(&self) -> Option<&Path> {
        match self {
            Region::Mapped { path, .. } => Some(path),
            Region::Memory(_) => None,
        }
    }

    /// Write dirty pages back to the file (no-op for heap regions)
    pub fn flush(&self) -> Result<()> {
        if let Region::Mapped { mmap, .. } = self {
            mmap.flush()?;
        }
        Ok(())
    }

    /// Copy of the region contents
    pub fn to_bytes(&self) -> Vec<u8> {
        self.as_slice().to_vec()
    }
}

impl std::fmt::Debug for Region {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Region::Mapped { mmap, path } => f
                .debug_struct("Region::Mapped")
                .field("path", path)
                .field("len", &mmap.len())
                .finish(),
            Region::Memory(bytes) => f
                .debug_struct("Region::Memory")
                .field("len", &bytes.len())
                .finish(),
        }
    }
}
