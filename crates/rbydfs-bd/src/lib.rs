//! Block-device abstraction.
//!
//! The decoder sees storage as a sequence of independently seekable,
//! fixed-size blocks and only ever reads. The [`Bd`] trait is the seam:
//! the real implementation is a read-only file, and tests use an
//! in-memory store, the same trait-at-the-seam pattern as a pager's page
//! reader.
//!
//! Reads near the end of the device may return fewer than `block_size`
//! bytes, and reads entirely past the end return an empty buffer. Both
//! are data, not errors: the log scanner treats missing tail bytes as
//! unwritten storage.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use parking_lot::Mutex;
use rbydfs_error::{RbydError, Result};

/// Read access to a device of fixed-size blocks.
pub trait Bd {
    /// Read one block-sized region. May return fewer than `block_size`
    /// bytes at the end of the device.
    fn read_block(&self, block_size: u32, block: u32) -> Result<Vec<u8>>;
}

/// A read-only file treated as a block device.
#[derive(Debug)]
pub struct FileBd {
    file: Mutex<File>,
}

impl FileBd {
    /// Open a file for block reads.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| match err.kind() {
            std::io::ErrorKind::NotFound => RbydError::DeviceNotFound {
                path: path.to_path_buf(),
            },
            _ => RbydError::Io(err),
        })?;
        Ok(Self {
            file: Mutex::new(file),
        })
    }

    /// Total size of the underlying file in bytes.
    pub fn size(&self) -> Result<u64> {
        Ok(self.file.lock().metadata()?.len())
    }
}

impl Bd for FileBd {
    fn read_block(&self, block_size: u32, block: u32) -> Result<Vec<u8>> {
        if block_size == 0 {
            return Err(RbydError::InvalidBlockSize { block_size });
        }
        let off = u64::from(block) * u64::from(block_size);
        let mut file = self.file.lock();
        file.seek(SeekFrom::Start(off))?;
        let mut data = Vec::with_capacity(block_size as usize);
        file.by_ref()
            .take(u64::from(block_size))
            .read_to_end(&mut data)?;
        Ok(data)
    }
}

/// An in-memory block device backed by a byte vector.
#[derive(Debug, Clone, Default)]
pub struct RamBd {
    data: Vec<u8>,
}

impl RamBd {
    #[must_use]
    pub fn new(data: Vec<u8>) -> Self {
        Self { data }
    }

    /// Place `data` at `block`, growing the device as needed.
    pub fn set_block(&mut self, block_size: u32, block: u32, data: &[u8]) {
        let off = block as usize * block_size as usize;
        let end = off + data.len();
        if self.data.len() < end {
            self.data.resize(end, 0xff);
        }
        self.data[off..end].copy_from_slice(data);
    }

    /// Mutable access to the raw bytes, for corruption tests.
    pub fn data_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }
}

impl Bd for RamBd {
    fn read_block(&self, block_size: u32, block: u32) -> Result<Vec<u8>> {
        if block_size == 0 {
            return Err(RbydError::InvalidBlockSize { block_size });
        }
        let off = block as usize * block_size as usize;
        let end = off
            .saturating_add(block_size as usize)
            .min(self.data.len());
        if off >= self.data.len() {
            return Ok(Vec::new());
        }
        Ok(self.data[off..end].to_vec())
    }
}
