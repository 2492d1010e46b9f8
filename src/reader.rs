//! Positioned byte access to a hive file.
//!
//! The validators never touch the underlying storage directly; they go
//! through the [`ReadAt`] trait, which models the hive as a random-access
//! sequence of bytes. The only failure a reader can produce on its own is
//! a short read.

use crate::error::{CheckError, Result};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use tracing::debug;

/// A random-access byte source.
///
/// All reads are positioned; the source need not be seekable in a
/// streaming sense.
pub trait ReadAt {
    /// Reads exactly `buf.len()` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::ShortRead`] when the source holds fewer
    /// bytes than requested at that position.
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()>;

    /// Total length of the source in bytes.
    fn len(&self) -> u64;

    /// Returns true if the source is empty.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A hive file opened for checking.
///
/// Backed either by a read-only memory map or by an owned buffer; the
/// owned form exists for in-memory use and tests.
pub struct HiveFile {
    data: HiveData,
}

/// Represents hive data storage.
enum HiveData {
    /// Memory-mapped file data.
    Mapped(Mmap),
    /// Owned data.
    Owned(Vec<u8>),
}

impl HiveData {
    /// Returns a slice of the hive data.
    fn as_slice(&self) -> &[u8] {
        match self {
            HiveData::Mapped(mmap) => mmap,
            HiveData::Owned(data) => data,
        }
    }
}

impl HiveFile {
    /// Opens a hive file read-only and memory-maps it.
    ///
    /// An empty file cannot be mapped on every platform, so it is held
    /// as an (empty) owned buffer instead; the checker then reports the
    /// short read like any other truncated input.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or mapped.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(&path)?;
        let metadata = file.metadata()?;
        let file_size = metadata.len();
        debug!(size = file_size, "opened hive file");

        if file_size == 0 {
            return Ok(Self {
                data: HiveData::Owned(Vec::new()),
            });
        }

        // SAFETY: This is safe because:
        // 1. The file is opened in read-only mode (no write access)
        // 2. The mmap lifetime is tied to the HiveFile lifetime
        // 3. All access to the mmap is bounds-checked via read_at()
        // 4. The file descriptor remains valid for the lifetime of the mmap
        // 5. No other code in this process has mutable access to the file
        let mmap = unsafe { Mmap::map(&file)? };
        debug!(size = mmap.len(), "memory mapped hive file");

        Ok(Self {
            data: HiveData::Mapped(mmap),
        })
    }

    /// Creates a hive source from owned data.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data: HiveData::Owned(data),
        }
    }
}

impl ReadAt for HiveFile {
    fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let data = self.data.as_slice();
        let start = offset as usize;
        let end = start.checked_add(buf.len());

        match end {
            Some(end) if offset <= data.len() as u64 && end <= data.len() => {
                buf.copy_from_slice(&data[start..end]);
                Ok(())
            }
            _ => Err(CheckError::short_read(
                offset,
                buf.len(),
                data.len().saturating_sub(start.min(data.len())),
            )),
        }
    }

    fn len(&self) -> u64 {
        self.data.as_slice().len() as u64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_in_bounds() {
        let src = HiveFile::from_vec(vec![1, 2, 3, 4, 5]);
        let mut buf = [0u8; 3];
        src.read_at(1, &mut buf).unwrap();
        assert_eq!(buf, [2, 3, 4]);
    }

    #[test]
    fn test_read_past_end() {
        let src = HiveFile::from_vec(vec![1, 2, 3]);
        let mut buf = [0u8; 4];
        let err = src.read_at(0, &mut buf).unwrap_err();
        assert!(matches!(
            err,
            CheckError::ShortRead {
                expected: 4,
                actual: 3,
                ..
            }
        ));
    }

    #[test]
    fn test_read_at_far_offset() {
        let src = HiveFile::from_vec(vec![0u8; 8]);
        let mut buf = [0u8; 1];
        let err = src.read_at(100, &mut buf).unwrap_err();
        assert!(matches!(err, CheckError::ShortRead { actual: 0, .. }));
    }

    #[test]
    fn test_empty_source() {
        let src = HiveFile::from_vec(Vec::new());
        assert!(src.is_empty());
        let mut buf = [0u8; 1];
        assert!(src.read_at(0, &mut buf).is_err());
    }
}
