//! Registry hive base block (header) decoding.
//!
//! The base block is the first 4096 bytes (0x1000) of a registry hive
//! file. Decoding is content-blind: every field is extracted as stored,
//! and all judgments about the values belong to pass 1 of the checker.

use crate::error::{CheckError, Result};
use crate::utils::{read_u32_le, utf16_display};

/// Size of the base block in bytes.
pub const BASE_BLOCK_SIZE: usize = 4096;

/// Expected signature for a valid registry hive ("regf").
pub const REGF_SIGNATURE: &[u8; 4] = b"regf";

/// Offset of the UTF-16LE description field in the base block.
pub const DESCRIPTION_OFFSET: usize = 0x30;

/// Length of the description field in bytes.
pub const DESCRIPTION_LENGTH: usize = 0x40;

/// Offset of the checksum field in the base block.
pub const CHECKSUM_OFFSET: usize = 0x1FC;

/// Registry hive base block header, as stored.
#[derive(Debug, Clone)]
pub struct BaseBlock {
    /// Signature bytes at offset 0, "regf" when well-formed.
    pub signature: [u8; 4],

    /// Two sentinel words at 0x04 and 0x08; identical in a clean hive.
    pub sequence: [u32; 2],

    /// Last written timestamp (Windows FILETIME).
    pub last_written: u64,

    /// The four version words at 0x14..0x24: major, minor, file type,
    /// file format. Expected {1, 3 or 5, 0, 1}.
    pub version: [u32; 4],

    /// Data-space offset of the root key cell.
    pub root_cell_offset: u32,

    /// Length of the hive bin data area in bytes.
    pub data_size: u32,

    /// Description field at 0x30, raw bytes (UTF-16LE when well-formed).
    pub description: [u8; DESCRIPTION_LENGTH],

    /// Stored checksum at 0x1FC (XOR of the preceding 127 words).
    pub checksum: u32,
}

impl BaseBlock {
    /// Decodes a base block from raw bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::Truncated`] if the slice is smaller than
    /// [`BASE_BLOCK_SIZE`]. Field contents never fail decoding.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < BASE_BLOCK_SIZE {
            return Err(CheckError::truncated(0, BASE_BLOCK_SIZE, data.len()));
        }

        let mut signature = [0u8; 4];
        signature.copy_from_slice(&data[0..4]);

        let sequence = [read_u32_le(data, 0x04)?, read_u32_le(data, 0x08)?];

        // Last written timestamp (8 bytes at offset 0x0C)
        let last_written =
            u64::from(read_u32_le(data, 0x0C)?) | (u64::from(read_u32_le(data, 0x10)?) << 32);

        let version = [
            read_u32_le(data, 0x14)?,
            read_u32_le(data, 0x18)?,
            read_u32_le(data, 0x1C)?,
            read_u32_le(data, 0x20)?,
        ];

        let root_cell_offset = read_u32_le(data, 0x24)?;
        let data_size = read_u32_le(data, 0x28)?;

        let mut description = [0u8; DESCRIPTION_LENGTH];
        description
            .copy_from_slice(&data[DESCRIPTION_OFFSET..DESCRIPTION_OFFSET + DESCRIPTION_LENGTH]);

        let checksum = read_u32_le(data, CHECKSUM_OFFSET)?;

        Ok(BaseBlock {
            signature,
            sequence,
            last_written,
            version,
            root_cell_offset,
            data_size,
            description,
            checksum,
        })
    }

    /// Minor format version (the second version word, 3 or 5).
    pub fn minor_version(&self) -> u32 {
        self.version[1]
    }

    /// Decodes the description field for display.
    pub fn description_string(&self) -> String {
        utf16_display(&self.description)
    }

    /// Converts the last written timestamp to a human-readable format.
    pub fn last_written_datetime(&self) -> Option<chrono::DateTime<chrono::Utc>> {
        // Windows FILETIME is 100-nanosecond intervals since 1601-01-01
        // Unix epoch is 1970-01-01, difference is 11644473600 seconds
        const FILETIME_UNIX_DIFF: i64 = 11644473600;

        let seconds = (self.last_written / 10_000_000) as i64 - FILETIME_UNIX_DIFF;
        let nanos = ((self.last_written % 10_000_000) * 100) as u32;

        chrono::DateTime::from_timestamp(seconds, nanos)
    }
}
