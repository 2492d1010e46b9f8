//! Utility functions for binary parsing, checksums, and name ordering.

use crate::error::{CheckError, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use encoding_rs::UTF_16LE;
use std::cmp::Ordering;
use std::io::Cursor;

/// Offset where hive bins start (after the base block).
pub const HBIN_START_OFFSET: u32 = 0x1000;

/// Reads a u32 from a byte slice at the given offset.
pub fn read_u32_le(data: &[u8], offset: usize) -> Result<u32> {
    if offset + 4 > data.len() {
        return Err(CheckError::truncated(
            offset as u32,
            4,
            data.len().saturating_sub(offset),
        ));
    }

    let mut cursor = Cursor::new(&data[offset..offset + 4]);
    Ok(cursor.read_u32::<LittleEndian>()?)
}

/// Reads a u16 from a byte slice at the given offset.
pub fn read_u16_le(data: &[u8], offset: usize) -> Result<u16> {
    if offset + 2 > data.len() {
        return Err(CheckError::truncated(
            offset as u32,
            2,
            data.len().saturating_sub(offset),
        ));
    }

    let mut cursor = Cursor::new(&data[offset..offset + 2]);
    Ok(cursor.read_u16::<LittleEndian>()?)
}

/// Reads an i32 from a byte slice at the given offset.
pub fn read_i32_le(data: &[u8], offset: usize) -> Result<i32> {
    if offset + 4 > data.len() {
        return Err(CheckError::truncated(
            offset as u32,
            4,
            data.len().saturating_sub(offset),
        ));
    }

    let mut cursor = Cursor::new(&data[offset..offset + 4]);
    Ok(cursor.read_i32::<LittleEndian>()?)
}

/// Calculates the XOR checksum over the first 0x1FC bytes of the base
/// block, viewed as 127 little-endian 32-bit words.
pub fn calculate_checksum(data: &[u8]) -> u32 {
    let mut checksum: u32 = 0;

    for i in (0..0x1FC).step_by(4) {
        if let Ok(dword) = read_u32_le(data, i) {
            checksum ^= dword;
        }
    }

    checksum
}

/// Converts a data-space cell offset to an absolute file offset.
///
/// Cell offsets in the registry are relative to the first hbin (at
/// 0x1000). This is the single place the translation happens.
#[inline]
pub fn cell_offset_to_absolute(cell_offset: u32) -> u64 {
    u64::from(cell_offset) + u64::from(HBIN_START_OFFSET)
}

/// ASCII case-insensitive ordering of two raw key names.
///
/// Key names are compared as stored; the registry sorts keys without
/// regard to ASCII case. Non-ASCII bytes compare by value.
pub fn name_cmp_ignore_case(a: &[u8], b: &[u8]) -> Ordering {
    let a = a.iter().map(u8::to_ascii_lowercase);
    let b = b.iter().map(u8::to_ascii_lowercase);
    a.cmp(b)
}

/// Decodes a UTF-16LE byte slice for display, lossily.
pub fn utf16_display(data: &[u8]) -> String {
    let (decoded, _encoding, _had_errors) = UTF_16LE.decode(data);
    decoded.trim_end_matches('\0').to_string()
}

/// Decodes a raw key or value name for display.
///
/// Compressed names are stored as ASCII, uncompressed names as UTF-16LE.
pub fn name_display(data: &[u8], compressed: bool) -> String {
    if compressed {
        String::from_utf8_lossy(data).trim_end_matches('\0').to_string()
    } else {
        utf16_display(data)
    }
}
