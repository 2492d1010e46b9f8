//! Security descriptor record (sk) decoding and intrinsic validation.
//!
//! Security records form a doubly-linked ring through their prev/next
//! offsets; many keys share one record through a usage counter. The
//! checker validates the link structure only, not the descriptor bytes.

use crate::error::{CheckError, Result};
use crate::report::Reporter;
use crate::utils::{cell_offset_to_absolute, read_u32_le};
use std::io::Write;

/// Size of the fixed security record header in payload bytes.
pub const SECURITY_KEY_HEADER_SIZE: usize = 0x14;

/// Security record (sk) structure, as stored.
#[derive(Debug, Clone)]
pub struct SecurityKey {
    /// Data-space offset of the previous sk record in the ring.
    pub prev_offset: u32,

    /// Data-space offset of the next sk record in the ring.
    pub next_offset: u32,

    /// Number of key nodes sharing this record.
    pub usage_count: u32,

    /// Declared size of the descriptor bytes that follow the header.
    pub descriptor_size: u32,
}

impl SecurityKey {
    /// Decodes a security record from cell payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::Truncated`] if the fixed header does not fit.
    pub fn parse(payload: &[u8], offset: u32) -> Result<Self> {
        if payload.len() < SECURITY_KEY_HEADER_SIZE {
            return Err(CheckError::truncated(
                offset,
                SECURITY_KEY_HEADER_SIZE,
                payload.len(),
            ));
        }

        let prev_offset = read_u32_le(payload, 0x04)?;
        let next_offset = read_u32_le(payload, 0x08)?;
        let usage_count = read_u32_le(payload, 0x0C)?;
        let descriptor_size = read_u32_le(payload, 0x10)?;

        Ok(SecurityKey {
            prev_offset,
            next_offset,
            usage_count,
            descriptor_size,
        })
    }

    /// Returns true if this record is a singleton ring (both links point
    /// at the record itself).
    pub fn is_singleton(&self, own_offset: u32) -> bool {
        self.prev_offset == own_offset && self.next_offset == own_offset
    }
}

/// Intrinsic (pass 2) checks for one sk cell.
///
/// `size` is the payload length.
pub fn check_intrinsic<W: Write>(
    sk: &SecurityKey,
    size: usize,
    offset: u32,
    report: &mut Reporter<W>,
) {
    let abs = cell_offset_to_absolute(offset);

    // A single sk record points at itself in both directions; one
    // self-link without the other breaks the ring.
    if (sk.prev_offset == offset || sk.next_offset == offset)
        && sk.prev_offset != sk.next_offset
    {
        report.error(format!(
            "Error: One sk offset points to self, the other doesn't. (0x{:x})",
            abs
        ));
        return;
    }

    // The ring is circular, so the links can never be absent.
    if sk.prev_offset == u32::MAX
        || sk.next_offset == u32::MAX
        || sk.prev_offset == 0
        || sk.next_offset == 0
    {
        report.error(format!("Error: illegal prev/next sk offset. (0x{:x})", abs));
        return;
    }

    if sk.descriptor_size as usize > size.saturating_sub(0x10) {
        report.error(format!(
            "Error: sk size value stretches beyond end of hbin data block (0x{:x})",
            abs
        ));
    }
}
