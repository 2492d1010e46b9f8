//! Registry key node (nk) decoding and intrinsic validation.

use crate::cell::{key_type, KeyNodeFlags};
use crate::error::{CheckError, Result};
use crate::report::Reporter;
use crate::utils::{cell_offset_to_absolute, name_display, read_u16_le, read_u32_le};
use std::io::Write;

/// Size of the fixed key node header in payload bytes.
pub const KEY_NODE_HEADER_SIZE: usize = 0x4C;

/// Key node (nk) structure, as stored.
#[derive(Debug, Clone)]
pub struct KeyNode {
    /// Node type word (0x20 normal, 0x2C root, 0x10 symlink).
    pub flags: KeyNodeFlags,

    /// Last written timestamp (Windows FILETIME).
    pub last_written: u64,

    /// Data-space offset of the parent key node.
    pub parent_offset: u32,

    /// Number of subkeys.
    pub subkey_count: u32,

    /// Data-space offset of the subkey list.
    pub subkey_list_offset: u32,

    /// Number of values.
    pub value_count: u32,

    /// Data-space offset of the value list.
    pub value_list_offset: u32,

    /// Data-space offset of the security descriptor record.
    pub security_offset: u32,

    /// Data-space offset of the class name.
    pub class_name_offset: u32,

    /// Declared length of the key name in bytes.
    pub name_length: u16,

    /// Declared length of the class name in bytes.
    pub class_name_length: u16,

    /// Key name bytes, clamped to what the cell actually holds.
    pub name: Vec<u8>,
}

impl KeyNode {
    /// Decodes a key node from cell payload bytes.
    ///
    /// The declared name length may exceed what the cell holds; the name
    /// is clamped and the mismatch is left for the intrinsic check.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::Truncated`] if the fixed header does not fit.
    pub fn parse(payload: &[u8], offset: u32) -> Result<Self> {
        if payload.len() < KEY_NODE_HEADER_SIZE {
            return Err(CheckError::truncated(
                offset,
                KEY_NODE_HEADER_SIZE,
                payload.len(),
            ));
        }

        let flags = KeyNodeFlags::new(read_u16_le(payload, 0x02)?);

        let last_written =
            u64::from(read_u32_le(payload, 0x04)?) | (u64::from(read_u32_le(payload, 0x08)?) << 32);

        let parent_offset = read_u32_le(payload, 0x10)?;
        let subkey_count = read_u32_le(payload, 0x14)?;
        let subkey_list_offset = read_u32_le(payload, 0x1C)?;
        let value_count = read_u32_le(payload, 0x24)?;
        let value_list_offset = read_u32_le(payload, 0x28)?;
        let security_offset = read_u32_le(payload, 0x2C)?;
        let class_name_offset = read_u32_le(payload, 0x30)?;

        let name_length = read_u16_le(payload, 0x48)?;
        let class_name_length = read_u16_le(payload, 0x4A)?;

        let name_end = (KEY_NODE_HEADER_SIZE + name_length as usize).min(payload.len());
        let name = payload[KEY_NODE_HEADER_SIZE..name_end].to_vec();

        Ok(KeyNode {
            flags,
            last_written,
            parent_offset,
            subkey_count,
            subkey_list_offset,
            value_count,
            value_list_offset,
            security_offset,
            class_name_offset,
            name_length,
            class_name_length,
            name,
        })
    }

    /// Node type word.
    pub fn node_type(&self) -> u16 {
        self.flags.0
    }

    /// Returns true if this node declares itself the root key.
    pub fn is_root(&self) -> bool {
        self.node_type() == key_type::ROOT
    }

    /// Key name decoded for display.
    pub fn name_lossy(&self) -> String {
        name_display(&self.name, self.flags.is_compressed())
    }

    /// Returns true if this key has subkeys.
    pub fn has_subkeys(&self) -> bool {
        self.subkey_count > 0
    }

    /// Returns true if this key has values.
    pub fn has_values(&self) -> bool {
        self.value_count > 0
    }
}

/// Intrinsic (pass 2) checks for one nk cell.
///
/// `size` is the payload length; `root_offset` comes from the file
/// header. Checks stop at the first hard violation for this cell.
pub fn check_intrinsic<W: Write>(
    nk: &KeyNode,
    size: usize,
    offset: u32,
    root_offset: u32,
    report: &mut Reporter<W>,
) {
    let abs = cell_offset_to_absolute(offset);

    if usize::from(nk.name_length) > size.saturating_sub(KEY_NODE_HEADER_SIZE) {
        report.error(format!("Error: Too long keyname length value (0x{:x}).", abs));
        return;
    }

    let node_type = nk.node_type();
    if node_type != key_type::NORMAL
        && node_type != key_type::ROOT
        && node_type != key_type::SYM_LINK
    {
        report.warning(format!(
            "Warning: this key is of unknown ({:x}) type (0x{:x})",
            node_type, abs
        ));
    }

    // There can be only one
    if node_type == key_type::ROOT && offset != root_offset {
        report.error(format!(
            "Error: Encountered unexpected root key. (0x{:x})",
            abs
        ));
    }

    if nk.parent_offset == 0 && node_type != key_type::ROOT {
        report.error(format!(
            "Error: this key has no parent and is no root key (0x{:x})",
            abs
        ));
        return;
    }

    if nk.subkey_count > 0 && nk.subkey_list_offset == u32::MAX {
        report.error(format!(
            "Error: this key has subkeys, but no listing (0x{:x})",
            abs
        ));
        return;
    }

    if nk.subkey_list_offset == 0 || nk.value_list_offset == 0 || nk.class_name_offset == 0 {
        report.error(format!(
            "Error: this key has a 0x00 offset, this is illegal (0x{:x})",
            abs
        ));
        return;
    }

    if nk.class_name_length > 0 && nk.class_name_offset == u32::MAX {
        report.error(format!(
            "Error: this key has a class name length, but no offset (0x{:x})",
            abs
        ));
        return;
    }

    if nk.value_count > 0 && nk.value_list_offset == u32::MAX {
        report.error(format!(
            "Error: this key has values, but no listing (0x{:x})",
            abs
        ));
        return;
    }

    // sk record is mandatory
    if nk.security_offset == u32::MAX || nk.security_offset == 0 {
        report.error(format!("Error: this key has no sk record (0x{:x})!", abs));
    }
}
