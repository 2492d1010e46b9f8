//! Subkey list decoding (lf, lh, li, ri) and intrinsic validation.
//!
//! A key with subkeys points at one of four list shapes: fast leaves
//! (lf) carry a 4-byte name prefix per entry, hash leaves (lh) carry a
//! base-37 name hash, index leaves (li) are bare offsets, and index
//! roots (ri) indirect to further lists.

use crate::error::{CheckError, Result};
use crate::report::Reporter;
use crate::utils::{cell_offset_to_absolute, read_u16_le, read_u32_le};
use std::io::Write;

/// Size of the list header (tag + count) in payload bytes.
pub const LIST_HEADER_SIZE: usize = 4;

/// A key count of 0xFFFF marks a corrupt or uninitialized list.
pub const INVALID_KEY_COUNT: u16 = 0xFFFF;

/// The four subkey list shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    /// Fast leaf (lf) - entries carry a 4-byte name prefix.
    FastLeaf,

    /// Hash leaf (lh) - entries carry a base-37 name hash.
    HashLeaf,

    /// Index leaf (li) - bare offsets.
    IndexLeaf,

    /// Index root (ri) - offsets of further subkey lists.
    IndexRoot,
}

impl ListKind {
    /// Identifies a list from its 2-byte record tag.
    pub fn from_tag(tag: [u8; 2]) -> Option<Self> {
        match &tag {
            b"lf" => Some(ListKind::FastLeaf),
            b"lh" => Some(ListKind::HashLeaf),
            b"li" => Some(ListKind::IndexLeaf),
            b"ri" => Some(ListKind::IndexRoot),
            _ => None,
        }
    }

    /// Bytes per entry in the entry table.
    pub fn stride(&self) -> usize {
        match self {
            ListKind::FastLeaf | ListKind::HashLeaf => 8,
            ListKind::IndexLeaf | ListKind::IndexRoot => 4,
        }
    }

    /// The record tag as text, for findings.
    pub fn tag_name(&self) -> &'static str {
        match self {
            ListKind::FastLeaf => "lf",
            ListKind::HashLeaf => "lh",
            ListKind::IndexLeaf => "li",
            ListKind::IndexRoot => "ri",
        }
    }
}

/// One entry of an lf or lh list.
#[derive(Debug, Clone, Copy)]
pub struct LeafEntry {
    /// Data-space offset of the subkey's nk cell.
    pub key_offset: u32,

    /// Name prefix (lf) or base-37 name hash (lh).
    pub hint: u32,
}

/// A decoded subkey list.
#[derive(Debug, Clone)]
pub enum SubkeyList {
    /// Fast leaf entries with name prefixes.
    FastLeaf(Vec<LeafEntry>),

    /// Hash leaf entries with name hashes.
    HashLeaf(Vec<LeafEntry>),

    /// Index leaf offsets.
    IndexLeaf(Vec<u32>),

    /// Index root offsets (of further lists).
    IndexRoot(Vec<u32>),
}

impl SubkeyList {
    /// Decodes a subkey list of known kind from cell payload bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CheckError::Truncated`] if the declared entry table
    /// does not fit in the payload.
    pub fn parse(kind: ListKind, payload: &[u8], offset: u32) -> Result<Self> {
        if payload.len() < LIST_HEADER_SIZE {
            return Err(CheckError::truncated(offset, LIST_HEADER_SIZE, payload.len()));
        }

        let count = read_u16_le(payload, 2)? as usize;
        let footprint = LIST_HEADER_SIZE + count * kind.stride();
        if payload.len() < footprint {
            return Err(CheckError::truncated(offset, footprint, payload.len()));
        }

        match kind {
            ListKind::FastLeaf | ListKind::HashLeaf => {
                let mut entries = Vec::with_capacity(count);
                for i in 0..count {
                    let pos = LIST_HEADER_SIZE + i * 8;
                    entries.push(LeafEntry {
                        key_offset: read_u32_le(payload, pos)?,
                        hint: read_u32_le(payload, pos + 4)?,
                    });
                }
                if kind == ListKind::FastLeaf {
                    Ok(SubkeyList::FastLeaf(entries))
                } else {
                    Ok(SubkeyList::HashLeaf(entries))
                }
            }
            ListKind::IndexLeaf | ListKind::IndexRoot => {
                let mut offsets = Vec::with_capacity(count);
                for i in 0..count {
                    offsets.push(read_u32_le(payload, LIST_HEADER_SIZE + i * 4)?);
                }
                if kind == ListKind::IndexLeaf {
                    Ok(SubkeyList::IndexLeaf(offsets))
                } else {
                    Ok(SubkeyList::IndexRoot(offsets))
                }
            }
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        match self {
            SubkeyList::FastLeaf(entries) | SubkeyList::HashLeaf(entries) => entries.len(),
            SubkeyList::IndexLeaf(offsets) | SubkeyList::IndexRoot(offsets) => offsets.len(),
        }
    }

    /// Returns true if the list has no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The base-37 hash stored in lh entries.
///
/// The name is folded left to right: multiply the running hash by 37
/// (wrapping) and add the uppercased character. Uppercasing follows the
/// ASCII rule, which may disagree with Windows for non-ASCII names.
pub fn name_hash(name: &[u8]) -> u32 {
    let mut hash: u32 = 0;
    for &byte in name {
        hash = hash
            .wrapping_mul(37)
            .wrapping_add(u32::from(byte.to_ascii_uppercase()));
    }
    hash
}

/// Intrinsic (pass 2) checks for one subkey list cell.
///
/// `size` is the payload length; `minor_version` comes from the file
/// header. Checks stop at the first hard violation for this cell.
pub fn check_intrinsic<W: Write>(
    kind: ListKind,
    payload: &[u8],
    size: usize,
    offset: u32,
    minor_version: u32,
    report: &mut Reporter<W>,
) {
    let abs = cell_offset_to_absolute(offset);

    // lh records appeared with format 1.5 (Windows XP).
    if kind == ListKind::HashLeaf && minor_version == 3 {
        report.warning(format!(
            "Warning: lh records should not exist in windows NT4/2k registries (0x{:x})",
            abs
        ));
    }

    let count = match read_u16_le(payload, 2) {
        Ok(count) => count,
        Err(_) => {
            report.error(format!(
                "Size doesn't match {} count (0x{:x})!",
                count_noun(kind),
                abs
            ));
            return;
        }
    };

    // Footprint bound on the full cell size (payload + 4-byte size
    // field), so an exact-fit list is legal.
    if usize::from(count) > size.saturating_sub(4) / kind.stride() {
        report.error(format!(
            "Size doesn't match {} count (0x{:x})!",
            count_noun(kind),
            abs
        ));
        return;
    }

    if count == 0 || count == INVALID_KEY_COUNT {
        report.error(format!("No {} count (0x{:x})!", count_noun(kind), abs));
        return;
    }

    let list = match SubkeyList::parse(kind, payload, offset) {
        Ok(list) => list,
        Err(_) => {
            report.error(format!(
                "Size doesn't match {} count (0x{:x})!",
                count_noun(kind),
                abs
            ));
            return;
        }
    };

    let offsets: Vec<u32> = match &list {
        SubkeyList::FastLeaf(entries) | SubkeyList::HashLeaf(entries) => {
            entries.iter().map(|e| e.key_offset).collect()
        }
        SubkeyList::IndexLeaf(offsets) | SubkeyList::IndexRoot(offsets) => offsets.clone(),
    };

    for entry_offset in offsets {
        // Offsets are stored signed; zero and negative are unusable.
        if entry_offset == 0 || entry_offset & 0x8000_0000 != 0 {
            report.error(format!(
                "No valid offset (0x{:x}) in this {} record (0x{:x})",
                entry_offset,
                kind.tag_name(),
                abs
            ));
            return;
        }
    }
}

fn count_noun(kind: ListKind) -> &'static str {
    match kind {
        ListKind::IndexRoot => "offset",
        _ => "key",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds a list payload from (offset, hint) pairs.
    pub(crate) fn list_payload(kind: ListKind, entries: &[(u32, u32)]) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.extend_from_slice(kind.tag_name().as_bytes());
        payload.extend_from_slice(&(entries.len() as u16).to_le_bytes());
        for (offset, hint) in entries {
            payload.extend_from_slice(&offset.to_le_bytes());
            if kind.stride() == 8 {
                payload.extend_from_slice(&hint.to_le_bytes());
            }
        }
        payload
    }

    fn run_check(kind: ListKind, payload: &[u8], minor: u32) -> (bool, String) {
        let mut report = Reporter::new(Vec::new());
        check_intrinsic(kind, payload, payload.len(), 0x98, minor, &mut report);
        let errors = report.has_errors();
        (errors, String::from_utf8(report.into_inner()).unwrap())
    }

    #[test]
    fn test_list_kind_from_tag() {
        assert_eq!(ListKind::from_tag(*b"lf"), Some(ListKind::FastLeaf));
        assert_eq!(ListKind::from_tag(*b"lh"), Some(ListKind::HashLeaf));
        assert_eq!(ListKind::from_tag(*b"li"), Some(ListKind::IndexLeaf));
        assert_eq!(ListKind::from_tag(*b"ri"), Some(ListKind::IndexRoot));
        assert_eq!(ListKind::from_tag(*b"nk"), None);
    }

    #[test]
    fn test_parse_fast_leaf() {
        let payload = list_payload(
            ListKind::FastLeaf,
            &[(0xB0, u32::from_le_bytes(*b"ALPH")), (0x108, u32::from_le_bytes(*b"BETA"))],
        );
        let list = SubkeyList::parse(ListKind::FastLeaf, &payload, 0).unwrap();
        match list {
            SubkeyList::FastLeaf(entries) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].key_offset, 0xB0);
                assert_eq!(entries[0].hint.to_le_bytes(), *b"ALPH");
            }
            other => panic!("wrong variant: {:?}", other),
        }
    }

    #[test]
    fn test_parse_index_leaf() {
        let payload = list_payload(ListKind::IndexLeaf, &[(0xB0, 0), (0x108, 0)]);
        let list = SubkeyList::parse(ListKind::IndexLeaf, &payload, 0).unwrap();
        assert_eq!(list.len(), 2);
        assert!(!list.is_empty());
    }

    #[test]
    fn test_parse_footprint_too_large() {
        let mut payload = list_payload(ListKind::HashLeaf, &[(0xB0, 0)]);
        payload[2..4].copy_from_slice(&9u16.to_le_bytes());
        assert!(SubkeyList::parse(ListKind::HashLeaf, &payload, 0).is_err());
    }

    #[test]
    fn test_name_hash() {
        assert_eq!(name_hash(b""), 0);
        assert_eq!(name_hash(b"A"), 65);
        assert_eq!(name_hash(b"AB"), 65 * 37 + 66);
        // Hashing is case-insensitive
        assert_eq!(name_hash(b"ControlSet001"), name_hash(b"CONTROLSET001"));
    }

    #[test]
    fn test_clean_list_passes() {
        let payload = list_payload(ListKind::FastLeaf, &[(0xB0, 0x41414141)]);
        let (errors, out) = run_check(ListKind::FastLeaf, &payload, 5);
        assert!(!errors, "unexpected findings: {}", out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_count_overruns_cell() {
        let mut payload = list_payload(ListKind::FastLeaf, &[(0xB0, 0)]);
        payload[2..4].copy_from_slice(&200u16.to_le_bytes());
        let (errors, out) = run_check(ListKind::FastLeaf, &payload, 5);
        assert!(errors);
        assert!(out.contains("Size doesn't match key count"));
    }

    #[test]
    fn test_zero_count() {
        let payload = list_payload(ListKind::HashLeaf, &[]);
        let (errors, out) = run_check(ListKind::HashLeaf, &payload, 5);
        assert!(errors);
        assert!(out.contains("No key count"));
    }

    #[test]
    fn test_ri_uses_offset_noun() {
        let payload = list_payload(ListKind::IndexRoot, &[]);
        let (errors, out) = run_check(ListKind::IndexRoot, &payload, 5);
        assert!(errors);
        assert!(out.contains("No offset count"));
    }

    #[test]
    fn test_null_entry_offset() {
        let payload = list_payload(ListKind::IndexLeaf, &[(0, 0)]);
        let (errors, out) = run_check(ListKind::IndexLeaf, &payload, 5);
        assert!(errors);
        assert!(out.contains("No valid offset (0x0) in this li record"));
    }

    #[test]
    fn test_lh_in_old_format_warns() {
        let payload = list_payload(ListKind::HashLeaf, &[(0xB0, name_hash(b"SOFTWARE"))]);
        let (errors, out) = run_check(ListKind::HashLeaf, &payload, 3);
        assert!(!errors);
        assert!(out.contains("lh records should not exist in windows NT4/2k registries"));
    }
}
