//! Pass 3: tree traversal.
//!
//! A depth-first descent starting at the root key cell. Every edge
//! carries the offset to visit, the referencing record's offset, the
//! record kind the referrer expects, and a count (subkeys, values, or a
//! byte length for raw value payloads). Findings never stop the walk;
//! only a failure to fetch or decode a referenced cell short-circuits,
//! and then only the current subtree.

use crate::cell::{key_type, CellType};
use crate::checker::{CheckContext, Checker};
use crate::error::CheckError;
use crate::key::KeyNode;
use crate::reader::ReadAt;
use crate::subkey_list::{name_hash, LeafEntry, ListKind, SubkeyList};
use crate::utils::{cell_offset_to_absolute, name_cmp_ignore_case, read_u32_le};
use crate::value::ValueKey;
use std::cmp::Ordering;
use std::fmt;
use std::io::Write;
use tracing::debug;

/// Hard cap on tree recursion; deeper hives are reported, not followed.
pub const MAX_TREE_DEPTH: u32 = 1024;

/// The record kind a referrer expects at an edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Expected {
    /// A key node.
    Nk,

    /// A security record.
    Sk,

    /// A value descriptor.
    Vk,

    /// One of the four subkey list shapes.
    SubkeyList,

    /// An array of value-descriptor offsets.
    ValueList,

    /// Raw bytes (value data or a class name); checked by length only.
    Value,
}

impl fmt::Display for Expected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Expected::Nk => "nk",
            Expected::Sk => "sk",
            Expected::Vk => "vk",
            Expected::SubkeyList => "subkeylist",
            Expected::ValueList => "valuelist",
            Expected::Value => "value",
        };
        f.write_str(name)
    }
}

impl<R: ReadAt, W: Write> Checker<'_, R, W> {
    /// Enters the tree at the root key declared by the header.
    pub(crate) fn check_tree_from_root(&mut self, ctx: &CheckContext) {
        self.check_tree(ctx.root_offset, 0, Expected::Nk, 0, 0);
    }

    /// Visits one cell. Returns false when this subtree failed; the
    /// caller keeps going with its remaining edges either way.
    fn check_tree(
        &mut self,
        offset: u32,
        parent: u32,
        expected: Expected,
        expected_count: u32,
        depth: u32,
    ) -> bool {
        if depth >= MAX_TREE_DEPTH {
            self.report_cell_error(&CheckError::RecursionLimit { offset });
            return false;
        }

        let cell = match self.fetch_cell(offset, parent) {
            Ok(cell) => cell,
            Err(err) => {
                self.report_cell_error(&err);
                return false;
            }
        };

        let abs = cell_offset_to_absolute(offset);
        let parent_abs = cell_offset_to_absolute(parent);
        let size = cell.size;
        let payload = cell.payload;
        let mut error = false;

        // Raw data and value lists have no record tag; they are judged
        // by the expectation alone.
        match expected {
            Expected::Value => {
                if u64::from(size) - 4 < u64::from(expected_count) {
                    self.report.error(format!(
                        "Error: Block too small (0x{:x}b) for value length ({}) at 0x{:x}",
                        size, expected_count, abs
                    ));
                    return false;
                }
                return true;
            }
            Expected::ValueList => {
                if u64::from(size) < (u64::from(expected_count) + 1) * 4 {
                    self.report.error(format!(
                        "Error: Block too small (0x{:x}b) for value count ({}) at 0x{:x}",
                        size, expected_count, abs
                    ));
                    return false;
                }
                for i in 0..expected_count as usize {
                    let value_offset = match read_u32_le(&payload, i * 4) {
                        Ok(value_offset) => value_offset,
                        Err(err) => {
                            self.report_cell_error(&err);
                            return false;
                        }
                    };
                    if !self.check_tree(value_offset, parent, Expected::Vk, 0, depth + 1) {
                        error = true;
                    }
                }
                return !error;
            }
            _ => {}
        }

        let tag = if payload.len() >= 2 {
            [payload[0], payload[1]]
        } else {
            self.report.error(format!("Unknown data at 0x{:x}!", abs));
            return false;
        };

        match CellType::from_tag(tag) {
            Some(CellType::KeyNode) => {
                if expected != Expected::Nk {
                    self.report.error(format!(
                        "Error: Unexpected 'nk' record at 0x{:x}, expected {}",
                        abs, expected
                    ));
                    return false;
                }

                let nk = match KeyNode::parse(&payload, offset) {
                    Ok(nk) => nk,
                    Err(err) => {
                        self.report_cell_error(&err);
                        return false;
                    }
                };

                debug!(name = %nk.name_lossy(), offset = abs, "visiting key");

                if nk.parent_offset != parent && nk.node_type() != key_type::ROOT {
                    self.report.error(format!(
                        "Error: Incorrect parent offset for nk record at 0x{:x}",
                        abs
                    ));
                    error = true;
                }

                if nk.node_type() == key_type::ROOT && parent != 0 {
                    self.report.error(format!(
                        "Error: Unexpected root key at 0x{:x}, parent 0x{:x}",
                        abs, parent_abs
                    ));
                    error = true;
                }

                if nk.class_name_length > 0
                    && !self.check_tree(
                        nk.class_name_offset,
                        offset,
                        Expected::Value,
                        u32::from(nk.class_name_length),
                        depth + 1,
                    )
                {
                    error = true;
                }

                if !self.check_tree(nk.security_offset, offset, Expected::Sk, 0, depth + 1) {
                    error = true;
                }

                if nk.subkey_count > 0
                    && !self.check_tree(
                        nk.subkey_list_offset,
                        offset,
                        Expected::SubkeyList,
                        nk.subkey_count,
                        depth + 1,
                    )
                {
                    error = true;
                }

                if nk.value_count > 0
                    && !self.check_tree(
                        nk.value_list_offset,
                        offset,
                        Expected::ValueList,
                        nk.value_count,
                        depth + 1,
                    )
                {
                    error = true;
                }
            }

            Some(CellType::Security) => {
                if expected != Expected::Sk {
                    self.report
                        .error("Error: Did not expect sk block here".to_string());
                    error = true;
                }
                // Reference counting and descriptor contents are not
                // checked.
            }

            Some(CellType::IndexRoot) => {
                // Indirect lists are recognized but not descended into.
                self.report
                    .error("This is an ri block, cannot check this.".to_string());
                if expected != Expected::SubkeyList {
                    self.report.error(format!(
                        "Error: Did not expect subkey list, expected {} at 0x{:x}, parent 0x{:x}",
                        expected, abs, parent_abs
                    ));
                }
                error = true;
            }

            Some(CellType::IndexLeaf) | Some(CellType::FastLeaf) | Some(CellType::HashLeaf) => {
                let kind = match ListKind::from_tag(tag) {
                    Some(kind) => kind,
                    None => return false,
                };

                if kind == ListKind::IndexLeaf {
                    self.report.debug("This is an li block".to_string());
                }

                if expected != Expected::SubkeyList {
                    self.report.error(format!(
                        "Error: Did not expect subkey list, expected {} at 0x{:x}, parent 0x{:x}",
                        expected, abs, parent_abs
                    ));
                    error = true;
                }

                let list = match SubkeyList::parse(kind, &payload, offset) {
                    Ok(list) => list,
                    Err(err) => {
                        self.report_cell_error(&err);
                        return false;
                    }
                };

                if list.len() as u32 != expected_count {
                    self.report.error(format!(
                        "Error: Expected {} subkeys, got {} subkeys at 0x{:x}",
                        expected_count,
                        list.len(),
                        abs
                    ));
                    error = true;
                }

                if !self.check_list_entries(&list, offset, parent, depth) {
                    error = true;
                }
            }

            Some(CellType::ValueKey) => {
                if expected != Expected::Vk {
                    self.report.error(format!(
                        "Error: did not expect vk block, expected {} at 0x{:x}, parent 0x{:x}",
                        expected, abs, parent_abs
                    ));
                    error = true;
                }

                let vk = match ValueKey::parse(&payload, offset) {
                    Ok(vk) => vk,
                    Err(err) => {
                        self.report_cell_error(&err);
                        return false;
                    }
                };

                debug!(name = %vk.name_lossy(), offset = abs, "visiting value");

                if !vk.is_inline_data()
                    && !self.check_tree(
                        vk.data_offset,
                        offset,
                        Expected::Value,
                        vk.data_size(),
                        depth + 1,
                    )
                {
                    error = true;
                }
            }

            None => {
                self.report.error(format!("Unknown data at 0x{:x}!", abs));
                error = true;
            }
        }

        !error
    }

    /// Validates and recurses into the entries of a leaf list. Returns
    /// false if any entry failed.
    fn check_list_entries(
        &mut self,
        list: &SubkeyList,
        list_offset: u32,
        parent: u32,
        depth: u32,
    ) -> bool {
        let abs = cell_offset_to_absolute(list_offset);
        let parent_abs = cell_offset_to_absolute(parent);
        let mut error = false;
        let mut prev_name: Option<Vec<u8>> = None;

        let entries: Vec<LeafEntry> = match list {
            SubkeyList::FastLeaf(entries) | SubkeyList::HashLeaf(entries) => entries.clone(),
            SubkeyList::IndexLeaf(offsets) | SubkeyList::IndexRoot(offsets) => offsets
                .iter()
                .map(|&key_offset| LeafEntry {
                    key_offset,
                    hint: 0,
                })
                .collect(),
        };

        for entry in &entries {
            let entry_abs = cell_offset_to_absolute(entry.key_offset);
            let name = self.fetch_key_name(entry.key_offset, list_offset);

            match &name {
                Some(name) => {
                    // Subkeys are sorted without regard to ASCII case.
                    if let Some(prev) = &prev_name {
                        if name_cmp_ignore_case(prev, name) == Ordering::Greater {
                            self.report.error(format!(
                                "Error: lf block is not sorted by name at 0x{:x}, parent 0x{:x}",
                                abs, parent_abs
                            ));
                            error = true;
                        }
                    }

                    match list {
                        SubkeyList::FastLeaf(_) => {
                            let prefix = entry.hint.to_le_bytes();
                            let n = name.len().min(4);
                            if prefix[..n] != name[..n] {
                                self.report.error(format!(
                                    "Error: Incorrect first 4 bytes of key name (0x{:x}) in lf block at 0x{:x}",
                                    entry_abs, abs
                                ));
                                error = true;
                            }
                        }
                        SubkeyList::HashLeaf(_) => {
                            if name_hash(name) != entry.hint {
                                self.report.error(format!(
                                    "Error: lh block has incorrect hash for offset 0x{:x} at 0x{:x}",
                                    entry_abs, abs
                                ));
                                error = true;
                            }
                        }
                        _ => {}
                    }
                }
                None => error = true,
            }

            if !self.check_tree(entry.key_offset, parent, Expected::Nk, 0, depth + 1) {
                error = true;
            }

            prev_name = name;
        }

        !error
    }

    /// Fetches the key name of an nk cell referenced from a subkey
    /// list, reporting a finding when the cell is not an nk.
    fn fetch_key_name(&mut self, offset: u32, list_offset: u32) -> Option<Vec<u8>> {
        let cell = match self.fetch_cell(offset, list_offset) {
            Ok(cell) => cell,
            Err(err) => {
                self.report_cell_error(&err);
                return None;
            }
        };

        if cell.payload.len() < 2 || &cell.payload[0..2] != b"nk" {
            self.report.error(format!(
                "Error: Expected nk block at 0x{:x}, parent 0x{:x}",
                cell_offset_to_absolute(offset),
                cell_offset_to_absolute(list_offset)
            ));
            return None;
        }

        match KeyNode::parse(&cell.payload, offset) {
            Ok(nk) => Some(nk.name),
            Err(err) => {
                self.report_cell_error(&err);
                None
            }
        }
    }
}
