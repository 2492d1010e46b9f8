//! Shared synthetic hive builder for integration tests.
//!
//! Builds a minimal but fully valid one-bin hive: a root key with two
//! subkeys ("ALPHA" and "BETA") behind a configurable list kind, one
//! inline value, and a shared singleton security record. Tests mutate
//! the returned bytes to create each corruption scenario.

#![allow(dead_code)] // not every test binary uses every helper

use regf_check::subkey_list::name_hash;

/// Page size; the hive is one header page plus one bin page.
pub const PAGE: usize = 0x1000;

/// Data-space offsets of the cells the builder lays down.
pub const ROOT_NK: u32 = 0x20;
pub const SK: u32 = 0x78;
pub const LIST: u32 = 0x98;
pub const CHILD_A: u32 = 0xB0;
pub const CHILD_B: u32 = 0x108;
pub const VALUE_LIST: u32 = 0x160;
pub const VK: u32 = 0x168;
pub const FREE: u32 = 0x188;

/// Options for hive construction.
pub struct HiveOptions {
    /// Minor format version word (3 or 5).
    pub minor_version: u32,

    /// Subkey list tag: b"lf", b"lh", or b"li".
    pub list_tag: [u8; 2],

    /// Store the children in reverse name order.
    pub swap_children: bool,

    /// Break the first entry's prefix/hash hint.
    pub corrupt_hint: bool,
}

impl Default for HiveOptions {
    fn default() -> Self {
        Self {
            minor_version: 5,
            list_tag: *b"lf",
            swap_children: false,
            corrupt_hint: false,
        }
    }
}

fn put_u32(data: &mut [u8], pos: usize, value: u32) {
    data[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
}

fn put_u16(data: &mut [u8], pos: usize, value: u16) {
    data[pos..pos + 2].copy_from_slice(&value.to_le_bytes());
}

/// Writes an allocated cell (negative raw size) at a data-space offset.
fn write_cell(hive: &mut [u8], cell_offset: u32, cell_size: u32, payload: &[u8]) {
    assert!(payload.len() + 4 <= cell_size as usize, "payload overflows cell");
    let pos = PAGE + cell_offset as usize;
    hive[pos..pos + 4].copy_from_slice(&(-(cell_size as i32)).to_le_bytes());
    hive[pos + 4..pos + 4 + payload.len()].copy_from_slice(payload);
}

/// Patches a u32 field inside a cell's payload after construction.
pub fn patch_cell_u32(hive: &mut [u8], cell_offset: u32, field: usize, value: u32) {
    let pos = PAGE + cell_offset as usize + 4 + field;
    hive[pos..pos + 4].copy_from_slice(&value.to_le_bytes());
}

/// Recomputes the header checksum after header edits.
pub fn refresh_checksum(hive: &mut [u8]) {
    let mut checksum: u32 = 0;
    for i in (0..0x1FC).step_by(4) {
        let word = u32::from_le_bytes([hive[i], hive[i + 1], hive[i + 2], hive[i + 3]]);
        checksum ^= word;
    }
    put_u32(hive, 0x1FC, checksum);
}

fn nk_record(
    node_type: u16,
    parent: u32,
    subkey_count: u32,
    subkey_offset: u32,
    value_count: u32,
    value_offset: u32,
    name: &[u8],
) -> Vec<u8> {
    let mut rec = vec![0u8; 0x4C];
    rec[0..2].copy_from_slice(b"nk");
    put_u16(&mut rec, 0x02, node_type);
    put_u32(&mut rec, 0x10, parent);
    put_u32(&mut rec, 0x14, subkey_count);
    put_u32(&mut rec, 0x1C, subkey_offset);
    put_u32(&mut rec, 0x20, u32::MAX); // volatile subkey list
    put_u32(&mut rec, 0x24, value_count);
    put_u32(&mut rec, 0x28, value_offset);
    put_u32(&mut rec, 0x2C, SK);
    put_u32(&mut rec, 0x30, u32::MAX); // class name
    put_u16(&mut rec, 0x48, name.len() as u16);
    rec.extend_from_slice(name);
    rec
}

fn sk_record(own_offset: u32) -> Vec<u8> {
    let mut rec = vec![0u8; 0x14];
    rec[0..2].copy_from_slice(b"sk");
    put_u32(&mut rec, 0x04, own_offset);
    put_u32(&mut rec, 0x08, own_offset);
    put_u32(&mut rec, 0x0C, 3); // shared by root and both children
    put_u32(&mut rec, 0x10, 4);
    rec.extend_from_slice(&[0u8; 4]);
    rec
}

fn vk_record(name: &[u8]) -> Vec<u8> {
    let mut rec = vec![0u8; 0x14];
    rec[0..2].copy_from_slice(b"vk");
    put_u16(&mut rec, 0x02, name.len() as u16);
    put_u32(&mut rec, 0x04, 0x8000_0004); // inline DWORD
    put_u32(&mut rec, 0x08, 0x0403_0201); // the data itself
    put_u32(&mut rec, 0x0C, 4); // REG_DWORD
    put_u16(&mut rec, 0x10, 1); // ASCII name
    rec.extend_from_slice(name);
    rec
}

fn name_prefix(name: &[u8]) -> u32 {
    let mut prefix = [0u8; 4];
    let n = name.len().min(4);
    prefix[..n].copy_from_slice(&name[..n]);
    u32::from_le_bytes(prefix)
}

fn list_record(opts: &HiveOptions, entries: &[(u32, &[u8])]) -> Vec<u8> {
    let mut rec = Vec::new();
    rec.extend_from_slice(&opts.list_tag);
    rec.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    for (i, (offset, name)) in entries.iter().enumerate() {
        rec.extend_from_slice(&offset.to_le_bytes());
        if &opts.list_tag != b"li" {
            let mut hint = if &opts.list_tag == b"lh" {
                name_hash(name)
            } else {
                name_prefix(name)
            };
            if i == 0 && opts.corrupt_hint {
                hint ^= 1;
            }
            rec.extend_from_slice(&hint.to_le_bytes());
        }
    }
    rec
}

/// Builds a complete hive per the given options.
pub fn build_hive(opts: &HiveOptions) -> Vec<u8> {
    let mut hive = vec![0u8; 2 * PAGE];

    // Base block
    hive[0..4].copy_from_slice(b"regf");
    put_u32(&mut hive, 0x04, 1);
    put_u32(&mut hive, 0x08, 1);
    put_u32(&mut hive, 0x14, 1);
    put_u32(&mut hive, 0x18, opts.minor_version);
    put_u32(&mut hive, 0x1C, 0);
    put_u32(&mut hive, 0x20, 1);
    put_u32(&mut hive, 0x24, ROOT_NK);
    put_u32(&mut hive, 0x28, PAGE as u32);
    let description: &[u8] = &[b'S', 0, b'Y', 0, b'S', 0, b'T', 0, b'E', 0, b'M', 0];
    hive[0x30..0x30 + description.len()].copy_from_slice(description);

    // Bin header
    hive[PAGE..PAGE + 4].copy_from_slice(b"hbin");
    put_u32(&mut hive, PAGE + 0x04, 0);
    put_u32(&mut hive, PAGE + 0x08, PAGE as u32);

    // Cells
    write_cell(
        &mut hive,
        ROOT_NK,
        0x58,
        &nk_record(0x2C, 0, 2, LIST, 1, VALUE_LIST, b"ROOT"),
    );
    write_cell(&mut hive, SK, 0x20, &sk_record(SK));

    let entries: [(u32, &[u8]); 2] = if opts.swap_children {
        [(CHILD_B, b"BETA"), (CHILD_A, b"ALPHA")]
    } else {
        [(CHILD_A, b"ALPHA"), (CHILD_B, b"BETA")]
    };
    write_cell(&mut hive, LIST, 0x18, &list_record(opts, &entries));

    write_cell(
        &mut hive,
        CHILD_A,
        0x58,
        &nk_record(0x20, ROOT_NK, 0, u32::MAX, 0, u32::MAX, b"ALPHA"),
    );
    write_cell(
        &mut hive,
        CHILD_B,
        0x58,
        &nk_record(0x20, ROOT_NK, 0, u32::MAX, 0, u32::MAX, b"BETA"),
    );

    write_cell(&mut hive, VALUE_LIST, 0x8, &VK.to_le_bytes());
    write_cell(&mut hive, VK, 0x20, &vk_record(b"val"));

    // One free cell fills the rest of the bin.
    let free_size = PAGE as u32 - FREE;
    let pos = PAGE + FREE as usize;
    hive[pos..pos + 4].copy_from_slice(&(free_size as i32).to_le_bytes());

    refresh_checksum(&mut hive);
    hive
}
