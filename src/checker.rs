//! The three-pass hive checker.
//!
//! Pass 1 validates the file header, pass 2 scans every bin and cell in
//! storage order, pass 3 walks the logical key tree (see
//! [`crate::tree`]). The checker holds the byte source, the findings
//! sink, and the header context every validator consults; there is no
//! process-wide state.

use crate::cell::CellType;
use crate::error::CheckError;
use crate::hbin::{Cell, CellWalker, HbinHeader, HBIN_HEADER_SIZE, HBIN_SIGNATURE, MAX_CELL_SIZE};
use crate::header::{BaseBlock, BASE_BLOCK_SIZE, REGF_SIGNATURE};
use crate::reader::ReadAt;
use crate::report::Reporter;
use crate::subkey_list::ListKind;
use crate::utils::{calculate_checksum, cell_offset_to_absolute};
use crate::{key, security, subkey_list, value};
use std::io::Write;
use tracing::debug;

/// Header facts the record validators consult.
#[derive(Debug, Clone, Copy)]
pub struct CheckContext {
    /// Minor format version (3 or 5).
    pub minor_version: u32,

    /// Data-space offset of the root key cell.
    pub root_offset: u32,

    /// Length of the data region in bytes.
    pub data_size: u32,
}

/// A cell fetched by reference during tree traversal.
///
/// The payload buffer is owned by the fetch, so sibling validations
/// never alias each other's bytes.
#[derive(Debug)]
pub(crate) struct FetchedCell {
    /// Logical size of the cell including the 4-byte size field.
    pub size: u32,

    /// Cell payload (excluding the size field).
    pub payload: Vec<u8>,
}

/// The checker run over one hive.
pub struct Checker<'a, R: ReadAt, W: Write> {
    pub(crate) reader: &'a R,
    pub(crate) report: Reporter<W>,
}

impl<'a, R: ReadAt, W: Write> Checker<'a, R, W> {
    /// Creates a checker over `reader`, writing findings to `out`.
    pub fn new(reader: &'a R, out: W) -> Self {
        Self {
            reader,
            report: Reporter::new(out),
        }
    }

    /// Runs all three passes. Returns true if no error-class finding
    /// was reported.
    pub fn run(&mut self) -> bool {
        self.report.line("");
        self.report.line("Pass 1: Checking registry regf header");
        self.report.line("");

        let header = match self.check_header() {
            Some(header) => header,
            None => {
                self.report.line("Regf header contains errors");
                return false;
            }
        };

        let ctx = CheckContext {
            minor_version: header.minor_version(),
            root_offset: header.root_cell_offset,
            data_size: header.data_size,
        };

        self.report.line("");
        self.report.line("Pass 2: Checking keys for incorrect values");
        self.report.line("");

        if self.check_bins(&ctx) {
            self.report.line("");
            self.report.line("Pass 3: Checking offsets and tree");

            debug!(root = ctx.root_offset, "starting tree walk");
            self.check_tree_from_root(&ctx);
        }

        if self.report.has_errors() {
            self.report.line("Errors encountered");
            false
        } else {
            self.report.line("");
            self.report.line("Done checking, no errors...");
            self.report.line("");
            true
        }
    }

    /// Consumes the checker, returning the findings sink.
    pub fn into_report(self) -> Reporter<W> {
        self.report
    }

    /// Pass 1: header validation. Returns the parsed header on success;
    /// `None` aborts the run.
    fn check_header(&mut self) -> Option<BaseBlock> {
        let mut buf = vec![0u8; BASE_BLOCK_SIZE];
        if self.reader.read_at(0, &mut buf).is_err() {
            self.report
                .error("Error: short read while reading regf block".to_string());
            return None;
        }

        let header = match BaseBlock::parse(&buf) {
            Ok(header) => header,
            Err(_) => {
                self.report
                    .error("Error: short read while reading regf block".to_string());
                return None;
            }
        };

        if &header.signature != REGF_SIGNATURE {
            self.report
                .error("No 'regf' found at 0x0 (is this an NT registry file?)".to_string());
            return None;
        }

        if header.sequence[0] != header.sequence[1] {
            self.report
                .error("Values at 0x0004 and 0x0008 should be identical.".to_string());
            return None;
        }

        if header.version[0] != 0x1
            || (header.version[1] != 0x3 && header.version[1] != 0x5)
            || header.version[2] != 0x0
            || header.version[3] != 0x1
        {
            self.report.error(
                "D-words from 0x0014 to 0x0020 should be 0x1, 0x3 or 0x5, 0x0, 0x1".to_string(),
            );
            return None;
        }

        // The first key cell sits right behind the bin header, usually
        // at 0x20.
        if header.root_cell_offset < 0x20 {
            self.report
                .error("Error: 1st record key offset smaller than hbin header.".to_string());
            return None;
        }
        if header.root_cell_offset > 0x100 {
            self.report
                .warning("Warning: 1st record offset seems large.".to_string());
        }

        if header.data_size == 0 || header.data_size % 0x1000 != 0 {
            self.report
                .error("Error: data size should be a multiple of 0x1000".to_string());
            return None;
        }

        // Heuristic: UTF-16LE ASCII text has high bytes 0x00-0x02 (or
        // 0xFF filler) at every odd index.
        for (i, &byte) in header.description.iter().enumerate() {
            if i % 2 == 1 && byte > 0x02 && byte != 0xFF {
                self.report.warning(
                    "Warning: regf description does not appear to be unicode".to_string(),
                );
                break;
            }
        }

        let computed = calculate_checksum(&buf);
        if computed != header.checksum {
            self.report.error(format!(
                "Error: checksum incorrect; got 0x{:x}, must be 0x{:x}",
                header.checksum, computed
            ));
            self.report
                .line("Note: This could be caused by other malicious data in the header!");
            return None;
        }

        debug!(
            version = ?header.version,
            root = header.root_cell_offset,
            data_size = header.data_size,
            description = %header.description_string(),
            "regf header accepted"
        );
        if let Some(written) = header.last_written_datetime() {
            debug!(last_written = %written, "hive timestamp");
        }

        Some(header)
    }

    /// Pass 2: walk every bin in data-space order. Returns false when a
    /// bad bin header forces the scan to stop.
    fn check_bins(&mut self, ctx: &CheckContext) -> bool {
        let mut index: u32 = 0;

        while u64::from(index) * 0x1000 < u64::from(ctx.data_size) {
            let bin_offset = index * 0x1000;

            let bin_size = match self.check_hbin_header(bin_offset, ctx) {
                Some(size) => size,
                None => {
                    self.report.error(format!(
                        "Errors in hbin header at 0x{:x}.",
                        cell_offset_to_absolute(bin_offset)
                    ));
                    return false;
                }
            };

            self.walk_bin(bin_offset, bin_size, ctx);

            // A bin spanning K pages consumes K page indexes.
            index += (bin_size / 0x1000).max(1);
        }

        true
    }

    /// Validates one bin header; returns the bin size on success.
    fn check_hbin_header(&mut self, bin_offset: u32, ctx: &CheckContext) -> Option<u32> {
        let abs = cell_offset_to_absolute(bin_offset);

        let mut buf = [0u8; HBIN_HEADER_SIZE];
        if self.reader.read_at(abs, &mut buf).is_err() {
            self.report.error(format!(
                "Error: short read while reading hbin block at 0x{:x}",
                abs
            ));
            return None;
        }

        let hbin = match HbinHeader::parse(&buf, bin_offset) {
            Ok(hbin) => hbin,
            Err(_) => {
                self.report.error(format!(
                    "Error: short read while reading hbin block at 0x{:x}",
                    abs
                ));
                return None;
            }
        };

        if &hbin.signature != HBIN_SIGNATURE {
            self.report
                .error("Error: this is no hbin block!".to_string());
            return None;
        }

        if hbin.offset_from_first != bin_offset || hbin.offset_from_first % 0x1000 != 0 {
            self.report.error(format!(
                "Error: hbin offset to first incorrect at 0x{:x}",
                abs
            ));
            return None;
        }

        if hbin.offset_to_next == 0 || hbin.offset_to_next % 0x1000 != 0 {
            self.report.error(format!(
                "Error: hbin offset to next isn't a multiple of 0x1000 at 0x{:x}",
                abs
            ));
            return None;
        }

        // A bin must lie inside the declared data region; an oversized
        // bin cannot be buffered or walked.
        if u64::from(bin_offset) + u64::from(hbin.offset_to_next) > u64::from(ctx.data_size) {
            self.report.error(format!(
                "Error: hbin stretches beyond the end of the data area at 0x{:x}",
                abs
            ));
            return None;
        }

        Some(hbin.offset_to_next)
    }

    /// Walks the cells of one bin and runs the intrinsic checks on each
    /// allocated cell.
    fn walk_bin(&mut self, bin_offset: u32, bin_size: u32, ctx: &CheckContext) {
        let abs = cell_offset_to_absolute(bin_offset);

        // Bound the bin buffer by the file before allocating it.
        if abs + u64::from(bin_size) > self.reader.len() {
            self.report.error(format!(
                "Error: short read while reading hbin data record size at 0x{:x}",
                abs + HBIN_HEADER_SIZE as u64
            ));
            return;
        }

        let mut buf = vec![0u8; bin_size as usize];
        if self.reader.read_at(abs, &mut buf).is_err() {
            self.report.error(format!(
                "Error: short read while reading hbin data record size at 0x{:x}",
                abs + HBIN_HEADER_SIZE as u64
            ));
            return;
        }

        for item in CellWalker::new(&buf, bin_offset) {
            match item {
                Ok(ref cell) if cell.is_allocated => self.check_cell(cell, ctx),
                Ok(_) => {} // free cell
                Err(err) => {
                    self.report_cell_error(&err);
                    return;
                }
            }
        }
    }

    /// Dispatches one allocated cell to its record-specific intrinsic
    /// check. Unknown tags are skipped for forward compatibility.
    fn check_cell(&mut self, cell: &Cell<'_>, ctx: &CheckContext) {
        let tag = match cell.tag() {
            Some(tag) => tag,
            None => return,
        };

        match CellType::from_tag(tag) {
            Some(CellType::KeyNode) => match key::KeyNode::parse(cell.payload, cell.offset) {
                Ok(nk) => key::check_intrinsic(
                    &nk,
                    cell.payload.len(),
                    cell.offset,
                    ctx.root_offset,
                    &mut self.report,
                ),
                Err(_) => self.report_truncated_record("nk", cell.offset),
            },
            Some(CellType::ValueKey) => match value::ValueKey::parse(cell.payload, cell.offset) {
                Ok(vk) => value::check_intrinsic(
                    &vk,
                    cell.payload.len(),
                    cell.offset,
                    &mut self.report,
                ),
                Err(_) => self.report_truncated_record("vk", cell.offset),
            },
            Some(CellType::Security) => {
                match security::SecurityKey::parse(cell.payload, cell.offset) {
                    Ok(sk) => security::check_intrinsic(
                        &sk,
                        cell.payload.len(),
                        cell.offset,
                        &mut self.report,
                    ),
                    Err(_) => self.report_truncated_record("sk", cell.offset),
                }
            }
            Some(kind) if kind.is_subkey_list() => {
                if let Some(list_kind) = ListKind::from_tag(tag) {
                    subkey_list::check_intrinsic(
                        list_kind,
                        cell.payload,
                        cell.payload.len(),
                        cell.offset,
                        ctx.minor_version,
                        &mut self.report,
                    );
                }
            }
            _ => {}
        }
    }

    fn report_truncated_record(&mut self, tag: &str, offset: u32) {
        self.report.error(format!(
            "Error: truncated {} record (0x{:x})",
            tag,
            cell_offset_to_absolute(offset)
        ));
    }

    /// Fetches the cell a tree edge references.
    ///
    /// `parent` is the referencing record's data-space offset, or 0 for
    /// the root-key fetch from the header (which tolerates a free cell,
    /// as the original tool does).
    pub(crate) fn fetch_cell(
        &mut self,
        offset: u32,
        parent: u32,
    ) -> Result<FetchedCell, CheckError> {
        let abs = cell_offset_to_absolute(offset);

        let mut size_buf = [0u8; 4];
        self.reader
            .read_at(abs, &mut size_buf)
            .map_err(|_| CheckError::short_read(abs, 4, 0))?;
        let raw_size = i32::from_le_bytes(size_buf);

        let size = if raw_size > 0 {
            if parent > 0 {
                return Err(CheckError::FreeCellReference {
                    offset,
                    size: raw_size as u32,
                    parent,
                });
            }
            raw_size as u32
        } else if raw_size == 0 {
            return Err(CheckError::CellSizeZero { offset });
        } else {
            raw_size.unsigned_abs()
        };

        if size > MAX_CELL_SIZE {
            return Err(CheckError::CellOversized { offset, size });
        }
        if size < 4 {
            return Err(CheckError::CellOverrun { offset, size });
        }

        let mut payload = vec![0u8; size as usize - 4];
        self.reader
            .read_at(abs + 4, &mut payload)
            .map_err(|_| CheckError::short_read(abs, size as usize, 0))?;

        Ok(FetchedCell { size, payload })
    }

    /// Formats a cell-level failure the way the findings sink expects.
    ///
    /// Oversized cells produce warnings but still count as a failed
    /// cell, so the error flag is set without an error line.
    pub(crate) fn report_cell_error(&mut self, err: &CheckError) {
        match err {
            CheckError::ShortRead {
                offset,
                expected: 4,
                ..
            } => {
                self.report.error(format!(
                    "Error: short read while reading hbin data record size at 0x{:x}",
                    offset
                ));
            }
            CheckError::ShortRead { offset, .. } => {
                self.report.error(format!(
                    "Error: Failed to read hbin data record at 0x{:x}",
                    offset
                ));
            }
            CheckError::CellSizeZero { offset } => {
                self.report.error(format!(
                    "Error: hbin data record size is NULL at 0x{:x}",
                    cell_offset_to_absolute(*offset)
                ));
            }
            CheckError::CellOversized { offset, size } => {
                self.report.warning(format!(
                    "Warning: hbin data record size (0x{:x}) is quite large at 0x{:x}",
                    size,
                    cell_offset_to_absolute(*offset)
                ));
                self.report
                    .warning("Warning: NOT ALLOCATING THIS BLOCK.".to_string());
                self.report.set_error();
            }
            CheckError::CellOverrun { offset, size } => {
                self.report.error(format!(
                    "Error: hbin data record size (0x{:x}) stretches beyond the hbin at 0x{:x}",
                    size,
                    cell_offset_to_absolute(*offset)
                ));
            }
            CheckError::FreeCellReference {
                offset,
                size,
                parent,
            } => {
                self.report.error(format!(
                    "Error: Referencing unused block (0x{:x}) with size 0x{:x} from 0x{:x}",
                    cell_offset_to_absolute(*offset),
                    size,
                    cell_offset_to_absolute(*parent)
                ));
            }
            CheckError::RecursionLimit { offset } => {
                self.report.error(format!(
                    "Error: key tree is nested too deep at 0x{:x}",
                    cell_offset_to_absolute(*offset)
                ));
            }
            other => {
                self.report.error(format!("Error: {}", other));
            }
        }
    }
}
