//! Error types for hive checking operations.
//!
//! Errors in this crate describe failures to *obtain* bytes (I/O, short
//! reads, truncated slices, anomalous cell sizes). Structural findings
//! about the hive itself are not errors; they are reported through
//! [`crate::report::Reporter`] so that a single run can collect as many
//! findings as possible.

use std::io;
use thiserror::Error;

/// Result type alias for checker operations.
pub type Result<T> = std::result::Result<T, CheckError>;

/// Errors that can occur while fetching or decoding hive structures.
#[derive(Error, Debug)]
pub enum CheckError {
    /// I/O error occurred while reading the hive file.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The byte source yielded fewer bytes than requested.
    #[error("Short read at offset {offset:#x}: wanted {expected} bytes, got {actual}")]
    ShortRead {
        offset: u64,
        expected: usize,
        actual: usize,
    },

    /// A fixed-layout decode was handed a slice that is too small.
    #[error("Truncated data at offset {offset:#x}: expected {expected} bytes, got {actual} bytes")]
    Truncated {
        offset: u32,
        expected: usize,
        actual: usize,
    },

    /// A cell declared a raw size of zero.
    #[error("Cell size is zero at offset {offset:#x}")]
    CellSizeZero { offset: u32 },

    /// A cell's declared extent crosses its bin boundary or the end of
    /// the data region.
    #[error("Cell at offset {offset:#x} with size {size:#x} overruns its bin")]
    CellOverrun { offset: u32, size: u32 },

    /// An allocated cell declared an implausibly large size.
    #[error("Cell at offset {offset:#x} declares suspicious size {size:#x}")]
    CellOversized { offset: u32, size: u32 },

    /// A cell reference landed on a free (unallocated) cell.
    #[error("Reference from {parent:#x} lands on free cell at offset {offset:#x}")]
    FreeCellReference {
        offset: u32,
        size: u32,
        parent: u32,
    },

    /// Tree traversal exceeded the recursion cap.
    #[error("Tree depth limit reached at offset {offset:#x}")]
    RecursionLimit { offset: u32 },
}

impl CheckError {
    /// Creates a short-read error with context.
    pub fn short_read(offset: u64, expected: usize, actual: usize) -> Self {
        Self::ShortRead {
            offset,
            expected,
            actual,
        }
    }

    /// Creates a truncated-data error with context.
    pub fn truncated(offset: u32, expected: usize, actual: usize) -> Self {
        Self::Truncated {
            offset,
            expected,
            actual,
        }
    }
}
