//! # Windows Registry Hive Checker
//!
//! A structural integrity checker for Windows NT registry hive files
//! (the on-disk "regf" format). It reads a hive and diagnoses the
//! inconsistencies that would make the Windows kernel parser reject or
//! misinterpret the file. It is a diagnostic tool for developers and
//! forensic analysts, not a repair tool: nothing is ever written.
//!
//! ## The three passes
//!
//! 1. **Header validation**: signature, sentinel pair, version words,
//!    root key offset, data-region size, and the file-wide XOR checksum.
//! 2. **Sequential block scan**: every hive bin in storage order, every
//!    cell within each bin, and the intrinsic invariants of each record
//!    kind (nk, vk, sk, lf, lh, li, ri).
//! 3. **Tree traversal**: depth-first walk from the root key, checking
//!    cross-references, expected record kinds at each edge, parent
//!    links, subkey-list sortedness, lf name prefixes, and lh name
//!    hashes.
//!
//! ## Binary layout
//!
//! Registry hives follow this structure:
//!
//! ```text
//! [Base Block - 4KB]
//!   - Signature: "regf"
//!   - Version, timestamps, root offset
//!   - Checksum
//!
//! [Hive Bins - variable size, 4KB aligned]
//!   [Hbin Header - 32 bytes]
//!     - Signature: "hbin"
//!     - Offset, size
//!
//!   [Cells - variable size]
//!     [Cell Size - 4 bytes, negative if allocated]
//!     [Cell Data]
//!       - Key nodes (nk)
//!       - Value keys (vk)
//!       - Subkey lists (lf/lh/li/ri)
//!       - Security descriptors (sk)
//! ```
//!
//! Offsets stored inside the file are relative to byte 0x1000 (the
//! start of the data area); findings print absolute file offsets.
//!
//! ## Example
//!
//! ```no_run
//! use regf_check::{Checker, HiveFile};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let hive = HiveFile::open("SYSTEM")?;
//! let mut checker = Checker::new(&hive, std::io::stdout());
//! let clean = checker.run();
//! println!("clean: {}", clean);
//! # Ok(())
//! # }
//! ```
//!
//! Findings are human-readable lines; the return value of
//! [`Checker::run`] reflects whether any error-class finding occurred.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod cell;
pub mod checker;
pub mod error;
pub mod hbin;
pub mod header;
pub mod key;
pub mod reader;
pub mod report;
pub mod security;
pub mod subkey_list;
pub mod tree;
pub mod utils;
pub mod value;

// Re-export main types for convenience
pub use cell::{CellType, KeyNodeFlags};
pub use checker::{CheckContext, Checker};
pub use error::{CheckError, Result};
pub use hbin::{Cell, CellWalker, HbinHeader};
pub use header::BaseBlock;
pub use key::KeyNode;
pub use reader::{HiveFile, ReadAt};
pub use report::Reporter;
pub use security::SecurityKey;
pub use subkey_list::{LeafEntry, ListKind, SubkeyList};
pub use tree::Expected;
pub use value::ValueKey;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
