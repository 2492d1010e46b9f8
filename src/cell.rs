//! Registry cell type definitions.
//!
//! Cells are the allocation units within hive bins. Each allocated cell
//! carries a 2-byte tag in the first two payload bytes that identifies
//! the record kind stored in it.

/// Cell record tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellType {
    /// Key node (nk) - a registry key.
    KeyNode,

    /// Value key (vk) - a registry value descriptor.
    ValueKey,

    /// Security descriptor (sk).
    Security,

    /// Index leaf (li) - subkey list of bare offsets.
    IndexLeaf,

    /// Fast leaf (lf) - subkey list with 4-byte name prefixes.
    FastLeaf,

    /// Hash leaf (lh) - subkey list with name hashes.
    HashLeaf,

    /// Index root (ri) - indirect list of subkey-list offsets.
    IndexRoot,
}

impl CellType {
    /// Identifies a cell record from its 2-byte tag.
    ///
    /// Unknown tags yield `None`; the sequential scan skips them for
    /// forward compatibility.
    pub fn from_tag(tag: [u8; 2]) -> Option<Self> {
        match &tag {
            b"nk" => Some(CellType::KeyNode),
            b"vk" => Some(CellType::ValueKey),
            b"sk" => Some(CellType::Security),
            b"li" => Some(CellType::IndexLeaf),
            b"lf" => Some(CellType::FastLeaf),
            b"lh" => Some(CellType::HashLeaf),
            b"ri" => Some(CellType::IndexRoot),
            _ => None,
        }
    }

    /// Returns the 2-byte tag for this cell type.
    pub fn tag(&self) -> &'static [u8; 2] {
        match self {
            CellType::KeyNode => b"nk",
            CellType::ValueKey => b"vk",
            CellType::Security => b"sk",
            CellType::IndexLeaf => b"li",
            CellType::FastLeaf => b"lf",
            CellType::HashLeaf => b"lh",
            CellType::IndexRoot => b"ri",
        }
    }

    /// Returns true if this cell type represents a subkey list.
    pub fn is_subkey_list(&self) -> bool {
        matches!(
            self,
            CellType::IndexLeaf | CellType::FastLeaf | CellType::HashLeaf | CellType::IndexRoot
        )
    }
}

/// Key node type words.
///
/// The nk type field is a small flag word; these three combinations are
/// the ones Windows writes.
pub mod key_type {
    /// Normal key.
    pub const NORMAL: u16 = 0x20;

    /// Root key. There can be only one.
    pub const ROOT: u16 = 0x2C;

    /// Symbolic link key.
    pub const SYM_LINK: u16 = 0x10;
}

/// Flags for key nodes.
#[derive(Debug, Clone, Copy)]
pub struct KeyNodeFlags(pub u16);

impl KeyNodeFlags {
    /// Key name is in compressed format (ASCII).
    pub const COMP_NAME: u16 = 0x0020;

    /// Key is the root key.
    pub const ROOT_KEY: u16 = 0x0004;

    /// Key is a symbolic link.
    pub const SYM_LINK: u16 = 0x0010;

    /// Creates a new KeyNodeFlags from a u16 value.
    pub fn new(flags: u16) -> Self {
        Self(flags)
    }

    /// Returns true if the specified flag is set.
    pub fn has_flag(&self, flag: u16) -> bool {
        (self.0 & flag) != 0
    }

    /// Returns true if the key name is compressed (ASCII).
    pub fn is_compressed(&self) -> bool {
        self.has_flag(Self::COMP_NAME)
    }

    /// Returns true if this is the root key.
    pub fn is_root(&self) -> bool {
        self.has_flag(Self::ROOT_KEY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_type_from_tag() {
        assert_eq!(CellType::from_tag(*b"nk"), Some(CellType::KeyNode));
        assert_eq!(CellType::from_tag(*b"vk"), Some(CellType::ValueKey));
        assert_eq!(CellType::from_tag(*b"sk"), Some(CellType::Security));
        assert_eq!(CellType::from_tag(*b"lf"), Some(CellType::FastLeaf));
        assert_eq!(CellType::from_tag(*b"lh"), Some(CellType::HashLeaf));
        assert_eq!(CellType::from_tag(*b"li"), Some(CellType::IndexLeaf));
        assert_eq!(CellType::from_tag(*b"ri"), Some(CellType::IndexRoot));
        assert_eq!(CellType::from_tag(*b"XX"), None);
    }

    #[test]
    fn test_cell_type_roundtrip() {
        let types = [
            CellType::KeyNode,
            CellType::ValueKey,
            CellType::Security,
            CellType::IndexLeaf,
            CellType::FastLeaf,
            CellType::HashLeaf,
            CellType::IndexRoot,
        ];

        for cell_type in &types {
            assert_eq!(CellType::from_tag(*cell_type.tag()), Some(*cell_type));
        }
    }

    #[test]
    fn test_is_subkey_list() {
        assert!(CellType::IndexLeaf.is_subkey_list());
        assert!(CellType::FastLeaf.is_subkey_list());
        assert!(CellType::HashLeaf.is_subkey_list());
        assert!(CellType::IndexRoot.is_subkey_list());

        assert!(!CellType::KeyNode.is_subkey_list());
        assert!(!CellType::ValueKey.is_subkey_list());
        assert!(!CellType::Security.is_subkey_list());
    }

    #[test]
    fn test_key_node_flags() {
        // 0x2C = compressed-name | no-delete | root
        let flags = KeyNodeFlags::new(key_type::ROOT);
        assert!(flags.is_root());
        assert!(flags.is_compressed());

        let flags = KeyNodeFlags::new(key_type::NORMAL);
        assert!(flags.is_compressed());
        assert!(!flags.is_root());

        let flags = KeyNodeFlags::new(key_type::SYM_LINK);
        assert!(flags.has_flag(KeyNodeFlags::SYM_LINK));
        assert!(!flags.is_compressed());
    }
}
