//! Block identifiers and on-disk constants shared by all Strata components.

use crate::error::{Result, StrataError};
use serde::{Deserialize, Serialize};

/// Size of every block in bytes (4 KB, matches the OS page size).
pub const BLOCK_SIZE: usize = 4096;

/// A raw block as read from or written to disk.
pub type Block = [u8; BLOCK_SIZE];

/// Sentinel stored in 4-byte on-page pointers meaning "no block".
pub const INVALID_BLOCK: u32 = u32::MAX;

/// Unique identifier for a block within a single store file.
///
/// Block 0 holds the store metadata (total block count) and block 1 holds
/// the tree header (root block id). Everything else is tree pages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockId(pub u64);

impl BlockId {
    /// Block reserved for the store's own metadata.
    pub const META: BlockId = BlockId(0);

    /// Block reserved for the tree header.
    pub const TREE_HEADER: BlockId = BlockId(1);

    /// First block id handed out by the allocator.
    pub const FIRST_DATA: BlockId = BlockId(2);

    /// Byte offset of this block within the store file.
    pub fn offset(&self) -> u64 {
        self.0 * BLOCK_SIZE as u64
    }

    /// Converts the id to the 4-byte form stored inside pages.
    pub fn to_pointer(&self) -> Result<u32> {
        match u32::try_from(self.0) {
            Ok(ptr) if ptr != INVALID_BLOCK => Ok(ptr),
            _ => Err(StrataError::PointerOverflow(self.0)),
        }
    }

    /// Decodes a 4-byte on-page pointer. Returns None for the invalid sentinel.
    pub fn from_pointer(ptr: u32) -> Option<BlockId> {
        if ptr == INVALID_BLOCK {
            None
        } else {
            Some(BlockId(ptr as u64))
        }
    }
}

impl From<u32> for BlockId {
    fn from(value: u32) -> Self {
        BlockId(value as u64)
    }
}

impl std::fmt::Display for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "block:{}", self.0)
    }
}

/// Node kinds stored in the first byte of every tree page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum NodeKind {
    /// Routing node holding separator keys and child pointers.
    Internal = 0,
    /// Bottom-level node.
    Leaf = 1,
}

impl NodeKind {
    /// Decodes a kind byte. Returns None for any unknown value.
    pub fn from_byte(byte: u8) -> Option<NodeKind> {
        match byte {
            0 => Some(NodeKind::Internal),
            1 => Some(NodeKind::Leaf),
            _ => None,
        }
    }
}
