//! Node behaviors: per-variant cell encoding and split policy.
//!
//! Cell layouts (all integers little-endian):
//! ```text
//! BTreeNode, leaf and internal:
//!   | left_child: u32 | key: i64 | len: u16 | value: [u8; len] |
//!
//! BPlusTreeNode internal:
//!   | left_child: u32 | key: i64 |
//!
//! BPlusTreeNode leaf:
//!   | key: i64 | len: u16 | value: [u8; len] |
//! ```

use super::page::NodePage;
use bytes::Bytes;
use strata_common::{Result, INVALID_BLOCK};

/// One decoded cell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    pub key: i64,
    /// None for cells that have no value slot (chained internal cells).
    pub value: Option<Bytes>,
    /// Child holding keys below `key`. INVALID_BLOCK on leaves.
    pub left_child: u32,
}

impl Cell {
    /// Creates a leaf cell.
    pub fn leaf(key: i64, value: Bytes) -> Self {
        Self {
            key,
            value: Some(value),
            left_child: INVALID_BLOCK,
        }
    }

    /// Length of the value payload, 0 when there is none.
    pub fn value_len(&self) -> usize {
        self.value.as_ref().map_or(0, |v| v.len())
    }
}

/// Capability set that specializes the generic tree engine to one index
/// variant. Implementations are stateless and bound to a tree at open time.
pub trait NodeBehavior: Send + Sync {
    /// Short name used in logs and DOT output.
    fn name(&self) -> &'static str;

    /// Encoded size of a cell carrying a value of `value_len` bytes.
    fn cell_size(&self, is_leaf: bool, value_len: usize) -> usize;

    /// Reads only the key of cell `index`.
    fn read_key(&self, page: &NodePage, index: usize, is_leaf: bool) -> Result<i64>;

    /// Decodes cell `index`.
    fn read_cell(&self, page: &NodePage, index: usize, is_leaf: bool) -> Result<Cell>;

    /// Encodes `cell` at `offset`, which must come from `allocate_cell_space`.
    fn write_cell(&self, page: &mut NodePage, offset: usize, cell: &Cell, is_leaf: bool);

    /// Length of the stored value of cell `index`, or None if the cell has
    /// no value slot.
    fn value_len(&self, page: &NodePage, index: usize, is_leaf: bool) -> Result<Option<usize>>;

    /// Replaces the value of cell `index` in place.
    ///
    /// Only valid when `value` is no longer than the stored value.
    fn overwrite_value(&self, page: &mut NodePage, index: usize, value: &[u8], is_leaf: bool)
        -> Result<()>;

    /// True if leaf splits keep the median in the right leaf and promote a
    /// copy of its key; false if the median moves up with its value.
    fn uses_copy_up_split(&self) -> bool;

    /// Wires sibling pointers after a leaf split.
    fn link_leaves(&self, left: &mut NodePage, right: &mut NodePage, new_right: u32, old_next: u32);

    /// Left child of internal cell `index`.
    ///
    /// Every internal layout starts with the child pointer.
    fn left_child(&self, page: &NodePage, index: usize) -> Result<u32> {
        page.read_u32(page.cell_ptr(index))
    }

    /// Rewrites the left child of internal cell `index`.
    fn set_left_child(&self, page: &mut NodePage, index: usize, child: u32) {
        let offset = page.cell_ptr(index);
        page.write_u32(offset, child);
    }

    /// Encoded size of `cell` including its pointer slot.
    fn footprint(&self, cell: &Cell, is_leaf: bool) -> usize {
        self.cell_size(is_leaf, cell.value_len()) + super::constants::CELL_PTR_SIZE
    }
}

/// Classic B-tree: values in every node, no leaf chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct BTreeNode;

impl BTreeNode {
    const KEY: usize = 4;
    const LEN: usize = 12;
    const VALUE: usize = 14;
}

impl NodeBehavior for BTreeNode {
    fn name(&self) -> &'static str {
        "btree"
    }

    fn cell_size(&self, _is_leaf: bool, value_len: usize) -> usize {
        Self::VALUE + value_len
    }

    fn read_key(&self, page: &NodePage, index: usize, _is_leaf: bool) -> Result<i64> {
        page.read_i64(page.cell_ptr(index) + Self::KEY)
    }

    fn read_cell(&self, page: &NodePage, index: usize, _is_leaf: bool) -> Result<Cell> {
        let off = page.cell_ptr(index);
        let left_child = page.read_u32(off)?;
        let key = page.read_i64(off + Self::KEY)?;
        let len = page.read_u16(off + Self::LEN)? as usize;
        let value = Bytes::copy_from_slice(page.read_bytes(off + Self::VALUE, len)?);
        Ok(Cell {
            key,
            value: Some(value),
            left_child,
        })
    }

    fn write_cell(&self, page: &mut NodePage, offset: usize, cell: &Cell, _is_leaf: bool) {
        let value = cell.value.as_deref().unwrap_or(&[]);
        page.write_u32(offset, cell.left_child);
        page.write_i64(offset + Self::KEY, cell.key);
        page.write_u16(offset + Self::LEN, value.len() as u16);
        page.write_bytes(offset + Self::VALUE, value);
    }

    fn value_len(&self, page: &NodePage, index: usize, _is_leaf: bool) -> Result<Option<usize>> {
        let len = page.read_u16(page.cell_ptr(index) + Self::LEN)?;
        Ok(Some(len as usize))
    }

    fn overwrite_value(
        &self,
        page: &mut NodePage,
        index: usize,
        value: &[u8],
        _is_leaf: bool,
    ) -> Result<()> {
        let off = page.cell_ptr(index);
        // Validate the slot before touching it
        page.read_bytes(off + Self::VALUE, value.len())?;
        page.write_u16(off + Self::LEN, value.len() as u16);
        page.write_bytes(off + Self::VALUE, value);
        Ok(())
    }

    fn uses_copy_up_split(&self) -> bool {
        false
    }

    fn link_leaves(&self, _: &mut NodePage, _: &mut NodePage, _: u32, _: u32) {}
}

/// B+ tree: values only in leaves, leaves chained in key order.
#[derive(Debug, Clone, Copy, Default)]
pub struct BPlusTreeNode;

impl BPlusTreeNode {
    const INTERNAL_KEY: usize = 4;
    const INTERNAL_SIZE: usize = 12;
    const LEAF_LEN: usize = 8;
    const LEAF_VALUE: usize = 10;
}

impl NodeBehavior for BPlusTreeNode {
    fn name(&self) -> &'static str {
        "bplustree"
    }

    fn cell_size(&self, is_leaf: bool, value_len: usize) -> usize {
        if is_leaf {
            Self::LEAF_VALUE + value_len
        } else {
            Self::INTERNAL_SIZE
        }
    }

    fn read_key(&self, page: &NodePage, index: usize, is_leaf: bool) -> Result<i64> {
        let off = page.cell_ptr(index);
        if is_leaf {
            page.read_i64(off)
        } else {
            page.read_i64(off + Self::INTERNAL_KEY)
        }
    }

    fn read_cell(&self, page: &NodePage, index: usize, is_leaf: bool) -> Result<Cell> {
        let off = page.cell_ptr(index);
        if is_leaf {
            let key = page.read_i64(off)?;
            let len = page.read_u16(off + Self::LEAF_LEN)? as usize;
            let value = Bytes::copy_from_slice(page.read_bytes(off + Self::LEAF_VALUE, len)?);
            Ok(Cell::leaf(key, value))
        } else {
            Ok(Cell {
                key: page.read_i64(off + Self::INTERNAL_KEY)?,
                value: None,
                left_child: page.read_u32(off)?,
            })
        }
    }

    fn write_cell(&self, page: &mut NodePage, offset: usize, cell: &Cell, is_leaf: bool) {
        if is_leaf {
            let value = cell.value.as_deref().unwrap_or(&[]);
            page.write_i64(offset, cell.key);
            page.write_u16(offset + Self::LEAF_LEN, value.len() as u16);
            page.write_bytes(offset + Self::LEAF_VALUE, value);
        } else {
            page.write_u32(offset, cell.left_child);
            page.write_i64(offset + Self::INTERNAL_KEY, cell.key);
        }
    }

    fn value_len(&self, page: &NodePage, index: usize, is_leaf: bool) -> Result<Option<usize>> {
        if !is_leaf {
            return Ok(None);
        }
        let len = page.read_u16(page.cell_ptr(index) + Self::LEAF_LEN)?;
        Ok(Some(len as usize))
    }

    fn overwrite_value(
        &self,
        page: &mut NodePage,
        index: usize,
        value: &[u8],
        is_leaf: bool,
    ) -> Result<()> {
        if !is_leaf {
            return Ok(());
        }
        let off = page.cell_ptr(index);
        page.read_bytes(off + Self::LEAF_VALUE, value.len())?;
        page.write_u16(off + Self::LEAF_LEN, value.len() as u16);
        page.write_bytes(off + Self::LEAF_VALUE, value);
        Ok(())
    }

    fn uses_copy_up_split(&self) -> bool {
        true
    }

    fn link_leaves(&self, left: &mut NodePage, right: &mut NodePage, new_right: u32, old_next: u32) {
        left.set_next_leaf(new_right);
        right.set_next_leaf(old_next);
    }
}
