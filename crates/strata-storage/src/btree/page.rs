//! Slotted tree page codec.
//!
//! Page layout:
//! ```text
//! +------------------------+ 0
//! | kind: u8               | 1
//! | num_cells: u16         | 3
//! | content_top: u16       | 5
//! | rightmost: u32         | 9
//! | next_leaf: u32         | 13 (HEADER_SIZE)
//! +------------------------+
//! | cell_ptr_0: u16        |
//! | cell_ptr_1: u16        |  pointer array grows down the page
//! | ...                    |
//! +------------------------+
//! |      free space        |
//! +------------------------+ content_top
//! | cell content           |  cells are bump-allocated toward the header
//! +------------------------+ 4096
//! ```
//!
//! Cell pointers are kept in ascending key order; cell bodies are not.

use super::constants::*;
use strata_common::{Block, BlockId, NodeKind, Result, StrataError, BLOCK_SIZE, INVALID_BLOCK};

/// Interpreted view of a block as a tree node.
#[derive(Clone)]
pub struct NodePage {
    /// Page data buffer.
    data: Box<Block>,
}

impl NodePage {
    /// Creates an empty page of the given kind.
    ///
    /// Both child pointers start at the invalid sentinel.
    pub fn new(kind: NodeKind) -> Self {
        let mut page = Self {
            data: Box::new([0u8; BLOCK_SIZE]),
        };
        page.data[KIND_OFFSET] = kind as u8;
        page.set_num_cells(0);
        page.set_content_top(BLOCK_SIZE);
        page.set_rightmost(INVALID_BLOCK);
        page.set_next_leaf(INVALID_BLOCK);
        page
    }

    /// Wraps a block read from the store.
    pub fn from_block(data: Box<Block>) -> Self {
        Self { data }
    }

    /// Returns the raw page data.
    pub fn as_block(&self) -> &Block {
        &self.data
    }

    /// Consumes the page and returns its block.
    pub fn into_block(self) -> Box<Block> {
        self.data
    }

    /// Returns the node kind, or None if the kind byte is unknown.
    pub fn kind(&self) -> Option<NodeKind> {
        NodeKind::from_byte(self.data[KIND_OFFSET])
    }

    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.kind() == Some(NodeKind::Leaf)
    }

    #[inline]
    pub fn num_cells(&self) -> usize {
        self.u16_at(NUM_CELLS_OFFSET) as usize
    }

    pub fn set_num_cells(&mut self, n: usize) {
        self.put_u16(NUM_CELLS_OFFSET, n as u16);
    }

    /// Offset of the lowest allocated cell byte.
    ///
    /// Stored as u16, so an empty page (top == 4096) fits without wrapping.
    #[inline]
    pub fn content_top(&self) -> usize {
        self.u16_at(CONTENT_TOP_OFFSET) as usize
    }

    pub fn set_content_top(&mut self, top: usize) {
        self.put_u16(CONTENT_TOP_OFFSET, top as u16);
    }

    #[inline]
    pub fn rightmost(&self) -> u32 {
        self.u32_at(RIGHTMOST_OFFSET)
    }

    pub fn set_rightmost(&mut self, child: u32) {
        self.put_u32(RIGHTMOST_OFFSET, child);
    }

    #[inline]
    pub fn next_leaf(&self) -> u32 {
        self.u32_at(NEXT_LEAF_OFFSET)
    }

    pub fn set_next_leaf(&mut self, next: u32) {
        self.put_u32(NEXT_LEAF_OFFSET, next);
    }

    /// Returns the content offset stored in pointer slot `index`.
    #[inline]
    pub fn cell_ptr(&self, index: usize) -> usize {
        self.u16_at(HEADER_SIZE + index * CELL_PTR_SIZE) as usize
    }

    pub fn set_cell_ptr(&mut self, index: usize, offset: usize) {
        self.put_u16(HEADER_SIZE + index * CELL_PTR_SIZE, offset as u16);
    }

    /// End of the pointer array for the current cell count.
    #[inline]
    fn ptr_array_end(&self) -> usize {
        HEADER_SIZE + self.num_cells() * CELL_PTR_SIZE
    }

    /// Bytes between the end of the pointer array and the content top.
    pub fn free_space(&self) -> usize {
        self.content_top().saturating_sub(self.ptr_array_end())
    }

    /// Returns true if a cell of `size` bytes and its pointer slot fit.
    pub fn can_fit(&self, size: usize) -> bool {
        self.free_space() >= size + CELL_PTR_SIZE
    }

    /// Bump-allocates `size` bytes of cell content.
    ///
    /// Returns the new cell's offset, or None if the cell plus its pointer
    /// slot would collide with the pointer array.
    pub fn allocate_cell_space(&mut self, size: usize) -> Option<usize> {
        if !self.can_fit(size) {
            return None;
        }
        let top = self.content_top() - size;
        self.set_content_top(top);
        Some(top)
    }

    /// Inserts a pointer at `index`, shifting later pointers right.
    ///
    /// The caller must have reserved room with `allocate_cell_space`.
    pub fn insert_cell_ptr(&mut self, index: usize, offset: usize) {
        let n = self.num_cells();
        let start = HEADER_SIZE + index * CELL_PTR_SIZE;
        let end = HEADER_SIZE + n * CELL_PTR_SIZE;
        self.data.copy_within(start..end, start + CELL_PTR_SIZE);
        self.set_cell_ptr(index, offset);
        self.set_num_cells(n + 1);
    }

    /// Removes the pointer at `index`, shifting later pointers left.
    ///
    /// The cell body stays where it is until the page is rebuilt.
    pub fn remove_cell_ptr(&mut self, index: usize) {
        let n = self.num_cells();
        if index >= n {
            return;
        }
        let start = HEADER_SIZE + (index + 1) * CELL_PTR_SIZE;
        let end = HEADER_SIZE + n * CELL_PTR_SIZE;
        self.data.copy_within(start..end, start - CELL_PTR_SIZE);
        self.set_num_cells(n - 1);
        let last = HEADER_SIZE + (n - 1) * CELL_PTR_SIZE;
        self.data[last..last + CELL_PTR_SIZE].fill(0);
    }

    /// Checks header fields against each other and the block bounds.
    pub fn validate(&self, block_id: BlockId) -> Result<()> {
        let kind = self.data[KIND_OFFSET];
        if NodeKind::from_byte(kind).is_none() {
            return Err(StrataError::corrupted(
                block_id.0,
                format!("invalid node kind {}", kind),
            ));
        }
        let top = self.content_top();
        if top > BLOCK_SIZE || top < self.ptr_array_end() {
            return Err(StrataError::corrupted(
                block_id.0,
                format!(
                    "content top {} overlaps pointer array ending at {}",
                    top,
                    self.ptr_array_end()
                ),
            ));
        }
        for i in 0..self.num_cells() {
            let ptr = self.cell_ptr(i);
            if ptr < top || ptr >= BLOCK_SIZE {
                return Err(StrataError::corrupted(
                    block_id.0,
                    format!("cell pointer {} = {} outside content area", i, ptr),
                ));
            }
        }
        Ok(())
    }

    // Bounds-checked cell field access. Cell bodies come from disk, so an
    // offset can be garbage even when the header checks out.

    pub fn read_u16(&self, offset: usize) -> Result<u16> {
        let b = self.read_bytes(offset, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&self, offset: usize) -> Result<u32> {
        let b = self.read_bytes(offset, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i64(&self, offset: usize) -> Result<i64> {
        let b = self.read_bytes(offset, 8)?;
        let mut buf = [0u8; 8];
        buf.copy_from_slice(b);
        Ok(i64::from_le_bytes(buf))
    }

    pub fn read_bytes(&self, offset: usize, len: usize) -> Result<&[u8]> {
        offset
            .checked_add(len)
            .filter(|&end| end <= BLOCK_SIZE)
            .map(|end| &self.data[offset..end])
            .ok_or(StrataError::MalformedCell { offset })
    }

    // Writes assume offsets produced by allocate_cell_space.

    pub fn write_u16(&mut self, offset: usize, value: u16) {
        self.put_u16(offset, value);
    }

    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.put_u32(offset, value);
    }

    pub fn write_i64(&mut self, offset: usize, value: i64) {
        self.data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, offset: usize, bytes: &[u8]) {
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }

    #[inline]
    fn u16_at(&self, offset: usize) -> u16 {
        u16::from_le_bytes([self.data[offset], self.data[offset + 1]])
    }

    #[inline]
    fn u32_at(&self, offset: usize) -> u32 {
        u32::from_le_bytes([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
            self.data[offset + 3],
        ])
    }

    #[inline]
    fn put_u16(&mut self, offset: usize, value: u16) {
        self.data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    #[inline]
    fn put_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
}

impl std::fmt::Debug for NodePage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NodePage")
            .field("kind", &self.kind())
            .field("num_cells", &self.num_cells())
            .field("content_top", &self.content_top())
            .field("rightmost", &self.rightmost())
            .field("next_leaf", &self.next_leaf())
            .finish()
    }
}
