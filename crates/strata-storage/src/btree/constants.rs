//! Tree page constants.

use strata_common::BLOCK_SIZE;

/// Node kind byte.
pub(crate) const KIND_OFFSET: usize = 0;

/// Cell count (u16).
pub(crate) const NUM_CELLS_OFFSET: usize = 1;

/// Top of the cell content area (u16). Content grows down from BLOCK_SIZE.
pub(crate) const CONTENT_TOP_OFFSET: usize = 3;

/// Rightmost child pointer (u32), internal pages only.
pub(crate) const RIGHTMOST_OFFSET: usize = 5;

/// Next leaf pointer (u32), chained leaves only.
pub(crate) const NEXT_LEAF_OFFSET: usize = 9;

/// Fixed page header size. The cell pointer array starts here.
pub const HEADER_SIZE: usize = 13;

/// Size of one cell pointer slot.
pub const CELL_PTR_SIZE: usize = 2;

/// Bytes available for cells and their pointers on an empty page.
pub const USABLE_SPACE: usize = BLOCK_SIZE - HEADER_SIZE;

/// Largest value accepted by insert. Keeps at least four cells per page.
pub const MAX_VALUE_SIZE: usize = 1000;

/// Minimum fill factor for non-root tree pages (50%).
pub const MIN_FILL_FACTOR: f64 = 0.5;

/// Live bytes below which a non-root page is considered underfull.
pub(crate) const UNDERFLOW_THRESHOLD: usize = (USABLE_SPACE as f64 * MIN_FILL_FACTOR) as usize;
