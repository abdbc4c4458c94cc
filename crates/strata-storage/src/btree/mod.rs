//! Disk-resident ordered indexes over `i64` keys.
//!
//! A single engine, [`Tree`], drives both index variants. What differs
//! between them lives behind [`NodeBehavior`]:
//!
//! - [`BTreeNode`]: every node carries values; splits push the median up.
//! - [`BPlusTreeNode`]: only leaves carry values; leaf splits copy the first
//!   right key up and leaves form a singly linked chain for range scans.
//!
//! Tree pages are 4 KiB slotted pages ([`NodePage`]):
//!
//! ```text
//! +--------+-------------------+ ... free ... +-----------------+
//! | header | cell ptrs (u16) ->|              |<- cell contents |
//! +--------+-------------------+ ............ +-----------------+
//! ```
//!
//! Block 0 of the file belongs to the page store, block 1 holds the root
//! pointer and tree pages start at block 2.

mod constants;
mod delete;
mod dot;
mod iter;
mod node;
mod page;
mod tree;
mod verify;

pub use constants::{CELL_PTR_SIZE, HEADER_SIZE, MAX_VALUE_SIZE, MIN_FILL_FACTOR, USABLE_SPACE};
pub use iter::{RangeCursor, RangeScan};
pub use node::{BPlusTreeNode, BTreeNode, Cell, NodeBehavior};
pub use page::NodePage;
pub use tree::Tree;
pub use verify::TreeStats;

/// Classic B-tree: values in every node.
pub type BTree = Tree<BTreeNode>;

/// B+ tree with chained leaves.
pub type BPlusTree = Tree<BPlusTreeNode>;
