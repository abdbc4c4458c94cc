//! Storage engine for Strata.
//!
//! This crate provides:
//! - Page store for block-level file I/O behind an LRU cache
//! - Slotted tree pages and per-variant cell codecs
//! - A generic tree engine serving a B-tree and a chained B+ tree
//! - Range cursors, structural verification and DOT export
//! - The [`Index`] interface and an [`open_index`] factory

mod btree;
mod disk;
mod index;

pub use btree::{
    BPlusTree, BPlusTreeNode, BTree, BTreeNode, Cell, NodeBehavior, NodePage, RangeCursor,
    RangeScan, Tree, TreeStats, CELL_PTR_SIZE, HEADER_SIZE, MAX_VALUE_SIZE, MIN_FILL_FACTOR,
    USABLE_SPACE,
};
pub use disk::{PageStore, PageStoreStats};
pub use index::{index_path, open_index, Index};
