//! Variant-agnostic index interface.

use crate::btree::{BPlusTree, BTree, NodeBehavior, RangeCursor, Tree};
use bytes::Bytes;
use std::path::{Path, PathBuf};
use strata_common::{IndexKind, Result, StoreConfig};

/// Operations shared by every index variant.
pub trait Index: Send {
    /// Inserts or replaces the value for `key`.
    fn insert(&mut self, key: i64, value: &[u8]) -> Result<()>;

    /// Looks up `key`. A missing key is `Ok(None)`.
    fn get(&self, key: i64) -> Result<Option<Bytes>>;

    /// Removes `key`. A missing key is not an error.
    fn delete(&mut self, key: i64) -> Result<()>;

    /// Cursor over the closed interval `[start, end]`.
    fn range(&self, start: i64, end: i64) -> Result<Box<dyn RangeCursor + '_>>;

    /// Flushes the header and releases the backing file.
    fn close(self: Box<Self>) -> Result<()>;
}

impl<B: NodeBehavior + 'static> Index for Tree<B> {
    fn insert(&mut self, key: i64, value: &[u8]) -> Result<()> {
        Tree::insert(self, key, value)
    }

    fn get(&self, key: i64) -> Result<Option<Bytes>> {
        Tree::get(self, key)
    }

    fn delete(&mut self, key: i64) -> Result<()> {
        Tree::delete(self, key).map(|_| ())
    }

    fn range(&self, start: i64, end: i64) -> Result<Box<dyn RangeCursor + '_>> {
        Ok(Box::new(Tree::range(self, start, end)?))
    }

    fn close(self: Box<Self>) -> Result<()> {
        Tree::close(*self)
    }
}

/// Opens an index of `kind` at `base_path` plus the kind's file extension.
pub fn open_index(
    kind: IndexKind,
    base_path: impl AsRef<Path>,
    config: StoreConfig,
) -> Result<Box<dyn Index>> {
    let path = index_path(kind, base_path.as_ref());
    Ok(match kind {
        IndexKind::BTree => Box::new(BTree::open(path, config)?),
        IndexKind::BPlusTree => Box::new(BPlusTree::open(path, config)?),
    })
}

/// Backing file path for an index of `kind` rooted at `base`.
pub fn index_path(kind: IndexKind, base: &Path) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(".");
    name.push(kind.file_extension());
    PathBuf::from(name)
}
