//! Range scans over a closed key interval.
//!
//! Two strategies share one cursor:
//! - [`InOrderWalk`]: explicit stack of `(page, index, descended)` frames
//!   doing an in-order traversal, for trees that keep values in every node.
//! - [`ChainWalk`]: seed at the leaf covering `start`, then follow next-leaf
//!   pointers without going back through the root.

use super::node::NodeBehavior;
use super::page::NodePage;
use super::tree::Tree;
use bytes::Bytes;
use strata_common::{BlockId, Result, StrataError};

/// Lazy, single-pass cursor over a key range.
pub trait RangeCursor {
    /// Moves to the next entry. Returns false when the range is exhausted or
    /// an error stopped the scan.
    fn advance(&mut self) -> bool;

    /// Key of the current entry.
    fn key(&self) -> Option<i64>;

    /// Value of the current entry.
    fn value(&self) -> Option<&Bytes>;

    /// Error that ended the scan early, if any.
    fn error(&self) -> Option<&StrataError>;

    /// Releases the cursor.
    fn close(self: Box<Self>) -> Result<()>;
}

struct Frame {
    id: BlockId,
    page: NodePage,
    index: usize,
    /// Child `index` has already been visited.
    descended: bool,
}

/// In-order traversal with an explicit stack.
pub struct InOrderWalk<'a, B: NodeBehavior> {
    tree: &'a Tree<B>,
    stack: Vec<Frame>,
}

impl<'a, B: NodeBehavior> InOrderWalk<'a, B> {
    /// Descends toward `start`, leaving one frame per level positioned at
    /// the first key not below it.
    fn seek(tree: &'a Tree<B>, start: i64) -> Result<Self> {
        let mut walk = Self {
            tree,
            stack: Vec::new(),
        };
        let chained = tree.behavior.uses_copy_up_split();
        let mut id = tree.root;
        loop {
            let page = tree.load(id)?;
            let leaf = page.is_leaf();
            let found = tree.search(&page, start)?;
            let hit = found.is_ok() && !leaf && !chained;
            let index = match found {
                Ok(i) if !leaf && chained => i + 1,
                Ok(i) | Err(i) => i,
            };
            let child = if leaf || hit {
                None
            } else {
                Some(tree.child_at(id, &page, index)?)
            };
            walk.stack.push(Frame {
                id,
                page,
                index,
                descended: true,
            });
            match child {
                Some(child) => id = child,
                None => return Ok(walk),
            }
        }
    }

    fn step(&mut self) -> Result<Option<(i64, Bytes)>> {
        loop {
            let Some(frame) = self.stack.last_mut() else {
                return Ok(None);
            };
            let leaf = frame.page.is_leaf();
            let n = frame.page.num_cells();

            if leaf {
                if frame.index < n {
                    let cell = self.tree.behavior.read_cell(&frame.page, frame.index, true)?;
                    frame.index += 1;
                    if let Some(value) = cell.value {
                        return Ok(Some((cell.key, value)));
                    }
                    continue;
                }
                self.stack.pop();
                continue;
            }

            if !frame.descended {
                frame.descended = true;
                let child = self.tree.child_at(frame.id, &frame.page, frame.index)?;
                let page = self.tree.load(child)?;
                self.stack.push(Frame {
                    id: child,
                    page,
                    index: 0,
                    descended: false,
                });
                continue;
            }

            if frame.index < n {
                let cell = self.tree.behavior.read_cell(&frame.page, frame.index, false)?;
                frame.index += 1;
                frame.descended = false;
                // Routing-only cells carry no value
                if let Some(value) = cell.value {
                    return Ok(Some((cell.key, value)));
                }
                continue;
            }
            self.stack.pop();
        }
    }
}

/// Sequential walk along the leaf chain.
pub struct ChainWalk<'a, B: NodeBehavior> {
    tree: &'a Tree<B>,
    page: Option<NodePage>,
    index: usize,
}

impl<'a, B: NodeBehavior> ChainWalk<'a, B> {
    fn seek(tree: &'a Tree<B>, start: i64) -> Result<Self> {
        let (_, page) = tree.find_leaf(start)?;
        let index = match tree.search(&page, start)? {
            Ok(i) | Err(i) => i,
        };
        Ok(Self {
            tree,
            page: Some(page),
            index,
        })
    }

    fn step(&mut self) -> Result<Option<(i64, Bytes)>> {
        loop {
            let Some(page) = &self.page else {
                return Ok(None);
            };
            if self.index < page.num_cells() {
                let cell = self.tree.behavior.read_cell(page, self.index, true)?;
                self.index += 1;
                if let Some(value) = cell.value {
                    return Ok(Some((cell.key, value)));
                }
                continue;
            }
            match BlockId::from_pointer(page.next_leaf()) {
                None => {
                    self.page = None;
                    return Ok(None);
                }
                Some(next) => {
                    self.page = Some(self.tree.load(next)?);
                    self.index = 0;
                }
            }
        }
    }
}

enum Walk<'a, B: NodeBehavior> {
    InOrder(InOrderWalk<'a, B>),
    Chain(ChainWalk<'a, B>),
    Empty,
}

/// Cursor over `[start, end]` in ascending key order.
///
/// Also an `Iterator`; a stored error is yielded once, then iteration ends.
pub struct RangeScan<'a, B: NodeBehavior> {
    walk: Walk<'a, B>,
    end: i64,
    current: Option<(i64, Bytes)>,
    error: Option<StrataError>,
    done: bool,
}

impl<'a, B: NodeBehavior> RangeScan<'a, B> {
    /// Scans with the in-order stack walk. Works for both variants.
    pub fn in_order(tree: &'a Tree<B>, start: i64, end: i64) -> Result<Self> {
        if start > end {
            return Ok(Self::new(Walk::Empty, end));
        }
        Ok(Self::new(Walk::InOrder(InOrderWalk::seek(tree, start)?), end))
    }

    /// Scans along the leaf chain. Only meaningful for chained trees.
    pub fn leaf_chain(tree: &'a Tree<B>, start: i64, end: i64) -> Result<Self> {
        if start > end {
            return Ok(Self::new(Walk::Empty, end));
        }
        Ok(Self::new(Walk::Chain(ChainWalk::seek(tree, start)?), end))
    }

    fn new(walk: Walk<'a, B>, end: i64) -> Self {
        let done = matches!(walk, Walk::Empty);
        Self {
            walk,
            end,
            current: None,
            error: None,
            done,
        }
    }

    fn step(&mut self) -> Result<Option<(i64, Bytes)>> {
        match &mut self.walk {
            Walk::InOrder(walk) => walk.step(),
            Walk::Chain(walk) => walk.step(),
            Walk::Empty => Ok(None),
        }
    }

    fn finish(&mut self) {
        self.done = true;
        self.current = None;
        self.walk = Walk::Empty;
    }
}

impl<'a, B: NodeBehavior> RangeCursor for RangeScan<'a, B> {
    fn advance(&mut self) -> bool {
        if self.done {
            return false;
        }
        match self.step() {
            Ok(Some((key, value))) if key <= self.end => {
                self.current = Some((key, value));
                true
            }
            Ok(_) => {
                self.finish();
                false
            }
            Err(e) => {
                self.error = Some(e);
                self.finish();
                false
            }
        }
    }

    fn key(&self) -> Option<i64> {
        self.current.as_ref().map(|(k, _)| *k)
    }

    fn value(&self) -> Option<&Bytes> {
        self.current.as_ref().map(|(_, v)| v)
    }

    fn error(&self) -> Option<&StrataError> {
        self.error.as_ref()
    }

    fn close(self: Box<Self>) -> Result<()> {
        Ok(())
    }
}

impl<'a, B: NodeBehavior> Iterator for RangeScan<'a, B> {
    type Item = Result<(i64, Bytes)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.advance() {
            return self.current.clone().map(Ok);
        }
        self.error.take().map(Err)
    }
}

impl<B: NodeBehavior> Tree<B> {
    /// Returns a cursor over `[start, end]`, using the leaf chain when the
    /// tree has one.
    pub fn range(&self, start: i64, end: i64) -> Result<RangeScan<'_, B>> {
        if self.behavior.uses_copy_up_split() {
            RangeScan::leaf_chain(self, start, end)
        } else {
            RangeScan::in_order(self, start, end)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::node::{BPlusTreeNode, BTreeNode};
    use strata_common::StoreConfig;
    use tempfile::tempdir;

    fn keys_of<B: NodeBehavior>(scan: RangeScan<'_, B>) -> Vec<i64> {
        scan.map(|r| r.unwrap().0).collect()
    }

    #[test]
    fn test_empty_tree_scan() {
        let dir = tempdir().unwrap();
        let tree: Tree<BTreeNode> =
            Tree::open(dir.path().join("e.bt"), StoreConfig::default()).unwrap();
        let mut scan = tree.range(i64::MIN, i64::MAX).unwrap();
        assert!(!scan.advance());
        assert_eq!(scan.key(), None);
        assert!(scan.error().is_none());
    }

    #[test]
    fn test_reversed_bounds_yield_nothing() {
        let dir = tempdir().unwrap();
        let mut tree: Tree<BPlusTreeNode> =
            Tree::open(dir.path().join("r.bpt"), StoreConfig::default()).unwrap();
        tree.insert(5, b"five").unwrap();
        assert!(keys_of(tree.range(10, 0).unwrap()).is_empty());
        assert_eq!(keys_of(tree.range(5, 5).unwrap()), vec![5]);
    }

    #[test]
    fn test_cursor_accessors() {
        let dir = tempdir().unwrap();
        let mut tree: Tree<BTreeNode> =
            Tree::open(dir.path().join("c.bt"), StoreConfig::default()).unwrap();
        tree.insert(1, b"a").unwrap();
        tree.insert(2, b"b").unwrap();

        let mut scan = tree.range(0, 10).unwrap();
        assert!(scan.advance());
        assert_eq!(scan.key(), Some(1));
        assert_eq!(scan.value().unwrap(), &b"a"[..]);
        assert!(scan.advance());
        assert_eq!(scan.key(), Some(2));
        assert!(!scan.advance());
        assert!(!scan.advance());
        assert_eq!(scan.key(), None);
        Box::new(scan).close().unwrap();
    }

    #[test]
    fn test_in_order_and_chain_agree_on_chained_tree() {
        let dir = tempdir().unwrap();
        let mut tree: Tree<BPlusTreeNode> =
            Tree::open(dir.path().join("a.bpt"), StoreConfig::default()).unwrap();
        for k in (0..1000).map(|k| k * 3) {
            tree.insert(k, format!("{}", k).as_bytes()).unwrap();
        }
        for (s, e) in [(0, 2997), (10, 500), (299, 301), (1500, 1500), (2990, 5000)] {
            let stack = keys_of(RangeScan::in_order(&tree, s, e).unwrap());
            let chain = keys_of(RangeScan::leaf_chain(&tree, s, e).unwrap());
            let expected: Vec<i64> = (0..1000).map(|k| k * 3).filter(|&k| s <= k && k <= e).collect();
            assert_eq!(stack, expected, "in-order [{}, {}]", s, e);
            assert_eq!(chain, expected, "chain [{}, {}]", s, e);
        }
    }

    #[test]
    fn test_in_order_scan_includes_internal_keys() {
        let dir = tempdir().unwrap();
        let mut tree: Tree<BTreeNode> =
            Tree::open(dir.path().join("i.bt"), StoreConfig::default()).unwrap();
        for k in 0..500 {
            tree.insert(k, &[b'x'; 40]).unwrap();
        }
        assert!(tree.height().unwrap() >= 2);
        let all = keys_of(tree.range(0, 499).unwrap());
        assert_eq!(all, (0..500).collect::<Vec<_>>());

        // Seeding on a separator key must yield it first
        let root = tree.load(tree.root()).unwrap();
        let sep = tree.behavior.read_key(&root, 0, false).unwrap();
        let from_sep = keys_of(tree.range(sep, sep + 2).unwrap());
        assert_eq!(from_sep, vec![sep, sep + 1, sep + 2]);
    }
}
