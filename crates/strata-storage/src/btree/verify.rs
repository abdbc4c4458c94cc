//! Structural consistency checks.

use super::node::NodeBehavior;
use super::tree::Tree;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use strata_common::{BlockId, Result, StrataError};

/// Shape of a tree as seen by [`Tree::verify`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeStats {
    pub height: usize,
    pub internal_pages: usize,
    pub leaf_pages: usize,
    pub keys: usize,
}

struct Walk {
    stats: TreeStats,
    leaf_depth: Option<usize>,
    leaves: Vec<BlockId>,
}

impl<B: NodeBehavior> Tree<B> {
    /// Walks the whole tree and checks its ordering invariants.
    ///
    /// Keys must ascend strictly within a page and respect the separators
    /// above them. All leaves must sit at the same depth, and in chained
    /// trees the leaf chain must visit exactly the leaves in key order.
    pub fn verify(&self) -> Result<TreeStats> {
        let mut walk = Walk {
            stats: TreeStats::default(),
            leaf_depth: None,
            leaves: Vec::new(),
        };
        self.verify_node(self.root, None, None, 1, &mut walk)?;
        walk.stats.height = walk.leaf_depth.unwrap_or(1);

        if self.behavior.uses_copy_up_split() {
            let chain = self.leaf_chain()?;
            if chain != walk.leaves {
                return Err(StrataError::corrupted(
                    self.root.0,
                    format!(
                        "leaf chain has {} pages, tree has {} leaves",
                        chain.len(),
                        walk.leaves.len()
                    ),
                ));
            }
        }
        Ok(walk.stats)
    }

    fn verify_node(
        &self,
        id: BlockId,
        lower: Option<i64>,
        upper: Option<i64>,
        depth: usize,
        walk: &mut Walk,
    ) -> Result<()> {
        let page = self.load(id)?;
        let leaf = page.is_leaf();
        let n = page.num_cells();
        // Chained separators equal the first key of their right subtree
        let inclusive_lower = self.behavior.uses_copy_up_split();

        if n == 0 && id != self.root {
            return Err(StrataError::corrupted(id.0, "empty non-root page"));
        }

        let mut prev: Option<i64> = None;
        for i in 0..n {
            let key = self.behavior.read_key(&page, i, leaf)?;
            if prev.is_some_and(|p| p >= key) {
                return Err(StrataError::corrupted(
                    id.0,
                    format!("key {} at slot {} out of order", key, i),
                ));
            }
            let above = match lower {
                None => true,
                Some(l) if inclusive_lower => key >= l,
                Some(l) => key > l,
            };
            let below = upper.map_or(true, |u| key < u);
            if !above || !below {
                return Err(StrataError::corrupted(
                    id.0,
                    format!("key {} escapes separator bounds {:?}..{:?}", key, lower, upper),
                ));
            }
            prev = Some(key);
        }

        if leaf {
            for i in 0..n {
                self.behavior.read_cell(&page, i, true)?;
            }
            match walk.leaf_depth {
                None => walk.leaf_depth = Some(depth),
                Some(d) if d != depth => {
                    return Err(StrataError::corrupted(
                        id.0,
                        format!("leaf at depth {}, expected {}", depth, d),
                    ))
                }
                Some(_) => {}
            }
            walk.stats.leaf_pages += 1;
            walk.stats.keys += n;
            walk.leaves.push(id);
            return Ok(());
        }

        walk.stats.internal_pages += 1;
        if !self.behavior.uses_copy_up_split() {
            walk.stats.keys += n;
        }
        let mut child_lower = lower;
        for i in 0..=n {
            let child_upper = if i < n {
                Some(self.behavior.read_key(&page, i, false)?)
            } else {
                upper
            };
            let child = self.child_at(id, &page, i)?;
            self.verify_node(child, child_lower, child_upper, depth + 1, walk)?;
            child_lower = child_upper;
        }
        Ok(())
    }

    /// Leaf pages in chain order, starting from the leftmost leaf.
    pub fn leaf_chain(&self) -> Result<Vec<BlockId>> {
        let mut id = self.root;
        let mut page = self.load(id)?;
        while !page.is_leaf() {
            id = self.child_at(id, &page, 0)?;
            page = self.load(id)?;
        }

        let mut chain = vec![id];
        let mut seen = HashSet::from([id]);
        while let Some(next) = BlockId::from_pointer(page.next_leaf()) {
            if !seen.insert(next) {
                return Err(StrataError::corrupted(
                    id.0,
                    format!("leaf chain loops back to {}", next),
                ));
            }
            page = self.load(next)?;
            if !page.is_leaf() {
                return Err(StrataError::corrupted(id.0, "next-leaf points at internal page"));
            }
            chain.push(next);
            id = next;
        }
        Ok(chain)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btree::node::{BPlusTreeNode, BTreeNode};
    use strata_common::StoreConfig;
    use tempfile::tempdir;

    #[test]
    fn test_verify_fresh_tree() {
        let dir = tempdir().unwrap();
        let tree: Tree<BTreeNode> =
            Tree::open(dir.path().join("v.bt"), StoreConfig::default()).unwrap();
        let stats = tree.verify().unwrap();
        assert_eq!(
            stats,
            TreeStats {
                height: 1,
                internal_pages: 0,
                leaf_pages: 1,
                keys: 0,
            }
        );
    }

    #[test]
    fn test_verify_counts_keys() {
        let dir = tempdir().unwrap();
        let mut btree: Tree<BTreeNode> =
            Tree::open(dir.path().join("v.bt"), StoreConfig::default()).unwrap();
        let mut bplus: Tree<BPlusTreeNode> =
            Tree::open(dir.path().join("v.bpt"), StoreConfig::default()).unwrap();
        for k in (0..800).rev() {
            btree.insert(k, &[1u8; 24]).unwrap();
            bplus.insert(k, &[1u8; 24]).unwrap();
        }

        let b = btree.verify().unwrap();
        assert_eq!(b.keys, 800);
        assert_eq!(b.height, btree.height().unwrap());
        assert!(b.internal_pages >= 1);

        let p = bplus.verify().unwrap();
        assert_eq!(p.keys, 800);
        assert_eq!(p.leaf_pages, bplus.leaf_chain().unwrap().len());
    }

    #[test]
    fn test_verify_detects_misordered_keys() {
        let dir = tempdir().unwrap();
        let mut tree: Tree<BPlusTreeNode> =
            Tree::open(dir.path().join("bad.bpt"), StoreConfig::default()).unwrap();
        tree.insert(1, b"a").unwrap();
        tree.insert(2, b"b").unwrap();

        // Swap the two cell pointers on the root leaf
        let root = tree.root();
        let mut page = tree.load(root).unwrap();
        let (a, b) = (page.cell_ptr(0), page.cell_ptr(1));
        page.set_cell_ptr(0, b);
        page.set_cell_ptr(1, a);
        tree.write_page(root, &page).unwrap();

        let err = tree.verify().unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_leaf_chain_detects_cycle() {
        let dir = tempdir().unwrap();
        let mut tree: Tree<BPlusTreeNode> =
            Tree::open(dir.path().join("cyc.bpt"), StoreConfig::default()).unwrap();
        for k in 0..300 {
            tree.insert(k, &[2u8; 30]).unwrap();
        }
        let chain = tree.leaf_chain().unwrap();
        assert!(chain.len() >= 2);

        let last = *chain.last().unwrap();
        let mut page = tree.load(last).unwrap();
        page.set_next_leaf(chain[0].to_pointer().unwrap());
        tree.write_page(last, &page).unwrap();

        assert!(tree.leaf_chain().unwrap_err().is_corruption());
    }

    #[test]
    fn test_stats_serialize() {
        let stats = TreeStats {
            height: 2,
            internal_pages: 1,
            leaf_pages: 3,
            keys: 90,
        };
        let json = serde_json::to_string(&stats).unwrap();
        let back: TreeStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }
}
