//! Key removal with sibling borrow and merge.
//!
//! An underfull child is repaired by its parent against an adjacent sibling:
//! merged into one page when the pair fits, otherwise redistributed evenly
//! by bytes. Leaves of chained trees concatenate directly; every other pair
//! rotates through the parent separator.

use super::constants::{UNDERFLOW_THRESHOLD, USABLE_SPACE};
use super::node::{Cell, NodeBehavior};
use super::tree::{split_point, NodeImage, Promotion, Tree};
use log::debug;
use strata_common::{BlockId, Result, StrataError, INVALID_BLOCK};

/// Outcome of removing a key from a subtree.
pub(crate) enum Removal {
    NotFound,
    /// The key is gone; `underfull` asks the parent to rebalance this node.
    Removed { underfull: bool },
    /// Rewriting this node overflowed it (a grown separator) and it split.
    Split(Promotion),
}

impl<B: NodeBehavior> Tree<B> {
    /// Removes `key`. Returns false if it was not present.
    pub fn delete(&mut self, key: i64) -> Result<bool> {
        match self.delete_rec(self.root, key)? {
            Removal::NotFound => Ok(false),
            Removal::Removed { .. } => {
                self.collapse_root()?;
                Ok(true)
            }
            Removal::Split(promo) => {
                self.grow_root(promo)?;
                Ok(true)
            }
        }
    }

    fn delete_rec(&self, id: BlockId, key: i64) -> Result<Removal> {
        let mut page = self.load(id)?;
        let leaf = page.is_leaf();
        let found = self.search(&page, key)?;

        if leaf {
            let Ok(idx) = found else {
                return Ok(Removal::NotFound);
            };
            page.remove_cell_ptr(idx);
            self.write_page(id, &page)?;
            let underfull = self.live_bytes(&page)? < UNDERFLOW_THRESHOLD;
            return Ok(Removal::Removed { underfull });
        }

        if let Ok(idx) = found {
            if !self.behavior.uses_copy_up_split() {
                return self.delete_from_internal(id, idx);
            }
        }

        let pos = match found {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        };
        let child = self.child_at(id, &page, pos)?;
        drop(page);

        let outcome = self.delete_rec(child, key)?;
        match outcome {
            Removal::NotFound | Removal::Removed { underfull: false } => Ok(outcome),
            _ => {
                let image = self.image(&self.load(id)?)?;
                self.settle(id, image, pos, outcome)
            }
        }
    }

    /// Replaces internal cell `idx` with its in-order predecessor, then
    /// removes the predecessor from the left subtree.
    fn delete_from_internal(&self, id: BlockId, idx: usize) -> Result<Removal> {
        let left = {
            let page = self.load(id)?;
            self.child_at(id, &page, idx)?
        };
        let pred = self.max_cell(left)?;

        let outcome = self.delete_rec(left, pred.key)?;
        if let Removal::NotFound = outcome {
            return Err(StrataError::corrupted(
                left.0,
                format!("predecessor {} vanished", pred.key),
            ));
        }

        let mut image = self.image(&self.load(id)?)?;
        let cell = &mut image.cells[idx];
        cell.key = pred.key;
        cell.value = pred.value;
        self.settle(id, image, idx, outcome)
    }

    /// Largest cell in the subtree rooted at `id`.
    fn max_cell(&self, id: BlockId) -> Result<Cell> {
        let mut id = id;
        loop {
            let page = self.load(id)?;
            let n = page.num_cells();
            if page.is_leaf() {
                if n == 0 {
                    return Err(StrataError::corrupted(id.0, "empty non-root leaf"));
                }
                return self.behavior.read_cell(&page, n - 1, true);
            }
            id = self.child_at(id, &page, n)?;
        }
    }

    /// Applies a child's removal outcome to its parent image and commits it.
    fn settle(
        &self,
        id: BlockId,
        mut image: NodeImage,
        pos: usize,
        outcome: Removal,
    ) -> Result<Removal> {
        match outcome {
            Removal::NotFound | Removal::Removed { underfull: false } => {}
            Removal::Removed { underfull: true } => self.rebalance(id, &mut image, pos)?,
            Removal::Split(promo) => {
                let cell = Cell {
                    key: promo.key,
                    value: promo.value,
                    left_child: image.child(pos),
                };
                image.cells.insert(pos, cell);
                image.set_child(pos + 1, promo.right.to_pointer()?);
            }
        }

        let underfull = self.footprint(&image) < UNDERFLOW_THRESHOLD;
        Ok(match self.commit(id, image)? {
            Some(promo) => Removal::Split(promo),
            None => Removal::Removed { underfull },
        })
    }

    /// Fixes the underfull child at `pos` against its right sibling, or its
    /// left sibling when it is the last child.
    fn rebalance(&self, parent_id: BlockId, parent: &mut NodeImage, pos: usize) -> Result<()> {
        let n = parent.cells.len();
        if n == 0 {
            // Lone child of a root that is about to collapse
            return Ok(());
        }
        let sep = pos.min(n - 1);
        let left_id = self.child_id(parent_id, parent.child(sep))?;
        let right_id = self.child_id(parent_id, parent.child(sep + 1))?;
        let left = self.image(&self.load(left_id)?)?;
        let right = self.image(&self.load(right_id)?)?;

        if left.leaf && self.behavior.uses_copy_up_split() {
            self.rebalance_chained(parent, sep, (left_id, left), (right_id, right))
        } else {
            self.rebalance_rotating(parent, sep, (left_id, left), (right_id, right))
        }
    }

    /// Chained leaves: concatenate, then merge or split at a fresh separator.
    fn rebalance_chained(
        &self,
        parent: &mut NodeImage,
        sep: usize,
        (left_id, left): (BlockId, NodeImage),
        (right_id, right): (BlockId, NodeImage),
    ) -> Result<()> {
        let right_next = right.next_leaf;
        let mut cells = left.cells;
        cells.extend(right.cells);
        let merged = NodeImage {
            leaf: true,
            cells,
            rightmost: INVALID_BLOCK,
            next_leaf: right_next,
        };

        if self.footprint(&merged) <= USABLE_SPACE {
            let page = self.build(left_id, &merged)?;
            self.write_page(left_id, &page)?;
            parent.cells.remove(sep);
            parent.set_child(sep, left_id.to_pointer()?);
            debug!("merged leaf {} into {}", right_id, left_id);
            return Ok(());
        }

        let mut cells = merged.cells;
        let sizes: Vec<usize> = cells
            .iter()
            .map(|c| self.behavior.footprint(c, true))
            .collect();
        let mid = split_point(&sizes, true, None).ok_or_else(|| {
            StrataError::corrupted(left_id.0, "leaf pair cannot be redistributed")
        })?;
        let right_cells = cells.split_off(mid);
        let new_sep = right_cells[0].key;

        let left_image = NodeImage {
            leaf: true,
            cells,
            rightmost: INVALID_BLOCK,
            next_leaf: right_id.to_pointer()?,
        };
        let right_image = NodeImage {
            leaf: true,
            cells: right_cells,
            rightmost: INVALID_BLOCK,
            next_leaf: right_next,
        };
        self.write_page(right_id, &self.build(right_id, &right_image)?)?;
        self.write_page(left_id, &self.build(left_id, &left_image)?)?;
        parent.cells[sep].key = new_sep;
        debug!(
            "redistributed leaves {} and {}, new separator {}",
            left_id, right_id, new_sep
        );
        Ok(())
    }

    /// Push-up pairs: pull the separator down between the siblings, then
    /// merge or push a new separator back up.
    fn rebalance_rotating(
        &self,
        parent: &mut NodeImage,
        sep: usize,
        (left_id, left): (BlockId, NodeImage),
        (right_id, right): (BlockId, NodeImage),
    ) -> Result<()> {
        let leaf = left.leaf;
        let mut demoted = parent.cells[sep].clone();
        demoted.left_child = left.rightmost;

        let mut cells = left.cells;
        cells.push(demoted);
        cells.extend(right.cells);
        let merged = NodeImage {
            leaf,
            cells,
            rightmost: right.rightmost,
            next_leaf: INVALID_BLOCK,
        };

        if self.footprint(&merged) <= USABLE_SPACE {
            let page = self.build(left_id, &merged)?;
            self.write_page(left_id, &page)?;
            parent.cells.remove(sep);
            parent.set_child(sep, left_id.to_pointer()?);
            debug!("merged {} into {}", right_id, left_id);
            return Ok(());
        }

        let NodeImage {
            mut cells,
            rightmost,
            ..
        } = merged;
        let sizes: Vec<usize> = cells
            .iter()
            .map(|c| self.behavior.footprint(c, leaf))
            .collect();
        let mid = split_point(&sizes, false, None).ok_or_else(|| {
            StrataError::corrupted(left_id.0, "sibling pair cannot be redistributed")
        })?;
        let right_cells = cells.split_off(mid + 1);
        let mut new_sep = cells
            .pop()
            .ok_or_else(|| StrataError::corrupted(left_id.0, "redistribution lost separator"))?;

        let left_image = NodeImage {
            leaf,
            cells,
            rightmost: new_sep.left_child,
            next_leaf: INVALID_BLOCK,
        };
        let right_image = NodeImage {
            leaf,
            cells: right_cells,
            rightmost,
            next_leaf: INVALID_BLOCK,
        };
        self.write_page(right_id, &self.build(right_id, &right_image)?)?;
        self.write_page(left_id, &self.build(left_id, &left_image)?)?;

        new_sep.left_child = left_id.to_pointer()?;
        debug!(
            "redistributed {} and {}, new separator {}",
            left_id, right_id, new_sep.key
        );
        parent.cells[sep] = new_sep;
        Ok(())
    }

    /// Replaces an internal root that lost its last separator by its only
    /// child, as many times as needed.
    fn collapse_root(&mut self) -> Result<()> {
        loop {
            let page = self.load(self.root)?;
            if page.is_leaf() || page.num_cells() > 0 {
                return Ok(());
            }
            let child = self.child_at(self.root, &page, 0)?;
            debug!("root collapsed from {} to {}", self.root, child);
            self.root = child;
            self.write_header()?;
        }
    }
}
