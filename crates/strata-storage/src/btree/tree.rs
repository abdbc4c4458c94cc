//! Generic page-resident tree engine.
//!
//! One algorithm serves both index variants; the bound [`NodeBehavior`]
//! decides cell layout and whether leaf splits copy or push the median up.
//!
//! No page handle survives a recursive call: after a child returns, the
//! parent re-reads its page from the store, since the child's writes may
//! have evicted it.

use super::constants::{MAX_VALUE_SIZE, USABLE_SPACE};
use super::node::{Cell, NodeBehavior};
use super::page::NodePage;
use crate::disk::{PageStore, PageStoreStats};
use bytes::Bytes;
use log::{debug, info};
use std::path::Path;
use strata_common::{
    BlockId, NodeKind, Result, StoreConfig, StrataError, BLOCK_SIZE, INVALID_BLOCK,
};

/// Separator handed to a parent after a child split.
#[derive(Debug)]
pub(crate) struct Promotion {
    pub key: i64,
    /// Value travelling with the key on push-up splits of value-carrying nodes.
    pub value: Option<Bytes>,
    /// The newly allocated right sibling.
    pub right: BlockId,
}

/// Decoded contents of a page, used whenever a page has to be rebuilt.
#[derive(Debug, Clone)]
pub(crate) struct NodeImage {
    pub leaf: bool,
    pub cells: Vec<Cell>,
    pub rightmost: u32,
    pub next_leaf: u32,
}

impl NodeImage {
    /// Child pointer at position `index` (cells.len() means rightmost).
    pub fn child(&self, index: usize) -> u32 {
        match self.cells.get(index) {
            Some(cell) => cell.left_child,
            None => self.rightmost,
        }
    }

    pub fn set_child(&mut self, index: usize, child: u32) {
        match self.cells.get_mut(index) {
            Some(cell) => cell.left_child = child,
            None => self.rightmost = child,
        }
    }
}

/// Picks a split index for cells with the given footprints.
///
/// Copy-up keeps `[mid..]` on the right. Push-up sends cell `mid` to the
/// parent and keeps `[mid + 1..]` on the right. `preferred` is tried first;
/// otherwise the index that best balances bytes between two fitting halves
/// wins. Returns None if no index leaves both halves non-empty and fitting.
pub(crate) fn split_point(sizes: &[usize], copy_up: bool, preferred: Option<usize>) -> Option<usize> {
    let n = sizes.len();
    let hi = if copy_up {
        n.checked_sub(1)?
    } else {
        n.checked_sub(2)?
    };
    if hi < 1 {
        return None;
    }

    let mut prefix = Vec::with_capacity(n + 1);
    prefix.push(0usize);
    for size in sizes {
        prefix.push(prefix[prefix.len() - 1] + size);
    }
    let total = prefix[n];
    let halves = |mid: usize| {
        let left = prefix[mid];
        let right = if copy_up {
            total - left
        } else {
            total - prefix[mid + 1]
        };
        (left, right)
    };
    let fits = |(left, right): (usize, usize)| left <= USABLE_SPACE && right <= USABLE_SPACE;

    if let Some(p) = preferred {
        let p = p.clamp(1, hi);
        if fits(halves(p)) {
            return Some(p);
        }
    }

    (1..=hi)
        .filter_map(|mid| {
            let (left, right) = halves(mid);
            fits((left, right)).then(|| (left.abs_diff(right), mid))
        })
        .min()
        .map(|(_, mid)| mid)
}

/// A disk-resident ordered index over `i64` keys.
///
/// Block 1 of the backing file holds the root block id; everything the tree
/// knows is reachable from there.
pub struct Tree<B: NodeBehavior> {
    pub(super) store: PageStore,
    pub(super) root: BlockId,
    pub(super) behavior: B,
}

impl<B: NodeBehavior + Default> Tree<B> {
    /// Opens the index at `path`, creating an empty one if needed.
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        Self::open_with(path, config, B::default())
    }
}

impl<B: NodeBehavior> Tree<B> {
    /// Opens the index at `path` with an explicit behavior value.
    pub fn open_with(path: impl AsRef<Path>, config: StoreConfig, behavior: B) -> Result<Self> {
        let path = path.as_ref();
        let store = PageStore::open(path, config)?;

        let header = store.read(BlockId::TREE_HEADER)?;
        let root_ptr = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);

        if root_ptr == 0 {
            let root = store.allocate()?;
            store.write(root, NodePage::new(NodeKind::Leaf).as_block())?;
            let tree = Self {
                store,
                root,
                behavior,
            };
            tree.write_header()?;
            info!(
                "created {} index at {} (root {})",
                tree.behavior.name(),
                path.display(),
                root
            );
            return Ok(tree);
        }

        let root = BlockId::from(root_ptr);
        if root < BlockId::FIRST_DATA || root.0 >= store.block_count() {
            return Err(StrataError::corrupted(
                BlockId::TREE_HEADER.0,
                format!("root pointer {} out of range", root_ptr),
            ));
        }
        let tree = Self {
            store,
            root,
            behavior,
        };
        tree.load(root)?;
        info!(
            "opened {} index at {} (root {})",
            tree.behavior.name(),
            path.display(),
            root
        );
        Ok(tree)
    }

    /// Returns the current root block.
    pub fn root(&self) -> BlockId {
        self.root
    }

    /// Returns the bound node behavior.
    pub fn behavior(&self) -> &B {
        &self.behavior
    }

    /// Returns page store statistics.
    pub fn store_stats(&self) -> PageStoreStats {
        self.store.stats()
    }

    /// Number of levels from root to leaf (1 for a lone root leaf).
    pub fn height(&self) -> Result<usize> {
        let mut height = 1;
        let mut id = self.root;
        loop {
            let page = self.load(id)?;
            if page.is_leaf() {
                return Ok(height);
            }
            id = self.child_at(id, &page, 0)?;
            height += 1;
        }
    }

    /// Looks up `key`. A missing key is `Ok(None)`.
    pub fn get(&self, key: i64) -> Result<Option<Bytes>> {
        if self.behavior.uses_copy_up_split() {
            let (_, leaf) = self.find_leaf(key)?;
            return match self.search(&leaf, key)? {
                Ok(idx) => Ok(self.behavior.read_cell(&leaf, idx, true)?.value),
                Err(_) => Ok(None),
            };
        }

        let mut id = self.root;
        loop {
            let page = self.load(id)?;
            let leaf = page.is_leaf();
            match self.search(&page, key)? {
                Ok(idx) => return Ok(self.behavior.read_cell(&page, idx, leaf)?.value),
                Err(_) if leaf => return Ok(None),
                Err(idx) => id = self.child_at(id, &page, idx)?,
            }
        }
    }

    /// Descends to the leaf whose key range covers `key`, ignoring matches
    /// in internal nodes.
    pub fn find_leaf(&self, key: i64) -> Result<(BlockId, NodePage)> {
        let mut id = self.root;
        loop {
            let page = self.load(id)?;
            if page.is_leaf() {
                return Ok((id, page));
            }
            let idx = self.upper_bound(&page, key)?;
            id = self.child_at(id, &page, idx)?;
        }
    }

    /// Inserts or replaces the value for `key`.
    pub fn insert(&mut self, key: i64, value: &[u8]) -> Result<()> {
        if value.len() > MAX_VALUE_SIZE {
            return Err(StrataError::ValueTooLarge {
                size: value.len(),
                max: MAX_VALUE_SIZE,
            });
        }
        let value = Bytes::copy_from_slice(value);
        if let Some(promo) = self.insert_rec(self.root, key, &value)? {
            self.grow_root(promo)?;
        }
        Ok(())
    }

    /// Rewrites the header and releases the backing file.
    pub fn close(self) -> Result<()> {
        self.write_header()?;
        debug!("closing {} index (root {})", self.behavior.name(), self.root);
        self.store.close()
    }

    fn insert_rec(&self, id: BlockId, key: i64, value: &Bytes) -> Result<Option<Promotion>> {
        let page = self.load(id)?;
        let leaf = page.is_leaf();
        let found = self.search(&page, key)?;

        match found {
            Ok(idx) if leaf || !self.behavior.uses_copy_up_split() => {
                return self.update(id, page, idx, value);
            }
            Err(pos) if leaf => {
                return self.insert_cell(id, page, pos, Cell::leaf(key, value.clone()), None);
            }
            _ => {}
        }

        let pos = match found {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        };
        let child = self.child_at(id, &page, pos)?;
        drop(page);

        match self.insert_rec(child, key, value)? {
            None => Ok(None),
            Some(promo) => {
                let page = self.load(id)?;
                self.insert_promotion(id, page, promo)
            }
        }
    }

    /// Replaces the value of an existing cell.
    fn update(
        &self,
        id: BlockId,
        mut page: NodePage,
        idx: usize,
        value: &Bytes,
    ) -> Result<Option<Promotion>> {
        let leaf = page.is_leaf();
        if let Some(stored) = self.behavior.value_len(&page, idx, leaf)? {
            if value.len() <= stored {
                self.behavior.overwrite_value(&mut page, idx, value, leaf)?;
                self.write_page(id, &page)?;
                return Ok(None);
            }
        }

        if leaf {
            let key = self.behavior.read_key(&page, idx, leaf)?;
            page.remove_cell_ptr(idx);
            return self.insert_cell(id, page, idx, Cell::leaf(key, value.clone()), None);
        }

        // Internal cell: its left subtree must stay attached
        let mut image = self.image(&page)?;
        image.cells[idx].value = Some(value.clone());
        self.commit(id, image)
    }

    /// Adds a separator from a child split at the position bracketing it.
    fn insert_promotion(
        &self,
        id: BlockId,
        page: NodePage,
        promo: Promotion,
    ) -> Result<Option<Promotion>> {
        let pos = match self.search(&page, promo.key)? {
            Err(pos) => pos,
            Ok(_) => {
                return Err(StrataError::corrupted(
                    id.0,
                    format!("separator {} already present", promo.key),
                ))
            }
        };
        let left_child = self.child_at(id, &page, pos)?.to_pointer()?;
        let cell = Cell {
            key: promo.key,
            value: promo.value,
            left_child,
        };
        self.insert_cell(id, page, pos, cell, Some(promo.right))
    }

    /// Inserts `cell` at `pos`, and optionally points the slot after it at
    /// `right`. Falls back to a rebuild, then a split, when space runs out.
    fn insert_cell(
        &self,
        id: BlockId,
        mut page: NodePage,
        pos: usize,
        cell: Cell,
        right: Option<BlockId>,
    ) -> Result<Option<Promotion>> {
        let leaf = page.is_leaf();
        let size = self.behavior.cell_size(leaf, cell.value_len());

        if let Some(offset) = page.allocate_cell_space(size) {
            self.behavior.write_cell(&mut page, offset, &cell, leaf);
            page.insert_cell_ptr(pos, offset);
            if let Some(right) = right {
                let ptr = right.to_pointer()?;
                if pos + 1 < page.num_cells() {
                    self.behavior.set_left_child(&mut page, pos + 1, ptr);
                } else {
                    page.set_rightmost(ptr);
                }
            }
            self.write_page(id, &page)?;
            return Ok(None);
        }

        let mut image = self.image(&page)?;
        image.cells.insert(pos, cell);
        if let Some(right) = right {
            image.set_child(pos + 1, right.to_pointer()?);
        }
        self.commit(id, image)
    }

    /// Writes `image` to `id`, compacting it if it fits and splitting it
    /// otherwise.
    pub(super) fn commit(&self, id: BlockId, image: NodeImage) -> Result<Option<Promotion>> {
        if self.footprint(&image) <= USABLE_SPACE {
            let page = self.build(id, &image)?;
            self.write_page(id, &page)?;
            return Ok(None);
        }
        self.split(id, image).map(Some)
    }

    fn split(&self, id: BlockId, image: NodeImage) -> Result<Promotion> {
        let NodeImage {
            leaf,
            mut cells,
            rightmost,
            next_leaf,
        } = image;
        let copy_up = leaf && self.behavior.uses_copy_up_split();

        let sizes: Vec<usize> = cells
            .iter()
            .map(|c| self.behavior.footprint(c, leaf))
            .collect();
        let mid = split_point(&sizes, copy_up, Some(cells.len() / 2)).ok_or_else(|| {
            StrataError::corrupted(id.0, format!("cannot split {} cells", cells.len()))
        })?;

        let right_id = self.store.allocate()?;
        let right_ptr = right_id.to_pointer()?;

        let (key, value, left_rightmost, right_cells) = if copy_up {
            let right_cells = cells.split_off(mid);
            (right_cells[0].key, None, INVALID_BLOCK, right_cells)
        } else {
            let right_cells = cells.split_off(mid + 1);
            let median = cells
                .pop()
                .ok_or_else(|| StrataError::corrupted(id.0, "split left no median"))?;
            (median.key, median.value, median.left_child, right_cells)
        };

        let left_image = NodeImage {
            leaf,
            cells,
            rightmost: if leaf { INVALID_BLOCK } else { left_rightmost },
            next_leaf: INVALID_BLOCK,
        };
        let right_image = NodeImage {
            leaf,
            cells: right_cells,
            rightmost,
            next_leaf: INVALID_BLOCK,
        };
        let mut left_page = self.build(id, &left_image)?;
        let mut right_page = self.build(right_id, &right_image)?;
        if leaf {
            self.behavior
                .link_leaves(&mut left_page, &mut right_page, right_ptr, next_leaf);
        }

        // Right sibling first so the left page never points at garbage
        self.write_page(right_id, &right_page)?;
        self.write_page(id, &left_page)?;

        debug!(
            "split {} {} ({} cells) off to {} ({} cells), promoting {}",
            if leaf { "leaf" } else { "internal" },
            id,
            left_page.num_cells(),
            right_id,
            right_page.num_cells(),
            key
        );

        Ok(Promotion {
            key,
            value,
            right: right_id,
        })
    }

    /// Installs a new internal root above the old one.
    pub(super) fn grow_root(&mut self, promo: Promotion) -> Result<()> {
        let old_root = self.root;
        let new_root = self.store.allocate()?;
        let image = NodeImage {
            leaf: false,
            cells: vec![Cell {
                key: promo.key,
                value: promo.value,
                left_child: old_root.to_pointer()?,
            }],
            rightmost: promo.right.to_pointer()?,
            next_leaf: INVALID_BLOCK,
        };
        let page = self.build(new_root, &image)?;
        self.write_page(new_root, &page)?;

        self.root = new_root;
        self.write_header()?;
        debug!("root grew from {} to {}", old_root, new_root);
        Ok(())
    }

    pub(super) fn write_header(&self) -> Result<()> {
        let mut header = [0u8; BLOCK_SIZE];
        header[0..4].copy_from_slice(&self.root.to_pointer()?.to_le_bytes());
        self.store.write(BlockId::TREE_HEADER, &header)
    }

    /// Reads and validates a tree page.
    pub(crate) fn load(&self, id: BlockId) -> Result<NodePage> {
        let page = NodePage::from_block(self.store.read(id)?);
        page.validate(id)?;
        Ok(page)
    }

    pub(super) fn write_page(&self, id: BlockId, page: &NodePage) -> Result<()> {
        self.store.write(id, page.as_block())
    }

    /// Binary search over the page's keys: `Ok(index)` on a hit, otherwise
    /// `Err(index)` of the first larger key.
    pub(crate) fn search(&self, page: &NodePage, key: i64) -> Result<std::result::Result<usize, usize>> {
        let leaf = page.is_leaf();
        let (mut lo, mut hi) = (0, page.num_cells());
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.behavior.read_key(page, mid, leaf)?.cmp(&key) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Ok(Ok(mid)),
            }
        }
        Ok(Err(lo))
    }

    /// Index of the first key strictly greater than `key`.
    ///
    /// Separators in chained trees equal the first key of their right
    /// subtree, so routing must send equal keys right.
    pub(crate) fn upper_bound(&self, page: &NodePage, key: i64) -> Result<usize> {
        Ok(match self.search(page, key)? {
            Ok(idx) => idx + 1,
            Err(idx) => idx,
        })
    }

    /// Child at position `index` of internal page `id`.
    pub(crate) fn child_at(&self, id: BlockId, page: &NodePage, index: usize) -> Result<BlockId> {
        let ptr = if index < page.num_cells() {
            self.behavior.left_child(page, index)?
        } else {
            page.rightmost()
        };
        self.child_id(id, ptr)
    }

    /// Decodes a child pointer read from page `parent`.
    pub(super) fn child_id(&self, parent: BlockId, ptr: u32) -> Result<BlockId> {
        match BlockId::from_pointer(ptr) {
            Some(child) if child >= BlockId::FIRST_DATA => Ok(child),
            _ => Err(StrataError::corrupted(
                parent.0,
                format!("invalid child pointer {}", ptr),
            )),
        }
    }

    pub(super) fn image(&self, page: &NodePage) -> Result<NodeImage> {
        let leaf = page.is_leaf();
        let cells = (0..page.num_cells())
            .map(|i| self.behavior.read_cell(page, i, leaf))
            .collect::<Result<Vec<_>>>()?;
        Ok(NodeImage {
            leaf,
            cells,
            rightmost: page.rightmost(),
            next_leaf: page.next_leaf(),
        })
    }

    /// Bytes the image's cells and pointers would occupy on a fresh page.
    pub(super) fn footprint(&self, image: &NodeImage) -> usize {
        image
            .cells
            .iter()
            .map(|c| self.behavior.footprint(c, image.leaf))
            .sum()
    }

    /// Bytes used by live cells on `page`, excluding dead cell bodies.
    pub(super) fn live_bytes(&self, page: &NodePage) -> Result<usize> {
        let leaf = page.is_leaf();
        let mut total = 0;
        for i in 0..page.num_cells() {
            let value_len = self.behavior.value_len(page, i, leaf)?.unwrap_or(0);
            total += self.behavior.cell_size(leaf, value_len) + super::constants::CELL_PTR_SIZE;
        }
        Ok(total)
    }

    /// Lays out an image on a fresh page.
    pub(super) fn build(&self, id: BlockId, image: &NodeImage) -> Result<NodePage> {
        let kind = if image.leaf {
            NodeKind::Leaf
        } else {
            NodeKind::Internal
        };
        let mut page = NodePage::new(kind);
        page.set_rightmost(image.rightmost);
        page.set_next_leaf(image.next_leaf);
        for (i, cell) in image.cells.iter().enumerate() {
            let size = self.behavior.cell_size(image.leaf, cell.value_len());
            let offset = page.allocate_cell_space(size).ok_or_else(|| {
                StrataError::corrupted(
                    id.0,
                    format!("{} cells do not fit one page", image.cells.len()),
                )
            })?;
            self.behavior.write_cell(&mut page, offset, cell, image.leaf);
            page.insert_cell_ptr(i, offset);
        }
        Ok(page)
    }
}

impl<B: NodeBehavior> std::fmt::Debug for Tree<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Tree")
            .field("variant", &self.behavior.name())
            .field("root", &self.root)
            .field("store", &self.store)
            .finish()
    }
}
