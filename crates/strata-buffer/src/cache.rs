//! Block cache manager.

use crate::frame::{CacheFrame, FrameId};
use crate::replacer::{LruReplacer, Replacer};
use log::trace;
use std::collections::HashMap;
use strata_common::{Block, BlockId};

/// Configuration for the block cache.
#[derive(Debug, Clone)]
pub struct BlockCacheConfig {
    /// Number of frames in the cache.
    pub num_frames: usize,
}

impl Default for BlockCacheConfig {
    fn default() -> Self {
        Self { num_frames: 256 }
    }
}

/// Block cache statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BlockCacheStats {
    /// Total frames.
    pub num_frames: usize,
    /// Frames not holding a block.
    pub free_frames: usize,
    /// Lookups served from the cache.
    pub hits: u64,
    /// Lookups that missed.
    pub misses: u64,
    /// Blocks dropped to make room for others.
    pub evictions: u64,
}

/// Bounded write-through block cache.
///
/// Manages a fixed-size set of frames with:
/// - Block ID to frame ID mapping
/// - Free frame list for new blocks
/// - LRU replacement when full
///
/// Nothing here is ever dirty: the owner writes a block to disk before
/// handing it to [`BlockCache::put`], so eviction simply forgets the frame.
pub struct BlockCache {
    /// Configuration.
    config: BlockCacheConfig,
    /// Array of cache frames.
    frames: Vec<CacheFrame>,
    /// Block ID to frame ID mapping.
    block_table: HashMap<BlockId, FrameId>,
    /// List of free frame IDs.
    free_list: Vec<FrameId>,
    /// Block replacement policy.
    replacer: LruReplacer,
    hits: u64,
    misses: u64,
    evictions: u64,
}

impl BlockCache {
    /// Creates a new block cache.
    pub fn new(config: BlockCacheConfig) -> Self {
        let num_frames = config.num_frames;

        let frames: Vec<_> = (0..num_frames)
            .map(|i| CacheFrame::new(FrameId(i as u32)))
            .collect();

        // Reverse so frame 0 is handed out first
        let free_list: Vec<_> = (0..num_frames).rev().map(|i| FrameId(i as u32)).collect();

        Self {
            config,
            frames,
            block_table: HashMap::with_capacity(num_frames),
            free_list,
            replacer: LruReplacer::new(num_frames),
            hits: 0,
            misses: 0,
            evictions: 0,
        }
    }

    /// Returns the number of frames in the cache.
    pub fn capacity(&self) -> usize {
        self.config.num_frames
    }

    /// Returns the number of blocks currently cached.
    pub fn len(&self) -> usize {
        self.block_table.len()
    }

    /// Returns true if no block is cached.
    pub fn is_empty(&self) -> bool {
        self.block_table.is_empty()
    }

    /// Checks if a block is cached without affecting recency.
    pub fn contains(&self, block_id: BlockId) -> bool {
        self.block_table.contains_key(&block_id)
    }

    /// Looks up a block and marks it most recently used.
    pub fn get(&mut self, block_id: BlockId) -> Option<&Block> {
        match self.block_table.get(&block_id) {
            Some(&frame_id) => {
                self.hits += 1;
                self.replacer.record_access(frame_id);
                Some(self.frames[frame_id.index()].data())
            }
            None => {
                self.misses += 1;
                None
            }
        }
    }

    /// Stores a block image, replacing any cached copy.
    ///
    /// Returns the block that was evicted to make room, if any.
    pub fn put(&mut self, block_id: BlockId, data: &Block) -> Option<BlockId> {
        if let Some(&frame_id) = self.block_table.get(&block_id) {
            self.frames[frame_id.index()].load(block_id, data);
            self.replacer.record_access(frame_id);
            return None;
        }

        let (frame_id, evicted) = self.allocate_frame()?;
        self.frames[frame_id.index()].load(block_id, data);
        self.block_table.insert(block_id, frame_id);
        self.replacer.record_access(frame_id);
        evicted
    }

    /// Drops a block from the cache. Returns true if it was cached.
    pub fn remove(&mut self, block_id: BlockId) -> bool {
        match self.block_table.remove(&block_id) {
            Some(frame_id) => {
                self.replacer.remove(frame_id);
                self.frames[frame_id.index()].reset();
                self.free_list.push(frame_id);
                true
            }
            None => false,
        }
    }

    /// Drops every cached block.
    pub fn clear(&mut self) {
        let cached: Vec<BlockId> = self.block_table.keys().copied().collect();
        for block_id in cached {
            self.remove(block_id);
        }
    }

    /// Returns cache statistics.
    pub fn stats(&self) -> BlockCacheStats {
        BlockCacheStats {
            num_frames: self.config.num_frames,
            free_frames: self.free_list.len(),
            hits: self.hits,
            misses: self.misses,
            evictions: self.evictions,
        }
    }

    /// Gets a frame for a new block.
    ///
    /// Tries the free list first, then evicts the least recently used block.
    /// Returns None only when the cache has zero capacity.
    fn allocate_frame(&mut self) -> Option<(FrameId, Option<BlockId>)> {
        if let Some(frame_id) = self.free_list.pop() {
            return Some((frame_id, None));
        }

        let victim = self.replacer.evict()?;
        let frame = &mut self.frames[victim.index()];
        let evicted = frame.block_id();
        if let Some(old) = evicted {
            self.block_table.remove(&old);
            trace!("evicted {} from {}", old, victim);
        }
        frame.reset();
        self.evictions += 1;
        Some((victim, evicted))
    }
}

impl std::fmt::Debug for BlockCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockCache")
            .field("capacity", &self.config.num_frames)
            .field("cached", &self.block_table.len())
            .finish()
    }
}
