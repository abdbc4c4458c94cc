//! Cache frame management.

use strata_common::{Block, BlockId};

/// Unique identifier for a frame in the block cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u32);

impl FrameId {
    /// Invalid frame ID.
    pub const INVALID: FrameId = FrameId(u32::MAX);

    /// Returns true if this is a valid frame ID.
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    #[inline]
    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame:{}", self.0)
    }
}

/// A frame in the block cache holding a single block image.
///
/// The cache is write-through, so a frame is never dirty: its contents always
/// match what is on disk.
pub struct CacheFrame {
    /// Frame identifier.
    frame_id: FrameId,
    /// The block currently stored in this frame.
    block_id: Option<BlockId>,
    /// Block data buffer.
    data: Box<Block>,
}

impl CacheFrame {
    /// Creates a new empty frame.
    pub fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            block_id: None,
            data: Box::new([0u8; strata_common::BLOCK_SIZE]),
        }
    }

    /// Returns the frame ID.
    #[inline]
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Returns the block currently stored in this frame.
    #[inline]
    pub fn block_id(&self) -> Option<BlockId> {
        self.block_id
    }

    /// Returns true if no block is loaded.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.block_id.is_none()
    }

    /// Returns the cached block image.
    #[inline]
    pub fn data(&self) -> &Block {
        &self.data
    }

    /// Loads a block image into this frame, replacing whatever was there.
    pub fn load(&mut self, block_id: BlockId, data: &Block) {
        self.block_id = Some(block_id);
        self.data.copy_from_slice(data);
    }

    /// Empties the frame.
    pub fn reset(&mut self) {
        self.block_id = None;
        self.data.fill(0);
    }
}

impl std::fmt::Debug for CacheFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheFrame")
            .field("frame_id", &self.frame_id)
            .field("block_id", &self.block_id)
            .finish()
    }
}
