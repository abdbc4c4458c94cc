//! Block caching for Strata.
//!
//! This crate provides in-memory block caching with:
//! - Fixed-size cache with configurable frame count
//! - LRU eviction policy
//! - Write-through semantics (frames are never dirty)

mod cache;
mod frame;
mod replacer;

pub use cache::{BlockCache, BlockCacheConfig, BlockCacheStats};
pub use frame::{CacheFrame, FrameId};
pub use replacer::{LruReplacer, Replacer};
