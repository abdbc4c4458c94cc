//! Configuration structures for Strata.

use crate::block::BLOCK_SIZE;
use crate::error::{Result, StrataError};
use serde::{Deserialize, Serialize};

/// Page store configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// LRU cache capacity in blocks.
    pub cache_blocks: usize,
    /// Call fsync after every block write.
    pub fsync_enabled: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_blocks: 256, // 1 MB with 4 KB blocks
            fsync_enabled: false,
        }
    }
}

impl StoreConfig {
    /// Creates a configuration with the given cache capacity.
    pub fn with_cache_blocks(cache_blocks: usize) -> Self {
        Self {
            cache_blocks,
            ..Default::default()
        }
    }

    /// Returns the cache size in bytes.
    pub fn cache_size_bytes(&self) -> usize {
        self.cache_blocks * BLOCK_SIZE
    }

    /// Checks that the configuration can be used to open a store.
    pub fn validate(&self) -> Result<()> {
        if self.cache_blocks == 0 {
            return Err(StrataError::InvalidParameter {
                name: "cache_blocks".to_string(),
                value: self.cache_blocks.to_string(),
            });
        }
        Ok(())
    }
}

/// The two index variants backed by the generic tree engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    /// Values stored in every node; in-order stack traversal for ranges.
    BTree,
    /// Values only in leaves; leaves chained for range scans.
    BPlusTree,
}

impl IndexKind {
    /// File extension appended to the base path of an index of this kind.
    pub fn file_extension(&self) -> &'static str {
        match self {
            IndexKind::BTree => "bt",
            IndexKind::BPlusTree => "bpt",
        }
    }
}

impl std::fmt::Display for IndexKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexKind::BTree => write!(f, "btree"),
            IndexKind::BPlusTree => write!(f, "bplustree"),
        }
    }
}
