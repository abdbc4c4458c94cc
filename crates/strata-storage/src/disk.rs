//! Page store: block-level file I/O behind an LRU cache.
//!
//! File layout:
//! ```text
//! +-----------------------+ 0
//! | block 0: meta         |   [0..8) total block count (u64 LE)
//! +-----------------------+ 4096
//! | block 1: tree header  |   owned by the tree engine
//! +-----------------------+ 8192
//! | block 2..n: pages     |
//! +-----------------------+
//! ```

use log::{debug, info, warn};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use strata_buffer::{BlockCache, BlockCacheConfig, BlockCacheStats};
use strata_common::{Block, BlockId, Result, StoreConfig, StrataError, BLOCK_SIZE};

/// Number of blocks a fresh store starts with (meta + tree header).
const RESERVED_BLOCKS: u64 = 2;

/// Page store statistics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageStoreStats {
    /// Blocks in the file, including the two reserved ones.
    pub block_count: u64,
    /// Positioned reads issued to the file.
    pub disk_reads: u64,
    /// Positioned writes issued to the file.
    pub disk_writes: u64,
    /// Cache counters.
    pub cache: BlockCacheStats,
}

/// Fixed-size block file with a write-through LRU cache.
///
/// Every write goes to disk immediately, so the cache never holds state the
/// file lacks. Reads return an owned copy of the block.
pub struct PageStore {
    /// Path to the backing file.
    path: PathBuf,
    /// Configuration.
    config: StoreConfig,
    /// File handle, cache and counters.
    inner: Mutex<StoreInner>,
    /// Set once `close` has synced the file.
    closed: bool,
}

struct StoreInner {
    file: File,
    cache: BlockCache,
    block_count: u64,
    disk_reads: u64,
    disk_writes: u64,
    fsync_enabled: bool,
}

impl StoreInner {
    fn check_range(&self, block_id: BlockId) -> Result<()> {
        if block_id.0 >= self.block_count {
            return Err(StrataError::BlockOutOfRange {
                block_id: block_id.0,
                block_count: self.block_count,
            });
        }
        Ok(())
    }

    fn read_from_disk(&mut self, block_id: BlockId) -> Result<Box<Block>> {
        let mut buffer = Box::new([0u8; BLOCK_SIZE]);
        self.file.seek(SeekFrom::Start(block_id.offset()))?;
        self.file.read_exact(&mut buffer[..])?;
        self.disk_reads += 1;
        Ok(buffer)
    }

    fn write_to_disk(&mut self, block_id: BlockId, data: &Block) -> Result<()> {
        self.file.seek(SeekFrom::Start(block_id.offset()))?;
        self.file.write_all(data)?;
        if self.fsync_enabled {
            self.file.sync_all()?;
        }
        self.disk_writes += 1;
        Ok(())
    }

    fn read(&mut self, block_id: BlockId) -> Result<Box<Block>> {
        self.check_range(block_id)?;
        if let Some(data) = self.cache.get(block_id) {
            return Ok(Box::new(*data));
        }
        let data = self.read_from_disk(block_id)?;
        self.cache.put(block_id, &data);
        Ok(data)
    }

    fn write(&mut self, block_id: BlockId, data: &Block) -> Result<()> {
        self.check_range(block_id)?;
        self.write_to_disk(block_id, data)?;
        self.cache.put(block_id, data);
        Ok(())
    }
}

impl PageStore {
    /// Opens the store at `path`, creating and initializing it if the file
    /// is empty or missing.
    pub fn open(path: impl AsRef<Path>, config: StoreConfig) -> Result<Self> {
        config.validate()?;
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let file_len = file.metadata()?.len();

        let mut inner = StoreInner {
            file,
            cache: BlockCache::new(BlockCacheConfig {
                num_frames: config.cache_blocks,
            }),
            block_count: 0,
            disk_reads: 0,
            disk_writes: 0,
            fsync_enabled: config.fsync_enabled,
        };

        if file_len == 0 {
            inner.block_count = RESERVED_BLOCKS;
            let mut meta = [0u8; BLOCK_SIZE];
            meta[0..8].copy_from_slice(&RESERVED_BLOCKS.to_le_bytes());
            inner.write_to_disk(BlockId::META, &meta)?;
            inner.write_to_disk(BlockId::TREE_HEADER, &[0u8; BLOCK_SIZE])?;
            info!("created page store {}", path.display());
        } else {
            if file_len < BLOCK_SIZE as u64 {
                return Err(StrataError::corrupted(
                    BlockId::META.0,
                    format!("file is {} bytes, shorter than the meta block", file_len),
                ));
            }
            let meta = inner.read_from_disk(BlockId::META)?;
            let mut count = [0u8; 8];
            count.copy_from_slice(&meta[0..8]);
            let block_count = u64::from_le_bytes(count);
            if block_count < RESERVED_BLOCKS {
                return Err(StrataError::corrupted(
                    BlockId::META.0,
                    format!("block count {} below reserved minimum", block_count),
                ));
            }
            if file_len < block_count * BLOCK_SIZE as u64 {
                return Err(StrataError::corrupted(
                    BlockId::META.0,
                    format!(
                        "block count {} exceeds file length {}",
                        block_count, file_len
                    ),
                ));
            }
            inner.block_count = block_count;
            info!(
                "opened page store {} with {} blocks",
                path.display(),
                block_count
            );
        }

        Ok(Self {
            path,
            config,
            inner: Mutex::new(inner),
            closed: false,
        })
    }

    /// Returns the backing file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the configuration the store was opened with.
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Reads a block, serving it from the cache when possible.
    pub fn read(&self, block_id: BlockId) -> Result<Box<Block>> {
        self.inner.lock().read(block_id)
    }

    /// Writes a block through the cache to disk.
    pub fn write(&self, block_id: BlockId, data: &Block) -> Result<()> {
        self.inner.lock().write(block_id, data)
    }

    /// Extends the file by one zeroed block and persists the new count.
    ///
    /// Returns the id of the new block.
    pub fn allocate(&self) -> Result<BlockId> {
        let mut inner = self.inner.lock();

        let block_id = BlockId(inner.block_count);
        inner.write_to_disk(block_id, &[0u8; BLOCK_SIZE])?;
        inner.block_count += 1;

        let mut meta = inner.read(BlockId::META)?;
        meta[0..8].copy_from_slice(&inner.block_count.to_le_bytes());
        inner.write(BlockId::META, &meta)?;

        debug!("allocated {}", block_id);
        Ok(block_id)
    }

    /// Returns the number of blocks in the file.
    pub fn block_count(&self) -> u64 {
        self.inner.lock().block_count
    }

    /// Checks if a block is cached without affecting LRU order.
    pub fn is_cached(&self, block_id: BlockId) -> bool {
        self.inner.lock().cache.contains(block_id)
    }

    /// Returns I/O and cache statistics.
    pub fn stats(&self) -> PageStoreStats {
        let inner = self.inner.lock();
        PageStoreStats {
            block_count: inner.block_count,
            disk_reads: inner.disk_reads,
            disk_writes: inner.disk_writes,
            cache: inner.cache.stats(),
        }
    }

    /// Syncs file contents to stable storage.
    pub fn flush(&self) -> Result<()> {
        self.inner.lock().file.sync_all()?;
        Ok(())
    }

    /// Syncs and releases the file handle.
    pub fn close(mut self) -> Result<()> {
        self.flush()?;
        self.closed = true;
        debug!("closed page store {}", self.path.display());
        Ok(())
    }
}

impl Drop for PageStore {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        if let Err(e) = self.flush() {
            warn!("page store {} failed to sync on drop: {}", self.path.display(), e);
        }
    }
}

impl std::fmt::Debug for PageStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageStore")
            .field("path", &self.path)
            .field("config", &self.config)
            .finish()
    }
}
