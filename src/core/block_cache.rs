//! Archive-backed block cache
//!
//! Wraps any [`BlockLoader`]. Each block is stored as one archive at
//!
//! ```text
//! <root>/<hash>-<version>/block_<n>.cache
//! ```
//!
//! where `(hash, version)` comes from the wrapped loader's [`CacheKey`]. A
//! miss fetches the block, writes it to a uniquely named temporary file in
//! the same directory and renames it into place, so readers never see a
//! partial archive. Every block, hit or miss, is then served from the
//! archive on disk, which makes repeated loads byte-identical.
//!
//! There is no eviction. A new manifest hash or version selects a new
//! directory and the old one is simply never read again.

use crate::archive::{block_file_name, ArchiveReader, ArchiveWriter, DATA_TYPE_RAW};
use crate::block_loader::{BlockLoader, CacheKey};
use crate::buffer::BufferPair;
use crate::error::{LoaderError, Result};
use std::fs;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Cache counters snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Blocks served from an existing archive
    pub hits: u64,
    /// Blocks fetched from the wrapped loader
    pub misses: u64,
    /// Archives written
    pub writes: u64,
    /// Corrupt archives deleted and re-fetched
    pub repairs: u64,
}

impl CacheStats {
    /// Fraction of loads served without touching the wrapped loader
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Live counters, shareable across threads
#[derive(Debug, Default)]
pub struct CacheCounters {
    hits: AtomicU64,
    misses: AtomicU64,
    writes: AtomicU64,
    repairs: AtomicU64,
}

impl CacheCounters {
    pub fn snapshot(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            repairs: self.repairs.load(Ordering::Relaxed),
        }
    }
}

/// Block loader decorator that persists blocks as archives
pub struct BlockCache<L: BlockLoader> {
    loader: L,
    root: PathBuf,
    counters: Arc<CacheCounters>,
}

impl<L: BlockLoader> BlockCache<L> {
    pub fn new<P: AsRef<Path>>(loader: L, root: P) -> Self {
        info!("Block cache rooted at {:?}", root.as_ref());
        BlockCache {
            loader,
            root: root.as_ref().to_path_buf(),
            counters: Arc::new(CacheCounters::default()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot()
    }

    /// Handle for reading counters from another thread
    pub fn counters(&self) -> Arc<CacheCounters> {
        Arc::clone(&self.counters)
    }

    /// Directory holding archives for `key`
    pub fn cache_dir(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.dir_name())
    }

    /// Archive path for `block_num` under the current key
    pub fn block_path(&self, block_num: usize) -> Result<PathBuf> {
        let key = self.loader.cache_key()?;
        Ok(self.cache_dir(&key).join(block_file_name(block_num)))
    }

    fn fetch_and_store(&mut self, block_num: usize, path: &Path) -> Result<()> {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);

        let mut block = BufferPair::new();
        self.loader.load_block(&mut block, block_num)?;

        let dir = path
            .parent()
            .ok_or_else(|| LoaderError::Config(format!("invalid cache path {:?}", path)))?;
        fs::create_dir_all(dir)?;

        let mut tmp = NamedTempFile::new_in(dir)?;
        {
            let mut writer = ArchiveWriter::new(BufWriter::new(tmp.as_file_mut()), DATA_TYPE_RAW)?;
            writer.write_all(&block)?;
            writer.close()?;
        }
        tmp.persist(path).map_err(|e| LoaderError::Io(e.error))?;

        self.counters.writes.fetch_add(1, Ordering::Relaxed);
        debug!("Cached block {} at {:?}", block_num, path);
        Ok(())
    }
}

/// Read a whole archive, touching `dest` only on success
fn read_archive(path: &Path, dest: &mut BufferPair) -> Result<()> {
    let mut block = BufferPair::new();
    ArchiveReader::open(path)?.read_into(&mut block)?;
    for pair in block.drain_pairs() {
        dest.push(pair);
    }
    Ok(())
}

impl<L: BlockLoader> BlockLoader for BlockCache<L> {
    fn load_block(&mut self, dest: &mut BufferPair, block_num: usize) -> Result<()> {
        let path = self.block_path(block_num)?;

        if path.exists() {
            match read_archive(&path, dest) {
                Ok(()) => {
                    self.counters.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(());
                }
                Err(LoaderError::Format(msg)) => {
                    warn!("Discarding corrupt cache entry {:?}: {}", path, msg);
                    fs::remove_file(&path)?;
                    self.counters.repairs.fetch_add(1, Ordering::Relaxed);
                }
                Err(e) => return Err(e),
            }
        }

        self.fetch_and_store(block_num, &path)?;
        read_archive(&path, dest)
    }

    fn object_count(&self) -> usize {
        self.loader.object_count()
    }

    fn block_count(&self) -> usize {
        self.loader.block_count()
    }

    fn block_size(&self) -> usize {
        self.loader.block_size()
    }

    fn cache_key(&self) -> Result<CacheKey> {
        self.loader.cache_key()
    }

    fn prefetch_block(&mut self, block_num: usize) {
        match self.block_path(block_num) {
            Ok(path) if !path.exists() => self.loader.prefetch_block(block_num),
            _ => {}
        }
    }
}
