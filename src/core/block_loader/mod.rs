//! Block sources
//!
//! A block loader turns a block number into the raw record pairs of that
//! block. The block size is fixed when the loader is built, so block `n`
//! always covers the same records.

mod file;
mod remote;

pub use file::FileBlockLoader;
pub use remote::{RemoteBlockLoader, RemoteMetadata};

use crate::buffer::BufferPair;
use crate::error::Result;

/// Identity of a block source for cache addressing
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    /// Content fingerprint of the source
    pub hash: String,
    /// Changes whenever the source is modified
    pub version: String,
}

impl CacheKey {
    /// Directory name under the cache root
    pub fn dir_name(&self) -> String {
        format!("{}-{}", self.hash, self.version)
    }
}

/// Source of raw record pairs, addressed by block number
pub trait BlockLoader: Send {
    /// Append the record pairs of `block_num` to `dest`
    fn load_block(&mut self, dest: &mut BufferPair, block_num: usize) -> Result<()>;

    /// Records in the whole source
    fn object_count(&self) -> usize;

    /// Blocks in the whole source
    fn block_count(&self) -> usize;

    fn block_size(&self) -> usize;

    /// Key under which blocks of this source are cached
    fn cache_key(&self) -> Result<CacheKey>;

    /// Hint that `block_num` will be loaded next. Best effort.
    fn prefetch_block(&mut self, _block_num: usize) {}
}

impl<L: BlockLoader + ?Sized> BlockLoader for Box<L> {
    fn load_block(&mut self, dest: &mut BufferPair, block_num: usize) -> Result<()> {
        (**self).load_block(dest, block_num)
    }

    fn object_count(&self) -> usize {
        (**self).object_count()
    }

    fn block_count(&self) -> usize {
        (**self).block_count()
    }

    fn block_size(&self) -> usize {
        (**self).block_size()
    }

    fn cache_key(&self) -> Result<CacheKey> {
        (**self).cache_key()
    }

    fn prefetch_block(&mut self, block_num: usize) {
        (**self).prefetch_block(block_num)
    }
}
