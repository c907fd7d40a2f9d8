//! Batch iterators decide which block is read next
//!
//! ```text
//! Fresh -> Reading(0 of N) -> ... -> Reading(N-1 of N) -> Exhausted -> Reading(0 of N)
//! ```
//!
//! The position only moves after a block loaded successfully, so a failed
//! `read` can be retried and fetches the same block again.

mod sequential;
mod shuffled;

pub use sequential::SequentialIterator;
pub use shuffled::ShuffledIterator;

use crate::block_loader::BlockLoader;
use crate::buffer::BufferPair;
use crate::error::{LoaderError, Result};

/// Where an iterator is within the current epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorState {
    /// Nothing read since construction or the last reset
    Fresh,
    /// Last delivered block was the `index`-th of `of` in this epoch
    Reading { index: usize, of: usize },
    /// Every block of the epoch has been delivered
    Exhausted,
}

/// Source of blocks for the read thread
pub trait BatchIterator: Send {
    /// Replace the contents of `dest` with the next block
    fn read(&mut self, dest: &mut BufferPair) -> Result<()>;

    /// Return to the start of an epoch
    fn reset(&mut self);

    fn state(&self) -> IteratorState;

    /// Completed reshuffles (always 0 for in-order iteration)
    fn epoch(&self) -> u64;

    fn block_count(&self) -> usize;

    fn object_count(&self) -> usize;
}

pub(crate) fn ensure_blocks(source: &dyn BlockLoader) -> Result<usize> {
    match source.block_count() {
        0 => Err(LoaderError::Config("block source has no blocks".into())),
        n => Ok(n),
    }
}

pub(crate) fn state_after(index: usize, of: usize) -> IteratorState {
    if index + 1 >= of {
        IteratorState::Exhausted
    } else {
        IteratorState::Reading { index, of }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::block_loader::{BlockLoader, CacheKey};
    use crate::buffer::{BufferPair, RecordPair};
    use crate::error::{LoaderError, Result};

    /// Block `b` holds records tagged `b*block_size + i`
    pub struct TaggedLoader {
        pub blocks: usize,
        pub block_size: usize,
        pub loads: Vec<usize>,
        pub fail_next: usize,
    }

    impl TaggedLoader {
        pub fn new(blocks: usize, block_size: usize) -> Self {
            TaggedLoader {
                blocks,
                block_size,
                loads: Vec::new(),
                fail_next: 0,
            }
        }
    }

    pub fn tags(dest: &BufferPair) -> Vec<u32> {
        dest.objects
            .iter()
            .map(|o| u32::from_le_bytes([o[0], o[1], o[2], o[3]]))
            .collect()
    }

    impl BlockLoader for TaggedLoader {
        fn load_block(&mut self, dest: &mut BufferPair, block_num: usize) -> Result<()> {
            if self.fail_next > 0 {
                self.fail_next -= 1;
                return Err(LoaderError::Io(std::io::Error::other("flaky")));
            }
            self.loads.push(block_num);
            for i in 0..self.block_size {
                let tag = (block_num * self.block_size + i) as u32;
                dest.push(RecordPair::new(tag.to_le_bytes(), tag.to_le_bytes()));
            }
            Ok(())
        }

        fn object_count(&self) -> usize {
            self.blocks * self.block_size
        }

        fn block_count(&self) -> usize {
            self.blocks
        }

        fn block_size(&self) -> usize {
            self.block_size
        }

        fn cache_key(&self) -> Result<CacheKey> {
            Ok(CacheKey {
                hash: "tagged".into(),
                version: "0".into(),
            })
        }
    }
}
