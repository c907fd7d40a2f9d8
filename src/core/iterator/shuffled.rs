use super::{ensure_blocks, state_after, BatchIterator, IteratorState};
use crate::block_loader::BlockLoader;
use crate::buffer::BufferPair;
use crate::error::Result;
use crate::rng::{stream_seed, Minstd};
use rand::seq::SliceRandom;
use rand::RngCore;
use tracing::debug;

/// Delivers blocks in a seeded random order and shuffles records within
/// each block
///
/// The generator for epoch `e` is seeded from `(random_seed, e)`. It first
/// permutes the block numbers, then supplies one shuffle seed per delivered
/// block. Two iterators with the same seed and epoch therefore produce the
/// same block order and the same record order. The epoch advances on
/// `reset()` and whenever a full pass completes.
pub struct ShuffledIterator {
    source: Box<dyn BlockLoader>,
    random_seed: u64,
    epoch: u64,
    rng: Minstd,
    order: Vec<usize>,
    position: usize,
    state: IteratorState,
}

impl ShuffledIterator {
    pub fn new(source: Box<dyn BlockLoader>, random_seed: u64) -> Self {
        let mut iter = ShuffledIterator {
            source,
            random_seed,
            epoch: 0,
            rng: Minstd::new(stream_seed(random_seed, 0)),
            order: Vec::new(),
            position: 0,
            state: IteratorState::Fresh,
        };
        iter.shuffle_order();
        iter
    }

    /// Block order of the current epoch
    pub fn order(&self) -> &[usize] {
        &self.order
    }

    fn shuffle_order(&mut self) {
        self.rng = Minstd::new(stream_seed(self.random_seed, self.epoch));
        self.order = (0..self.source.block_count()).collect();
        self.order.shuffle(&mut self.rng);
        self.position = 0;
        debug!("Epoch {} block order: {:?}", self.epoch, self.order);
    }

    fn next_epoch(&mut self) {
        self.epoch += 1;
        self.shuffle_order();
    }
}

impl BatchIterator for ShuffledIterator {
    fn read(&mut self, dest: &mut BufferPair) -> Result<()> {
        let count = ensure_blocks(self.source.as_ref())?;
        if self.position >= self.order.len() {
            self.next_epoch();
        }

        let block = self.order[self.position];
        dest.clear();
        self.source.load_block(dest, block)?;

        let seed = self.rng.next_u32();
        dest.shuffle(seed);

        self.state = state_after(self.position, count);
        self.position += 1;
        if let Some(&next) = self.order.get(self.position) {
            self.source.prefetch_block(next);
        }
        Ok(())
    }

    fn reset(&mut self) {
        self.next_epoch();
        self.state = IteratorState::Fresh;
    }

    fn state(&self) -> IteratorState {
        self.state
    }

    fn epoch(&self) -> u64 {
        self.epoch
    }

    fn block_count(&self) -> usize {
        self.source.block_count()
    }

    fn object_count(&self) -> usize {
        self.source.object_count()
    }
}
