use super::{ensure_blocks, state_after, BatchIterator, IteratorState};
use crate::block_loader::BlockLoader;
use crate::buffer::BufferPair;
use crate::error::Result;
use tracing::debug;

/// Delivers blocks 0..N-1 in order, forever
pub struct SequentialIterator {
    source: Box<dyn BlockLoader>,
    position: usize,
    state: IteratorState,
}

impl SequentialIterator {
    pub fn new(source: Box<dyn BlockLoader>) -> Self {
        SequentialIterator {
            source,
            position: 0,
            state: IteratorState::Fresh,
        }
    }
}

impl BatchIterator for SequentialIterator {
    fn read(&mut self, dest: &mut BufferPair) -> Result<()> {
        let count = ensure_blocks(self.source.as_ref())?;
        let block = self.position % count;

        dest.clear();
        self.source.load_block(dest, block)?;

        self.state = state_after(block, count);
        self.position = (block + 1) % count;
        if self.position == 0 {
            debug!("Sequential iterator wrapped after {} blocks", count);
        }
        self.source.prefetch_block(self.position);
        Ok(())
    }

    fn reset(&mut self) {
        self.position = 0;
        self.state = IteratorState::Fresh;
    }

    fn state(&self) -> IteratorState {
        self.state
    }

    fn epoch(&self) -> u64 {
        0
    }

    fn block_count(&self) -> usize {
        self.source.block_count()
    }

    fn object_count(&self) -> usize {
        self.source.object_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::test_support::{tags, TaggedLoader};

    #[test]
    fn test_in_order_with_wrap() {
        let mut iter = SequentialIterator::new(Box::new(TaggedLoader::new(3, 2)));
        assert_eq!(iter.state(), IteratorState::Fresh);

        let mut seen = Vec::new();
        for _ in 0..4 {
            let mut dest = BufferPair::new();
            iter.read(&mut dest).unwrap();
            seen.extend(tags(&dest));
        }
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5, 0, 1]);
        assert_eq!(iter.state(), IteratorState::Reading { index: 0, of: 3 });
    }

    #[test]
    fn test_exhausted_then_reset() {
        let mut iter = SequentialIterator::new(Box::new(TaggedLoader::new(2, 1)));
        let mut dest = BufferPair::new();
        iter.read(&mut dest).unwrap();
        iter.read(&mut dest).unwrap();
        assert_eq!(iter.state(), IteratorState::Exhausted);

        iter.read(&mut dest).unwrap();
        iter.reset();
        assert_eq!(iter.state(), IteratorState::Fresh);

        let mut dest = BufferPair::new();
        iter.read(&mut dest).unwrap();
        assert_eq!(tags(&dest), vec![0]);
    }

    #[test]
    fn test_failed_read_does_not_advance() {
        let mut loader = TaggedLoader::new(3, 1);
        loader.fail_next = 1;
        let mut iter = SequentialIterator::new(Box::new(loader));

        let mut dest = BufferPair::new();
        assert!(iter.read(&mut dest).is_err());
        assert_eq!(iter.state(), IteratorState::Fresh);
        iter.read(&mut dest).unwrap();
        assert_eq!(tags(&dest), vec![0]);
    }

    #[test]
    fn test_empty_source() {
        let mut iter = SequentialIterator::new(Box::new(TaggedLoader::new(0, 4)));
        assert!(iter.read(&mut BufferPair::new()).is_err());
    }
}
