//! Record storage for the input side of the pipeline

use crate::rng::Minstd;
use rand::seq::SliceRandom;

/// One (object, target) unit as read from storage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordPair {
    pub object: Vec<u8>,
    pub target: Vec<u8>,
}

impl RecordPair {
    pub fn new(object: impl Into<Vec<u8>>, target: impl Into<Vec<u8>>) -> Self {
        RecordPair {
            object: object.into(),
            target: target.into(),
        }
    }
}

/// Ordered list of variable-length records
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordBuffer {
    records: Vec<Vec<u8>>,
}

impl RecordBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: Vec<u8>) {
        self.records.push(record);
    }

    pub fn get(&self, index: usize) -> Option<&[u8]> {
        self.records.get(index).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    pub fn truncate(&mut self, len: usize) {
        self.records.truncate(len);
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.records.iter().map(Vec::as_slice)
    }

    /// Sum of all record lengths
    pub fn total_bytes(&self) -> usize {
        self.records.iter().map(Vec::len).sum()
    }

    /// Length of the largest record
    pub fn max_len(&self) -> usize {
        self.records.iter().map(Vec::len).max().unwrap_or(0)
    }

    /// Shuffle in place. Two buffers of equal length shuffled with the same
    /// seed receive the same permutation.
    pub fn shuffle(&mut self, seed: u32) {
        self.records.shuffle(&mut Minstd::new(seed as u64));
    }

    fn take_all(&mut self) -> std::vec::IntoIter<Vec<u8>> {
        std::mem::take(&mut self.records).into_iter()
    }
}

/// Object and target buffers for one block, kept index-aligned
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BufferPair {
    pub objects: RecordBuffer,
    pub targets: RecordBuffer,
}

impl BufferPair {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, pair: RecordPair) {
        self.objects.push(pair.object);
        self.targets.push(pair.target);
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn clear(&mut self) {
        self.objects.clear();
        self.targets.clear();
    }

    pub fn truncate(&mut self, len: usize) {
        self.objects.truncate(len);
        self.targets.truncate(len);
    }

    /// Borrow pair `index`
    pub fn pair(&self, index: usize) -> Option<(&[u8], &[u8])> {
        Some((self.objects.get(index)?, self.targets.get(index)?))
    }

    /// Apply one seeded permutation to both buffers
    pub fn shuffle(&mut self, seed: u32) {
        self.objects.shuffle(seed);
        self.targets.shuffle(seed);
    }

    /// Move every pair out, leaving the buffers empty for reuse
    pub fn drain_pairs(&mut self) -> impl Iterator<Item = RecordPair> {
        self.objects
            .take_all()
            .zip(self.targets.take_all())
            .map(|(object, target)| RecordPair { object, target })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagged(n: usize) -> BufferPair {
        let mut buffers = BufferPair::new();
        for i in 0..n {
            buffers.push(RecordPair::new(
                format!("object-{}", i),
                format!("target-{}", i),
            ));
        }
        buffers
    }

    #[test]
    fn test_shuffle_keeps_pairs_aligned() {
        let mut buffers = tagged(16);
        buffers.shuffle(1234);

        assert_eq!(buffers.len(), 16);
        for i in 0..16 {
            let (object, target) = buffers.pair(i).unwrap();
            let object = std::str::from_utf8(object).unwrap();
            let target = std::str::from_utf8(target).unwrap();
            assert_eq!(
                object.trim_start_matches("object-"),
                target.trim_start_matches("target-")
            );
        }
        assert_ne!(buffers, tagged(16));
    }

    #[test]
    fn test_drain_pairs_empties_buffers() {
        let mut buffers = tagged(3);
        let pairs: Vec<_> = buffers.drain_pairs().collect();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[2], RecordPair::new("object-2", "target-2"));
        assert!(buffers.is_empty());
        assert!(buffers.targets.is_empty());
    }

    #[test]
    fn test_sizes() {
        let mut buffers = BufferPair::new();
        buffers.push(RecordPair::new(vec![0u8; 10], vec![1u8; 4]));
        buffers.push(RecordPair::new(vec![0u8; 3], vec![]));
        assert_eq!(buffers.objects.total_bytes(), 13);
        assert_eq!(buffers.objects.max_len(), 10);
        assert_eq!(buffers.targets.max_len(), 4);
    }
}
