//! Pipeline threads and the values that flow between them
//!
//! ```text
//! BatchIterator --read thread--> BufferPool<BufferPair>
//!     --decode pool--> BufferPool<Minibatch> --next()--> consumer
//!                            \--> DeviceSink
//! ```

pub mod decode_pool;
pub mod read_thread;

pub use decode_pool::{partition, worker_count, DecodePool, DecodeSetup};
pub use read_thread::{ReadThread, READ_RETRIES};

use bytes::BytesMut;
use parking_lot::Mutex;
use tracing::error;

/// A record whose provider failed; its output regions are zero filled
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFailure {
    /// Position within the minibatch
    pub index: usize,
    pub message: String,
}

/// One transformed minibatch, laid out record after record
#[derive(Debug, Default)]
pub struct Minibatch {
    data: BytesMut,
    targets: BytesMut,
    len: usize,
    data_len: usize,
    target_len: usize,
    buffer_index: usize,
    failures: Vec<RecordFailure>,
}

impl Minibatch {
    pub fn with_capacity(records: usize, data_len: usize, target_len: usize) -> Self {
        Minibatch {
            data: BytesMut::with_capacity(records * data_len),
            targets: BytesMut::with_capacity(records * target_len),
            len: 0,
            data_len,
            target_len,
            buffer_index: 0,
            failures: Vec::new(),
        }
    }

    /// Records in the batch
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Contiguous object output for all records
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Contiguous target output for all records
    pub fn targets(&self) -> &[u8] {
        &self.targets
    }

    /// Output regions of record `index`
    pub fn record(&self, index: usize) -> Option<(&[u8], &[u8])> {
        if index >= self.len {
            return None;
        }
        let data = &self.data[index * self.data_len..(index + 1) * self.data_len];
        let target = &self.targets[index * self.target_len..(index + 1) * self.target_len];
        Some((data, target))
    }

    pub fn data_len(&self) -> usize {
        self.data_len
    }

    pub fn target_len(&self) -> usize {
        self.target_len
    }

    /// Output-pool slot this batch was produced into
    pub fn buffer_index(&self) -> usize {
        self.buffer_index
    }

    /// Records whose transform failed, by ascending index
    pub fn failures(&self) -> &[RecordFailure] {
        &self.failures
    }

    /// Size both buffers for `records` zeroed records
    pub(crate) fn prepare(&mut self, records: usize, data_len: usize, target_len: usize) {
        self.len = records;
        self.data_len = data_len;
        self.target_len = target_len;
        self.failures.clear();
        self.data.clear();
        self.data.resize(records * data_len, 0);
        self.targets.clear();
        self.targets.resize(records * target_len, 0);
    }
}

/// First fatal error seen by any pipeline thread
#[derive(Debug, Default)]
pub struct PipelineHealth {
    fault: Mutex<Option<String>>,
}

impl PipelineHealth {
    /// Record a fatal error. Only the first one is kept.
    pub fn fail(&self, message: String) {
        let mut fault = self.fault.lock();
        if fault.is_none() {
            error!("Pipeline fault: {}", message);
            *fault = Some(message);
        }
    }

    pub fn fault(&self) -> Option<String> {
        self.fault.lock().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minibatch_layout() {
        let mut batch = Minibatch::default();
        batch.prepare(3, 2, 1);
        batch.data[2..4].copy_from_slice(b"xy");
        batch.targets[1] = 9;

        assert_eq!(batch.len(), 3);
        assert_eq!(batch.data().len(), 6);
        assert_eq!(batch.record(1), Some((&b"xy"[..], &[9u8][..])));
        assert!(batch.record(3).is_none());
    }

    #[test]
    fn test_first_fault_wins() {
        let health = PipelineHealth::default();
        assert!(health.fault().is_none());
        health.fail("disk".into());
        health.fail("later".into());
        assert_eq!(health.fault().as_deref(), Some("disk"));
    }
}
