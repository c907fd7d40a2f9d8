//! Destination of completed minibatches
//!
//! The decode manager hands every finished minibatch to a [`DeviceSink`]
//! together with the output-pool slot it occupies. A GPU backend would copy
//! into device memory here; [`HostSink`] keeps host copies.

use crate::error::Result;

pub trait DeviceSink: Send {
    /// Called once per `start()`
    fn init(&mut self) -> Result<()>;

    /// Transformed object bytes for output slot `buffer_index`
    fn copy_data(&mut self, buffer_index: usize, data: &[u8]) -> Result<()>;

    /// Transformed target bytes for output slot `buffer_index`
    fn copy_labels(&mut self, buffer_index: usize, labels: &[u8]) -> Result<()>;
}

/// Host-memory sink holding the latest buffers per slot
#[derive(Debug, Default)]
pub struct HostSink {
    data: Vec<Vec<u8>>,
    labels: Vec<Vec<u8>>,
    init_count: usize,
    batches: u64,
}

impl HostSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn data(&self, buffer_index: usize) -> Option<&[u8]> {
        self.data.get(buffer_index).map(Vec::as_slice)
    }

    pub fn labels(&self, buffer_index: usize) -> Option<&[u8]> {
        self.labels.get(buffer_index).map(Vec::as_slice)
    }

    /// Number of `init()` calls so far
    pub fn init_count(&self) -> usize {
        self.init_count
    }

    /// Minibatches received
    pub fn batches(&self) -> u64 {
        self.batches
    }
}

fn store(slots: &mut Vec<Vec<u8>>, index: usize, bytes: &[u8]) {
    if slots.len() <= index {
        slots.resize_with(index + 1, Vec::new);
    }
    let slot = &mut slots[index];
    slot.clear();
    slot.extend_from_slice(bytes);
}

impl DeviceSink for HostSink {
    fn init(&mut self) -> Result<()> {
        self.init_count += 1;
        Ok(())
    }

    fn copy_data(&mut self, buffer_index: usize, data: &[u8]) -> Result<()> {
        store(&mut self.data, buffer_index, data);
        self.batches += 1;
        Ok(())
    }

    fn copy_labels(&mut self, buffer_index: usize, labels: &[u8]) -> Result<()> {
        store(&mut self.labels, buffer_index, labels);
        Ok(())
    }
}
