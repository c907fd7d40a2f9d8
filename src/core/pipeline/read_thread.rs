//! Single producer that fills the input pool from a batch iterator

use super::PipelineHealth;
use crate::buffer::BufferPair;
use crate::buffer_pool::BufferPool;
use crate::error::Result;
use crate::iterator::BatchIterator;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Retries after a failed block read before the fault is fatal
pub const READ_RETRIES: usize = 3;

pub struct ReadThread {
    handle: Option<JoinHandle<()>>,
}

impl ReadThread {
    pub fn spawn(
        iterator: Arc<Mutex<Box<dyn BatchIterator>>>,
        input: Arc<BufferPool<BufferPair>>,
        health: Arc<PipelineHealth>,
    ) -> Result<Self> {
        let handle = thread::Builder::new()
            .name("macrobatch-read".into())
            .spawn(move || run(&iterator, &input, &health))?;
        Ok(ReadThread {
            handle: Some(handle),
        })
    }

    /// Wait for the thread to exit. The input pool must already be closed.
    pub fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Read thread panicked");
            }
        }
    }
}

impl Drop for ReadThread {
    fn drop(&mut self) {
        self.join();
    }
}

fn run(
    iterator: &Mutex<Box<dyn BatchIterator>>,
    input: &BufferPool<BufferPair>,
    health: &PipelineHealth,
) {
    loop {
        let mut slot = {
            let mut state = input.lock();
            if !input.wait_for_non_full(&mut state) {
                break;
            }
            std::mem::take(state.write_slot())
        };

        if let Err(e) = read_with_retry(iterator, &mut slot) {
            health.fail(format!(
                "block read failed after {} attempts: {}",
                READ_RETRIES + 1,
                e
            ));
            input.close();
            break;
        }

        let mut state = input.lock();
        if state.is_closed() {
            break;
        }
        *state.write_slot() = slot;
        state.advance_write_pos();
        drop(state);
        input.signal_non_empty();
    }
    debug!("Read thread exiting");
}

fn read_with_retry(iterator: &Mutex<Box<dyn BatchIterator>>, slot: &mut BufferPair) -> Result<()> {
    let mut attempt = 0;
    loop {
        match iterator.lock().read(slot) {
            Ok(()) => return Ok(()),
            Err(e) if attempt < READ_RETRIES => {
                attempt += 1;
                warn!("Block read failed (retry {}/{}): {}", attempt, READ_RETRIES, e);
            }
            Err(e) => return Err(e),
        }
    }
}
