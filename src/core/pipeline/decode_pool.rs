//! Static-partition decode pool
//!
//! A minibatch of `B` records is split across `count` workers. Worker `id`
//! owns records `[id * per, min(B, (id + 1) * per))` with
//! `per = ceil(B / count)`, and writes them into its own slice of the output
//! buffers. Slices are carved out of one contiguous `BytesMut` with
//! `split_to` and re-joined with `unsplit`, so workers never share memory
//! and the joined buffer stays contiguous.
//!
//! Per minibatch the manager thread:
//!
//! 1. stages `B` records from the input pool (blocks may be larger or
//!    smaller than a minibatch, so a batch can span blocks)
//! 2. waits for a free output slot
//! 3. sends every worker its range and slices (start rendezvous)
//! 4. waits for one completion per dispatched worker (end barrier)
//! 5. hands the buffers to the device sink and publishes the slot

use super::{Minibatch, PipelineHealth, RecordFailure};
use crate::buffer::{BufferPair, RecordPair};
use crate::buffer_pool::BufferPool;
use crate::device::DeviceSink;
use crate::error::{LoaderError, Result};
use crate::provider::Provider;
use crate::rng::stream_seed;
use bytes::BytesMut;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::collections::VecDeque;
use std::ops::Range;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Records owned by worker `id` of `count` for a batch of `batch`
pub fn partition(batch: usize, count: usize, id: usize) -> Range<usize> {
    if batch == 0 || count == 0 {
        return 0..0;
    }
    let per = batch.div_ceil(count);
    let start = (id * per).min(batch);
    let end = ((id + 1) * per).min(batch);
    start..end
}

/// Workers worth starting for `batch` records on `cores` cores
///
/// Never more workers than records, and never a worker whose range would
/// be empty.
pub fn worker_count(batch: usize, cores: usize) -> usize {
    if batch == 0 {
        return 1;
    }
    let per = batch.div_ceil(cores.max(1));
    batch.div_ceil(per).min(batch)
}

struct Job {
    records: Arc<Vec<RecordPair>>,
    range: Range<usize>,
    data: BytesMut,
    targets: BytesMut,
}

struct Done {
    worker: usize,
    data: BytesMut,
    targets: BytesMut,
    failures: Vec<RecordFailure>,
}

/// Everything the manager thread needs
pub struct DecodeSetup {
    pub providers: Vec<Box<dyn Provider>>,
    pub minibatch_size: usize,
    pub input: Arc<BufferPool<BufferPair>>,
    pub output: Arc<BufferPool<Minibatch>>,
    pub sink: Arc<Mutex<dyn DeviceSink>>,
    pub health: Arc<PipelineHealth>,
    /// Base for per-worker RNG seeds
    pub seed: u64,
    /// Distinguishes RNG streams across restarts
    pub generation: u64,
}

/// Manager plus worker threads
pub struct DecodePool {
    manager: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
}

impl DecodePool {
    pub fn spawn(setup: DecodeSetup) -> Result<Self> {
        let DecodeSetup {
            providers,
            minibatch_size,
            input,
            output,
            sink,
            health,
            seed,
            generation,
        } = setup;

        let first = providers
            .first()
            .ok_or_else(|| LoaderError::Config("decode pool needs at least one worker".into()))?;
        let data_len = first.data_len();
        let target_len = first.target_len();

        let (done_tx, done_rx) = channel::unbounded();
        let mut job_txs = Vec::with_capacity(providers.len());
        let mut workers = Vec::with_capacity(providers.len());

        for (id, provider) in providers.into_iter().enumerate() {
            let (job_tx, job_rx) = channel::bounded(1);
            let done_tx = done_tx.clone();
            let worker_seed = stream_seed(stream_seed(seed, generation), id as u64);
            let handle = thread::Builder::new()
                .name(format!("macrobatch-decode-{}", id))
                .spawn(move || {
                    run_worker(id, provider, StdRng::seed_from_u64(worker_seed), job_rx, done_tx)
                })?;
            job_txs.push(job_tx);
            workers.push(handle);
        }
        drop(done_tx);

        let manager = Manager {
            job_txs,
            done_rx,
            minibatch_size,
            data_len,
            target_len,
            input,
            output,
            sink,
            health,
        };
        let manager = thread::Builder::new()
            .name("macrobatch-decode-manager".into())
            .spawn(move || manager.run())?;

        debug!("Decode pool started with {} workers", workers.len());
        Ok(DecodePool {
            manager: Some(manager),
            workers,
        })
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Wait for every thread. Both pools must already be closed.
    pub fn join(&mut self) {
        if let Some(manager) = self.manager.take() {
            if manager.join().is_err() {
                warn!("Decode manager panicked");
            }
        }
        for worker in self.workers.drain(..) {
            if worker.join().is_err() {
                warn!("Decode worker panicked");
            }
        }
    }
}

impl Drop for DecodePool {
    fn drop(&mut self) {
        self.join();
    }
}

fn run_worker(
    id: usize,
    mut provider: Box<dyn Provider>,
    mut rng: StdRng,
    jobs: Receiver<Job>,
    done: Sender<Done>,
) {
    let data_len = provider.data_len();
    let target_len = provider.target_len();

    for mut job in jobs.iter() {
        let mut failures = Vec::new();

        for (offset, index) in job.range.clone().enumerate() {
            let pair = &job.records[index];
            let data = &mut job.data[offset * data_len..(offset + 1) * data_len];
            let target = &mut job.targets[offset * target_len..(offset + 1) * target_len];

            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                provider.provide(&pair.object, &pair.target, data, target, &mut rng)
            }));
            let message = match outcome {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => e.message,
                Err(payload) => panic_message(payload.as_ref()),
            };

            data.fill(0);
            target.fill(0);
            failures.push(RecordFailure { index, message });
        }

        let finished = Done {
            worker: id,
            data: job.data,
            targets: job.targets,
            failures,
        };
        if done.send(finished).is_err() {
            break;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("provider panicked: {}", s)
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("provider panicked: {}", s)
    } else {
        "provider panicked".to_string()
    }
}

struct Manager {
    job_txs: Vec<Sender<Job>>,
    done_rx: Receiver<Done>,
    minibatch_size: usize,
    data_len: usize,
    target_len: usize,
    input: Arc<BufferPool<BufferPair>>,
    output: Arc<BufferPool<Minibatch>>,
    sink: Arc<Mutex<dyn DeviceSink>>,
    health: Arc<PipelineHealth>,
}

impl Manager {
    fn run(self) {
        let mut pending = VecDeque::new();
        while let Some(records) = self.stage(&mut pending) {
            match self.produce(records) {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    self.health.fail(e.to_string());
                    break;
                }
            }
        }
        // Wake the consumer whether we stopped or failed
        self.output.close();
        self.input.close();
        debug!("Decode manager exiting");
    }

    /// Collect the next `minibatch_size` records, or `None` once closed
    fn stage(&self, pending: &mut VecDeque<RecordPair>) -> Option<Arc<Vec<RecordPair>>> {
        while pending.len() < self.minibatch_size {
            let mut state = self.input.lock();
            if !self.input.wait_for_non_empty(&mut state) {
                return None;
            }
            pending.extend(state.read_slot().drain_pairs());
            state.advance_read_pos();
            drop(state);
            self.input.signal_non_full();
        }
        Some(Arc::new(pending.drain(..self.minibatch_size).collect()))
    }

    /// Build and publish one minibatch. `Ok(false)` means the output closed.
    fn produce(&self, records: Arc<Vec<RecordPair>>) -> Result<bool> {
        let batch_size = records.len();

        let (mut batch, buffer_index) = {
            let mut state = self.output.lock();
            if !self.output.wait_for_non_full(&mut state) {
                return Ok(false);
            }
            (std::mem::take(state.write_slot()), state.write_pos())
        };
        batch.prepare(batch_size, self.data_len, self.target_len);
        batch.buffer_index = buffer_index;

        // Start rendezvous: each worker gets a disjoint slice
        let count = self.job_txs.len();
        let mut data = std::mem::take(&mut batch.data);
        let mut targets = std::mem::take(&mut batch.targets);
        let mut dispatched = 0;
        for (id, tx) in self.job_txs.iter().enumerate() {
            let range = partition(batch_size, count, id);
            if range.is_empty() {
                continue;
            }
            let job = Job {
                data: data.split_to(range.len() * self.data_len),
                targets: targets.split_to(range.len() * self.target_len),
                records: Arc::clone(&records),
                range,
            };
            tx.send(job)
                .map_err(|_| LoaderError::PipelineFault(format!("decode worker {} exited", id)))?;
            dispatched += 1;
        }

        // End barrier: one completion per dispatched worker
        let mut parts: Vec<Option<Done>> = (0..count).map(|_| None).collect();
        for _ in 0..dispatched {
            let done = self
                .done_rx
                .recv()
                .map_err(|_| LoaderError::PipelineFault("decode workers exited".into()))?;
            let worker = done.worker;
            parts[worker] = Some(done);
        }

        for part in parts.into_iter().flatten() {
            data.unsplit(part.data);
            targets.unsplit(part.targets);
            batch.failures.extend(part.failures);
        }
        batch.failures.sort_by_key(|f| f.index);
        batch.data = data;
        batch.targets = targets;

        {
            let mut sink = self.sink.lock();
            sink.copy_data(buffer_index, &batch.data)?;
            sink.copy_labels(buffer_index, &batch.targets)?;
        }

        let mut state = self.output.lock();
        if state.is_closed() {
            return Ok(false);
        }
        *state.write_slot() = batch;
        state.advance_write_pos();
        drop(state);
        self.output.signal_non_empty();
        Ok(true)
    }
}
