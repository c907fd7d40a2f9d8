//! The `Loader` facade
//!
//! Owns the block source, the iterator and, while started, the two buffer
//! pools and the pipeline threads. The consumer sees one minibatch at a time
//! through [`Loader::next`]; the batch returned by one call stays valid until
//! the following call releases its slot.

use crate::block_cache::{BlockCache, CacheCounters, CacheStats};
use crate::block_loader::{BlockLoader, FileBlockLoader, RemoteBlockLoader};
use crate::buffer::BufferPair;
use crate::buffer_pool::BufferPool;
use crate::config::LoaderConfig;
use crate::device::{DeviceSink, HostSink};
use crate::error::{LoaderError, Result};
use crate::iterator::{BatchIterator, SequentialIterator, ShuffledIterator};
use crate::manifest::{Manifest, ManifestOptions};
use crate::pipeline::{
    worker_count, DecodePool, DecodeSetup, Minibatch, PipelineHealth, ReadThread,
};
use crate::provider::ProviderRegistry;
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread;
use tracing::{debug, info};

/// Threads and pools of one `start()` .. `stop()` span
struct Running {
    input: Arc<BufferPool<BufferPair>>,
    output: Arc<BufferPool<Minibatch>>,
    health: Arc<PipelineHealth>,
    read_thread: ReadThread,
    decode_pool: DecodePool,
    /// Batch handed out by the last `next()`; its slot is still occupied
    current: Option<Minibatch>,
}

impl Running {
    fn shutdown(mut self) {
        self.input.close();
        self.output.close();
        self.read_thread.join();
        self.decode_pool.join();
        let dropped = self.input.lock().drain() + self.output.lock().drain();
        debug!("Pipeline stopped, {} unread slots dropped", dropped);
    }
}

/// Streams transformed minibatches from a manifest or a remote block service
///
/// # Examples
///
/// ```rust,no_run
/// use macrobatch::{Loader, LoaderConfig, ProviderConfig};
/// use serde_json::json;
///
/// # fn main() -> macrobatch::Result<()> {
/// let config = LoaderConfig::builder("train.csv", 64)
///     .macrobatch_size(1024)
///     .with_cache_directory("/tmp/macrobatch")
///     .with_shuffle(7)
///     .provider(ProviderConfig {
///         kind: "raw,raw".into(),
///         data_config: json!({"output_len": 784}),
///         target_config: json!({"output_len": 1}),
///     })
///     .build()?;
///
/// let mut loader = Loader::new(config)?;
/// loader.start()?;
/// for _ in 0..loader.item_count() / 64 {
///     let batch = loader.next()?;
///     println!("{} records, {} data bytes", batch.len(), batch.data().len());
/// }
/// loader.stop();
/// # Ok(())
/// # }
/// ```
pub struct Loader {
    config: LoaderConfig,
    registry: ProviderRegistry,
    sink: Arc<Mutex<dyn DeviceSink>>,
    iterator: Arc<Mutex<Box<dyn BatchIterator>>>,
    item_count: usize,
    cache_counters: Option<Arc<CacheCounters>>,
    generation: u64,
    running: Option<Running>,
}

impl Loader {
    /// Build the block source and iterator. No threads start yet.
    pub fn new(config: LoaderConfig) -> Result<Self> {
        config.check()?;
        let (source, cache_counters) = build_source(&config)?;
        let item_count = source.object_count();

        let iterator: Box<dyn BatchIterator> = if config.shuffle_every_epoch {
            Box::new(ShuffledIterator::new(source, config.random_seed))
        } else {
            Box::new(SequentialIterator::new(source))
        };

        info!(
            "Loader ready: {} records, {} blocks of {}",
            item_count,
            iterator.block_count(),
            config.block_size()
        );

        Ok(Loader {
            config,
            registry: ProviderRegistry::new(),
            sink: Arc::new(Mutex::new(HostSink::new())),
            iterator: Arc::new(Mutex::new(iterator)),
            item_count,
            cache_counters,
            generation: 0,
            running: None,
        })
    }

    /// Use a registry with additional providers
    pub fn with_registry(mut self, registry: ProviderRegistry) -> Self {
        self.registry = registry;
        self
    }

    /// Send finished minibatches to `sink` instead of a [`HostSink`]
    pub fn with_sink(mut self, sink: Arc<Mutex<dyn DeviceSink>>) -> Self {
        self.sink = sink;
        self
    }

    pub fn config(&self) -> &LoaderConfig {
        &self.config
    }

    /// Records in the data set
    pub fn item_count(&self) -> usize {
        self.item_count
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Cache counters, when a cache directory is configured
    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache_counters.as_ref().map(|c| c.snapshot())
    }

    /// Fatal error that stopped the running pipeline, if any
    pub fn fault(&self) -> Option<String> {
        self.running.as_ref().and_then(|r| r.health.fault())
    }

    /// Spawn the read thread and decode pool. Does nothing if already running.
    ///
    /// A pipeline that stopped on a fault stays in place so the fault can be
    /// read; `start()` reports it until `stop()` or `reset()` clears it.
    pub fn start(&mut self) -> Result<()> {
        if let Some(running) = &self.running {
            return match running.health.fault() {
                Some(fault) => Err(LoaderError::PipelineFault(fault)),
                None => Ok(()),
            };
        }
        if self.item_count == 0 {
            return Err(LoaderError::Config("data set has no records".into()));
        }

        let minibatch_size = self.config.minibatch_size;
        let cores = self.config.decode_threads.unwrap_or_else(|| {
            thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        });
        let workers = worker_count(minibatch_size, cores);
        let providers = (0..workers)
            .map(|_| self.registry.create(&self.config.provider))
            .collect::<Result<Vec<_>>>()?;
        let (data_len, target_len) = providers
            .first()
            .map(|p| (p.data_len(), p.target_len()))
            .unwrap_or_default();

        self.sink.lock().init()?;

        let depth = self.config.pool_depth;
        let health = Arc::new(PipelineHealth::default());
        let input = Arc::new(BufferPool::<BufferPair>::new(depth));
        let output = Arc::new(BufferPool::with_slots(
            (0..depth)
                .map(|_| Minibatch::with_capacity(minibatch_size, data_len, target_len))
                .collect(),
        ));

        let read_thread = ReadThread::spawn(
            Arc::clone(&self.iterator),
            Arc::clone(&input),
            Arc::clone(&health),
        )?;
        let decode_pool = DecodePool::spawn(DecodeSetup {
            providers,
            minibatch_size,
            input: Arc::clone(&input),
            output: Arc::clone(&output),
            sink: Arc::clone(&self.sink),
            health: Arc::clone(&health),
            seed: self.config.random_seed,
            generation: self.generation,
        });
        let decode_pool = match decode_pool {
            Ok(pool) => pool,
            Err(e) => {
                input.close();
                return Err(e);
            }
        };

        info!(
            "Pipeline started: {} decode workers, minibatch {}, pool depth {}",
            workers, minibatch_size, depth
        );
        self.generation += 1;
        self.running = Some(Running {
            input,
            output,
            health,
            read_thread,
            decode_pool,
            current: None,
        });
        Ok(())
    }

    /// Release the previous minibatch and wait for the next one
    ///
    /// Minibatches finished before a fault are delivered first; the fault is
    /// returned once they run out.
    pub fn next(&mut self) -> Result<&Minibatch> {
        let running = self.running.as_mut().ok_or(LoaderError::NotStarted)?;
        let output = &running.output;

        let mut state = output.lock();
        if let Some(previous) = running.current.take() {
            *state.read_slot() = previous;
            state.advance_read_pos();
            output.signal_non_full();
        }
        if !output.wait_for_non_empty(&mut state) {
            drop(state);
            let fault = running
                .health
                .fault()
                .unwrap_or_else(|| "pipeline closed".to_string());
            return Err(LoaderError::PipelineFault(fault));
        }
        let batch = std::mem::take(state.read_slot());
        drop(state);

        Ok(running.current.insert(batch))
    }

    /// Stop and join every pipeline thread. Idempotent.
    pub fn stop(&mut self) {
        if let Some(running) = self.running.take() {
            running.shutdown();
        }
    }

    /// Stop, rewind the iterator to the start of an epoch and start again
    pub fn reset(&mut self) -> Result<()> {
        self.stop();
        self.iterator.lock().reset();
        self.start()
    }
}

impl Drop for Loader {
    fn drop(&mut self) {
        self.stop();
    }
}

fn build_source(
    config: &LoaderConfig,
) -> Result<(Box<dyn BlockLoader>, Option<Arc<CacheCounters>>)> {
    let block_size = config.block_size();

    let source: Box<dyn BlockLoader> = match (&config.remote, &config.manifest_filename) {
        (Some(remote), _) => Box::new(RemoteBlockLoader::new(remote.clone(), block_size)?),
        (None, Some(path)) => {
            let options = ManifestOptions {
                shuffle: config.shuffle_manifest,
                random_seed: config.random_seed,
                root: config.repo_directory.clone(),
            };
            let manifest = Manifest::open_with(path, &options)?;
            Box::new(
                FileBlockLoader::new(Arc::new(manifest), block_size)
                    .with_subset_percent(config.subset_percent),
            )
        }
        (None, None) => {
            return Err(LoaderError::Config(
                "no manifest_filename and no remote block source".into(),
            ))
        }
    };

    match &config.cache_directory {
        Some(dir) => {
            let cache = BlockCache::new(source, dir);
            let counters = cache.counters();
            Ok((Box::new(cache), Some(counters)))
        }
        None => Ok((source, None)),
    }
}
