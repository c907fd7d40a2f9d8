//! # Macrobatch - Cached, Threaded Minibatch Loading
//!
//! `macrobatch` streams fixed-size, transformed minibatches out of a data set
//! described by a CSV manifest or served by a remote block service:
//!
//! - **Blocks** ("macrobatches") of records are loaded from files or over HTTP
//! - **Block cache** stores every block as a cpio-style archive keyed by the
//!   manifest's content hash and modification time
//! - **Shuffling** of block order and of records within each block, per epoch
//! - **Double-buffered pipeline**: a read thread and a decode pool hand off
//!   through bounded buffer pools
//! - **Providers** turn raw record bytes into fixed-size outputs per modality
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use macrobatch::{Loader, LoaderConfig, ProviderConfig, Result};
//! use serde_json::json;
//!
//! # fn main() -> Result<()> {
//! let config = LoaderConfig::builder("train.csv", 128)
//!     .macrobatch_size(4096)
//!     .with_cache_directory("/var/cache/macrobatch")
//!     .provider(ProviderConfig {
//!         kind: "raw,label".into(),
//!         data_config: json!({"output_len": 3072}),
//!         target_config: json!(null),
//!     })
//!     .build()?;
//!
//! let mut loader = Loader::new(config)?;
//! loader.start()?;
//!
//! let batch = loader.next()?;
//! assert_eq!(batch.len(), 128);
//!
//! // Back to the first block of a new epoch
//! loader.reset()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Configuration files
//!
//! ```rust,no_run
//! use macrobatch::{Loader, LoaderConfig};
//!
//! # fn main() -> macrobatch::Result<()> {
//! let config = LoaderConfig::from_path("loader.toml")?;
//! let mut loader = Loader::new(config)?;
//! loader.start()?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod loader;

// Re-export core modules internally so crate:: paths in core still work
pub(crate) use self::core::{
    archive, block_cache, block_loader, buffer, buffer_pool, device, error, iterator, manifest,
    pipeline, provider, rng,
};

pub use crate::config::{LoaderConfig, LoaderConfigBuilder, ProviderConfig, RemoteConfig};
pub use crate::core::{
    archive::{ArchiveHeader, ArchiveReader, ArchiveWriter},
    block_cache::{BlockCache, CacheStats},
    block_loader::{BlockLoader, CacheKey, FileBlockLoader, RemoteBlockLoader},
    buffer::{BufferPair, RecordPair},
    device::{DeviceSink, HostSink},
    error::{LoaderError, Result, TransformError},
    manifest::Manifest,
    pipeline::{Minibatch, RecordFailure},
    provider::{Provider, ProviderRegistry},
};
pub use crate::loader::Loader;
