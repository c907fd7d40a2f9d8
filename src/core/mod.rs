//! Pipeline building blocks
//!
//! - [`manifest`] - CSV list of record files
//! - [`block_loader`] - Fetch one block of records (local files or HTTP)
//! - [`archive`] - On-disk block format used by the cache
//! - [`block_cache`] - Archive-backed cache in front of any block loader
//! - [`iterator`] - Sequential and shuffled block order
//! - [`buffer_pool`] - Bounded ring shared by two pipeline stages
//! - [`provider`] - Per-modality record transforms
//! - [`pipeline`] - Read thread and decode pool
//! - [`device`] - Where finished minibatches go
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌────────────┐   ┌───────────────┐
//! │ BlockLoader  │──▶│ BlockCache │──▶│ BatchIterator │
//! └──────────────┘   └────────────┘   └───────┬───────┘
//!                                             │ read thread
//!                                   ┌─────────▼─────────┐
//!                                   │ BufferPool<Pair>  │
//!                                   └─────────┬─────────┘
//!                                             │ decode pool
//!                                   ┌─────────▼─────────┐
//!                                   │ BufferPool<Batch> │──▶ DeviceSink
//!                                   └─────────┬─────────┘
//!                                             │ Loader::next()
//!                                             ▼
//! ```

pub mod archive;
pub mod block_cache;
pub mod block_loader;
pub mod buffer;
pub mod buffer_pool;
pub mod device;
pub mod error;
pub mod iterator;
pub mod manifest;
pub mod pipeline;
pub mod provider;
pub mod rng;
