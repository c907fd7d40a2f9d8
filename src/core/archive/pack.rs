//! Bulk archive writing
//!
//! Writes every block of a source as `block_<n>.cache`, the same naming the
//! block cache uses, so a packed directory can seed a cache directory.

use super::{ArchiveWriter, DATA_TYPE_RAW};
use crate::block_loader::{BlockLoader, FileBlockLoader};
use crate::buffer::BufferPair;
use crate::error::Result;
use crate::manifest::Manifest;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// What a pack run produced
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackSummary {
    pub blocks: usize,
    pub records: usize,
    /// Payload bytes, objects and targets combined
    pub bytes: u64,
    pub files: Vec<PathBuf>,
}

/// Archive file name for `block_num`
pub fn block_file_name(block_num: usize) -> String {
    format!("block_{}.cache", block_num)
}

/// Write one archive per block of `source` into `out_dir`
pub fn pack_blocks(source: &mut dyn BlockLoader, out_dir: &Path) -> Result<PackSummary> {
    fs::create_dir_all(out_dir)?;

    let mut summary = PackSummary::default();
    let mut block = BufferPair::new();
    for block_num in 0..source.block_count() {
        block.clear();
        source.load_block(&mut block, block_num)?;

        let path = out_dir.join(block_file_name(block_num));
        let mut writer = ArchiveWriter::create(&path, DATA_TYPE_RAW)?;
        writer.write_all(&block)?;
        let header = *writer.header();
        writer.close()?;

        debug!("Packed block {} into {:?}", block_num, path);
        summary.blocks += 1;
        summary.records += block.len();
        summary.bytes += u64::from(header.total_data_size) + u64::from(header.total_targets_size);
        summary.files.push(path);
    }

    info!(
        "Packed {} records in {} blocks into {:?}",
        summary.records, summary.blocks, out_dir
    );
    Ok(summary)
}

/// Pack every block of a manifest
pub fn pack_manifest(
    manifest: Arc<Manifest>,
    block_size: usize,
    out_dir: &Path,
) -> Result<PackSummary> {
    let mut loader = FileBlockLoader::new(manifest, block_size);
    pack_blocks(&mut loader, out_dir)
}
