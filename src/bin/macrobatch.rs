//! macrobatch command line
//!
//! Pack a manifest into block archives, inspect an archive, or drive a
//! loader from a config file.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use macrobatch::core::archive::pack_manifest;
use macrobatch::{ArchiveReader, Loader, LoaderConfig, Manifest};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "macrobatch")]
#[command(about = "Block archives and minibatch loading for training data")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write every block of a manifest as an archive
    Pack {
        /// CSV manifest
        #[arg(short = 'm', long)]
        manifest: PathBuf,

        /// Records per block
        #[arg(short = 'b', long, default_value = "1024")]
        block_size: usize,

        /// Output directory
        #[arg(short = 'o', long)]
        out: PathBuf,
    },

    /// Print an archive's header and record sizes
    Inspect {
        archive: PathBuf,

        /// Also list every record
        #[arg(short = 'v', long)]
        verbose: bool,
    },

    /// Pull minibatches through a loader
    Run {
        /// Loader config (.json or .toml)
        #[arg(short = 'c', long)]
        config: PathBuf,

        /// Minibatches to pull
        #[arg(short = 'n', long, default_value = "10")]
        batches: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    match Args::parse().command {
        Command::Pack {
            manifest,
            block_size,
            out,
        } => pack(manifest, block_size, out),
        Command::Inspect { archive, verbose } => inspect(archive, verbose),
        Command::Run { config, batches } => run(config, batches),
    }
}

fn pack(manifest: PathBuf, block_size: usize, out: PathBuf) -> Result<()> {
    anyhow::ensure!(block_size > 0, "block size must be positive");
    let manifest = Manifest::open(&manifest)
        .with_context(|| format!("opening manifest {}", manifest.display()))?;
    let summary = pack_manifest(Arc::new(manifest), block_size, &out)
        .with_context(|| format!("packing into {}", out.display()))?;

    println!(
        "{} records in {} blocks ({} payload bytes) written to {}",
        summary.records,
        summary.blocks,
        summary.bytes,
        out.display()
    );
    Ok(())
}

fn inspect(archive: PathBuf, verbose: bool) -> Result<()> {
    let mut reader = ArchiveReader::open(&archive)
        .with_context(|| format!("opening archive {}", archive.display()))?;

    let header = *reader.header();
    println!("archive:         {}", archive.display());
    println!("format version:  {}", header.format_version);
    println!("writer version:  {}", header.writer_version);
    println!("data type:       {}", header.data_type_str());
    println!("items:           {}", header.item_count);
    println!("max datum size:  {}", header.max_datum_size);
    println!("max target size: {}", header.max_target_size);
    println!("total data size: {}", header.total_data_size);
    println!("total targets:   {}", header.total_targets_size);

    let mut index = 0;
    while let Some(pair) = reader.read()? {
        if verbose {
            println!(
                "  [{}] datum {} bytes, target {} bytes",
                index,
                pair.object.len(),
                pair.target.len()
            );
        }
        index += 1;
    }
    println!("records read:    {}", index);
    Ok(())
}

fn run(config: PathBuf, batches: usize) -> Result<()> {
    let config = LoaderConfig::from_path(&config)
        .with_context(|| format!("loading config {}", config.display()))?;
    let mut loader = Loader::new(config)?;
    info!("{} records available", loader.item_count());

    loader.start()?;
    let started = Instant::now();
    let mut failures = 0;
    for n in 0..batches {
        let batch = loader.next()?;
        failures += batch.failures().len();
        info!(
            "Batch {}: {} records, {} data bytes, {} target bytes",
            n,
            batch.len(),
            batch.data().len(),
            batch.targets().len()
        );
    }
    let elapsed = started.elapsed();
    loader.stop();

    println!(
        "{} batches in {:.2?} ({:.1} batches/s), {} failed records",
        batches,
        elapsed,
        batches as f64 / elapsed.as_secs_f64().max(f64::EPSILON),
        failures
    );
    if let Some(stats) = loader.cache_stats() {
        println!(
            "cache: {} hits, {} misses, {} writes, {} repairs ({:.1}% hit rate)",
            stats.hits,
            stats.misses,
            stats.writes,
            stats.repairs,
            stats.hit_rate() * 100.0
        );
    }
    Ok(())
}
