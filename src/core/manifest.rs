//! Record manifest
//!
//! A manifest is a text file with one record per line:
//!
//! ```text
//! images/0001.jpg,labels/0001.txt
//! images/0002.jpg,labels/0002.txt
//! ```
//!
//! The first column names the object file and the remaining columns name its
//! target file(s). Every line must have the same number of columns. Blank
//! lines and lines starting with `#` are ignored. Relative paths resolve
//! against the manifest's own directory unless a root is supplied.
//!
//! [`Manifest::hash`] and [`Manifest::version`] together key the block
//! cache: editing the file changes the hash and touching it changes the
//! version, and either one moves the cache to a fresh directory.

use crate::error::{LoaderError, Result};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;
use tracing::{debug, info};

/// One manifest line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestEntry {
    pub object: PathBuf,
    pub targets: Vec<PathBuf>,
}

/// How a manifest is loaded
#[derive(Debug, Clone, Default)]
pub struct ManifestOptions {
    /// Shuffle entries once after parsing
    pub shuffle: bool,
    pub random_seed: u64,
    /// Base directory for relative paths (defaults to the manifest's directory)
    pub root: Option<PathBuf>,
}

/// Parsed, immutable record list
#[derive(Debug, Clone)]
pub struct Manifest {
    path: PathBuf,
    entries: Vec<ManifestEntry>,
    columns: usize,
    hash: String,
    shuffle_seed: Option<u64>,
}

impl Manifest {
    /// Load a manifest in file order
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::open_with(path, &ManifestOptions::default())
    }

    /// Load a manifest with explicit options
    pub fn open_with<P: AsRef<Path>>(path: P, options: &ManifestOptions) -> Result<Self> {
        let path = path.as_ref();
        info!("Loading manifest {:?}", path);

        let content = fs::read(path).map_err(|e| {
            LoaderError::Config(format!("cannot read manifest {}: {}", path.display(), e))
        })?;
        let text = String::from_utf8(content.clone()).map_err(|_| {
            LoaderError::Config(format!("manifest {} is not valid UTF-8", path.display()))
        })?;

        let base = match &options.root {
            Some(root) => root.clone(),
            None => path.parent().map(Path::to_path_buf).unwrap_or_default(),
        };
        let (mut entries, columns) = parse(&text, &base)?;

        if options.shuffle {
            entries.shuffle(&mut StdRng::seed_from_u64(options.random_seed));
            debug!("Shuffled {} manifest entries", entries.len());
        }

        let mut hasher = Sha256::new();
        hasher.update(path.to_string_lossy().as_bytes());
        hasher.update([0u8]);
        hasher.update(&content);
        let hash = format!("{:x}", hasher.finalize());

        Ok(Manifest {
            path: path.to_path_buf(),
            entries,
            columns,
            hash,
            shuffle_seed: options.shuffle.then_some(options.random_seed),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Content fingerprint (SHA-256 of path and bytes, hex)
    pub fn hash(&self) -> &str {
        &self.hash
    }

    /// Seed of the load-time shuffle, if entries were shuffled
    pub fn shuffle_seed(&self) -> Option<u64> {
        self.shuffle_seed
    }

    /// Modification time of the manifest file in nanoseconds since the epoch
    ///
    /// Read from the filesystem on every call so a touched manifest is seen
    /// by the next cache lookup.
    pub fn version(&self) -> Result<String> {
        let modified = fs::metadata(&self.path)?.modified()?;
        let nanos = modified
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        Ok(nanos.to_string())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Columns per line (object plus targets)
    pub fn columns(&self) -> usize {
        self.columns
    }

    pub fn entries(&self) -> &[ManifestEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&ManifestEntry> {
        self.entries.get(index)
    }

    /// Number of blocks of `block_size` records (last one may be short)
    pub fn block_count(&self, block_size: usize) -> usize {
        if block_size == 0 {
            return 0;
        }
        self.entries.len().div_ceil(block_size)
    }

    /// Entries of block `block_num`, empty past the end
    pub fn block(&self, block_num: usize, block_size: usize) -> &[ManifestEntry] {
        let start = block_num.saturating_mul(block_size).min(self.entries.len());
        let end = start.saturating_add(block_size).min(self.entries.len());
        &self.entries[start..end]
    }
}

fn parse(text: &str, base: &Path) -> Result<(Vec<ManifestEntry>, usize)> {
    let mut entries = Vec::new();
    let mut columns = 0;

    for (line_no, line) in text.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let fields: Vec<&str> = line.split(',').map(str::trim).collect();
        if columns == 0 {
            columns = fields.len();
        } else if fields.len() != columns {
            return Err(LoaderError::Config(format!(
                "at line: {}, manifest file has a line with differing number of files ({} vs {})",
                line_no,
                fields.len(),
                columns
            )));
        }
        if fields.iter().any(|f| f.is_empty()) {
            return Err(LoaderError::Config(format!(
                "at line: {}, manifest file has an empty file name",
                line_no
            )));
        }

        let mut paths = fields.into_iter().map(|f| base.join(f));
        let object = paths.next().unwrap_or_default();
        entries.push(ManifestEntry {
            object,
            targets: paths.collect(),
        });
    }

    Ok((entries, columns))
}
