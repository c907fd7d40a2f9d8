use super::{BlockLoader, CacheKey};
use crate::buffer::{BufferPair, RecordPair};
use crate::error::{LoaderError, Result};
use crate::manifest::{Manifest, ManifestEntry};
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Reads blocks straight from the files a manifest names
///
/// Target bytes are the concatenation of every target column in order, so a
/// one-column manifest yields empty targets. With a subset percentage below
/// 100 only the leading `ceil(len * pct / 100)` records of each block are
/// returned.
pub struct FileBlockLoader {
    manifest: Arc<Manifest>,
    block_size: usize,
    subset_percent: u32,
}

impl FileBlockLoader {
    pub fn new(manifest: Arc<Manifest>, block_size: usize) -> Self {
        FileBlockLoader {
            manifest,
            block_size: block_size.max(1),
            subset_percent: 100,
        }
    }

    /// Keep only a leading share of each block (clamped to 1..=100)
    pub fn with_subset_percent(mut self, percent: u32) -> Self {
        self.subset_percent = percent.clamp(1, 100);
        self
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    fn subset_len(&self, len: usize) -> usize {
        (len * self.subset_percent as usize).div_ceil(100)
    }

    fn read_entry(entry: &ManifestEntry) -> Result<RecordPair> {
        let object = read_file(&entry.object)?;
        let mut target = Vec::new();
        for path in &entry.targets {
            target.extend_from_slice(&read_file(path)?);
        }
        Ok(RecordPair { object, target })
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>> {
    fs::read(path).map_err(|e| {
        LoaderError::Io(io::Error::new(
            e.kind(),
            format!("{}: {}", path.display(), e),
        ))
    })
}

impl BlockLoader for FileBlockLoader {
    fn load_block(&mut self, dest: &mut BufferPair, block_num: usize) -> Result<()> {
        let entries = self.manifest.block(block_num, self.block_size);
        let entries = &entries[..self.subset_len(entries.len())];
        debug!("Reading block {} ({} records) from disk", block_num, entries.len());

        // Read everything first so a failing file leaves `dest` untouched
        let pairs = entries
            .iter()
            .map(Self::read_entry)
            .collect::<Result<Vec<_>>>()?;
        for pair in pairs {
            dest.push(pair);
        }
        Ok(())
    }

    fn object_count(&self) -> usize {
        (0..self.block_count())
            .map(|n| self.subset_len(self.manifest.block(n, self.block_size).len()))
            .sum()
    }

    fn block_count(&self) -> usize {
        self.manifest.block_count(self.block_size)
    }

    fn block_size(&self) -> usize {
        self.block_size
    }

    fn cache_key(&self) -> Result<CacheKey> {
        // Same files in a different order or grouping are different blocks
        let mut hash = format!("{}-b{}", self.manifest.hash(), self.block_size);
        if let Some(seed) = self.manifest.shuffle_seed() {
            hash.push_str(&format!("-s{}", seed));
        }
        if self.subset_percent < 100 {
            hash.push_str(&format!("-subset{}", self.subset_percent));
        }
        Ok(CacheKey {
            hash,
            version: self.manifest.version()?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::ManifestOptions;
    use std::path::PathBuf;

    fn fixture(dir: &Path, n: usize) -> PathBuf {
        let mut lines = String::new();
        for i in 0..n {
            fs::write(dir.join(format!("o{}", i)), format!("object {}", i)).unwrap();
            fs::write(dir.join(format!("t{}", i)), format!("{}", i)).unwrap();
            lines.push_str(&format!("o{},t{}\n", i, i));
        }
        let path = dir.join("manifest.csv");
        fs::write(&path, lines).unwrap();
        path
    }

    #[test]
    fn test_load_block_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Arc::new(Manifest::open(fixture(dir.path(), 5)).unwrap());
        let mut loader = FileBlockLoader::new(manifest, 2);

        assert_eq!(loader.block_count(), 3);
        assert_eq!(loader.object_count(), 5);

        let mut dest = BufferPair::new();
        loader.load_block(&mut dest, 1).unwrap();
        assert_eq!(dest.len(), 2);
        assert_eq!(dest.pair(0).unwrap(), (&b"object 2"[..], &b"2"[..]));
        assert_eq!(dest.pair(1).unwrap(), (&b"object 3"[..], &b"3"[..]));

        dest.clear();
        loader.load_block(&mut dest, 2).unwrap();
        assert_eq!(dest.len(), 1);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let manifest_path = fixture(dir.path(), 3);
        fs::remove_file(dir.path().join("t1")).unwrap();

        let manifest = Arc::new(Manifest::open(manifest_path).unwrap());
        let mut loader = FileBlockLoader::new(manifest, 3);
        let mut dest = BufferPair::new();

        let err = loader.load_block(&mut dest, 0).unwrap_err();
        assert!(matches!(err, LoaderError::Io(_)));
        assert!(err.to_string().contains("t1"));
        assert!(dest.is_empty());
    }

    #[test]
    fn test_subset_percent() {
        let dir = tempfile::tempdir().unwrap();
        let manifest = Arc::new(Manifest::open(fixture(dir.path(), 10)).unwrap());
        let mut loader = FileBlockLoader::new(manifest, 4).with_subset_percent(50);

        // blocks of 4, 4, 2 keep 2, 2, 1
        assert_eq!(loader.object_count(), 5);
        let mut dest = BufferPair::new();
        loader.load_block(&mut dest, 2).unwrap();
        assert_eq!(dest.len(), 1);
        assert!(loader.cache_key().unwrap().hash.ends_with("-subset50"));
    }

    #[test]
    fn test_cache_key_tracks_grouping() {
        let dir = tempfile::tempdir().unwrap();
        let path = fixture(dir.path(), 6);
        let manifest = Arc::new(Manifest::open(&path).unwrap());

        let by_two = FileBlockLoader::new(Arc::clone(&manifest), 2).cache_key().unwrap();
        let by_three = FileBlockLoader::new(Arc::clone(&manifest), 3).cache_key().unwrap();
        assert_ne!(by_two.hash, by_three.hash);
        assert!(by_two.hash.starts_with(manifest.hash()));
        assert!(by_two.hash.ends_with("-b2"));

        let shuffled = |seed| {
            let options = ManifestOptions {
                shuffle: true,
                random_seed: seed,
                root: None,
            };
            let manifest = Arc::new(Manifest::open_with(&path, &options).unwrap());
            FileBlockLoader::new(manifest, 2).cache_key().unwrap().hash
        };
        assert_eq!(shuffled(7), shuffled(7));
        assert_ne!(shuffled(7), shuffled(8));
        assert!(shuffled(7).ends_with("-b2-s7"));
        assert_ne!(shuffled(7), by_two.hash);
    }

    #[test]
    fn test_concatenated_targets() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("o"), b"obj").unwrap();
        fs::write(dir.path().join("a"), b"AA").unwrap();
        fs::write(dir.path().join("b"), b"B").unwrap();
        let path = dir.path().join("m.csv");
        fs::write(&path, "o,a,b\n").unwrap();

        let manifest = Arc::new(Manifest::open(&path).unwrap());
        let mut loader = FileBlockLoader::new(manifest, 1);
        let mut dest = BufferPair::new();
        loader.load_block(&mut dest, 0).unwrap();
        assert_eq!(dest.pair(0).unwrap(), (&b"obj"[..], &b"AAB"[..]));
    }
}
