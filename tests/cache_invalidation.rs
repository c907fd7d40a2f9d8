//! Block cache keying tests
//!
//! Editing the manifest changes its hash and touching it changes its
//! version; either must send the cache to a fresh directory. So must a
//! different block size over an unchanged manifest.

use macrobatch::{
    BlockCache, BlockLoader, BufferPair, FileBlockLoader, Loader, LoaderConfig, Manifest,
    ProviderConfig,
};
use serde_json::json;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

fn write_dataset(dir: &Path, n: usize) -> PathBuf {
    let mut lines = String::new();
    for i in 0..n {
        let object = dir.join(format!("obj_{}.bin", i));
        let target = dir.join(format!("tgt_{}.bin", i));
        fs::write(&object, format!("object-{}", i)).unwrap();
        fs::write(&target, format!("target-{}", i)).unwrap();
        lines.push_str(&format!("obj_{}.bin,tgt_{}.bin\n", i, i));
    }
    let manifest = dir.join("manifest.csv");
    fs::write(&manifest, lines).unwrap();
    manifest
}

fn cache_for(manifest: &Path, root: &Path, block_size: usize) -> BlockCache<FileBlockLoader> {
    let manifest = Manifest::open(manifest).unwrap();
    BlockCache::new(FileBlockLoader::new(Arc::new(manifest), block_size), root)
}

fn load(cache: &mut BlockCache<FileBlockLoader>, block: usize) -> BufferPair {
    let mut dest = BufferPair::new();
    cache.load_block(&mut dest, block).unwrap();
    dest
}

#[test]
fn test_cache_layout() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_dataset(dir.path(), 6);
    let root = dir.path().join("cache");
    let mut cache = cache_for(&manifest, &root, 4);

    let block = load(&mut cache, 1);
    assert_eq!(block.len(), 2);
    assert_eq!(block.pair(0), Some((&b"object-4"[..], &b"target-4"[..])));

    let key = cache.cache_key().unwrap();
    let path = cache.block_path(1).unwrap();
    assert_eq!(path, root.join(key.dir_name()).join("block_1.cache"));
    assert!(path.exists());
    assert!(!cache.block_path(0).unwrap().exists());
}

#[test]
fn test_edited_manifest_uses_new_directory() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_dataset(dir.path(), 4);
    let root = dir.path().join("cache");

    let mut cache = cache_for(&manifest, &root, 2);
    load(&mut cache, 0);
    let old_dir = root.join(cache.cache_key().unwrap().dir_name());

    // Drop the first record
    let text = fs::read_to_string(&manifest).unwrap();
    let edited: String = text.lines().skip(1).map(|l| format!("{}\n", l)).collect();
    fs::write(&manifest, edited).unwrap();

    let mut cache = cache_for(&manifest, &root, 2);
    let block = load(&mut cache, 0);
    let new_dir = root.join(cache.cache_key().unwrap().dir_name());

    assert_ne!(old_dir, new_dir);
    assert_eq!(block.pair(0), Some((&b"object-1"[..], &b"target-1"[..])));
    assert_eq!(cache.stats().misses, 1);
    assert_eq!(cache.stats().hits, 0);
}

#[test]
fn test_touched_manifest_uses_new_directory() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_dataset(dir.path(), 4);
    let root = dir.path().join("cache");
    let mut cache = cache_for(&manifest, &root, 2);

    load(&mut cache, 0);
    load(&mut cache, 0);
    assert_eq!(cache.stats().misses, 1);
    assert_eq!(cache.stats().hits, 1);
    let before = cache.cache_key().unwrap();

    let later = SystemTime::now() + Duration::from_secs(60);
    File::options()
        .write(true)
        .open(&manifest)
        .unwrap()
        .set_modified(later)
        .unwrap();

    // Same loader instance: the version is re-read on every lookup
    load(&mut cache, 0);
    let after = cache.cache_key().unwrap();
    assert_eq!(before.hash, after.hash);
    assert_ne!(before.version, after.version);
    assert_eq!(cache.stats().misses, 2);
}

#[test]
fn test_subset_has_its_own_directory() {
    let dir = tempfile::tempdir().unwrap();
    let manifest = write_dataset(dir.path(), 4);
    let root = dir.path().join("cache");

    let full = cache_for(&manifest, &root, 4);
    let manifest = Manifest::open(&manifest).unwrap();
    let half = BlockCache::new(
        FileBlockLoader::new(Arc::new(manifest), 4).with_subset_percent(50),
        &root,
    );

    assert_ne!(
        full.cache_key().unwrap().dir_name(),
        half.cache_key().unwrap().dir_name()
    );
    assert_eq!(half.object_count(), 2);
}

#[test]
fn test_block_size_change_uses_new_directory() {
    let dir = tempfile::tempdir().unwrap();
    let mut lines = String::new();
    for i in 0..4u8 {
        fs::write(dir.path().join(format!("o{}", i)), [i]).unwrap();
        fs::write(dir.path().join(format!("t{}", i)), [i]).unwrap();
        lines.push_str(&format!("o{},t{}\n", i, i));
    }
    let manifest = dir.path().join("m.csv");
    fs::write(&manifest, lines).unwrap();
    let root = dir.path().join("cache");

    let run = |block_size: usize, minibatch: usize, batches: usize| -> Vec<u8> {
        let config = LoaderConfig::builder(&manifest, minibatch)
            .macrobatch_size(block_size)
            .with_cache_directory(&root)
            .decode_threads(1)
            .provider(ProviderConfig {
                kind: "raw,raw".into(),
                data_config: json!({"output_len": 1}),
                target_config: json!({"output_len": 1}),
            })
            .build()
            .unwrap();
        let mut loader = Loader::new(config).unwrap();
        loader.start().unwrap();
        let mut data = Vec::new();
        for _ in 0..batches {
            data.extend_from_slice(loader.next().unwrap().data());
        }
        data
    };

    // One record per block warms block_0 and block_1
    assert_eq!(run(1, 1, 2), vec![0, 1]);
    // Whole manifest in one block must not reuse the one-record block_0
    assert_eq!(run(4, 4, 1), vec![0, 1, 2, 3]);

    let keys: Vec<_> = fs::read_dir(&root).unwrap().flatten().collect();
    assert_eq!(keys.len(), 2);
}
