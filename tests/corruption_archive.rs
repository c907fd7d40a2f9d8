//! Archive corruption detection tests
//!
//! Every kind of damage must surface as `LoaderError::Format`, never as a
//! panic or a silently short block, and the block cache must replace a
//! damaged entry with a fresh copy.

use macrobatch::core::archive::DATA_TYPE_RAW;
use macrobatch::{
    ArchiveReader, ArchiveWriter, BlockCache, BlockLoader, BufferPair, FileBlockLoader,
    LoaderError, Manifest,
};
use std::fs::{self, OpenOptions};
use std::io::{Cursor, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::Arc;

/// Record header (26) + "cpiohdr\0" (8)
const HEADER_PAYLOAD_OFFSET: u64 = 34;

fn sample_archive() -> Vec<u8> {
    let mut writer = ArchiveWriter::new(Cursor::new(Vec::new()), DATA_TYPE_RAW).unwrap();
    for i in 0..5u8 {
        writer.write(&vec![i; 10 + i as usize], &[i]).unwrap();
    }
    writer.close().unwrap().into_inner()
}

fn read_all(bytes: Vec<u8>) -> Result<BufferPair, LoaderError> {
    let mut dest = BufferPair::new();
    ArchiveReader::new(Cursor::new(bytes))?.read_into(&mut dest)?;
    Ok(dest)
}

fn corrupt_at(path: &Path, offset: u64, bytes: &[u8]) {
    let mut file = OpenOptions::new().write(true).open(path).unwrap();
    file.seek(SeekFrom::Start(offset)).unwrap();
    file.write_all(bytes).unwrap();
    file.flush().unwrap();
}

#[test]
fn test_intact_archive_reads_back() {
    let block = read_all(sample_archive()).unwrap();
    assert_eq!(block.len(), 5);
    assert_eq!(block.pair(4), Some((&[4u8; 14][..], &[4u8][..])));
}

#[test]
fn test_bad_record_magic() {
    let mut bytes = sample_archive();
    bytes[0] ^= 0xFF;
    assert!(matches!(read_all(bytes), Err(LoaderError::Format(_))));
}

#[test]
fn test_bad_archive_magic() {
    let mut bytes = sample_archive();
    bytes[HEADER_PAYLOAD_OFFSET as usize..][..4].copy_from_slice(b"XXXX");
    assert!(matches!(read_all(bytes), Err(LoaderError::Format(_))));
}

#[test]
fn test_truncation_at_every_length() {
    let bytes = sample_archive();
    for len in 0..bytes.len() {
        let result = read_all(bytes[..len].to_vec());
        assert!(
            matches!(result, Err(LoaderError::Format(_))),
            "truncation to {} bytes was not detected",
            len
        );
    }
}

#[test]
fn test_inflated_item_count() {
    let mut bytes = sample_archive();
    // item_count follows magic, two versions and the data type
    let offset = HEADER_PAYLOAD_OFFSET as usize + 4 + 4 + 4 + 8;
    bytes[offset..offset + 4].copy_from_slice(&9u32.to_le_bytes());
    assert!(matches!(read_all(bytes), Err(LoaderError::Format(_))));
}

#[test]
fn test_corrupt_cache_entry_is_replaced() {
    let dir = tempfile::tempdir().unwrap();
    let mut lines = String::new();
    for i in 0..3 {
        fs::write(dir.path().join(format!("o{}", i)), vec![i as u8; 32]).unwrap();
        fs::write(dir.path().join(format!("t{}", i)), [i as u8]).unwrap();
        lines.push_str(&format!("o{},t{}\n", i, i));
    }
    let manifest_path = dir.path().join("m.csv");
    fs::write(&manifest_path, lines).unwrap();

    let manifest = Manifest::open(&manifest_path).unwrap();
    let loader = FileBlockLoader::new(Arc::new(manifest), 3);
    let mut cache = BlockCache::new(loader, dir.path().join("cache"));

    let mut first = BufferPair::new();
    cache.load_block(&mut first, 0).unwrap();

    let archive = cache.block_path(0).unwrap();
    let len = fs::metadata(&archive).unwrap().len();
    OpenOptions::new()
        .write(true)
        .open(&archive)
        .unwrap()
        .set_len(len / 2)
        .unwrap();

    let mut second = BufferPair::new();
    cache.load_block(&mut second, 0).unwrap();
    assert_eq!(first, second);
    assert_eq!(cache.stats().repairs, 1);
    assert_eq!(cache.stats().misses, 2);

    // Garbage in the header record is handled the same way
    corrupt_at(&archive, 0, &[0xFF; 8]);
    let mut third = BufferPair::new();
    cache.load_block(&mut third, 0).unwrap();
    assert_eq!(first, third);
    assert_eq!(cache.stats().repairs, 2);
}
