//! Property-based tests for the block archive
//!
//! Uses proptest to check that archives of arbitrary records read back
//! exactly and that the header tallies match the contents.

use macrobatch::core::archive::DATA_TYPE_RAW;
use macrobatch::{ArchiveReader, ArchiveWriter, BufferPair, RecordPair};
use proptest::prelude::*;
use std::io::Cursor;

fn records() -> impl Strategy<Value = Vec<(Vec<u8>, Vec<u8>)>> {
    prop::collection::vec(
        (
            prop::collection::vec(any::<u8>(), 0..300),
            prop::collection::vec(any::<u8>(), 0..20),
        ),
        0..40,
    )
}

proptest! {
    #[test]
    fn prop_records_survive_archive(records in records()) {
        let mut writer = ArchiveWriter::new(Cursor::new(Vec::new()), DATA_TYPE_RAW).unwrap();
        for (object, target) in &records {
            writer.write(object, target).unwrap();
        }
        let bytes = writer.close().unwrap().into_inner();

        let mut reader = ArchiveReader::new(Cursor::new(bytes)).unwrap();
        let header = *reader.header();
        let mut read = Vec::new();
        while let Some(pair) = reader.read().unwrap() {
            read.push(pair);
        }

        let expected: Vec<RecordPair> = records
            .iter()
            .map(|(o, t)| RecordPair::new(o.clone(), t.clone()))
            .collect();
        prop_assert_eq!(read, expected);

        prop_assert_eq!(header.item_count as usize, records.len());
        let max_datum = records.iter().map(|(o, _)| o.len()).max().unwrap_or(0);
        let max_target = records.iter().map(|(_, t)| t.len()).max().unwrap_or(0);
        prop_assert_eq!(header.max_datum_size as usize, max_datum);
        prop_assert_eq!(header.max_target_size as usize, max_target);
        let total: usize = records.iter().map(|(o, _)| o.len()).sum();
        prop_assert_eq!(header.total_data_size as usize, total);
    }

    #[test]
    fn prop_archive_length_is_even(records in records()) {
        let mut writer = ArchiveWriter::new(Cursor::new(Vec::new()), DATA_TYPE_RAW).unwrap();
        for (object, target) in &records {
            writer.write(object, target).unwrap();
        }
        let bytes = writer.close().unwrap().into_inner();
        prop_assert_eq!(bytes.len() % 2, 0);
    }

    #[test]
    fn prop_garbage_never_panics(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        // Errors are fine; panics and unbounded allocation are not
        if let Ok(mut reader) = ArchiveReader::new(Cursor::new(bytes)) {
            let mut dest = BufferPair::new();
            let _ = reader.read_into(&mut dest);
        }
    }

    #[test]
    fn prop_shuffle_keeps_pairs_together(
        count in 1usize..60,
        seed in any::<u32>(),
    ) {
        let mut block = BufferPair::new();
        for i in 0..count as u32 {
            block.push(RecordPair::new(i.to_le_bytes().to_vec(), vec![i as u8]));
        }
        block.shuffle(seed);

        let mut seen: Vec<u32> = (0..block.len())
            .map(|i| {
                let (object, target) = block.pair(i).unwrap();
                let id = u32::from_le_bytes([object[0], object[1], object[2], object[3]]);
                assert_eq!(target, &[id as u8]);
                id
            })
            .collect();
        seen.sort_unstable();
        prop_assert_eq!(seen, (0..count as u32).collect::<Vec<_>>());
    }
}
