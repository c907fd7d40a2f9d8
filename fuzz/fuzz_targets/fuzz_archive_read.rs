#![no_main]
use libfuzzer_sys::fuzz_target;
use macrobatch::{ArchiveReader, BufferPair};
use std::io::Cursor;

// Arbitrary bytes must be rejected with an error, never a panic
fuzz_target!(|data: &[u8]| {
    let mut reader = match ArchiveReader::new(Cursor::new(data)) {
        Ok(r) => r,
        Err(_) => return,
    };

    let mut dest = BufferPair::new();
    if let Ok(count) = reader.read_into(&mut dest) {
        assert_eq!(count as u32, reader.item_count());
        assert_eq!(dest.len(), count);
    }
});
