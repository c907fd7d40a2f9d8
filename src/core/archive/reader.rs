//! Streaming archive reader

use super::{
    read_exact_or_truncated, ArchiveHeader, RecordHeader, DATUM_PREFIX, HEADER_NAME, HEADER_SIZE,
    RECORD_HEADER_SIZE, TARGET_PREFIX, TRAILER_NAME, TRAILER_SIZE,
};
use crate::buffer::{BufferPair, RecordPair};
use crate::error::{LoaderError, Result};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

/// Reads record pairs back in archive order
///
/// Any structural problem (bad magic, oversized record, short read, item
/// count disagreeing with the header) is reported as
/// [`LoaderError::Format`]. No partial record is ever returned.
pub struct ArchiveReader<R: Read> {
    inner: R,
    header: ArchiveHeader,
    items_read: u32,
    finished: bool,
}

impl ArchiveReader<BufReader<File>> {
    /// Open an archive file and validate its header
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        Self::new(BufReader::new(file))
    }

    /// Header-only read, for sizing destination buffers
    pub fn read_header<P: AsRef<Path>>(path: P) -> Result<ArchiveHeader> {
        Ok(*Self::open(path)?.header())
    }
}

impl<R: Read> ArchiveReader<R> {
    pub fn new(mut inner: R) -> Result<Self> {
        let (name, payload) = read_record(&mut inner, HEADER_SIZE as u32)?;
        if name != HEADER_NAME {
            return Err(LoaderError::Format(format!(
                "expected archive header record, found '{}'",
                name
            )));
        }
        let header = ArchiveHeader::from_bytes(&payload)?;

        Ok(ArchiveReader {
            inner,
            header,
            items_read: 0,
            finished: false,
        })
    }

    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    pub fn item_count(&self) -> u32 {
        self.header.item_count
    }

    pub fn max_datum_size(&self) -> u32 {
        self.header.max_datum_size
    }

    pub fn max_target_size(&self) -> u32 {
        self.header.max_target_size
    }

    /// Next record pair, or `None` once the trailer has been consumed
    pub fn read(&mut self) -> Result<Option<RecordPair>> {
        if self.finished {
            return Ok(None);
        }

        let limit = self.header.max_datum_size.max(TRAILER_SIZE as u32);
        let (name, object) = read_record(&mut self.inner, limit)?;

        if name == TRAILER_NAME {
            self.finished = true;
            if self.items_read != self.header.item_count {
                return Err(LoaderError::Format(format!(
                    "archive declares {} items but contains {}",
                    self.header.item_count, self.items_read
                )));
            }
            return Ok(None);
        }

        if self.items_read >= self.header.item_count {
            return Err(LoaderError::Format(format!(
                "archive contains more than the {} declared items",
                self.header.item_count
            )));
        }
        expect_prefix(&name, DATUM_PREFIX)?;
        if object.len() > self.header.max_datum_size as usize {
            return Err(LoaderError::Format(format!(
                "record '{}' exceeds declared maximum datum size",
                name
            )));
        }

        let (name, target) = read_record(&mut self.inner, self.header.max_target_size)?;
        expect_prefix(&name, TARGET_PREFIX)?;

        self.items_read += 1;
        Ok(Some(RecordPair { object, target }))
    }

    /// Append every remaining pair to `dest`, returning how many were read
    pub fn read_into(&mut self, dest: &mut BufferPair) -> Result<usize> {
        let mut count = 0;
        while let Some(pair) = self.read()? {
            dest.push(pair);
            count += 1;
        }
        Ok(count)
    }
}

fn expect_prefix(name: &str, prefix: &str) -> Result<()> {
    if name.starts_with(prefix) {
        Ok(())
    } else {
        Err(LoaderError::Format(format!(
            "expected '{}' record, found '{}'",
            prefix, name
        )))
    }
}

fn read_record<R: Read>(reader: &mut R, max_payload: u32) -> Result<(String, Vec<u8>)> {
    let mut raw = [0u8; RECORD_HEADER_SIZE];
    read_exact_or_truncated(reader, &mut raw, "record header")?;
    let header = RecordHeader::from_bytes(&raw)?;

    let mut name = vec![0u8; header.name_span()];
    read_exact_or_truncated(reader, &mut name, "record name")?;
    let name_len = header.namesize as usize - 1;
    if name[name_len] != 0 {
        return Err(LoaderError::Format("record name is not terminated".into()));
    }
    name.truncate(name_len);
    let name = String::from_utf8(name)
        .map_err(|_| LoaderError::Format("record name is not valid UTF-8".into()))?;

    if header.filesize > max_payload {
        return Err(LoaderError::Format(format!(
            "record '{}' of {} bytes exceeds limit of {}",
            name, header.filesize, max_payload
        )));
    }

    let mut payload = vec![0u8; header.payload_span()];
    read_exact_or_truncated(reader, &mut payload, "record body")?;
    payload.truncate(header.filesize as usize);

    Ok((name, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{ArchiveWriter, DATA_TYPE_RAW};
    use std::io::Cursor;

    fn build(pairs: &[(&[u8], &[u8])]) -> Vec<u8> {
        let mut writer = ArchiveWriter::new(Cursor::new(Vec::new()), DATA_TYPE_RAW).unwrap();
        for (datum, target) in pairs {
            writer.write(datum, target).unwrap();
        }
        writer.close().unwrap().into_inner()
    }

    #[test]
    fn test_round_trip_order() {
        let bytes = build(&[(b"first", b"1"), (b"", b""), (b"third-object", b"333")]);
        let mut reader = ArchiveReader::new(Cursor::new(bytes)).unwrap();

        assert_eq!(reader.item_count(), 3);
        assert_eq!(reader.max_datum_size(), 12);
        assert_eq!(reader.max_target_size(), 3);

        let mut dest = BufferPair::new();
        assert_eq!(reader.read_into(&mut dest).unwrap(), 3);
        assert_eq!(dest.pair(0).unwrap(), (&b"first"[..], &b"1"[..]));
        assert_eq!(dest.pair(1).unwrap(), (&b""[..], &b""[..]));
        assert_eq!(dest.pair(2).unwrap(), (&b"third-object"[..], &b"333"[..]));

        assert!(reader.read().unwrap().is_none());
    }

    #[test]
    fn test_empty_archive() {
        let bytes = build(&[]);
        let mut reader = ArchiveReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.item_count(), 0);
        assert!(reader.read().unwrap().is_none());
    }

    #[test]
    fn test_truncated_body_is_format_error() {
        let bytes = build(&[(b"0123456789", b"x")]);
        let cut = bytes.len() - 60;
        let mut reader = ArchiveReader::new(Cursor::new(bytes[..cut].to_vec())).unwrap();
        assert!(matches!(reader.read(), Err(LoaderError::Format(_))));
    }

    #[test]
    fn test_bad_magic_rejected_on_open() {
        let mut bytes = build(&[(b"a", b"b")]);
        let offset = RECORD_HEADER_SIZE + 8;
        bytes[offset..offset + 4].copy_from_slice(b"XXXX");
        assert!(matches!(
            ArchiveReader::new(Cursor::new(bytes)),
            Err(LoaderError::Format(_))
        ));
    }

    #[test]
    fn test_unclosed_archive_rejected() {
        let mut writer = ArchiveWriter::new(Cursor::new(Vec::new()), DATA_TYPE_RAW).unwrap();
        writer.write(b"abc", b"1").unwrap();
        // simulate a writer dropped before committing its tallies
        let bytes = {
            let header = *writer.header();
            assert_eq!(header.item_count, 1);
            let mut cursor = writer.close().unwrap();
            let offset = (RECORD_HEADER_SIZE + 8) as u64;
            cursor.set_position(offset);
            std::io::Write::write_all(
                &mut cursor,
                &ArchiveHeader::new(DATA_TYPE_RAW).to_bytes(),
            )
            .unwrap();
            cursor.into_inner()
        };

        let mut reader = ArchiveReader::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(reader.read(), Err(LoaderError::Format(_))));
    }

    #[test]
    fn test_header_only_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("block_3.cache");
        std::fs::write(&path, build(&[(b"abcdef", b"12")])).unwrap();

        let header = ArchiveReader::read_header(&path).unwrap();
        assert_eq!(header.item_count, 1);
        assert_eq!(header.max_datum_size, 6);
        assert_eq!(header.data_type_str(), "raw");
    }
}
