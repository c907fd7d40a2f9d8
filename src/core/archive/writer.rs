//! Streaming archive writer

use super::{
    padded, ArchiveHeader, RecordHeader, DATUM_PREFIX, HEADER_NAME, HEADER_SIZE, PAYLOAD_ALIGN,
    RECORD_HEADER_SIZE, TARGET_PREFIX, TRAILER_NAME, TRAILER_SIZE,
};
use crate::buffer::BufferPair;
use crate::error::{LoaderError, Result};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

/// Appends record pairs to an archive
///
/// The header is written with empty tallies when the writer is created and
/// rewritten with the final counts and sizes by [`ArchiveWriter::close`].
/// Dropping a writer without closing it leaves an archive whose header
/// reports zero items, which readers reject at the trailer.
///
/// # Examples
///
/// ```
/// use macrobatch::core::archive::{ArchiveReader, ArchiveWriter, DATA_TYPE_RAW};
/// use std::io::Cursor;
///
/// let mut writer = ArchiveWriter::new(Cursor::new(Vec::new()), DATA_TYPE_RAW).unwrap();
/// writer.write(b"pixels", b"7").unwrap();
/// let bytes = writer.close().unwrap().into_inner();
///
/// let mut reader = ArchiveReader::new(Cursor::new(bytes)).unwrap();
/// assert_eq!(reader.header().item_count, 1);
/// assert_eq!(reader.read().unwrap().unwrap().object, b"pixels");
/// ```
pub struct ArchiveWriter<W: Write + Seek> {
    inner: W,
    header: ArchiveHeader,
    header_offset: u64,
    mtime: u32,
}

impl ArchiveWriter<BufWriter<File>> {
    /// Create (or truncate) an archive file
    pub fn create<P: AsRef<Path>>(path: P, data_type: [u8; 8]) -> Result<Self> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Self::new(BufWriter::new(file), data_type)
    }
}

impl<W: Write + Seek> ArchiveWriter<W> {
    /// Start an archive at the current position of `inner`
    pub fn new(mut inner: W, data_type: [u8; 8]) -> Result<Self> {
        let mtime = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or(0);

        let header = ArchiveHeader::new(data_type);
        let start = inner.stream_position()?;
        write_record(&mut inner, HEADER_NAME, &header.to_bytes(), mtime)?;
        let header_offset = start + (RECORD_HEADER_SIZE + padded(HEADER_NAME.len() + 1, 2)) as u64;

        Ok(ArchiveWriter {
            inner,
            header,
            header_offset,
            mtime,
        })
    }

    /// Append one record pair
    pub fn write(&mut self, datum: &[u8], target: &[u8]) -> Result<()> {
        let datum_size = payload_size(datum.len())?;
        let target_size = payload_size(target.len())?;
        let index = self.header.item_count;

        write_record(
            &mut self.inner,
            &format!("{}{}", DATUM_PREFIX, index),
            datum,
            self.mtime,
        )?;
        write_record(
            &mut self.inner,
            &format!("{}{}", TARGET_PREFIX, index),
            target,
            self.mtime,
        )?;

        self.header.item_count += 1;
        self.header.max_datum_size = self.header.max_datum_size.max(datum_size);
        self.header.max_target_size = self.header.max_target_size.max(target_size);
        self.header.total_data_size = self.header.total_data_size.saturating_add(datum_size);
        self.header.total_targets_size =
            self.header.total_targets_size.saturating_add(target_size);

        Ok(())
    }

    /// Append every pair of a block, in order
    pub fn write_all(&mut self, buffers: &BufferPair) -> Result<()> {
        for (datum, target) in buffers.objects.iter().zip(buffers.targets.iter()) {
            self.write(datum, target)?;
        }
        Ok(())
    }

    /// Tallies accumulated so far
    pub fn header(&self) -> &ArchiveHeader {
        &self.header
    }

    /// Write the trailer, commit the header tallies and hand back the sink
    pub fn close(mut self) -> Result<W> {
        write_record(
            &mut self.inner,
            TRAILER_NAME,
            &[0u8; TRAILER_SIZE],
            self.mtime,
        )?;
        let end = self.inner.stream_position()?;

        self.inner.seek(SeekFrom::Start(self.header_offset))?;
        self.inner.write_all(&self.header.to_bytes())?;
        self.inner.seek(SeekFrom::Start(end))?;
        self.inner.flush()?;

        Ok(self.inner)
    }
}

fn payload_size(len: usize) -> Result<u32> {
    if len > i32::MAX as usize {
        return Err(LoaderError::Format(format!(
            "record of {} bytes exceeds archive limit",
            len
        )));
    }
    Ok(len as u32)
}

fn write_record<W: Write>(out: &mut W, name: &str, payload: &[u8], mtime: u32) -> Result<()> {
    let header = RecordHeader::new(name, payload.len() as u32, mtime);
    out.write_all(&header.to_bytes())?;

    let mut name_bytes = Vec::with_capacity(header.name_span());
    name_bytes.extend_from_slice(name.as_bytes());
    name_bytes.resize(header.name_span(), 0);
    out.write_all(&name_bytes)?;

    out.write_all(payload)?;
    let pad = padded(payload.len(), PAYLOAD_ALIGN) - payload.len();
    if pad > 0 {
        out.write_all(&[0u8; PAYLOAD_ALIGN][..pad])?;
    }

    Ok(())
}
