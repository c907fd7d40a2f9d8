//! Binary block archive
//!
//! One archive holds one block of record pairs. The container is a run of
//! old-binary cpio records so generic archive tools can list it:
//!
//! ```text
//! [record "cpiohdr"]    64-byte ArchiveHeader
//! [record "cpiodtm<i>"] object bytes, padded to 4 bytes   } item_count times
//! [record "cpiotgt<i>"] target bytes, padded to 4 bytes   }
//! [record "TRAILER!!!"] 16-byte reserved trailer
//! ```
//!
//! All integers are little-endian. Header tallies are written as zeros first
//! and patched in place when the writer is closed.

pub mod pack;
pub mod reader;
pub mod writer;

pub use pack::{block_file_name, pack_blocks, pack_manifest, PackSummary};
pub use reader::ArchiveReader;
pub use writer::ArchiveWriter;

use crate::error::{LoaderError, Result};
use std::io::{self, Read};

pub const MAGIC: [u8; 4] = *b"MACR";
pub const FORMAT_VERSION: u32 = 1;
pub const WRITER_VERSION: u32 = 1;
pub const HEADER_SIZE: usize = 64;
pub const TRAILER_SIZE: usize = 16;

/// Data-type tag written by the block cache
pub const DATA_TYPE_RAW: [u8; 8] = *b"raw\0\0\0\0\0";

pub(crate) const HEADER_NAME: &str = "cpiohdr";
pub(crate) const DATUM_PREFIX: &str = "cpiodtm";
pub(crate) const TARGET_PREFIX: &str = "cpiotgt";
pub(crate) const TRAILER_NAME: &str = "TRAILER!!!";

pub(crate) const RECORD_MAGIC: u16 = 0o070707;
pub(crate) const RECORD_MODE: u16 = 0o100644;
pub(crate) const RECORD_HEADER_SIZE: usize = 26;
pub(crate) const MAX_NAME_SIZE: u16 = 256;
pub(crate) const PAYLOAD_ALIGN: usize = 4;

/// Archive header, carried as the payload of the first record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ArchiveHeader {
    /// Magic number: "MACR"
    pub magic: [u8; 4],

    pub format_version: u32,
    pub writer_version: u32,

    /// Free-form tag describing the payload
    pub data_type: [u8; 8],

    /// Number of record pairs
    pub item_count: u32,

    /// Largest object payload in the archive
    pub max_datum_size: u32,

    /// Largest target payload in the archive
    pub max_target_size: u32,

    pub total_data_size: u32,
    pub total_targets_size: u32,

    pub reserved: [u8; 24],
}

impl ArchiveHeader {
    pub fn new(data_type: [u8; 8]) -> Self {
        ArchiveHeader {
            magic: MAGIC,
            format_version: FORMAT_VERSION,
            writer_version: WRITER_VERSION,
            data_type,
            item_count: 0,
            max_datum_size: 0,
            max_target_size: 0,
            total_data_size: 0,
            total_targets_size: 0,
            reserved: [0; 24],
        }
    }

    /// Validate magic and versions
    pub fn validate(&self) -> Result<()> {
        if self.magic != MAGIC {
            return Err(LoaderError::Format(format!(
                "invalid archive magic {:?}",
                String::from_utf8_lossy(&self.magic)
            )));
        }

        if self.format_version != FORMAT_VERSION {
            return Err(LoaderError::Format(format!(
                "unsupported format version {}",
                self.format_version
            )));
        }

        if self.writer_version != WRITER_VERSION {
            return Err(LoaderError::Format(format!(
                "unsupported writer version {}",
                self.writer_version
            )));
        }

        Ok(())
    }

    /// Data-type tag with trailing NULs removed
    pub fn data_type_str(&self) -> String {
        let end = self
            .data_type
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.data_type.len());
        String::from_utf8_lossy(&self.data_type[..end]).into_owned()
    }

    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4..8].copy_from_slice(&self.format_version.to_le_bytes());
        bytes[8..12].copy_from_slice(&self.writer_version.to_le_bytes());
        bytes[12..20].copy_from_slice(&self.data_type);
        bytes[20..24].copy_from_slice(&self.item_count.to_le_bytes());
        bytes[24..28].copy_from_slice(&self.max_datum_size.to_le_bytes());
        bytes[28..32].copy_from_slice(&self.max_target_size.to_le_bytes());
        bytes[32..36].copy_from_slice(&self.total_data_size.to_le_bytes());
        bytes[36..40].copy_from_slice(&self.total_targets_size.to_le_bytes());
        bytes[40..64].copy_from_slice(&self.reserved);
        bytes
    }

    /// Decode and validate a header
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < HEADER_SIZE {
            return Err(LoaderError::Format(format!(
                "archive header truncated: {} of {} bytes",
                bytes.len(),
                HEADER_SIZE
            )));
        }

        let u32_at = |offset: usize| {
            u32::from_le_bytes([
                bytes[offset],
                bytes[offset + 1],
                bytes[offset + 2],
                bytes[offset + 3],
            ])
        };

        let mut header = ArchiveHeader::new([0; 8]);
        header.magic.copy_from_slice(&bytes[0..4]);
        header.format_version = u32_at(4);
        header.writer_version = u32_at(8);
        header.data_type.copy_from_slice(&bytes[12..20]);
        header.item_count = u32_at(20);
        header.max_datum_size = u32_at(24);
        header.max_target_size = u32_at(28);
        header.total_data_size = u32_at(32);
        header.total_targets_size = u32_at(36);
        header.reserved.copy_from_slice(&bytes[40..64]);

        header.validate()?;

        Ok(header)
    }
}

/// Old-binary cpio record header
///
/// Only `mtime`, `namesize` and `filesize` carry information. The remaining
/// fields are fixed placeholders so external tools accept the file. Two-word
/// fields store the high half first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RecordHeader {
    pub magic: u16,
    pub dev: u16,
    pub ino: u16,
    pub mode: u16,
    pub uid: u16,
    pub gid: u16,
    pub nlink: u16,
    pub rdev: u16,
    pub mtime: u32,
    pub namesize: u16,
    pub filesize: u32,
}

impl RecordHeader {
    pub fn new(name: &str, filesize: u32, mtime: u32) -> Self {
        RecordHeader {
            magic: RECORD_MAGIC,
            dev: 0,
            ino: 0,
            mode: RECORD_MODE,
            uid: 0,
            gid: 0,
            nlink: 1,
            rdev: 0,
            mtime,
            namesize: (name.len() + 1) as u16,
            filesize,
        }
    }

    pub fn to_bytes(&self) -> [u8; RECORD_HEADER_SIZE] {
        let words = [
            self.magic,
            self.dev,
            self.ino,
            self.mode,
            self.uid,
            self.gid,
            self.nlink,
            self.rdev,
            (self.mtime >> 16) as u16,
            self.mtime as u16,
            self.namesize,
            (self.filesize >> 16) as u16,
            self.filesize as u16,
        ];

        let mut bytes = [0u8; RECORD_HEADER_SIZE];
        for (chunk, word) in bytes.chunks_exact_mut(2).zip(words) {
            chunk.copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    pub fn from_bytes(bytes: &[u8; RECORD_HEADER_SIZE]) -> Result<Self> {
        let mut words = [0u16; 13];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(2)) {
            *word = u16::from_le_bytes([chunk[0], chunk[1]]);
        }

        let header = RecordHeader {
            magic: words[0],
            dev: words[1],
            ino: words[2],
            mode: words[3],
            uid: words[4],
            gid: words[5],
            nlink: words[6],
            rdev: words[7],
            mtime: ((words[8] as u32) << 16) | words[9] as u32,
            namesize: words[10],
            filesize: ((words[11] as u32) << 16) | words[12] as u32,
        };

        if header.magic != RECORD_MAGIC {
            return Err(LoaderError::Format(format!(
                "invalid record magic {:#o}",
                header.magic
            )));
        }
        if header.namesize == 0 || header.namesize > MAX_NAME_SIZE {
            return Err(LoaderError::Format(format!(
                "invalid record name size {}",
                header.namesize
            )));
        }
        if header.filesize > i32::MAX as u32 {
            return Err(LoaderError::Format(format!(
                "invalid record size {}",
                header.filesize
            )));
        }

        Ok(header)
    }

    /// Bytes of name plus padding that follow the header
    pub fn name_span(&self) -> usize {
        padded(self.namesize as usize, 2)
    }

    /// Bytes of payload plus padding that follow the name
    pub fn payload_span(&self) -> usize {
        padded(self.filesize as usize, PAYLOAD_ALIGN)
    }
}

pub(crate) fn padded(len: usize, align: usize) -> usize {
    len.div_ceil(align) * align
}

/// `read_exact` that reports a short read as a truncated archive
pub(crate) fn read_exact_or_truncated<R: Read>(
    reader: &mut R,
    buf: &mut [u8],
    what: &str,
) -> Result<()> {
    reader.read_exact(buf).map_err(|e| match e.kind() {
        io::ErrorKind::UnexpectedEof => {
            LoaderError::Format(format!("archive truncated while reading {}", what))
        }
        _ => LoaderError::Io(e),
    })
}
