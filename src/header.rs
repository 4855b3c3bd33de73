use byteorder::{BigEndian, ByteOrder, ReadBytesExt};
use std::fmt;
use std::io::{self, Cursor, Read};

use crate::checksum::{content_hash, header_check};
use crate::error::VofError;

/// Fixed 8-byte magic opening every record header.
pub const MAGIC: [u8; 8] = [0x89, b'T', b'L', b'V', 0x0d, 0x0a, 0x1a, 0x0a];
/// Size of the fixed record header.
pub const HEADER_LEN: usize = 32;
/// The only supported format version.
pub const FORMAT_VERSION: u8 = 0;
/// Hash-type designator for the 64-bit xxhash content hash.
pub const HASH_TYPE_XXH64: u8 = 8;

/// 2-byte ASCII record-kind discriminator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Tag(pub [u8; 2]);

impl Tag {
    /// One block of object data; payload carries the data as its secondary part.
    pub const BLOCK: Tag = Tag(*b"bk");
    /// Pack list stored inside a data-pack file.
    pub const PACK_LIST: Tag = Tag(*b"ol");
    /// Object version metadata.
    pub const VERSION: Tag = Tag(*b"vm");
    /// Deletion of a single version.
    pub const VERSION_DELETE: Tag = Tag(*b"vd");
    /// Marker opening the first file of a full metadata dump.
    pub const META_FILE: Tag = Tag(*b"mf");
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.0))
    }
}

/// Validated 32-byte record header.
///
/// Layout, big-endian:
/// `magic(8) | data_len(8) | data_hash(8) | format_version(1) | tag(2) |
/// hash_type(1) | reserved(2) | header_check(2)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TlvHeader {
    pub data_len: u64,
    pub data_hash: u64,
    pub tag: Tag,
}

impl TlvHeader {
    /// Read and validate one header from `reader`. `offset` is the stream
    /// position of the header's first byte, used for error context only.
    ///
    /// Zero bytes at the record boundary is clean end-of-stream and returns
    /// `Ok(None)`; 1..=31 bytes is a fatal short read.
    pub fn read<R: Read>(reader: &mut R, offset: u64) -> Result<Option<Self>, VofError> {
        let mut buf = [0u8; HEADER_LEN];
        let got = read_fully(reader, &mut buf)?;
        if got == 0 {
            return Ok(None);
        }
        if got < HEADER_LEN {
            return Err(VofError::ShortRead {
                offset,
                needed: HEADER_LEN as u64,
                got: got as u64,
            });
        }
        Self::parse(&buf, offset).map(Some)
    }

    /// Validate a full 32-byte header buffer.
    pub fn parse(buf: &[u8; HEADER_LEN], offset: u64) -> Result<Self, VofError> {
        if buf[0..8] != MAGIC {
            let mut actual = [0u8; 8];
            actual.copy_from_slice(&buf[0..8]);
            return Err(VofError::BadMagic { offset, actual });
        }

        let mut cursor = Cursor::new(&buf[8..]);
        let data_len = cursor.read_u64::<BigEndian>().map_err(VofError::Io)?;
        let data_hash = cursor.read_u64::<BigEndian>().map_err(VofError::Io)?;
        let version = cursor.read_u8().map_err(VofError::Io)?;
        let mut tag = [0u8; 2];
        cursor.read_exact(&mut tag).map_err(VofError::Io)?;
        let hash_type = cursor.read_u8().map_err(VofError::Io)?;
        let stored = BigEndian::read_u16(&buf[30..32]);

        if version != FORMAT_VERSION {
            return Err(VofError::UnsupportedFormatVersion { offset, version });
        }
        if hash_type != HASH_TYPE_XXH64 {
            return Err(VofError::UnsupportedHashType { offset, hash_type });
        }
        let computed = header_check(&buf[0..30]);
        if stored != computed {
            return Err(VofError::HeaderCheckMismatch {
                offset,
                stored,
                computed,
            });
        }

        Ok(Self {
            data_len,
            data_hash,
            tag: Tag(tag),
        })
    }

    /// Build the 32-byte header framing `payload` under `tag`, with the
    /// payload hash and header self-check filled in.
    pub fn encode(tag: Tag, payload: &[u8]) -> [u8; HEADER_LEN] {
        let mut buf = [0u8; HEADER_LEN];
        buf[0..8].copy_from_slice(&MAGIC);
        BigEndian::write_u64(&mut buf[8..16], payload.len() as u64);
        BigEndian::write_u64(&mut buf[16..24], content_hash(payload));
        buf[24] = FORMAT_VERSION;
        buf[25..27].copy_from_slice(&tag.0);
        buf[27] = HASH_TYPE_XXH64;
        // buf[28..30] reserved, left zero
        let check = header_check(&buf[0..30]);
        BigEndian::write_u16(&mut buf[30..32], check);
        buf
    }
}

/// Read until `buf` is full or the stream ends; returns bytes read.
/// Unlike `read_exact`, a clean EOF before any byte is distinguishable.
pub(crate) fn read_fully<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize, io::Error> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
