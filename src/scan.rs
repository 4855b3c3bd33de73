//! Lazy record scanners over TLV byte streams.
//!
//! A [`Scanner`] pulls one record at a time: frame read, integrity check,
//! value decode, tag dispatch. It yields `(offset, Record)` pairs until the
//! stream ends cleanly at a record boundary, and stops permanently at the
//! first fatal error — the format offers no resynchronization point, so a
//! caller that wants to continue must reopen the stream at an offset it
//! trusts.
//!
//! The tag → decoder mapping is a table chosen at construction. A schema
//! revision that renames tags is a different table, not a different loop.

use std::io::Read;

use crate::entity::{Block, MetaFile, PackList, Record, Version, VersionDelete};
use crate::error::VofError;
use crate::frame::read_frame;
use crate::header::Tag;
use crate::value::{decode_value, RecordValue};

/// Decodes one record value into an entity.
pub type DecodeFn = fn(RecordValue) -> Result<Record, VofError>;

fn decode_block(value: RecordValue) -> Result<Record, VofError> {
    Block::decode(value).map(Record::Block)
}

fn decode_pack_list(value: RecordValue) -> Result<Record, VofError> {
    PackList::decode(value).map(Record::PackList)
}

fn decode_version(value: RecordValue) -> Result<Record, VofError> {
    Version::decode(value).map(Record::Version)
}

fn decode_version_delete(value: RecordValue) -> Result<Record, VofError> {
    VersionDelete::decode(value).map(Record::VersionDelete)
}

fn decode_meta_file(value: RecordValue) -> Result<Record, VofError> {
    MetaFile::decode(value).map(Record::MetaFile)
}

/// Record kinds that may appear in a standalone data-pack file.
pub const PACK_FILE_TABLE: &[(Tag, DecodeFn)] = &[
    (Tag::BLOCK, decode_block),
    (Tag::PACK_LIST, decode_pack_list),
];

/// Every record kind of the metadata format.
pub const METADATA_TABLE: &[(Tag, DecodeFn)] = &[
    (Tag::BLOCK, decode_block),
    (Tag::PACK_LIST, decode_pack_list),
    (Tag::VERSION, decode_version),
    (Tag::VERSION_DELETE, decode_version_delete),
    (Tag::META_FILE, decode_meta_file),
];

/// Look `tag` up in `table`; unknown tags are fatal — record meaning is not
/// guessable even though record length is self-describing.
pub(crate) fn lookup(
    table: &[(Tag, DecodeFn)],
    tag: Tag,
    offset: u64,
) -> Result<DecodeFn, VofError> {
    table
        .iter()
        .find(|(t, _)| *t == tag)
        .map(|(_, f)| *f)
        .ok_or(VofError::UnknownTag { offset, tag })
}

/// Single-pass pull scanner over a stream positioned at a record boundary.
///
/// Implements `Iterator<Item = Result<(u64, Record), VofError>>`, where the
/// `u64` is the record's byte offset from the scan start. The iterator ends
/// after clean end-of-stream or after yielding its first error.
pub struct Scanner<R: Read> {
    reader: R,
    table: &'static [(Tag, DecodeFn)],
    offset: u64,
    done: bool,
}

impl<R: Read> Scanner<R> {
    pub fn new(reader: R, table: &'static [(Tag, DecodeFn)]) -> Self {
        Self {
            reader,
            table,
            offset: 0,
            done: false,
        }
    }

    /// Scanner restricted to the record kinds of a standalone data-pack
    /// file (`bk`, `ol`).
    pub fn pack_file(reader: R) -> Self {
        Self::new(reader, PACK_FILE_TABLE)
    }

    /// Scanner over every record kind of the metadata format.
    pub fn metadata(reader: R) -> Self {
        Self::new(reader, METADATA_TABLE)
    }

    /// Byte offset of the next unread record boundary.
    pub fn position(&self) -> u64 {
        self.offset
    }

    fn next_record(&mut self) -> Result<Option<(u64, Record)>, VofError> {
        let at = self.offset;
        let Some(frame) = read_frame(&mut self.reader, at)? else {
            return Ok(None);
        };
        self.offset += frame.encoded_len();

        let tag = frame.header.tag;
        let decode = lookup(self.table, tag, at)?;
        let value = decode_value(&frame.payload, at)?;
        let record = decode(value).map_err(|e| VofError::RecordDecode {
            offset: at,
            tag,
            source: Box::new(e),
        })?;
        tracing::debug!(offset = at, tag = %tag, "decoded record");
        Ok(Some((at, record)))
    }
}

impl<R: Read> Iterator for Scanner<R> {
    type Item = Result<(u64, Record), VofError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match self.next_record() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
