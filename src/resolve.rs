//! Cross-file pack resolution.
//!
//! A version's clone may point at a pack list stored in another pack file
//! rather than embedding it. Following that [`PackReference`] crosses a file
//! boundary the scanner has no authority over, so it is a caller-driven
//! operation: open the named pack file, seek to the reference's range start,
//! decode exactly one record there.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::entity::{PackList, PackReference, Record};
use crate::error::VofError;
use crate::frame::read_frame;
use crate::header::{Tag, HEADER_LEN};
use crate::scan::{lookup, DecodeFn};
use crate::value::decode_value;

/// Decode exactly one record at `offset`. Unlike a scan loop, end-of-stream
/// here is an error — a reference pointing past the end of its pack file
/// means the reference (or the file) is damaged.
pub fn read_record_at<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
    table: &[(Tag, DecodeFn)],
) -> Result<Record, VofError> {
    reader.seek(SeekFrom::Start(offset))?;
    let frame = read_frame(reader, offset)?.ok_or(VofError::ShortRead {
        offset,
        needed: HEADER_LEN as u64,
        got: 0,
    })?;

    let tag = frame.header.tag;
    let decode = lookup(table, tag, offset)?;
    let value = decode_value(&frame.payload, offset)?;
    decode(value).map_err(|e| VofError::RecordDecode {
        offset,
        tag,
        source: Box::new(e),
    })
}

fn decode_pack_list(value: crate::value::RecordValue) -> Result<Record, VofError> {
    PackList::decode(value).map(Record::PackList)
}

const PACK_LIST_TABLE: &[(Tag, DecodeFn)] = &[(Tag::PACK_LIST, decode_pack_list)];

/// Decode the pack-list record stored at `offset`. Any other record kind at
/// that position fails with an unknown-tag error.
pub fn read_pack_list_at<R: Read + Seek>(
    reader: &mut R,
    offset: u64,
) -> Result<PackList, VofError> {
    match read_record_at(reader, offset, PACK_LIST_TABLE)? {
        Record::PackList(list) => Ok(list),
        other => Err(VofError::UnknownTag {
            offset,
            tag: other.tag(),
        }),
    }
}

/// Follow a [`PackReference`]: open `<pack>.blk` under `dir`, seek to the
/// reference's range start, and decode the pack list stored there.
pub fn resolve_pack_reference(
    dir: &Path,
    reference: &PackReference,
) -> Result<PackList, VofError> {
    let path = dir.join(format!("{}.blk", reference.pack));
    tracing::debug!(pack = %reference.pack, offset = reference.packrange.start, "resolving pack reference");
    let mut file = File::open(path)?;
    read_pack_list_at(&mut file, reference.packrange.start)
}
