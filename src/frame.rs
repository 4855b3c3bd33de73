//! One-record framing: a validated header followed by a checksummed payload.
//!
//! [`read_frame`] consumes exactly one record and leaves the stream
//! positioned at the start of the next, so back-to-back records can be read
//! in a loop. Integrity failures are fatal; there is no resynchronization —
//! a caller that wants to continue past corruption must reopen the stream
//! at an offset it trusts.

use std::io::{Read, Write};

use crate::checksum::content_hash;
use crate::error::VofError;
use crate::header::{read_fully, Tag, TlvHeader, HEADER_LEN};

/// One complete record: validated header plus integrity-checked payload.
#[derive(Debug, Clone)]
pub struct Frame {
    pub header: TlvHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    /// Total encoded size of this record, header included.
    pub fn encoded_len(&self) -> u64 {
        HEADER_LEN as u64 + self.payload.len() as u64
    }
}

/// Read one record starting at `offset` (the current stream position, used
/// for error context). Returns `Ok(None)` on clean end-of-stream at the
/// record boundary.
pub fn read_frame<R: Read>(reader: &mut R, offset: u64) -> Result<Option<Frame>, VofError> {
    let header = match TlvHeader::read(reader, offset)? {
        Some(h) => h,
        None => return Ok(None),
    };

    let mut payload = vec![0u8; header.data_len as usize];
    let got = read_fully(reader, &mut payload)?;
    if (got as u64) < header.data_len {
        return Err(VofError::ShortRead {
            offset: offset + HEADER_LEN as u64,
            needed: header.data_len,
            got: got as u64,
        });
    }

    let computed = content_hash(&payload);
    if computed != header.data_hash {
        return Err(VofError::PayloadHashMismatch {
            offset,
            tag: header.tag,
            stored: header.data_hash,
            computed,
        });
    }

    Ok(Some(Frame { header, payload }))
}

/// Write one record: header framing `payload` under `tag`, then the payload.
pub fn write_frame<W: Write>(writer: &mut W, tag: Tag, payload: &[u8]) -> Result<(), VofError> {
    writer.write_all(&TlvHeader::encode(tag, payload))?;
    writer.write_all(payload)?;
    Ok(())
}
