use crate::header::Tag;
use std::io;
use thiserror::Error;

/// Every fatal condition a scan can hit. None of these are retried at this
/// layer; the first error aborts the current scan and the caller decides
/// whether to reopen at a recovered offset.
#[derive(Error, Debug)]
pub enum VofError {
    #[error("short read at offset {offset}: needed {needed} bytes, got {got}")]
    ShortRead { offset: u64, needed: u64, got: u64 },

    #[error("bad record magic at offset {offset}: got {actual:02x?}")]
    BadMagic { offset: u64, actual: [u8; 8] },

    #[error("unknown format version {version} at offset {offset}; only version 0 is supported")]
    UnsupportedFormatVersion { offset: u64, version: u8 },

    #[error("unsupported hash type {hash_type} at offset {offset}; only type 8 (xxhash64) is supported")]
    UnsupportedHashType { offset: u64, hash_type: u8 },

    #[error("header self-check mismatch at offset {offset}: stored {stored:#06x}, computed {computed:#06x}")]
    HeaderCheckMismatch { offset: u64, stored: u16, computed: u16 },

    #[error("payload hash mismatch for {tag} record at offset {offset}: stored {stored:#018x}, computed {computed:#018x}")]
    PayloadHashMismatch {
        offset: u64,
        tag: Tag,
        stored: u64,
        computed: u64,
    },

    /// The value envelope carries a `z` key. Decryption is out of scope;
    /// such records are rejected rather than partially decoded.
    #[error("record at offset {offset} holds an encrypted value; encrypted values are not supported")]
    EncryptedValue { offset: u64 },

    #[error("unknown record tag {tag} at offset {offset}; no decoder registered")]
    UnknownTag { offset: u64, tag: Tag },

    #[error("malformed {entity} record: missing field {field:?}")]
    MissingField {
        entity: &'static str,
        field: &'static str,
    },

    #[error("malformed {entity} record: field {field:?} has an unexpected type")]
    FieldType {
        entity: &'static str,
        field: &'static str,
    },

    #[error("invalid sortable identifier {text:?}: {reason}")]
    InvalidIdentifier { text: String, reason: String },

    #[error("secondary segment of {declared} bytes exceeds the {payload_len}-byte payload at offset {offset}")]
    SecondaryOverrun {
        offset: u64,
        declared: u64,
        payload_len: u64,
    },

    #[error("failed to decode {tag} record at offset {offset}: {source}")]
    RecordDecode {
        offset: u64,
        tag: Tag,
        #[source]
        source: Box<VofError>,
    },

    #[error("malformed record value: {0}")]
    MalformedValue(#[from] rmpv::decode::Error),

    #[error("value encoding failed: {0}")]
    ValueEncode(#[from] rmpv::encode::Error),

    #[error("zstd decompression failed: {0}")]
    Decompress(#[source] io::Error),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}
