pub mod checksum;
pub mod entity;
pub mod error;
pub mod frame;
pub mod header;
pub mod resolve;
pub mod scan;
pub mod value;

pub use checksum::{content_hash, header_check};
pub use entity::{Block, MetaFile, PackList, Record, Version, VersionDelete, VersionId};
pub use error::VofError;
pub use frame::{read_frame, write_frame, Frame};
pub use header::{Tag, TlvHeader};
pub use resolve::{read_pack_list_at, resolve_pack_reference};
pub use scan::Scanner;
pub use value::{decode_value, encode_value, RecordValue};
