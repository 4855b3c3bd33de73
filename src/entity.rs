//! Typed entities decoded from record values.
//!
//! Every entity is an immutable value built once by decoding; equality is
//! field-wise. Decoders look fields up explicitly by their single-letter
//! on-wire codes, with declared defaults for optional fields — a required
//! field that is absent or mistyped fails the whole record.

use rmpv::Value;
use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use ulid::Ulid;

use crate::error::VofError;
use crate::header::Tag;
use crate::value::{map_get, value_bytes, RecordValue};

// ── ACL permission bits ──────────────────────────────────────────────────────

pub const PERM_READ: u64 = 1;
pub const PERM_WRITE: u64 = 2;
pub const PERM_READ_ACL: u64 = 4;
pub const PERM_WRITE_ACL: u64 = 8;

/// On-wire key of the delete-target identifier in a `vd` record. The real
/// key name has not been published by the format owner; until it is, this
/// placeholder keeps `vd` decoding fail-closed (the field reads as missing).
pub const DELETE_TARGET_KEY: &str = "?";

// ── Field lookup helpers ─────────────────────────────────────────────────────

fn req<'a>(map: &'a Value, entity: &'static str, field: &'static str) -> Result<&'a Value, VofError> {
    map_get(map, field).ok_or(VofError::MissingField { entity, field })
}

fn req_str(map: &Value, entity: &'static str, field: &'static str) -> Result<String, VofError> {
    req(map, entity, field)?
        .as_str()
        .map(str::to_owned)
        .ok_or(VofError::FieldType { entity, field })
}

fn opt_str(map: &Value, entity: &'static str, field: &'static str) -> Result<Option<String>, VofError> {
    match map_get(map, field) {
        None => Ok(None),
        Some(v) => v
            .as_str()
            .map(str::to_owned)
            .map(Some)
            .ok_or(VofError::FieldType { entity, field }),
    }
}

fn req_u64(map: &Value, entity: &'static str, field: &'static str) -> Result<u64, VofError> {
    req(map, entity, field)?
        .as_u64()
        .ok_or(VofError::FieldType { entity, field })
}

fn opt_u64(map: &Value, entity: &'static str, field: &'static str) -> Result<Option<u64>, VofError> {
    match map_get(map, field) {
        None => Ok(None),
        Some(v) => v.as_u64().map(Some).ok_or(VofError::FieldType { entity, field }),
    }
}

fn opt_bool(map: &Value, entity: &'static str, field: &'static str) -> Result<bool, VofError> {
    match map_get(map, field) {
        None => Ok(false),
        Some(v) => v.as_bool().ok_or(VofError::FieldType { entity, field }),
    }
}

fn req_bytes(map: &Value, entity: &'static str, field: &'static str) -> Result<Vec<u8>, VofError> {
    value_bytes(req(map, entity, field)?)
        .map(<[u8]>::to_vec)
        .ok_or(VofError::FieldType { entity, field })
}

fn opt_bytes(
    map: &Value,
    entity: &'static str,
    field: &'static str,
) -> Result<Option<Vec<u8>>, VofError> {
    match map_get(map, field) {
        None => Ok(None),
        Some(v) => value_bytes(v)
            .map(<[u8]>::to_vec)
            .map(Some)
            .ok_or(VofError::FieldType { entity, field }),
    }
}

fn opt_u64_seq(map: &Value, entity: &'static str, field: &'static str) -> Result<Vec<u64>, VofError> {
    let Some(v) = map_get(map, field) else {
        return Ok(Vec::new());
    };
    let items = v.as_array().ok_or(VofError::FieldType { entity, field })?;
    items
        .iter()
        .map(|item| item.as_u64().ok_or(VofError::FieldType { entity, field }))
        .collect()
}

fn opt_seq<'a>(
    map: &'a Value,
    entity: &'static str,
    field: &'static str,
) -> Result<&'a [Value], VofError> {
    match map_get(map, field) {
        None => Ok(&[]),
        Some(v) => v
            .as_array()
            .map(Vec::as_slice)
            .ok_or(VofError::FieldType { entity, field }),
    }
}

fn opt_str_map(
    map: &Value,
    entity: &'static str,
    field: &'static str,
) -> Result<HashMap<String, String>, VofError> {
    let Some(v) = map_get(map, field) else {
        return Ok(HashMap::new());
    };
    let Value::Map(entries) = v else {
        return Err(VofError::FieldType { entity, field });
    };
    entries
        .iter()
        .map(|(k, v)| {
            match (k.as_str(), v.as_str()) {
                (Some(k), Some(v)) => Ok((k.to_owned(), v.to_owned())),
                _ => Err(VofError::FieldType { entity, field }),
            }
        })
        .collect()
}

fn hex_bytes<S: Serializer>(bytes: &Vec<u8>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

fn hex_bytes_opt<S: Serializer>(
    bytes: &Option<Vec<u8>>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match bytes {
        Some(b) => serializer.serialize_some(&hex::encode(b)),
        None => serializer.serialize_none(),
    }
}

// ── VersionId ────────────────────────────────────────────────────────────────

/// Composite version identifier: bucket, object, and a sortable 128-bit
/// version ULID.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionId {
    pub bucket: String,
    pub object: String,
    pub version: Ulid,
}

impl VersionId {
    /// Parse the string form: a 26-character ULID, a separator, then
    /// `bucket/object` split on the first slash.
    pub fn parse(text: &str) -> Result<Self, VofError> {
        let ulid_text = text.get(..26).ok_or_else(|| VofError::InvalidIdentifier {
            text: text.to_owned(),
            reason: "shorter than the 26-character version prefix".to_owned(),
        })?;
        let version = Ulid::from_string(ulid_text).map_err(|e| VofError::InvalidIdentifier {
            text: text.to_owned(),
            reason: e.to_string(),
        })?;
        let name = text.get(27..).ok_or_else(|| VofError::InvalidIdentifier {
            text: text.to_owned(),
            reason: "missing bucket/object suffix".to_owned(),
        })?;
        let (bucket, object) = name.split_once('/').ok_or_else(|| VofError::InvalidIdentifier {
            text: text.to_owned(),
            reason: "missing '/' between bucket and object".to_owned(),
        })?;
        Ok(Self {
            bucket: bucket.to_owned(),
            object: object.to_owned(),
            version,
        })
    }

    /// Decode the map form: `b` (bucket), `o` (object), `v` (version text).
    pub fn from_map(map: &Value) -> Result<Self, VofError> {
        let text = req_str(map, "VersionId", "v")?;
        let version = Ulid::from_string(&text).map_err(|e| VofError::InvalidIdentifier {
            text,
            reason: e.to_string(),
        })?;
        Ok(Self {
            bucket: req_str(map, "VersionId", "b")?,
            object: req_str(map, "VersionId", "o")?,
            version,
        })
    }
}

impl fmt::Display for VersionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}/{}", self.version, self.bucket, self.object)
    }
}

// ── Range ────────────────────────────────────────────────────────────────────

/// Byte offset and length; defaults to `(0, 0)` when absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Range {
    pub start: u64,
    pub len: u64,
}

impl Range {
    /// Decode from map keys `s` (start) and `l` (length), both optional.
    pub fn from_map(map: &Value) -> Result<Self, VofError> {
        Ok(Self {
            start: opt_u64(map, "Range", "s")?.unwrap_or(0),
            len: opt_u64(map, "Range", "l")?.unwrap_or(0),
        })
    }

    pub fn end(&self) -> u64 {
        self.start + self.len
    }
}

fn opt_range(map: &Value, entity: &'static str, field: &'static str) -> Result<Range, VofError> {
    match map_get(map, field) {
        None => Ok(Range::default()),
        Some(v) => {
            if !matches!(v, Value::Map(_)) {
                return Err(VofError::FieldType { entity, field });
            }
            Range::from_map(v)
        }
    }
}

// ── PackEntry ────────────────────────────────────────────────────────────────

/// Locates one version's data within a pack: the range within the original
/// object, the range within the physical pack, and the per-block length
/// breakdown used to seek directly to block boundaries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackEntry {
    pub packid: Ulid,
    pub sourcerange: Range,
    pub packrange: Range,
    pub blocklens: Vec<u64>,
    pub sourcelens: Vec<u64>,
}

impl PackEntry {
    pub fn from_map(map: &Value) -> Result<Self, VofError> {
        let packid_text = req_str(map, "PackEntry", "p")?;
        let packid = Ulid::from_string(&packid_text).map_err(|e| VofError::InvalidIdentifier {
            text: packid_text,
            reason: e.to_string(),
        })?;
        Ok(Self {
            packid,
            sourcerange: opt_range(map, "PackEntry", "o")?,
            packrange: opt_range(map, "PackEntry", "t")?,
            blocklens: opt_u64_seq(map, "PackEntry", "E")?,
            sourcelens: opt_u64_seq(map, "PackEntry", "N")?,
        })
    }
}

fn pack_entries(seq: &[Value]) -> Result<Vec<PackEntry>, VofError> {
    seq.iter().map(PackEntry::from_map).collect()
}

// ── PackReference ────────────────────────────────────────────────────────────

/// Points at a pack-list record stored in another pack file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackReference {
    pub pack: String,
    pub packrange: Range,
}

impl PackReference {
    /// Decode from map keys `k` (target pack) and `r` (range of the stored
    /// pack list within it).
    pub fn from_map(map: &Value) -> Result<Self, VofError> {
        Ok(Self {
            pack: req_str(map, "PackReference", "k")?,
            packrange: opt_range(map, "PackReference", "r")?,
        })
    }
}

// ── ACL ──────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdType {
    User,
    Group,
}

/// One access-control entry; `permissions` combines the `PERM_*` bits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Acl {
    pub idtype: IdType,
    pub id: String,
    pub permissions: u64,
}

impl Acl {
    pub fn from_map(map: &Value) -> Result<Self, VofError> {
        let idtype = match req_u64(map, "Acl", "t")? {
            0 => IdType::User,
            1 => IdType::Group,
            _ => return Err(VofError::FieldType { entity: "Acl", field: "t" }),
        };
        Ok(Self {
            idtype,
            id: req_str(map, "Acl", "i")?,
            permissions: req_u64(map, "Acl", "p")?,
        })
    }
}

// ── CryptData ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CryptKind {
    None,
    CustomerKey,
    ServiceKey,
}

/// Encryption metadata carried by a version. Its presence only describes the
/// object; records whose *values* are encrypted are rejected upstream of
/// entity decoding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CryptData {
    pub kind: CryptKind,
    #[serde(serialize_with = "hex_bytes")]
    pub datakey: Vec<u8>,
    #[serde(serialize_with = "hex_bytes")]
    pub extra: Vec<u8>,
}

impl CryptData {
    pub fn from_map(map: &Value) -> Result<Self, VofError> {
        let kind = match req_u64(map, "CryptData", "x")? {
            0 => CryptKind::None,
            1 => CryptKind::CustomerKey,
            2 => CryptKind::ServiceKey,
            _ => return Err(VofError::FieldType { entity: "CryptData", field: "x" }),
        };
        Ok(Self {
            kind,
            datakey: req_bytes(map, "CryptData", "k")?,
            extra: req_bytes(map, "CryptData", "e")?,
        })
    }
}

// ── Clone ────────────────────────────────────────────────────────────────────

/// Resolved payload of a clone's raw data field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CloneData {
    /// The clone embeds its own pack entries.
    EmbeddedPacks(Vec<PackEntry>),
    /// The clone points at a pack list stored elsewhere.
    Reference(PackReference),
    /// Raw bytes that do not parse as structured data; kept verbatim.
    Opaque(#[serde(serialize_with = "hex_bytes")] Vec<u8>),
}

impl CloneData {
    /// Probe the raw data field. A blob that parses as a map with key `p`
    /// is an embedded pack list; one with key `R` is a pack reference;
    /// anything that fails to parse stays opaque — that is the normal
    /// branch for non-structured data, not an error.
    pub fn probe(raw: Vec<u8>) -> Result<Self, VofError> {
        let parsed = match rmpv::decode::read_value(&mut &raw[..]) {
            Ok(v) => v,
            Err(_) => return Ok(CloneData::Opaque(raw)),
        };
        if let Some(packs) = map_get(&parsed, "p") {
            let seq = packs.as_array().ok_or(VofError::FieldType {
                entity: "Clone",
                field: "p",
            })?;
            return Ok(CloneData::EmbeddedPacks(pack_entries(seq)?));
        }
        if let Some(reference) = map_get(&parsed, "R") {
            return Ok(CloneData::Reference(PackReference::from_map(reference)?));
        }
        Ok(CloneData::Opaque(raw))
    }
}

/// One physical replica of a version's data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Clone {
    pub pool: String,
    pub data: CloneData,
    pub flags: u64,
    pub blocklen: u64,
    pub len: u64,
}

impl Clone {
    pub fn from_map(map: &Value) -> Result<Self, VofError> {
        let raw = req_bytes(map, "Clone", "l")?;
        Ok(Self {
            pool: req_str(map, "Clone", "p")?,
            data: CloneData::probe(raw)?,
            flags: opt_u64(map, "Clone", "f")?.unwrap_or(0),
            blocklen: req_u64(map, "Clone", "B")?,
            len: req_u64(map, "Clone", "s")?,
        })
    }
}

// ── Block ────────────────────────────────────────────────────────────────────

/// One block of object data; the bytes come from the record's secondary part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Block {
    pub versionid: VersionId,
    #[serde(serialize_with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl Block {
    pub fn decode(value: RecordValue) -> Result<Self, VofError> {
        let versionid = VersionId::parse(&req_str(&value.primary, "Block", "I")?)?;
        Ok(Self {
            versionid,
            data: value.secondary,
        })
    }
}

// ── PackList ─────────────────────────────────────────────────────────────────

/// The stored list of packs holding one version's data. An empty `uploadid`
/// means the object was written with a single PUT.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PackList {
    pub versionid: VersionId,
    pub uploadid: String,
    pub packs: Vec<PackEntry>,
}

impl PackList {
    pub fn decode(value: RecordValue) -> Result<Self, VofError> {
        let primary = &value.primary;
        Ok(Self {
            versionid: VersionId::parse(&req_str(primary, "PackList", "I")?)?,
            uploadid: opt_str(primary, "PackList", "U")?.unwrap_or_default(),
            packs: pack_entries(opt_seq(primary, "PackList", "P")?)?,
        })
    }
}

// ── Version ──────────────────────────────────────────────────────────────────

/// A single version of an object. `data` is present only when the object is
/// small enough to store inline in the version record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Version {
    pub versionid: VersionId,
    pub owner: String,
    pub acls: Vec<Acl>,
    pub len: u64,
    pub etag: String,
    pub deletemarker: bool,
    pub nullversion: bool,
    pub crypt: Option<CryptData>,
    pub clones: Vec<Clone>,
    pub metadata: HashMap<String, String>,
    pub usermetadata: HashMap<String, String>,
    pub legalhold: bool,
    #[serde(serialize_with = "hex_bytes_opt")]
    pub data: Option<Vec<u8>>,
}

impl Version {
    pub fn decode(value: RecordValue) -> Result<Self, VofError> {
        let primary = &value.primary;
        let crypt = match map_get(primary, "C").or_else(|| map_get(primary, "c")) {
            Some(v) => Some(CryptData::from_map(v)?),
            None => None,
        };
        Ok(Self {
            versionid: VersionId::from_map(primary)?,
            owner: opt_str(primary, "Version", "w")?.unwrap_or_default(),
            acls: opt_seq(primary, "Version", "A")?
                .iter()
                .map(Acl::from_map)
                .collect::<Result<_, _>>()?,
            len: opt_u64(primary, "Version", "l")?.unwrap_or(0),
            etag: opt_str(primary, "Version", "e")?.unwrap_or_default(),
            deletemarker: opt_bool(primary, "Version", "d")?,
            nullversion: opt_bool(primary, "Version", "N")?,
            crypt,
            clones: opt_seq(primary, "Version", "p")?
                .iter()
                .map(Clone::from_map)
                .collect::<Result<_, _>>()?,
            metadata: opt_str_map(primary, "Version", "s")?,
            usermetadata: opt_str_map(primary, "Version", "m")?,
            legalhold: opt_bool(primary, "Version", "h")?,
            data: opt_bytes(primary, "Version", "D")?,
        })
    }
}

// ── VersionDelete ────────────────────────────────────────────────────────────

/// Deletion of a single version. Decoding stays fail-closed until the
/// on-wire name of the delete-target field is confirmed upstream; see
/// [`DELETE_TARGET_KEY`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VersionDelete {
    pub versionid: VersionId,
    pub deleteid: VersionId,
}

impl VersionDelete {
    pub fn decode(value: RecordValue) -> Result<Self, VofError> {
        let primary = &value.primary;
        let target = req(primary, "VersionDelete", DELETE_TARGET_KEY)?
            .as_str()
            .ok_or(VofError::FieldType {
                entity: "VersionDelete",
                field: DELETE_TARGET_KEY,
            })?;
        Ok(Self {
            versionid: VersionId::from_map(primary)?,
            deleteid: VersionId::parse(target)?,
        })
    }
}

// ── MetaFile ─────────────────────────────────────────────────────────────────

/// Marks the beginning of the first file of a full metadata dump; `oldest`
/// names the oldest file that belongs to the dump — earlier files are stale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetaFile {
    pub oldest: String,
}

impl MetaFile {
    pub fn decode(value: RecordValue) -> Result<Self, VofError> {
        Ok(Self {
            oldest: req_str(&value.primary, "MetaFile", "o")?,
        })
    }
}

// ── Record ───────────────────────────────────────────────────────────────────

/// Any decoded record, discriminated by its header tag.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Record {
    Block(Block),
    PackList(PackList),
    Version(Version),
    VersionDelete(VersionDelete),
    MetaFile(MetaFile),
}

impl Record {
    pub fn tag(&self) -> Tag {
        match self {
            Record::Block(_) => Tag::BLOCK,
            Record::PackList(_) => Tag::PACK_LIST,
            Record::Version(_) => Tag::VERSION,
            Record::VersionDelete(_) => Tag::VERSION_DELETE,
            Record::MetaFile(_) => Tag::META_FILE,
        }
    }

    pub fn versionid(&self) -> Option<&VersionId> {
        match self {
            Record::Block(b) => Some(&b.versionid),
            Record::PackList(p) => Some(&p.versionid),
            Record::Version(v) => Some(&v.versionid),
            Record::VersionDelete(d) => Some(&d.versionid),
            Record::MetaFile(_) => None,
        }
    }
}
