use rmpv::Value;
use std::io::Cursor;
use vof::entity::{CloneData, IdType, Range, Record, VersionDelete, DELETE_TARGET_KEY, PERM_READ, PERM_WRITE};
use vof::frame::{read_frame, write_frame};
use vof::header::{Tag, TlvHeader, HEADER_LEN, MAGIC};
use vof::resolve::{read_record_at, resolve_pack_reference};
use vof::scan::{Scanner, PACK_FILE_TABLE};
use vof::value::{decode_value, encode_value, RecordValue};
use vof::VofError;

const ULID_A: &str = "01ARZ3NDEKTSV4RRFFQ69G5FAV";
const ULID_B: &str = "01BX5ZZKBKACTAV9WEVGEMMVRY";

/// Known-good record: header + payload `"data data data"` under tag `C!`.
const SAMPLE_RECORD_HEX: &str =
    "89544c560d0a1a0a000000000000000ee33db5f49f8ecb36004321080000bb146461746120646174612064617461";

fn sample_record() -> Vec<u8> {
    hex::decode(SAMPLE_RECORD_HEX).unwrap()
}

fn map(entries: Vec<(&str, Value)>) -> Value {
    Value::Map(
        entries
            .into_iter()
            .map(|(k, v)| (Value::from(k), v))
            .collect(),
    )
}

fn bin(data: &[u8]) -> Value {
    Value::from(data.to_vec())
}

fn msgpack(value: &Value) -> Vec<u8> {
    let mut out = Vec::new();
    rmpv::encode::write_value(&mut out, value).unwrap();
    out
}

fn version_str(ulid: &str, bucket: &str, object: &str) -> String {
    format!("{ulid}:{bucket}/{object}")
}

fn block_record(versionid: &str, data: &[u8]) -> Vec<u8> {
    let primary = map(vec![("I", Value::from(versionid))]);
    let payload = encode_value(&primary, Some(data), false).unwrap();
    let mut out = Vec::new();
    write_frame(&mut out, Tag::BLOCK, &payload).unwrap();
    out
}

// ── Header and framing ───────────────────────────────────────────────────────

#[test]
fn known_header_vector_decodes() {
    let bytes = sample_record();
    assert_eq!(bytes[0..8], MAGIC);

    let header = TlvHeader::read(&mut Cursor::new(&bytes), 0).unwrap().unwrap();
    assert_eq!(header.data_len, 14);
    assert_eq!(header.tag, Tag(*b"C!"));

    let frame = read_frame(&mut Cursor::new(&bytes), 0).unwrap().unwrap();
    assert_eq!(frame.payload, b"data data data");
    assert_eq!(frame.encoded_len(), HEADER_LEN as u64 + 14);
}

#[test]
fn empty_stream_is_clean_end() {
    assert!(read_frame(&mut Cursor::new(Vec::<u8>::new()), 0)
        .unwrap()
        .is_none());

    let mut scanner = Scanner::metadata(Cursor::new(Vec::new()));
    assert!(scanner.next().is_none());
}

#[test]
fn truncated_header_is_short_read() {
    let bytes = &sample_record()[..20];
    let err = read_frame(&mut Cursor::new(bytes), 0).unwrap_err();
    assert!(matches!(
        err,
        VofError::ShortRead { offset: 0, needed: 32, got: 20 }
    ));
}

#[test]
fn truncated_payload_is_short_read() {
    let record = sample_record();
    let bytes = &record[..HEADER_LEN + 5];
    let err = read_frame(&mut Cursor::new(bytes), 0).unwrap_err();
    assert!(matches!(
        err,
        VofError::ShortRead { offset: 32, needed: 14, got: 5 }
    ));
}

#[test]
fn three_blocks_scan_in_order() {
    let vid = version_str(ULID_A, "bucket", "object");
    let mut stream = Vec::new();
    for data in [b"data 1", b"data 2", b"data 3"] {
        stream.extend(block_record(&vid, data));
    }

    let mut scanner = Scanner::pack_file(Cursor::new(&stream));
    let mut offsets = Vec::new();
    let mut payloads = Vec::new();
    for item in &mut scanner {
        let (offset, record) = item.unwrap();
        offsets.push(offset);
        match record {
            Record::Block(b) => payloads.push(b.data),
            other => panic!("unexpected record {other:?}"),
        }
    }
    assert_eq!(payloads, vec![b"data 1".to_vec(), b"data 2".to_vec(), b"data 3".to_vec()]);

    // Records are back-to-back with no gaps.
    let record_len = stream.len() as u64 / 3;
    assert_eq!(offsets, vec![0, record_len, 2 * record_len]);
    assert!(scanner.next().is_none());
}

// ── Value envelope ───────────────────────────────────────────────────────────

#[test]
fn value_with_secondary_part() {
    let payload = encode_value(
        &Value::from("value 1 header"),
        Some(&b"value 1 data"[..]),
        false,
    )
    .unwrap();
    let value = decode_value(&payload, 0).unwrap();
    assert_eq!(value.primary.as_str(), Some("value 1 header"));
    assert_eq!(value.secondary, b"value 1 data");
}

#[test]
fn compressed_value_roundtrip() {
    let primary_text = "header header header header header header header header";
    let secondary: &[u8] = b"data data data data data data data data data data data";

    let payload = encode_value(&Value::from(primary_text), Some(secondary), true).unwrap();
    let mut stream = Vec::new();
    write_frame(&mut stream, Tag(*b"C!"), &payload).unwrap();

    let frame = read_frame(&mut Cursor::new(&stream), 0).unwrap().unwrap();
    let value = decode_value(&frame.payload, 0).unwrap();
    assert_eq!(value.primary.as_str(), Some(primary_text));
    assert_eq!(value.secondary, secondary);
}

#[test]
fn missing_secondary_defaults_to_empty() {
    let payload = encode_value(&Value::from("only primary"), None, false).unwrap();
    let value = decode_value(&payload, 0).unwrap();
    assert!(value.secondary.is_empty());
}

#[test]
fn malformed_secondary_descriptor_means_no_secondary() {
    // s[0] lacks the required `l`; upstream treats that as "no secondary
    // part", not as a defect.
    let envelope = map(vec![
        ("e", bin(&msgpack(&Value::from("primary")))),
        ("s", Value::Array(vec![map(vec![])])),
    ]);
    let value = decode_value(&msgpack(&envelope), 0).unwrap();
    assert_eq!(value.primary.as_str(), Some("primary"));
    assert!(value.secondary.is_empty());
}

#[test]
fn oversized_secondary_is_rejected() {
    let envelope = map(vec![
        ("e", bin(&msgpack(&Value::from("primary")))),
        (
            "s",
            Value::Array(vec![map(vec![("l", Value::from(1_000_000u64))])]),
        ),
    ]);
    let err = decode_value(&msgpack(&envelope), 7).unwrap_err();
    assert!(matches!(err, VofError::SecondaryOverrun { offset: 7, .. }));
}

#[test]
fn encrypted_value_is_rejected() {
    let envelope = map(vec![
        ("e", bin(&msgpack(&Value::from("primary")))),
        ("z", Value::from(1u64)),
    ]);
    let err = decode_value(&msgpack(&envelope), 3).unwrap_err();
    assert!(matches!(err, VofError::EncryptedValue { offset: 3 }));
}

// ── Tag dispatch ─────────────────────────────────────────────────────────────

#[test]
fn unknown_tag_is_fatal() {
    let payload = encode_value(&Value::from("x"), None, false).unwrap();
    let mut stream = Vec::new();
    write_frame(&mut stream, Tag(*b"zz"), &payload).unwrap();

    let mut scanner = Scanner::metadata(Cursor::new(&stream));
    let err = scanner.next().unwrap().unwrap_err();
    assert!(matches!(
        err,
        VofError::UnknownTag { offset: 0, tag: Tag([b'z', b'z']) }
    ));
    // The scan is dead after a fatal error.
    assert!(scanner.next().is_none());
}

#[test]
fn pack_file_scanner_rejects_version_records() {
    let primary = map(vec![
        ("b", Value::from("bucket")),
        ("o", Value::from("object")),
        ("v", Value::from(ULID_A)),
    ]);
    let payload = encode_value(&primary, None, false).unwrap();
    let mut stream = Vec::new();
    write_frame(&mut stream, Tag::VERSION, &payload).unwrap();

    let err = Scanner::pack_file(Cursor::new(&stream))
        .next()
        .unwrap()
        .unwrap_err();
    assert!(matches!(err, VofError::UnknownTag { tag: Tag([b'v', b'm']), .. }));

    // The same record is fine under the full metadata table.
    let (_, record) = Scanner::metadata(Cursor::new(&stream))
        .next()
        .unwrap()
        .unwrap();
    match record {
        Record::Version(v) => assert_eq!(v.versionid.bucket, "bucket"),
        other => panic!("unexpected record {other:?}"),
    }
}

// ── Pack files and block seeks ───────────────────────────────────────────────

#[test]
fn pack_file_scan_and_block_seeks() {
    let vid = version_str(ULID_A, "bucket", "object");
    let blocks: [&[u8]; 3] = [b"block 1 data", b"block 2 data", b"block 3 data"];

    let mut stream = Vec::new();
    let mut record_lens = Vec::new();
    for data in blocks {
        let record = block_record(&vid, data);
        record_lens.push(record.len() as u64);
        stream.extend(record);
    }
    let pack_end = stream.len() as u64;

    let source_len: u64 = blocks.iter().map(|b| b.len() as u64).sum();
    let entry = map(vec![
        ("p", Value::from(ULID_B)),
        ("o", map(vec![("l", Value::from(source_len))])),
        (
            "t",
            map(vec![("s", Value::from(0u64)), ("l", Value::from(pack_end))]),
        ),
        (
            "E",
            Value::Array(vec![
                Value::from(record_lens[0]),
                Value::from(record_lens[1]),
            ]),
        ),
        (
            "N",
            Value::Array(vec![
                Value::from(blocks[0].len() as u64),
                Value::from(blocks[1].len() as u64),
            ]),
        ),
    ]);
    let primary = map(vec![
        ("I", Value::from(vid.as_str())),
        ("P", Value::Array(vec![entry])),
    ]);
    let payload = encode_value(&primary, None, false).unwrap();
    write_frame(&mut stream, Tag::PACK_LIST, &payload).unwrap();

    // Scan the whole pack file.
    let records: Vec<_> = Scanner::pack_file(Cursor::new(&stream))
        .map(|item| item.unwrap().1)
        .collect();
    assert_eq!(records.len(), 4);
    let list = match &records[3] {
        Record::PackList(list) => list,
        other => panic!("unexpected record {other:?}"),
    };
    assert_eq!(list.uploadid, "");
    assert_eq!(list.packs.len(), 1);
    let entry = &list.packs[0];
    assert_eq!(entry.sourcerange, Range { start: 0, len: source_len });
    assert_eq!(entry.packrange, Range { start: 0, len: pack_end });
    assert_eq!(entry.blocklens.len(), entry.sourcelens.len());

    // Cumulative blocklens offsets land exactly on record boundaries.
    let mut cursor = Cursor::new(&stream);
    let mut offset = entry.sourcerange.start;
    for (i, expected) in blocks.iter().enumerate() {
        let record = read_record_at(&mut cursor, offset, PACK_FILE_TABLE).unwrap();
        match record {
            Record::Block(b) => assert_eq!(b.data, *expected),
            other => panic!("unexpected record {other:?}"),
        }
        if i < entry.blocklens.len() {
            offset += entry.blocklens[i];
        }
    }
}

// ── Versions ─────────────────────────────────────────────────────────────────

fn pack_entry_map(packid: &str, start: u64, len: u64) -> Value {
    map(vec![
        ("p", Value::from(packid)),
        (
            "o",
            map(vec![("s", Value::from(start)), ("l", Value::from(len))]),
        ),
        (
            "t",
            map(vec![("s", Value::from(start)), ("l", Value::from(len))]),
        ),
    ])
}

#[test]
fn version_record_with_clones() {
    let embedded_raw = msgpack(&map(vec![(
        "p",
        Value::Array(vec![pack_entry_map(ULID_B, 0, 64)]),
    )]));
    let reference_raw = msgpack(&map(vec![(
        "R",
        map(vec![
            ("k", Value::from(ULID_B)),
            (
                "r",
                map(vec![("s", Value::from(96u64)), ("l", Value::from(160u64))]),
            ),
        ]),
    )]));
    // bin8 declaring five bytes but carrying two: not decodable as
    // structured data, so it must survive verbatim as opaque bytes.
    let opaque_raw = vec![0xc4, 0x05, 0x01, 0x02];

    let clone_map = |raw: &[u8], pool: &str| {
        map(vec![
            ("p", Value::from(pool)),
            ("B", Value::from(4096u64)),
            ("s", Value::from(64u64)),
            ("f", Value::from(1u64)),
            ("l", bin(raw)),
        ])
    };

    let primary = map(vec![
        ("b", Value::from("bucket")),
        ("o", Value::from("object")),
        ("v", Value::from(ULID_A)),
        ("w", Value::from("owner-1")),
        (
            "A",
            Value::Array(vec![map(vec![
                ("t", Value::from(0u64)),
                ("i", Value::from("alice")),
                ("p", Value::from(PERM_READ | PERM_WRITE)),
            ])]),
        ),
        ("l", Value::from(64u64)),
        ("e", Value::from("d41d8cd98f00b204e9800998ecf8427e")),
        ("d", Value::from(false)),
        ("N", Value::from(true)),
        (
            "c",
            map(vec![
                ("x", Value::from(1u64)),
                ("k", bin(b"wrapped-key")),
                ("e", bin(b"extra")),
            ]),
        ),
        (
            "p",
            Value::Array(vec![
                clone_map(&embedded_raw, "pool-a"),
                clone_map(&reference_raw, "pool-b"),
                clone_map(&opaque_raw, "pool-c"),
            ]),
        ),
        ("s", map(vec![("content-type", Value::from("text/plain"))])),
        ("m", map(vec![("x-user", Value::from("yes"))])),
        ("h", Value::from(true)),
        ("D", bin(b"inline body")),
    ]);

    let payload = encode_value(&primary, None, false).unwrap();
    let mut stream = Vec::new();
    write_frame(&mut stream, Tag::VERSION, &payload).unwrap();

    let (_, record) = Scanner::metadata(Cursor::new(&stream))
        .next()
        .unwrap()
        .unwrap();
    let version = match record {
        Record::Version(v) => v,
        other => panic!("unexpected record {other:?}"),
    };

    assert_eq!(version.versionid.bucket, "bucket");
    assert_eq!(version.versionid.object, "object");
    assert_eq!(version.versionid.version.to_string(), ULID_A);
    assert_eq!(version.owner, "owner-1");
    assert_eq!(version.acls.len(), 1);
    assert_eq!(version.acls[0].idtype, IdType::User);
    assert_eq!(version.acls[0].permissions, PERM_READ | PERM_WRITE);
    assert_eq!(version.len, 64);
    assert!(!version.deletemarker);
    assert!(version.nullversion);
    assert!(version.legalhold);
    assert_eq!(version.metadata["content-type"], "text/plain");
    assert_eq!(version.usermetadata["x-user"], "yes");
    assert_eq!(version.data.as_deref(), Some(&b"inline body"[..]));

    let crypt = version.crypt.expect("crypt data present");
    assert_eq!(crypt.datakey, b"wrapped-key");

    assert_eq!(version.clones.len(), 3);
    match &version.clones[0].data {
        CloneData::EmbeddedPacks(packs) => {
            assert_eq!(packs.len(), 1);
            assert_eq!(packs[0].packid.to_string(), ULID_B);
        }
        other => panic!("expected embedded packs, got {other:?}"),
    }
    match &version.clones[1].data {
        CloneData::Reference(r) => {
            assert_eq!(r.pack, ULID_B);
            assert_eq!(r.packrange, Range { start: 96, len: 160 });
        }
        other => panic!("expected reference, got {other:?}"),
    }
    match &version.clones[2].data {
        CloneData::Opaque(raw) => assert_eq!(*raw, opaque_raw),
        other => panic!("expected opaque data, got {other:?}"),
    }
}

#[test]
fn clone_probe_keeps_unrelated_maps_opaque() {
    // Parses as a map, but carries neither `p` nor `R`.
    let raw = msgpack(&map(vec![("x", Value::from(1u64))]));
    match CloneData::probe(raw.clone()).unwrap() {
        CloneData::Opaque(kept) => assert_eq!(kept, raw),
        other => panic!("expected opaque data, got {other:?}"),
    }
}

// ── Version delete ───────────────────────────────────────────────────────────

#[test]
fn version_delete_requires_target_field() {
    let target = version_str(ULID_B, "bucket", "object");
    let with_target = map(vec![
        ("b", Value::from("bucket")),
        ("o", Value::from("object")),
        ("v", Value::from(ULID_A)),
        (DELETE_TARGET_KEY, Value::from(target.as_str())),
    ]);
    let decoded = VersionDelete::decode(RecordValue {
        primary: with_target,
        secondary: Vec::new(),
    })
    .unwrap();
    assert_eq!(decoded.versionid.version.to_string(), ULID_A);
    assert_eq!(decoded.deleteid.version.to_string(), ULID_B);

    let without_target = map(vec![
        ("b", Value::from("bucket")),
        ("o", Value::from("object")),
        ("v", Value::from(ULID_A)),
    ]);
    let err = VersionDelete::decode(RecordValue {
        primary: without_target,
        secondary: Vec::new(),
    })
    .unwrap_err();
    assert!(matches!(
        err,
        VofError::MissingField { entity: "VersionDelete", field } if field == DELETE_TARGET_KEY
    ));
}

// ── Metadata dump marker ─────────────────────────────────────────────────────

#[test]
fn meta_file_marker_scans() {
    let marker = map(vec![("o", Value::from("01HV0000000000000000000000"))]);
    let payload = encode_value(&marker, None, false).unwrap();
    let mut stream = Vec::new();
    write_frame(&mut stream, Tag::META_FILE, &payload).unwrap();
    stream.extend(block_record(
        &version_str(ULID_A, "bucket", "object"),
        b"payload",
    ));

    let records: Vec<_> = Scanner::metadata(Cursor::new(&stream))
        .map(|item| item.unwrap().1)
        .collect();
    assert_eq!(records.len(), 2);
    match &records[0] {
        Record::MetaFile(m) => assert_eq!(m.oldest, "01HV0000000000000000000000"),
        other => panic!("unexpected record {other:?}"),
    }
}

// ── Cross-file resolution ────────────────────────────────────────────────────

#[test]
fn resolve_pack_reference_across_files() {
    let dir = tempfile::tempdir().unwrap();
    let vid = version_str(ULID_A, "bucket", "object");

    // Build the pack file: one block, then the pack list the reference
    // points at.
    let mut pack_bytes = block_record(&vid, b"block data");
    let list_offset = pack_bytes.len() as u64;
    let primary = map(vec![
        ("I", Value::from(vid.as_str())),
        ("U", Value::from("upload-7")),
        ("P", Value::Array(vec![pack_entry_map(ULID_B, 0, 10)])),
    ]);
    let payload = encode_value(&primary, None, false).unwrap();
    write_frame(&mut pack_bytes, Tag::PACK_LIST, &payload).unwrap();
    let list_len = pack_bytes.len() as u64 - list_offset;
    std::fs::write(dir.path().join(format!("{ULID_B}.blk")), &pack_bytes).unwrap();

    let reference = vof::entity::PackReference {
        pack: ULID_B.to_owned(),
        packrange: Range { start: list_offset, len: list_len },
    };
    let list = resolve_pack_reference(dir.path(), &reference).unwrap();
    assert_eq!(list.uploadid, "upload-7");
    assert_eq!(list.packs.len(), 1);
    assert_eq!(list.packs[0].packid.to_string(), ULID_B);

    // A reference at a block offset is a kind mismatch, not a pack list.
    let bad = vof::entity::PackReference {
        pack: ULID_B.to_owned(),
        packrange: Range { start: 0, len: 0 },
    };
    let err = resolve_pack_reference(dir.path(), &bad).unwrap_err();
    assert!(matches!(err, VofError::UnknownTag { tag: Tag([b'b', b'k']), .. }));
}

// ── Determinism ──────────────────────────────────────────────────────────────

#[test]
fn decoding_is_deterministic() {
    let stream = block_record(&version_str(ULID_A, "bucket", "object"), b"same bytes");
    let first = Scanner::pack_file(Cursor::new(&stream))
        .next()
        .unwrap()
        .unwrap();
    let second = Scanner::pack_file(Cursor::new(&stream))
        .next()
        .unwrap()
        .unwrap();
    assert_eq!(first, second);
}
