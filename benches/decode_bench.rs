use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rmpv::Value;
use std::io::Cursor;
use vof::checksum::content_hash;
use vof::frame::write_frame;
use vof::header::Tag;
use vof::scan::Scanner;
use vof::value::encode_value;

fn block_stream(blocks: usize, block_size: usize, compress: bool) -> Vec<u8> {
    let versionid = "01ARZ3NDEKTSV4RRFFQ69G5FAV:bucket/object";
    let data = vec![42u8; block_size];
    let mut stream = Vec::new();
    for _ in 0..blocks {
        let primary = Value::Map(vec![(Value::from("I"), Value::from(versionid))]);
        let payload = encode_value(&primary, Some(&data[..]), compress).unwrap();
        write_frame(&mut stream, Tag::BLOCK, &payload).unwrap();
    }
    stream
}

fn bench_content_hash(c: &mut Criterion) {
    let data = vec![0u8; 1024 * 1024];
    c.bench_function("content_hash_1mb", |b| b.iter(|| content_hash(black_box(&data))));
}

fn bench_scan(c: &mut Criterion) {
    let plain = block_stream(100, 64 * 1024, false);
    let compressed = block_stream(100, 64 * 1024, true);

    c.bench_function("scan_100_blocks_64k", |b| {
        b.iter(|| {
            let scanner = Scanner::pack_file(Cursor::new(black_box(&plain)));
            assert_eq!(scanner.filter(|r| r.is_ok()).count(), 100);
        })
    });

    c.bench_function("scan_100_blocks_64k_zstd", |b| {
        b.iter(|| {
            let scanner = Scanner::pack_file(Cursor::new(black_box(&compressed)));
            assert_eq!(scanner.filter(|r| r.is_ok()).count(), 100);
        })
    });
}

criterion_group!(benches, bench_content_hash, bench_scan);
criterion_main!(benches);
