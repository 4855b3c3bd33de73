use xxhash_rust::xxh64::xxh64;

/// 64-bit content hash (XXH64, seed 0) used for payload integrity and as
/// the basis of the header self-check.
#[inline]
pub fn content_hash(data: &[u8]) -> u64 {
    xxh64(data, 0)
}

/// 16-bit header self-check: low 16 bits of [`content_hash`] over the first
/// 30 bytes of a 32-byte record header.
#[inline]
pub fn header_check(header_prefix: &[u8]) -> u16 {
    (content_hash(header_prefix) & 0xffff) as u16
}
