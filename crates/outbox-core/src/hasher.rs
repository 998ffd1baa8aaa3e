//! Partition Hasher.
//!
//! FNV-1a over the key's UTF-8 bytes, folded into `TOTAL_PARTITIONS`
//! buckets. FNV-1a is deliberately simple and has no version-to-version
//! instability the way a hasher seeded from `RandomState` would — the
//! contract requires the mapping be stable across releases.

use outbox_schemas::TOTAL_PARTITIONS;

const FNV_OFFSET_BASIS: u32 = 0x811c_9dc5;
const FNV_PRIME: u32 = 0x0100_0193;

fn fnv1a_32(bytes: &[u8]) -> u32 {
    let mut hash = FNV_OFFSET_BASIS;
    for &b in bytes {
        hash ^= b as u32;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Map a record key to one of `[0, TOTAL_PARTITIONS)`. Deterministic,
/// case-sensitive, defined for the empty string.
pub fn partition_of(key: &str) -> u16 {
    let hash = fnv1a_32(key.as_bytes());
    (hash % TOTAL_PARTITIONS as u32) as u16
}
