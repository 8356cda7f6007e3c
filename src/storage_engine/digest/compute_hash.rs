use crate::storage_engine::constants::{SEGMENT_HASH_SHIFT, TAG_HASH_SHIFT};
use xxhash_rust::xxh3::xxh3_64_with_seed;

/// Computes the 64-bit hash of a serialized key using seeded XXH3.
///
/// The hash must be identical in every process that maps the same file, so
/// the seed comes from the map header rather than from a per-process random
/// state. Every lookup path (create, read, remove) goes through this one
/// function together with [`segment_for_hash`] so that "does this key exist"
/// cannot diverge between entry points.
///
/// # Parameters
/// - `key`: the serialized key bytes.
/// - `seed`: the map's hash seed.
#[inline]
pub fn compute_hash(key: &[u8], seed: u64) -> u64 {
    xxh3_64_with_seed(key, seed)
}

/// Picks the segment that owns `hash`.
///
/// Uses the upper half of the hash so the low bits stay independent for the
/// bucket index inside the segment.
#[inline]
pub fn segment_for_hash(hash: u64, segments: u32) -> usize {
    debug_assert!(segments > 0);
    ((hash >> SEGMENT_HASH_SHIFT) % segments as u64) as usize
}

/// Picks the bucket inside a segment. `bucket_count` is a power of two.
#[inline]
pub fn bucket_for_hash(hash: u64, bucket_count: u32) -> usize {
    debug_assert!(bucket_count.is_power_of_two());
    (hash & (bucket_count as u64 - 1)) as usize
}

/// The 32-bit tag stored in each slot for fast negative comparisons.
#[inline]
pub fn tag_for_hash(hash: u64) -> u32 {
    (hash >> TAG_HASH_SHIFT) as u32
}
