use std::ops::Range;
use std::time::Duration;

/// Magic word at offset 0 of every map file. Written last on creation, so a
/// file whose magic is present has a fully published header.
pub const MAP_MAGIC: [u8; 8] = *b"SHMAP\0v1";

pub const FORMAT_VERSION: u32 = 2;

// Map header (fixed 64 bytes at the start of the file, little-endian)
pub const HEADER_SIZE: usize = 64;
pub const MAGIC_RANGE: Range<usize> = 0..8;
pub const VERSION_RANGE: Range<usize> = 8..12;
pub const SEGMENTS_RANGE: Range<usize> = 12..16;
pub const ENTRIES_RANGE: Range<usize> = 16..24;
pub const SEGMENT_CAPACITY_RANGE: Range<usize> = 24..32;
pub const ENTRY_SIZE_RANGE: Range<usize> = 32..36;
pub const VALUE_SIZE_RANGE: Range<usize> = 36..40;
pub const BUCKET_COUNT_RANGE: Range<usize> = 40..44;
pub const VALUE_ALIGN_RANGE: Range<usize> = 44..48;
pub const HASH_SEED_RANGE: Range<usize> = 48..56;
pub const VALUE_TYPE_RANGE: Range<usize> = 56..60;
pub const HEADER_CHECKSUM_RANGE: Range<usize> = 60..64;

/// Every segment region starts on a cache-line boundary.
pub const SEGMENT_ALIGNMENT: usize = 64;

// Segment header (fixed 64 bytes at the start of every segment region)
pub const SEGMENT_HEADER_SIZE: usize = 64;
pub const SEGMENT_LOCK_OFFSET: usize = 0;
pub const SEGMENT_LEN_OFFSET: usize = 8;
pub const SEGMENT_FREE_HINT_OFFSET: usize = 16;

// Slot header (fixed 16 bytes at the start of every slot)
pub const SLOT_HEADER_SIZE: usize = 16;
pub const SLOT_TAG_RANGE: Range<usize> = 0..4;
pub const SLOT_NEXT_RANGE: Range<usize> = 4..8;
pub const SLOT_STATUS_OFFSET: usize = 8;
pub const SLOT_KEY_LEN_RANGE: Range<usize> = 10..12;

/// Minimum alignment of a slot; keeps slot headers word aligned.
pub const SLOT_ALIGNMENT: usize = 8;

/// Longest key a slot header can describe.
pub const MAX_KEY_LEN: usize = u16::MAX as usize;

/// Bucket heads and chain links store `slot + 1` in a `u32`.
pub const MAX_SEGMENT_CAPACITY: u64 = u32::MAX as u64 - 1;

/// The segment is chosen from the upper half of the key hash, leaving the
/// low bits to pick a bucket inside the segment.
pub const SEGMENT_HASH_SHIFT: u32 = 32;

/// The slot tag is the upper half of the key hash.
pub const TAG_HASH_SHIFT: u32 = 32;

pub const DEFAULT_ENTRIES: u64 = 1 << 20;
pub const DEFAULT_SEGMENTS: u32 = 128;
pub const DEFAULT_ENTRY_SIZE: u32 = 128;
pub const DEFAULT_HASH_SEED: u64 = 0;

/// How long an opener waits for a concurrently created file to publish its
/// header before giving up.
pub const HEADER_PUBLISH_TIMEOUT: Duration = Duration::from_secs(2);
pub const HEADER_PUBLISH_POLL: Duration = Duration::from_millis(2);

/// Busy spins a lock waiter performs before it starts yielding its slice.
pub const LOCK_SPINS_BEFORE_YIELD: u32 = 64;
