use crate::storage_engine::constants::*;
use crate::storage_engine::digest::compute_checksum;
use crate::storage_engine::segment::SegmentGeometry;
use crate::storage_engine::slot_layout::SlotLayout;
use crate::storage_engine::{MapError, Result};

/// Immutable description of a map file, stored in its first 64 bytes.
///
/// Written once when the file is created and only read afterwards, by every
/// process that opens the file.
///
/// ## Header Layout (little-endian)
///
/// - **`0..8`**: magic (`b"SHMAP\0v1"`), published last
/// - **`8..12`**: format version
/// - **`12..16`**: segment count
/// - **`16..24`**: requested entries
/// - **`24..32`**: slots per segment
/// - **`32..36`**: entry size (key + value budget)
/// - **`36..40`**: value size
/// - **`40..44`**: buckets per segment (power of two)
/// - **`44..48`**: value alignment
/// - **`48..56`**: hash seed
/// - **`56..60`**: value type identifier
/// - **`60..64`**: CRC32 of bytes `0..60`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapHeader {
    pub segments: u32,
    pub entries: u64,
    pub segment_capacity: u64,
    pub entry_size: u32,
    pub value_size: u32,
    pub value_align: u32,
    pub bucket_count: u32,
    pub hash_seed: u64,
    pub value_type: u32,
}

impl MapHeader {
    /// The magic as the native-endian word stored at offset 0, so it can be
    /// published and observed with a single atomic.
    #[inline]
    pub fn magic_word() -> u64 {
        u64::from_ne_bytes(MAP_MAGIC)
    }

    /// Total number of slots across all segments.
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.segment_capacity * self.segments as u64
    }

    pub fn serialize(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];

        buf[MAGIC_RANGE].copy_from_slice(&MAP_MAGIC);
        buf[VERSION_RANGE].copy_from_slice(&FORMAT_VERSION.to_le_bytes());
        buf[SEGMENTS_RANGE].copy_from_slice(&self.segments.to_le_bytes());
        buf[ENTRIES_RANGE].copy_from_slice(&self.entries.to_le_bytes());
        buf[SEGMENT_CAPACITY_RANGE].copy_from_slice(&self.segment_capacity.to_le_bytes());
        buf[ENTRY_SIZE_RANGE].copy_from_slice(&self.entry_size.to_le_bytes());
        buf[VALUE_SIZE_RANGE].copy_from_slice(&self.value_size.to_le_bytes());
        buf[BUCKET_COUNT_RANGE].copy_from_slice(&self.bucket_count.to_le_bytes());
        buf[VALUE_ALIGN_RANGE].copy_from_slice(&self.value_align.to_le_bytes());
        buf[HASH_SEED_RANGE].copy_from_slice(&self.hash_seed.to_le_bytes());
        buf[VALUE_TYPE_RANGE].copy_from_slice(&self.value_type.to_le_bytes());

        let checksum = compute_checksum(&buf[..HEADER_CHECKSUM_RANGE.start]);
        buf[HEADER_CHECKSUM_RANGE].copy_from_slice(&checksum);

        buf
    }

    /// Parses and validates a header.
    ///
    /// # Errors
    /// - `IncompatibleLayout` if the magic, version or checksum is wrong, or
    ///   the recorded geometry is impossible.
    pub fn deserialize(data: &[u8]) -> Result<Self> {
        if data.len() < HEADER_SIZE {
            return Err(MapError::IncompatibleLayout(format!(
                "file is {} bytes, shorter than the {}-byte header",
                data.len(),
                HEADER_SIZE
            )));
        }

        if data[MAGIC_RANGE] != MAP_MAGIC {
            return Err(MapError::IncompatibleLayout(
                "missing shared hash map magic".to_string(),
            ));
        }

        let version = read_u32(data, VERSION_RANGE);
        if version != FORMAT_VERSION {
            return Err(MapError::IncompatibleLayout(format!(
                "unsupported format version {} (expected {})",
                version, FORMAT_VERSION
            )));
        }

        let checksum = compute_checksum(&data[..HEADER_CHECKSUM_RANGE.start]);
        if data[HEADER_CHECKSUM_RANGE] != checksum {
            return Err(MapError::IncompatibleLayout(
                "header checksum mismatch".to_string(),
            ));
        }

        let header = Self {
            segments: read_u32(data, SEGMENTS_RANGE),
            entries: read_u64(data, ENTRIES_RANGE),
            segment_capacity: read_u64(data, SEGMENT_CAPACITY_RANGE),
            entry_size: read_u32(data, ENTRY_SIZE_RANGE),
            value_size: read_u32(data, VALUE_SIZE_RANGE),
            value_align: read_u32(data, VALUE_ALIGN_RANGE),
            bucket_count: read_u32(data, BUCKET_COUNT_RANGE),
            hash_seed: read_u64(data, HASH_SEED_RANGE),
            value_type: read_u32(data, VALUE_TYPE_RANGE),
        };

        if header.segments == 0
            || header.segment_capacity == 0
            || header.segment_capacity > MAX_SEGMENT_CAPACITY
            || !header.bucket_count.is_power_of_two()
        {
            return Err(MapError::IncompatibleLayout(format!(
                "impossible geometry: {} segments of {} slots, {} buckets",
                header.segments, header.segment_capacity, header.bucket_count
            )));
        }

        Ok(header)
    }

    pub fn slot_layout(&self) -> Result<SlotLayout> {
        SlotLayout::new(
            self.entry_size as usize,
            self.value_size as usize,
            self.value_align as usize,
        )
    }

    pub(crate) fn geometry(&self) -> Result<SegmentGeometry> {
        SegmentGeometry::new(self.segment_capacity, self.bucket_count, self.slot_layout()?)
    }

    /// Size the backing file must have.
    pub fn file_len(&self) -> Result<u64> {
        self.geometry()?.file_len(self.segments)
    }
}

#[inline]
fn read_u32(data: &[u8], range: std::ops::Range<usize>) -> u32 {
    let mut bytes = [0u8; 4];
    bytes.copy_from_slice(&data[range]);
    u32::from_le_bytes(bytes)
}

#[inline]
fn read_u64(data: &[u8], range: std::ops::Range<usize>) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&data[range]);
    u64::from_le_bytes(bytes)
}
