use crate::storage_engine::constants::*;
use crate::storage_engine::{MapError, Result};

/// Occupancy of a slot.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotStatus {
    Free = 0,
    Occupied = 1,
}

impl SlotStatus {
    #[inline]
    pub fn from_byte(byte: u8) -> Self {
        if byte == SlotStatus::Occupied as u8 {
            SlotStatus::Occupied
        } else {
            SlotStatus::Free
        }
    }
}

/// Fixed header at the start of every slot.
///
/// ## Slot Layout
///
/// - **Offset `0` → `4`**: **Tag** (upper 32 bits of the key hash)
/// - **Offset `4` → `8`**: **Next** (`slot + 1` of the next entry in the same
///   bucket chain, `0` terminates the chain)
/// - **Offset `8`**: **Status** (`0` free, `1` occupied)
/// - **Offset `10` → `12`**: **Key length**
/// - **Offset `16` → `16 + key_capacity`**: **Key bytes**
/// - **Offset `value_offset` → `value_offset + value_size`**: **Value**,
///   aligned for the value type and owned by value views
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotHeader {
    pub tag: u32,
    pub next: u32,
    pub status: SlotStatus,
    pub key_len: u16,
}

impl SlotHeader {
    /// Header of a slot that holds no entry.
    pub const FREE: Self = Self {
        tag: 0,
        next: 0,
        status: SlotStatus::Free,
        key_len: 0,
    };

    #[inline]
    pub fn serialize(&self) -> [u8; SLOT_HEADER_SIZE] {
        let mut buf = [0u8; SLOT_HEADER_SIZE];

        buf[SLOT_TAG_RANGE].copy_from_slice(&self.tag.to_le_bytes());
        buf[SLOT_NEXT_RANGE].copy_from_slice(&self.next.to_le_bytes());
        buf[SLOT_STATUS_OFFSET] = self.status as u8;
        buf[SLOT_KEY_LEN_RANGE].copy_from_slice(&self.key_len.to_le_bytes());

        buf
    }

    /// # Panics
    /// - If `data` is shorter than [`SLOT_HEADER_SIZE`].
    #[inline]
    pub fn deserialize(data: &[u8]) -> Self {
        let mut tag = [0u8; 4];
        let mut next = [0u8; 4];
        let mut key_len = [0u8; 2];
        tag.copy_from_slice(&data[SLOT_TAG_RANGE]);
        next.copy_from_slice(&data[SLOT_NEXT_RANGE]);
        key_len.copy_from_slice(&data[SLOT_KEY_LEN_RANGE]);

        Self {
            tag: u32::from_le_bytes(tag),
            next: u32::from_le_bytes(next),
            status: SlotStatus::from_byte(data[SLOT_STATUS_OFFSET]),
            key_len: u16::from_le_bytes(key_len),
        }
    }
}

/// Byte geometry of one slot, derived from the configured entry size and
/// the value type.
///
/// `entry_size` is the per-entry budget for key bytes plus value bytes; the
/// 16-byte slot header and alignment padding come on top of it. A key may
/// use at most `entry_size - value_size` bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotLayout {
    value_size: usize,
    value_align: usize,
    key_capacity: usize,
    value_offset: usize,
    slot_size: usize,
}

#[inline]
pub(crate) const fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

impl SlotLayout {
    pub fn new(entry_size: usize, value_size: usize, value_align: usize) -> Result<Self> {
        if !value_align.is_power_of_two() || value_align > SEGMENT_ALIGNMENT {
            return Err(MapError::InvalidConfig(format!(
                "value alignment {} must be a power of two no larger than {}",
                value_align, SEGMENT_ALIGNMENT
            )));
        }

        if value_size > entry_size {
            return Err(MapError::InvalidConfig(format!(
                "entry size {} cannot hold a {}-byte value",
                entry_size, value_size
            )));
        }

        let key_capacity = (entry_size - value_size).min(MAX_KEY_LEN);
        let value_offset = align_up(SLOT_HEADER_SIZE + key_capacity, value_align);
        let slot_size = align_up(value_offset + value_size, value_align.max(SLOT_ALIGNMENT));

        Ok(Self {
            value_size,
            value_align,
            key_capacity,
            value_offset,
            slot_size,
        })
    }

    /// Fails fast with `EntryTooLarge` if a key of `key_len` bytes would
    /// spill into the value region.
    #[inline]
    pub fn check_key_len(&self, key_len: usize) -> Result<()> {
        if key_len > self.key_capacity {
            return Err(MapError::EntryTooLarge {
                key_len,
                max_key_len: self.key_capacity,
            });
        }
        Ok(())
    }

    #[inline]
    pub fn value_size(&self) -> usize {
        self.value_size
    }

    #[inline]
    pub fn value_align(&self) -> usize {
        self.value_align
    }

    /// Longest key this layout accepts.
    #[inline]
    pub fn key_capacity(&self) -> usize {
        self.key_capacity
    }

    /// Offset of the value region from the start of the slot.
    #[inline]
    pub fn value_offset(&self) -> usize {
        self.value_offset
    }

    /// Stride between consecutive slots.
    #[inline]
    pub fn slot_size(&self) -> usize {
        self.slot_size
    }

    /// Writes the header and key of a newly created entry.
    ///
    /// `meta` is the slot's header-and-key region (`..value_offset`); the
    /// value region is never part of it.
    ///
    /// # Panics
    /// - If `key` is longer than [`Self::key_capacity`]; callers validate
    ///   with [`Self::check_key_len`] first.
    pub fn write_entry(&self, meta: &mut [u8], tag: u32, next: u32, key: &[u8]) {
        debug_assert_eq!(meta.len(), self.value_offset);
        assert!(key.len() <= self.key_capacity, "key exceeds slot key capacity");

        let header = SlotHeader {
            tag,
            next,
            status: SlotStatus::Occupied,
            key_len: key.len() as u16,
        };
        meta[..SLOT_HEADER_SIZE].copy_from_slice(&header.serialize());

        let key_region = &mut meta[SLOT_HEADER_SIZE..SLOT_HEADER_SIZE + self.key_capacity];
        key_region[..key.len()].copy_from_slice(key);
        key_region[key.len()..].fill(0);
    }

    /// Stored key bytes of an occupied slot.
    #[inline]
    pub fn key_of<'a>(&self, meta: &'a [u8], header: &SlotHeader) -> &'a [u8] {
        let len = (header.key_len as usize).min(self.key_capacity);
        &meta[SLOT_HEADER_SIZE..SLOT_HEADER_SIZE + len]
    }
}
