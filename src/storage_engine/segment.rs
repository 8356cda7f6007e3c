use crate::storage_engine::constants::*;
use crate::storage_engine::digest::{bucket_for_hash, tag_for_hash};
use crate::storage_engine::free_slot_index::{FreeSlotIndex, OccupiedSlots, bitset_words};
use crate::storage_engine::segment_lock::SegmentLock;
use crate::storage_engine::slot_layout::{SlotHeader, SlotLayout, SlotStatus};
use crate::storage_engine::{MapError, Result};
use shared_hash_map_values::{MappedRegion, debug_assert_aligned_offset};
use std::marker::PhantomData;
use std::ptr;
use std::slice;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Byte layout shared by every segment of a map.
///
/// ## Segment Region Layout
///
/// - **`0..64`**: segment header (lock word, entry count, allocator hint)
/// - **`buckets_offset..`**: `bucket_count` little-endian `u32` chain heads
///   (`0` is empty, otherwise `slot + 1`)
/// - **`bitset_offset..`**: occupancy bitset, one bit per slot
/// - **`slots_offset..`**: `capacity` fixed-size slots
///
/// Regions are padded to [`SEGMENT_ALIGNMENT`] so no two segments share a
/// cache line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct SegmentGeometry {
    pub capacity: u64,
    pub bucket_count: u32,
    pub bitset_words: usize,
    pub buckets_offset: usize,
    pub bitset_offset: usize,
    pub slots_offset: usize,
    pub stride: usize,
    pub slot: SlotLayout,
}

#[inline]
fn checked_align_up(n: usize, align: usize) -> Option<usize> {
    n.checked_add(align - 1).map(|v| v & !(align - 1))
}

impl SegmentGeometry {
    pub fn new(capacity: u64, bucket_count: u32, slot: SlotLayout) -> Result<Self> {
        let overflow = || {
            MapError::InvalidConfig(format!(
                "a segment of {} slots of {} bytes does not fit the address space",
                capacity,
                slot.slot_size()
            ))
        };

        let slots = usize::try_from(capacity).map_err(|_| overflow())?;
        let words = bitset_words(capacity);

        let buckets_offset = SEGMENT_HEADER_SIZE;
        let bitset_offset = (bucket_count as usize)
            .checked_mul(4)
            .and_then(|len| buckets_offset.checked_add(len))
            .and_then(|end| checked_align_up(end, 8))
            .ok_or_else(overflow)?;
        let slots_offset = words
            .checked_mul(8)
            .and_then(|len| bitset_offset.checked_add(len))
            .and_then(|end| checked_align_up(end, SEGMENT_ALIGNMENT))
            .ok_or_else(overflow)?;
        let stride = slots
            .checked_mul(slot.slot_size())
            .and_then(|len| slots_offset.checked_add(len))
            .and_then(|end| checked_align_up(end, SEGMENT_ALIGNMENT))
            .ok_or_else(overflow)?;

        Ok(Self {
            capacity,
            bucket_count,
            bitset_words: words,
            buckets_offset,
            bitset_offset,
            slots_offset,
            stride,
            slot,
        })
    }

    /// Offset of segment `index` from the start of the file.
    #[inline]
    pub fn segment_offset(&self, index: usize) -> usize {
        HEADER_SIZE + index * self.stride
    }

    /// Size of a file holding `segments` segments.
    pub fn file_len(&self, segments: u32) -> Result<u64> {
        (self.stride as u64)
            .checked_mul(segments as u64)
            .and_then(|len| len.checked_add(HEADER_SIZE as u64))
            .filter(|&len| usize::try_from(len).is_ok())
            .ok_or_else(|| {
                MapError::InvalidConfig(format!(
                    "{} segments of {} bytes do not fit the address space",
                    segments, self.stride
                ))
            })
    }
}

/// Where a key was found in its bucket chain.
#[derive(Debug, Clone, Copy)]
struct Located {
    bucket: usize,
    prev: Option<u32>,
    slot: u32,
    next: u32,
}

/// Handle on one segment region inside a mapping.
///
/// Segments are transient views built per operation; all persistent state
/// (lock, count, buckets, bitset, slots) lives in the mapped bytes. Every
/// method takes the segment lock for its own duration and releases it before
/// returning, so callers never hold two segment locks at once.
pub(crate) struct Segment<'a> {
    base: *mut u8,
    index: usize,
    geometry: &'a SegmentGeometry,
    _region: PhantomData<&'a MappedRegion>,
}

impl<'a> Segment<'a> {
    /// # Safety
    /// `region` must hold the full region of segment `index` as described by
    /// `geometry`, and that region must only ever be accessed through
    /// `Segment` handles.
    pub unsafe fn new(region: &'a MappedRegion, geometry: &'a SegmentGeometry, index: usize) -> Self {
        let offset = geometry.segment_offset(index);
        debug_assert!(region.contains(offset, geometry.stride));

        Self {
            // SAFETY: in bounds per the caller's contract.
            base: unsafe { region.as_ptr().add(offset) },
            index,
            geometry,
            _region: PhantomData,
        }
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    /// Number of live entries, read without taking the lock.
    #[inline]
    pub fn len(&self) -> u64 {
        self.len_cell().load(Ordering::Acquire)
    }

    /// Returns `true` if any thread or process holds this segment's lock.
    #[inline]
    pub fn is_locked(&self) -> bool {
        self.lock().is_locked()
    }

    /// Offset of `slot`'s value from the start of the mapping.
    #[inline]
    pub fn value_offset(&self, slot: u32) -> usize {
        let offset = self.geometry.segment_offset(self.index)
            + self.geometry.slots_offset
            + slot as usize * self.geometry.slot.slot_size()
            + self.geometry.slot.value_offset();
        debug_assert_aligned_offset(offset, self.geometry.slot.value_align());
        offset
    }

    /// Looks `key` up under the shared lock.
    pub fn find(&self, hash: u64, key: &[u8]) -> Option<u32> {
        let _guard = self.lock().acquire_shared();
        // SAFETY: shared lock held.
        unsafe { self.locate(hash, key) }.map(|found| found.slot)
    }

    /// Returns the slot holding `key`, creating a zero-valued entry if it is
    /// missing. Lookup and insertion happen under one exclusive hold, so
    /// concurrent callers racing on the same new key all land on one slot.
    pub fn find_or_create(&self, hash: u64, key: &[u8]) -> Result<u32> {
        let _guard = self.lock().acquire_exclusive();

        // SAFETY: exclusive lock held for every raw access below.
        if let Some(found) = unsafe { self.locate(hash, key) } {
            return Ok(found.slot);
        }

        let slot = unsafe { self.free_index() }
            .allocate()
            .ok_or(MapError::CapacityExhausted {
                segment: self.index,
            })? as u32;

        unsafe { self.link_new_entry(slot, hash, key) };
        self.len_cell().fetch_add(1, Ordering::Release);

        Ok(slot)
    }

    /// Unlinks `key` and frees its slot. Returns `false` if it was absent.
    pub fn remove(&self, hash: u64, key: &[u8]) -> bool {
        let _guard = self.lock().acquire_exclusive();

        // SAFETY: exclusive lock held for every raw access below.
        let Some(found) = (unsafe { self.locate(hash, key) }) else {
            return false;
        };

        unsafe {
            match found.prev {
                None => self.buckets_mut()[found.bucket] = found.next.to_le(),
                Some(prev) => {
                    let meta = self.slot_meta_mut(prev);
                    let mut header = SlotHeader::deserialize(meta);
                    header.next = found.next;
                    meta[..SLOT_HEADER_SIZE].copy_from_slice(&header.serialize());
                }
            }

            self.slot_meta_mut(found.slot)[..SLOT_HEADER_SIZE]
                .copy_from_slice(&SlotHeader::FREE.serialize());
            self.free_index().release(found.slot as u64);
        }
        self.len_cell().fetch_sub(1, Ordering::Release);

        true
    }

    /// Drops every entry. Returns how many were removed.
    pub fn clear(&self) -> u64 {
        let _guard = self.lock().acquire_exclusive();

        // SAFETY: exclusive lock held.
        unsafe {
            let occupied: Vec<u32> = OccupiedSlots::new(self.bitset())
                .take_while(|&slot| slot < self.geometry.capacity)
                .map(|slot| slot as u32)
                .collect();
            for slot in occupied {
                self.slot_meta_mut(slot)[..SLOT_HEADER_SIZE]
                    .copy_from_slice(&SlotHeader::FREE.serialize());
            }

            self.buckets_mut().fill(0);
            self.free_index().clear();
        }
        self.len_cell().swap(0, Ordering::AcqRel)
    }

    /// Snapshot of every live key, taken under the shared lock.
    pub fn keys(&self) -> Vec<Vec<u8>> {
        let _guard = self.lock().acquire_shared();

        // SAFETY: shared lock held.
        let bitset = unsafe { self.bitset() };
        OccupiedSlots::new(bitset)
            .take_while(|&slot| slot < self.geometry.capacity)
            .filter_map(|slot| {
                let slot = slot as u32;
                let meta = unsafe { self.slot_meta(slot) };
                let header = SlotHeader::deserialize(meta);
                if header.status != SlotStatus::Occupied {
                    warn!(
                        "Slot {} of segment {} is allocated but not occupied; skipping it",
                        slot, self.index
                    );
                    return None;
                }
                Some(self.geometry.slot.key_of(meta, &header).to_vec())
            })
            .collect()
    }

    #[inline]
    fn lock(&self) -> SegmentLock<'a> {
        // SAFETY: the lock word is 4-byte aligned inside the segment header
        // and is only ever accessed atomically.
        unsafe { SegmentLock::from_ptr(self.base.add(SEGMENT_LOCK_OFFSET).cast()) }
    }

    #[inline]
    fn len_cell(&self) -> &'a AtomicU64 {
        // SAFETY: 8-byte aligned inside the segment header, always accessed
        // atomically.
        unsafe { AtomicU64::from_ptr(self.base.add(SEGMENT_LEN_OFFSET).cast()) }
    }

    /// Walks the bucket chain for `key`.
    ///
    /// # Safety
    /// The segment lock must be held, in either mode.
    unsafe fn locate(&self, hash: u64, key: &[u8]) -> Option<Located> {
        let tag = tag_for_hash(hash);
        let bucket = bucket_for_hash(hash, self.geometry.bucket_count);

        let mut link = u32::from_le(unsafe { self.buckets() }[bucket]);
        let mut prev = None;
        let mut hops = 0u64;

        while link != 0 {
            let slot = link - 1;
            if slot as u64 >= self.geometry.capacity || hops > self.geometry.capacity {
                warn!(
                    "Corrupted bucket chain in segment {} (bucket {}); treating key as absent",
                    self.index, bucket
                );
                return None;
            }

            let meta = unsafe { self.slot_meta(slot) };
            let header = SlotHeader::deserialize(meta);
            if header.status != SlotStatus::Occupied {
                warn!(
                    "Free slot {} linked into bucket {} of segment {}; treating key as absent",
                    slot, bucket, self.index
                );
                return None;
            }
            if header.tag == tag && self.geometry.slot.key_of(meta, &header) == key {
                return Some(Located {
                    bucket,
                    prev,
                    slot,
                    next: header.next,
                });
            }

            prev = Some(slot);
            link = header.next;
            hops += 1;
        }

        None
    }

    /// Writes a fresh entry into `slot`, zeroes its value and pushes it on
    /// the front of its bucket chain.
    ///
    /// # Safety
    /// The segment lock must be held exclusively and `slot` freshly allocated.
    unsafe fn link_new_entry(&self, slot: u32, hash: u64, key: &[u8]) {
        let bucket = bucket_for_hash(hash, self.geometry.bucket_count);

        unsafe {
            let head = u32::from_le(self.buckets()[bucket]);
            self.geometry
                .slot
                .write_entry(self.slot_meta_mut(slot), tag_for_hash(hash), head, key);

            ptr::write_bytes(
                self.slot_ptr(slot).add(self.geometry.slot.value_offset()),
                0,
                self.geometry.slot.value_size(),
            );

            self.buckets_mut()[bucket] = (slot + 1).to_le();
        }
    }

    // The accessors below hand out plain references into the mapping. They
    // are only sound while the segment lock is held in a mode that rules out
    // conflicting writers, and never cover a value region.

    #[inline]
    unsafe fn buckets(&self) -> &[u32] {
        unsafe {
            slice::from_raw_parts(
                self.base.add(self.geometry.buckets_offset).cast::<u32>(),
                self.geometry.bucket_count as usize,
            )
        }
    }

    #[inline]
    #[allow(clippy::mut_from_ref)]
    unsafe fn buckets_mut(&self) -> &mut [u32] {
        unsafe {
            slice::from_raw_parts_mut(
                self.base.add(self.geometry.buckets_offset).cast::<u32>(),
                self.geometry.bucket_count as usize,
            )
        }
    }

    #[inline]
    unsafe fn bitset(&self) -> &[u64] {
        unsafe {
            slice::from_raw_parts(
                self.base.add(self.geometry.bitset_offset).cast::<u64>(),
                self.geometry.bitset_words,
            )
        }
    }

    #[inline]
    unsafe fn free_index(&self) -> FreeSlotIndex<'_> {
        unsafe {
            let words = slice::from_raw_parts_mut(
                self.base.add(self.geometry.bitset_offset).cast::<u64>(),
                self.geometry.bitset_words,
            );
            let hint = &mut *self.base.add(SEGMENT_FREE_HINT_OFFSET).cast::<u64>();
            FreeSlotIndex::new(words, hint, self.geometry.capacity)
        }
    }

    #[inline]
    unsafe fn slot_ptr(&self, slot: u32) -> *mut u8 {
        unsafe {
            self.base
                .add(self.geometry.slots_offset + slot as usize * self.geometry.slot.slot_size())
        }
    }

    /// Header and key bytes of `slot`.
    #[inline]
    unsafe fn slot_meta(&self, slot: u32) -> &[u8] {
        unsafe { slice::from_raw_parts(self.slot_ptr(slot), self.geometry.slot.value_offset()) }
    }

    #[inline]
    #[allow(clippy::mut_from_ref)]
    unsafe fn slot_meta_mut(&self, slot: u32) -> &mut [u8] {
        unsafe { slice::from_raw_parts_mut(self.slot_ptr(slot), self.geometry.slot.value_offset()) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage_engine::digest::compute_hash;

    fn region_for(geometry: &SegmentGeometry) -> MappedRegion {
        let len = geometry.file_len(1).expect("Geometry too large") as usize;
        MappedRegion::anonymous(len).expect("Failed to map anonymous region")
    }

    fn geometry(capacity: u64) -> SegmentGeometry {
        let slot = SlotLayout::new(24, 8, 8).expect("Invalid slot layout");
        SegmentGeometry::new(capacity, capacity.next_power_of_two() as u32, slot)
            .expect("Invalid geometry")
    }

    #[test]
    fn test_geometry_is_cache_line_aligned() {
        let geometry = geometry(100);
        assert_eq!(geometry.slots_offset % SEGMENT_ALIGNMENT, 0);
        assert_eq!(geometry.stride % SEGMENT_ALIGNMENT, 0);
        assert!(geometry.bitset_offset >= SEGMENT_HEADER_SIZE + 128 * 4);
        assert_eq!(geometry.bitset_words, 2);
    }

    #[test]
    fn test_find_or_create_is_idempotent() {
        let geometry = geometry(8);
        let region = region_for(&geometry);
        let segment = unsafe { Segment::new(&region, &geometry, 0) };

        let hash = compute_hash(b"alpha", 0);
        let first = segment.find_or_create(hash, b"alpha").unwrap();
        let second = segment.find_or_create(hash, b"alpha").unwrap();

        assert_eq!(first, second);
        assert_eq!(segment.len(), 1);
        assert_eq!(segment.find(hash, b"alpha"), Some(first));
        assert_eq!(segment.find(compute_hash(b"beta", 0), b"beta"), None);
    }

    #[test]
    fn test_colliding_keys_share_a_chain() {
        let geometry = geometry(8);
        let region = region_for(&geometry);
        let segment = unsafe { Segment::new(&region, &geometry, 0) };

        // Same bucket and tag, different keys: only the key compare tells
        // them apart.
        let hash = 0x1234_5678_0000_0003;
        let a = segment.find_or_create(hash, b"a").unwrap();
        let b = segment.find_or_create(hash, b"b").unwrap();
        let c = segment.find_or_create(hash, b"c").unwrap();
        assert_ne!(a, b);
        assert_ne!(b, c);

        assert!(segment.remove(hash, b"b"), "Middle of chain should unlink");
        assert_eq!(segment.find(hash, b"a"), Some(a));
        assert_eq!(segment.find(hash, b"b"), None);
        assert_eq!(segment.find(hash, b"c"), Some(c));

        assert!(segment.remove(hash, b"c"), "Head of chain should unlink");
        assert_eq!(segment.find(hash, b"a"), Some(a));
        assert_eq!(segment.len(), 1);
    }

    #[test]
    fn test_capacity_exhaustion_and_reuse() {
        let geometry = geometry(3);
        let region = region_for(&geometry);
        let segment = unsafe { Segment::new(&region, &geometry, 0) };

        for key in [b"k1", b"k2", b"k3"] {
            segment
                .find_or_create(compute_hash(key, 0), key)
                .expect("Slot should be available");
        }

        match segment.find_or_create(compute_hash(b"k4", 0), b"k4") {
            Err(MapError::CapacityExhausted { segment }) => assert_eq!(segment, 0),
            other => panic!("Expected CapacityExhausted, got {:?}", other),
        }

        assert!(segment.remove(compute_hash(b"k2", 0), b"k2"));
        assert!(segment.find_or_create(compute_hash(b"k4", 0), b"k4").is_ok());
        assert_eq!(segment.len(), 3);
    }

    #[test]
    fn test_new_entry_value_is_zeroed() {
        let geometry = geometry(4);
        let region = region_for(&geometry);
        let segment = unsafe { Segment::new(&region, &geometry, 0) };

        let hash = compute_hash(b"zero", 0);
        let slot = segment.find_or_create(hash, b"zero").unwrap();
        let offset = segment.value_offset(slot);
        unsafe { ptr::write_bytes(region.as_ptr().add(offset), 0xFF, 8) };

        assert!(segment.remove(hash, b"zero"));
        let slot = segment.find_or_create(hash, b"zero").unwrap();
        let value = unsafe { slice::from_raw_parts(region.as_ptr().add(segment.value_offset(slot)), 8) };
        assert!(value.iter().all(|&b| b == 0), "Recreated entry must start at zero");
    }

    #[test]
    fn test_clear_and_keys() {
        let geometry = geometry(16);
        let region = region_for(&geometry);
        let segment = unsafe { Segment::new(&region, &geometry, 0) };

        for i in 0..10u32 {
            let key = format!("key{}", i);
            segment
                .find_or_create(compute_hash(key.as_bytes(), 0), key.as_bytes())
                .unwrap();
        }

        let mut keys: Vec<Vec<u8>> = segment.keys();
        keys.sort();
        assert_eq!(keys.len(), 10);
        assert_eq!(keys[0], b"key0".to_vec());

        assert_eq!(segment.clear(), 10);
        assert_eq!(segment.len(), 0);
        assert!(segment.keys().is_empty());
        assert_eq!(segment.find(compute_hash(b"key3", 0), b"key3"), None);

        for slot in 0..16u32 {
            let header = SlotHeader::deserialize(unsafe { segment.slot_meta(slot) });
            assert_eq!(header.status, SlotStatus::Free, "Slot {} left occupied", slot);
        }
    }

    #[test]
    fn test_slot_status_tracks_occupancy() {
        let geometry = geometry(4);
        let region = region_for(&geometry);
        let segment = unsafe { Segment::new(&region, &geometry, 0) };

        let hash = compute_hash(b"alpha", 0);
        let slot = segment.find_or_create(hash, b"alpha").unwrap();
        let status = |slot| SlotHeader::deserialize(unsafe { segment.slot_meta(slot) }).status;
        assert_eq!(status(slot), SlotStatus::Occupied);

        assert!(segment.remove(hash, b"alpha"));
        assert_eq!(status(slot), SlotStatus::Free);
    }

    #[test]
    fn test_linked_free_slot_is_not_matched() {
        let geometry = geometry(4);
        let region = region_for(&geometry);
        let segment = unsafe { Segment::new(&region, &geometry, 0) };

        let hash = compute_hash(b"alpha", 0);
        let slot = segment.find_or_create(hash, b"alpha").unwrap();

        // A torn writer left the slot chained and allocated but marked free.
        unsafe { segment.slot_meta_mut(slot)[SLOT_STATUS_OFFSET] = SlotStatus::Free as u8 };

        assert_eq!(segment.find(hash, b"alpha"), None);
        assert!(segment.keys().is_empty());
    }
}
