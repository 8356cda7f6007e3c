use crate::storage_engine::builder::attach;
use crate::storage_engine::digest::{compute_hash, segment_for_hash};
use crate::storage_engine::map_header::MapHeader;
use crate::storage_engine::segment::{Segment, SegmentGeometry};
use crate::storage_engine::{MapError, Result};
use crate::utils::verify_file_existence;
use shared_hash_map_values::{MappedRegion, ValueView};
use std::fmt;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Point-in-time occupancy summary of a map.
///
/// Counters are read without locking, so under concurrent writers the
/// figures are individually exact but not a consistent snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapStats {
    pub len: u64,
    pub capacity: u64,
    pub segments: u32,
    pub segment_capacity: u64,
    /// Live entries in the fullest segment.
    pub max_segment_len: u64,
    /// Segments whose lock was held when the stats were taken. A segment
    /// that stays locked across calls points at a holder that died.
    pub locked_segments: u32,
    /// Size of the mapping in bytes.
    pub mapped_bytes: u64,
}

impl MapStats {
    /// Fraction of all slots in use, in `0.0..=1.0`.
    pub fn load_factor(&self) -> f64 {
        if self.capacity == 0 {
            0.0
        } else {
            self.len as f64 / self.capacity as f64
        }
    }
}

/// Segmented, memory-mapped hash map shared across threads and processes.
///
/// Every entry lives in a fixed-size slot inside one file. Keys are byte
/// strings; values are fixed-size records accessed in place through a
/// caller-owned [`ValueView`] that is rebound on every lookup, so the hot
/// path never allocates.
///
/// Any number of `SharedHashMap` instances, in any number of processes, may
/// map the same file. Structural changes (insert, remove) are serialized per
/// segment by a spin lock stored in the file; value updates go through the
/// view's hardware atomics and take no lock at all.
///
/// ## Thread Safety
/// - `SharedHashMap` is `Send + Sync`; share it behind an `Arc`.
/// - A bound view keeps the mapping alive on its own, so it stays valid even
///   if the map is closed or dropped.
pub struct SharedHashMap<V: ValueView> {
    region: Arc<MappedRegion>,
    header: MapHeader,
    geometry: SegmentGeometry,
    path: PathBuf,
    closed: AtomicBool,
    _value: PhantomData<fn() -> V>,
}

impl<V: ValueView> SharedHashMap<V> {
    /// Opens an **existing** map file, using the configuration recorded in
    /// its header.
    ///
    /// # Parameters:
    /// - `path`: The map file.
    ///
    /// # Returns:
    /// - `Ok(SharedHashMap)` attached to the file.
    /// - `Err(MapError::BackingStoreFailure)` if the file is missing or
    ///   cannot be mapped.
    /// - `Err(MapError::IncompatibleLayout)` if the file is not a map or was
    ///   created for a different value type.
    pub fn open(path: &Path) -> Result<Self> {
        verify_file_existence(path)?;
        attach::<V>(path, None)
    }

    pub(crate) fn from_parts(region: Arc<MappedRegion>, header: MapHeader, path: PathBuf) -> Result<Self> {
        let geometry = header.geometry()?;

        Ok(Self {
            region,
            header,
            geometry,
            path,
            closed: AtomicBool::new(false),
            _value: PhantomData,
        })
    }

    /// Returns the view bound to `key`'s value, creating a zero-valued entry
    /// first if the key is absent.
    ///
    /// `view` is rebound in place and handed back; no value is allocated.
    ///
    /// # Returns:
    /// - `Ok(&mut V)`: `view`, bound to the entry.
    /// - `Err(MapError::EntryTooLarge)` if the key exceeds the per-entry
    ///   budget. Nothing is written.
    /// - `Err(MapError::CapacityExhausted)` if the key's segment is full.
    /// - `Err(MapError::MapClosed)` after [`Self::close`].
    pub fn acquire_using<'v, K>(&self, key: &K, view: &'v mut V) -> Result<&'v mut V>
    where
        K: AsRef<[u8]> + ?Sized,
    {
        self.ensure_open()?;

        let key = key.as_ref();
        self.geometry.slot.check_key_len(key.len())?;

        let hash = compute_hash(key, self.header.hash_seed);
        let segment = self.segment_for(hash);

        let slot = segment.find_or_create(hash, key).inspect_err(|err| {
            if let MapError::CapacityExhausted { segment } = err {
                warn!(
                    "Segment {} of {} is full ({} slots)",
                    segment,
                    self.path.display(),
                    self.geometry.capacity
                );
            }
        })?;

        // SAFETY: the offset comes from the segment geometry the region was
        // sized with, and value regions are aligned to `V::ALIGN`.
        unsafe { view.bind_to(&self.region, segment.value_offset(slot)) };
        Ok(view)
    }

    /// Binds `view` to `key`'s value if the key is present.
    ///
    /// Never creates an entry. On a miss `view` is unbound and `Ok(None)` is
    /// returned; a key too long to ever be stored is simply absent.
    pub fn get_using<'v, K>(&self, key: &K, view: &'v mut V) -> Result<Option<&'v mut V>>
    where
        K: AsRef<[u8]> + ?Sized,
    {
        self.ensure_open()?;

        let key = key.as_ref();
        match self.find(key) {
            Some((segment, slot)) => {
                let offset = self.segment(segment).value_offset(slot);
                // SAFETY: see `acquire_using`.
                unsafe { view.bind_to(&self.region, offset) };
                Ok(Some(view))
            }
            None => {
                view.unbind();
                Ok(None)
            }
        }
    }

    pub fn contains_key<K>(&self, key: &K) -> Result<bool>
    where
        K: AsRef<[u8]> + ?Sized,
    {
        self.ensure_open()?;
        Ok(self.find(key.as_ref()).is_some())
    }

    /// Deletes `key` and returns its slot to the segment's free pool.
    ///
    /// Views still bound to the removed entry keep pointing at its old
    /// slot, which may be reused by a later insert.
    ///
    /// # Returns:
    /// - `Ok(true)` if the key was present.
    /// - `Ok(false)` if it was absent (nothing changes).
    pub fn remove<K>(&self, key: &K) -> Result<bool>
    where
        K: AsRef<[u8]> + ?Sized,
    {
        self.ensure_open()?;

        let key = key.as_ref();
        if self.geometry.slot.check_key_len(key.len()).is_err() {
            return Ok(false);
        }

        let hash = compute_hash(key, self.header.hash_seed);
        Ok(self.segment_for(hash).remove(hash, key))
    }

    /// Number of live entries across all segments.
    pub fn len(&self) -> Result<usize> {
        self.ensure_open()?;
        Ok(self.segments().map(|segment| segment.len()).sum::<u64>() as usize)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Total number of slots; fixed for the life of the file.
    #[inline]
    pub fn capacity(&self) -> u64 {
        self.header.capacity()
    }

    #[inline]
    pub fn segment_count(&self) -> u32 {
        self.header.segments
    }

    /// Per-entry byte budget for key plus value.
    #[inline]
    pub fn entry_size(&self) -> u32 {
        self.header.entry_size
    }

    /// Longest key [`Self::acquire_using`] accepts.
    #[inline]
    pub fn max_key_len(&self) -> usize {
        self.geometry.slot.key_capacity()
    }

    #[inline]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the header this map was opened with.
    #[inline]
    pub fn header(&self) -> &MapHeader {
        &self.header
    }

    /// Removes every entry, one segment at a time.
    ///
    /// Not atomic across segments: a concurrent writer may insert into a
    /// segment that was already cleared.
    pub fn clear(&self) -> Result<()> {
        self.ensure_open()?;

        let removed: u64 = self.segments().map(|segment| segment.clear()).sum();
        debug!("Cleared {} entries from {}", removed, self.path.display());
        Ok(())
    }

    /// Keys of all live entries, in no particular order.
    pub fn keys(&self) -> Result<Vec<Vec<u8>>> {
        self.ensure_open()?;

        Ok(self
            .segments()
            .flat_map(|segment| segment.keys())
            .collect())
    }

    /// Calls `f` with every live key and `view` bound to its value.
    ///
    /// Each segment's keys are snapshotted under its shared lock and the lock
    /// is released before `f` runs, so `f` may freely call back into the map.
    /// Every snapshotted key is looked up again before its visit: keys
    /// removed in the meantime are skipped, and `view` is always bound to the
    /// value currently stored under the key it is passed with. Keys inserted
    /// after the snapshot are not visited.
    pub fn for_each_entry<F>(&self, view: &mut V, mut f: F) -> Result<()>
    where
        F: FnMut(&[u8], &mut V),
    {
        self.ensure_open()?;

        for segment in self.segments() {
            for key in segment.keys() {
                if self.rebind(&segment, &key, view) {
                    f(&key, view);
                }
            }
        }

        view.unbind();
        Ok(())
    }

    /// Parallel [`Self::for_each_entry`]: segments are visited concurrently,
    /// each with its own freshly created view.
    #[cfg(feature = "parallel")]
    pub fn par_for_each_entry<F>(&self, f: F) -> Result<()>
    where
        V: Default,
        F: Fn(&[u8], &mut V) + Send + Sync,
    {
        self.ensure_open()?;

        (0..self.header.segments as usize)
            .into_par_iter()
            .for_each(|index| {
                let segment = self.segment(index);
                let mut view = V::default();
                for key in segment.keys() {
                    if self.rebind(&segment, &key, &mut view) {
                        f(&key, &mut view);
                    }
                }
            });

        Ok(())
    }

    /// Binds `view` to the value `key` currently has in `segment`.
    ///
    /// Returns `false` if the key is gone; its slot may already hold another
    /// key.
    fn rebind(&self, segment: &Segment<'_>, key: &[u8], view: &mut V) -> bool {
        let hash = compute_hash(key, self.header.hash_seed);
        match segment.find(hash, key) {
            Some(slot) => {
                // SAFETY: see `acquire_using`.
                unsafe { view.bind_to(&self.region, segment.value_offset(slot)) };
                true
            }
            None => false,
        }
    }

    pub fn stats(&self) -> Result<MapStats> {
        self.ensure_open()?;

        let mut len = 0;
        let mut max_segment_len = 0;
        let mut locked_segments = 0;
        for segment in self.segments() {
            let segment_len = segment.len();
            len += segment_len;
            max_segment_len = max_segment_len.max(segment_len);
            if segment.is_locked() {
                locked_segments += 1;
            }
        }

        Ok(MapStats {
            len,
            capacity: self.capacity(),
            segments: self.header.segments,
            segment_capacity: self.header.segment_capacity,
            max_segment_len,
            locked_segments,
            mapped_bytes: self.region.len() as u64,
        })
    }

    /// Synchronously writes dirty pages back to the file.
    pub fn flush(&self) -> Result<()> {
        self.ensure_open()?;
        self.region.flush()?;
        Ok(())
    }

    /// Flushes the map and marks it closed.
    ///
    /// Every later call on this instance fails with [`MapError::MapClosed`],
    /// including a second `close`. The mapping itself is released once this
    /// instance and every view bound through it are dropped. Other instances
    /// mapping the same file are unaffected.
    pub fn close(&self) -> Result<()> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Err(MapError::MapClosed);
        }

        self.region.flush()?;
        info!("Closed shared hash map {}", self.path.display());
        Ok(())
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    #[inline]
    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(MapError::MapClosed);
        }
        Ok(())
    }

    /// Locates `key` without creating it. Keys that cannot fit a slot are
    /// never present.
    fn find(&self, key: &[u8]) -> Option<(usize, u32)> {
        if self.geometry.slot.check_key_len(key.len()).is_err() {
            return None;
        }

        let hash = compute_hash(key, self.header.hash_seed);
        let segment = self.segment_for(hash);
        segment.find(hash, key).map(|slot| (segment.index(), slot))
    }

    #[inline]
    fn segment_for(&self, hash: u64) -> Segment<'_> {
        self.segment(segment_for_hash(hash, self.header.segments))
    }

    #[inline]
    fn segment(&self, index: usize) -> Segment<'_> {
        debug_assert!(index < self.header.segments as usize);
        // SAFETY: the region was validated to be at least `file_len` bytes,
        // which covers every segment described by `geometry`.
        unsafe { Segment::new(&self.region, &self.geometry, index) }
    }

    fn segments(&self) -> impl Iterator<Item = Segment<'_>> {
        (0..self.header.segments as usize).map(|index| self.segment(index))
    }
}

impl<V: ValueView> Drop for SharedHashMap<V> {
    fn drop(&mut self) {
        if *self.closed.get_mut() {
            return;
        }

        if let Err(err) = self.region.flush() {
            warn!(
                "Failed to flush {} on drop: {}",
                self.path.display(),
                err
            );
        }
    }
}

impl<V: ValueView> fmt::Debug for SharedHashMap<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedHashMap")
            .field("path", &self.path)
            .field("segments", &self.header.segments)
            .field("capacity", &self.capacity())
            .field("entry_size", &self.header.entry_size)
            .field("closed", &self.is_closed())
            .finish()
    }
}
