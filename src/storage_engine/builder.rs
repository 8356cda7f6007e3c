use crate::storage_engine::constants::*;
use crate::storage_engine::map_header::MapHeader;
use crate::storage_engine::shared_hash_map::SharedHashMap;
use crate::storage_engine::{MapError, Result};
use memmap2::MmapMut;
use shared_hash_map_values::constants::MAX_VALUE_ALIGN;
use shared_hash_map_values::{MappedRegion, ValueView};
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::Path;
use std::slice;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;
use std::time::Instant;
use tracing::{debug, info};

/// Configuration for creating or attaching to a map file.
///
/// ```no_run
/// use shared_hash_map::{LongValue, SharedHashMapBuilder};
/// use std::path::Path;
///
/// let map = SharedHashMapBuilder::new()
///     .entries(1_000_000)
///     .segments(128)
///     .entry_size(24)
///     .create::<LongValue>(Path::new("/dev/shm/counters.shm"))
///     .expect("Failed to create map");
///
/// let mut counter = LongValue::new();
/// map.acquire_using("user:42", &mut counter)
///     .expect("Failed to acquire entry")
///     .add_atomic_value(1);
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SharedHashMapBuilder {
    entries: u64,
    segments: u32,
    entry_size: u32,
    hash_seed: u64,
}

impl Default for SharedHashMapBuilder {
    fn default() -> Self {
        Self {
            entries: DEFAULT_ENTRIES,
            segments: DEFAULT_SEGMENTS,
            entry_size: DEFAULT_ENTRY_SIZE,
            hash_seed: DEFAULT_HASH_SEED,
        }
    }
}

impl SharedHashMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries the map must be able to hold.
    pub fn entries(mut self, entries: u64) -> Self {
        self.entries = entries;
        self
    }

    /// Number of independently locked segments.
    pub fn segments(mut self, segments: u32) -> Self {
        self.segments = segments;
        self
    }

    /// Per-entry byte budget for key bytes plus value bytes.
    pub fn entry_size(mut self, entry_size: u32) -> Self {
        self.entry_size = entry_size;
        self
    }

    /// Seed mixed into every key hash. All openers of a file use the seed
    /// recorded in its header.
    pub fn hash_seed(mut self, hash_seed: u64) -> Self {
        self.hash_seed = hash_seed;
        self
    }

    /// Resolves this configuration into the header a map of `V` values
    /// would be created with.
    ///
    /// # Returns:
    /// - `Err(MapError::InvalidConfig)` if any option is zero, the value
    ///   type does not fit `entry_size`, or the file would be too large.
    pub fn header_for<V: ValueView>(&self) -> Result<MapHeader> {
        if self.entries == 0 || self.segments == 0 || self.entry_size == 0 {
            return Err(MapError::InvalidConfig(format!(
                "entries ({}), segments ({}) and entry size ({}) must all be non-zero",
                self.entries, self.segments, self.entry_size
            )));
        }

        if !V::ALIGN.is_power_of_two() || V::ALIGN > MAX_VALUE_ALIGN {
            return Err(MapError::InvalidConfig(format!(
                "value alignment {} is not supported",
                V::ALIGN
            )));
        }

        let value_size = u32::try_from(V::SIZE).map_err(|_| {
            MapError::InvalidConfig(format!("value size {} is too large", V::SIZE))
        })?;

        let segment_capacity = segment_capacity_for(self.entries, self.segments);
        if segment_capacity > MAX_SEGMENT_CAPACITY {
            return Err(MapError::InvalidConfig(format!(
                "{} entries over {} segments needs {} slots per segment (max {})",
                self.entries, self.segments, segment_capacity, MAX_SEGMENT_CAPACITY
            )));
        }

        let bucket_count = u32::try_from(segment_capacity.next_power_of_two()).map_err(|_| {
            MapError::InvalidConfig(format!(
                "{} slots per segment is too many to index",
                segment_capacity
            ))
        })?;

        let header = MapHeader {
            segments: self.segments,
            entries: self.entries,
            segment_capacity,
            entry_size: self.entry_size,
            value_size,
            value_align: V::ALIGN as u32,
            bucket_count,
            hash_seed: self.hash_seed,
            value_type: V::TYPE_ID,
        };

        // Surfaces layout and size overflows before any file is touched.
        header.file_len()?;

        Ok(header)
    }

    /// Opens the map at `path`, creating and sizing the file if it does not
    /// exist yet.
    ///
    /// Safe to call from several processes at once: exactly one creates the
    /// file, the others wait for its header to be published and attach.
    ///
    /// # Parameters:
    /// - `path`: Map file, typically on a tmpfs such as `/dev/shm`.
    ///
    /// # Returns:
    /// - `Ok(SharedHashMap)` on success.
    /// - `Err(MapError::InvalidConfig)` if the configuration is invalid.
    /// - `Err(MapError::IncompatibleLayout)` if an existing file was created
    ///   with a different configuration or value type.
    /// - `Err(MapError::BackingStoreFailure)` on I/O or mapping failures.
    pub fn create<V: ValueView>(&self, path: &Path) -> Result<SharedHashMap<V>> {
        let header = self.header_for::<V>()?;

        match OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)
        {
            Ok(file) => {
                let result = initialize::<V>(file, path, header);
                if result.is_err() {
                    // Never leave a half-initialized file behind for others
                    // to attach to.
                    let _ = fs::remove_file(path);
                }
                result
            }
            Err(err) if err.kind() == ErrorKind::AlreadyExists => attach::<V>(path, Some(&header)),
            Err(err) => Err(err.into()),
        }
    }
}

/// Slots per segment for `entries` spread over `segments`.
///
/// Keys do not hash perfectly evenly, so with more than one segment each gets
/// headroom of roughly six standard deviations of the expected load. A single
/// segment holds exactly `entries`.
pub(crate) fn segment_capacity_for(entries: u64, segments: u32) -> u64 {
    let mean = entries.div_ceil(segments as u64);
    if segments == 1 {
        return mean;
    }

    let headroom = (6.0 * (mean as f64).sqrt()).ceil() as u64 + 8;
    mean.saturating_add(headroom)
}

fn initialize<V: ValueView>(file: File, path: &Path, header: MapHeader) -> Result<SharedHashMap<V>> {
    let file_len = header.file_len()?;
    file.set_len(file_len)?;

    // SAFETY: the file was just created by this process; other processes
    // only ever access it through the same protocol.
    let mut mmap = unsafe { MmapMut::map_mut(&file)? };

    // Everything but the magic first; the magic publishes the header.
    let bytes = header.serialize();
    mmap[MAGIC_RANGE.end..HEADER_SIZE].copy_from_slice(&bytes[MAGIC_RANGE.end..]);

    let region = Arc::new(MappedRegion::new(mmap));
    magic_cell(&region).store(MapHeader::magic_word(), Ordering::Release);
    region.flush()?;

    info!(
        "Created shared hash map {} ({} segments x {} slots, {} bytes)",
        path.display(),
        header.segments,
        header.segment_capacity,
        file_len
    );

    SharedHashMap::from_parts(region, header, path.to_path_buf())
}

/// Maps an existing file and validates its header against the value type
/// and, if given, the configuration the caller asked for.
pub(crate) fn attach<V: ValueView>(path: &Path, expected: Option<&MapHeader>) -> Result<SharedHashMap<V>> {
    let file = OpenOptions::new().read(true).write(true).open(path)?;
    let deadline = Instant::now() + HEADER_PUBLISH_TIMEOUT;

    // A concurrent creator may not have sized the file yet.
    loop {
        let len = file.metadata()?.len();
        if len >= HEADER_SIZE as u64 {
            break;
        }
        if Instant::now() >= deadline {
            return Err(MapError::IncompatibleLayout(format!(
                "{} is {} bytes, too short to be a shared hash map",
                path.display(),
                len
            )));
        }
        thread::sleep(HEADER_PUBLISH_POLL);
    }

    // SAFETY: see `initialize`.
    let mmap = unsafe { MmapMut::map_mut(&file)? };
    let region = Arc::new(MappedRegion::new(mmap));

    let magic = magic_cell(&region);
    while magic.load(Ordering::Acquire) != MapHeader::magic_word() && Instant::now() < deadline {
        thread::sleep(HEADER_PUBLISH_POLL);
    }

    // SAFETY: the region is at least `HEADER_SIZE` bytes and the header is
    // never written after its magic is published.
    let header_bytes = unsafe { slice::from_raw_parts(region.as_ptr(), HEADER_SIZE) };
    let header = MapHeader::deserialize(header_bytes)?;

    let required = header.file_len()?;
    if (region.len() as u64) < required {
        return Err(MapError::IncompatibleLayout(format!(
            "{} is {} bytes but its header describes {} bytes",
            path.display(),
            region.len(),
            required
        )));
    }

    if header.value_type != V::TYPE_ID
        || header.value_size as usize != V::SIZE
        || header.value_align as usize != V::ALIGN
    {
        return Err(MapError::IncompatibleLayout(format!(
            "file stores values of type {} ({} bytes aligned to {}), \
             requested type {} ({} bytes aligned to {})",
            header.value_type,
            header.value_size,
            header.value_align,
            V::TYPE_ID,
            V::SIZE,
            V::ALIGN
        )));
    }

    if let Some(expected) = expected {
        if *expected != header {
            return Err(MapError::IncompatibleLayout(format!(
                "file was created with {} entries, {} segments, entry size {}, seed {}; \
                 requested {} entries, {} segments, entry size {}, seed {}",
                header.entries,
                header.segments,
                header.entry_size,
                header.hash_seed,
                expected.entries,
                expected.segments,
                expected.entry_size,
                expected.hash_seed
            )));
        }
    }

    debug!(
        "Attached to shared hash map {} ({} segments, capacity {})",
        path.display(),
        header.segments,
        header.capacity()
    );

    SharedHashMap::from_parts(region, header, path.to_path_buf())
}

#[inline]
fn magic_cell(region: &MappedRegion) -> &AtomicU64 {
    // SAFETY: offset 0 of a page-aligned mapping of at least `HEADER_SIZE`
    // bytes; the magic is only ever accessed atomically after creation.
    unsafe { AtomicU64::from_ptr(region.as_ptr().cast::<u64>()) }
}

#[cfg(test)]
mod tests {
    use super::*;
    use shared_hash_map_values::{IntValue, LongValue};

    #[test]
    fn test_defaults() {
        let header = SharedHashMapBuilder::new()
            .header_for::<LongValue>()
            .expect("Default configuration must be valid");
        assert_eq!(header.entries, DEFAULT_ENTRIES);
        assert_eq!(header.segments, DEFAULT_SEGMENTS);
        assert_eq!(header.entry_size, DEFAULT_ENTRY_SIZE);
        assert!(header.capacity() >= DEFAULT_ENTRIES);
    }

    #[test]
    fn test_single_segment_capacity_is_exact() {
        assert_eq!(segment_capacity_for(10, 1), 10);
        assert_eq!(segment_capacity_for(1, 1), 1);
    }

    #[test]
    fn test_headroom_covers_hash_skew() {
        let per_segment = segment_capacity_for(1_000_000, 128);
        let mean = 1_000_000u64.div_ceil(128);
        assert!(per_segment > mean);
        // Roughly six standard deviations of a binomial load.
        assert!(per_segment - mean >= 6 * 88);
    }

    #[test]
    fn test_invalid_configurations() {
        for builder in [
            SharedHashMapBuilder::new().entries(0),
            SharedHashMapBuilder::new().segments(0),
            SharedHashMapBuilder::new().entry_size(0),
            SharedHashMapBuilder::new().entry_size(4),
        ] {
            assert!(
                matches!(builder.header_for::<LongValue>(), Err(MapError::InvalidConfig(_))),
                "{:?} should be rejected",
                builder
            );
        }

        // An i32 fits where an i64 does not.
        assert!(SharedHashMapBuilder::new()
            .entry_size(4)
            .header_for::<IntValue>()
            .is_ok());
    }
}
