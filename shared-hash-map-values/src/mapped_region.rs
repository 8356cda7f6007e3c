use memmap2::MmapMut;
use std::fmt;
use std::io::Result;
use std::ptr::NonNull;

/// Writable memory mapping shared by a map and every view bound into it.
///
/// The region is reference-counted (`Arc<MappedRegion>`) by its owners: the
/// map holds one reference and each bound [`crate::ViewBinding`] holds
/// another, so the bytes stay mapped until the last of them is dropped. This
/// is what keeps a view sound even after the map that produced it was closed.
///
/// All mutation goes through the raw base pointer captured at construction;
/// the inner `MmapMut` is only touched again for `flush`.
pub struct MappedRegion {
    mmap: MmapMut,
    base: NonNull<u8>,
    len: usize,
}

// SAFETY: the mapping is plain shared memory. Every access made through
// `base` is either an atomic operation or happens under a lock that lives in
// the mapping itself.
unsafe impl Send for MappedRegion {}
unsafe impl Sync for MappedRegion {}

impl MappedRegion {
    /// Takes ownership of a writable mapping.
    pub fn new(mut mmap: MmapMut) -> Self {
        let len = mmap.len();
        let base = NonNull::new(mmap.as_mut_ptr()).unwrap_or(NonNull::dangling());
        Self { mmap, base, len }
    }

    /// Creates a zero-filled anonymous region of `len` bytes.
    ///
    /// Anonymous regions are only shared between threads of this process;
    /// they are used for scratch maps and tests.
    pub fn anonymous(len: usize) -> Result<Self> {
        Ok(Self::new(MmapMut::map_anon(len)?))
    }

    /// Base address of the mapping.
    #[inline]
    pub fn as_ptr(&self) -> *mut u8 {
        self.base.as_ptr()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if `offset .. offset + size` lies inside the region.
    #[inline]
    pub fn contains(&self, offset: usize, size: usize) -> bool {
        offset
            .checked_add(size)
            .is_some_and(|end| end <= self.len)
    }

    /// Synchronously writes dirty pages back to the backing file.
    pub fn flush(&self) -> Result<()> {
        self.mmap.flush()
    }
}

impl fmt::Debug for MappedRegion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappedRegion")
            .field("base", &self.base)
            .field("len", &self.len)
            .finish()
    }
}
