use crate::MappedRegion;
use std::fmt;
use std::ptr::NonNull;
use std::sync::Arc;

/// The target a value view is currently bound to.
///
/// A binding owns a clone of the region's `Arc`, so the address it caches can
/// never dangle. Rebinding to another offset of the same region only moves
/// the cached pointer; the reference count is untouched.
#[derive(Default)]
pub struct ViewBinding {
    target: Option<BoundTarget>,
}

struct BoundTarget {
    region: Arc<MappedRegion>,
    offset: usize,
    ptr: NonNull<u8>,
}

// SAFETY: `ptr` always points into `region`, which is itself `Send + Sync`
// and kept alive by the `Arc` stored alongside it.
unsafe impl Send for ViewBinding {}
unsafe impl Sync for ViewBinding {}

impl ViewBinding {
    pub const fn unbound() -> Self {
        Self { target: None }
    }

    /// Points this binding at `region[offset..]`.
    ///
    /// # Safety
    /// - `offset .. offset + size_of_value` must lie inside `region`.
    /// - The address must satisfy the alignment of the view using it.
    /// - The bytes must be reserved for exactly one value of that view type
    ///   and only ever be accessed through atomic operations while bound.
    #[inline]
    pub unsafe fn bind(&mut self, region: &Arc<MappedRegion>, offset: usize) {
        // SAFETY: the caller guarantees `offset` is in bounds.
        let ptr = unsafe { NonNull::new_unchecked(region.as_ptr().add(offset)) };

        match &mut self.target {
            Some(target) if Arc::ptr_eq(&target.region, region) => {
                target.offset = offset;
                target.ptr = ptr;
            }
            _ => {
                self.target = Some(BoundTarget {
                    region: Arc::clone(region),
                    offset,
                    ptr,
                });
            }
        }
    }

    /// Drops the binding (and this view's share of the region).
    #[inline]
    pub fn unbind(&mut self) {
        self.target = None;
    }

    #[inline]
    pub fn is_bound(&self) -> bool {
        self.target.is_some()
    }

    /// Offset of the bound value inside its region.
    #[inline]
    pub fn offset(&self) -> Option<usize> {
        self.target.as_ref().map(|target| target.offset)
    }

    #[inline]
    pub fn region(&self) -> Option<&Arc<MappedRegion>> {
        self.target.as_ref().map(|target| &target.region)
    }

    #[inline]
    pub fn as_ptr(&self) -> Option<NonNull<u8>> {
        self.target.as_ref().map(|target| target.ptr)
    }

    /// Returns `true` if both bindings reference the same bytes.
    pub fn same_target(&self, other: &ViewBinding) -> bool {
        match (self.as_ptr(), other.as_ptr()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Address of the bound value.
    ///
    /// # Panics
    /// If the binding is empty. Reading through an unbound view is a
    /// programming error, the same way indexing past a slice is.
    #[inline]
    pub fn expect_bound(&self, view: &'static str) -> NonNull<u8> {
        match &self.target {
            Some(target) => target.ptr,
            None => panic!("{view} is not bound to a map entry"),
        }
    }
}

impl fmt::Debug for ViewBinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.target {
            Some(target) => f
                .debug_struct("ViewBinding")
                .field("offset", &target.offset)
                .field("ptr", &target.ptr)
                .finish(),
            None => f.write_str("ViewBinding(unbound)"),
        }
    }
}
