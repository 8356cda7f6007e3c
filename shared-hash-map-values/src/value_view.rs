use crate::constants::MAX_VALUE_ALIGN;
use crate::{MappedRegion, ViewBinding, debug_assert_aligned};
use std::sync::Arc;

/// A type that can be overlaid on raw mapped bytes and exposes typed,
/// atomic operations on them.
///
/// Implementors are caller-owned flyweights: one instance is created up front
/// and rebound to a different entry on every lookup instead of allocating a
/// value per call. The map only needs four things from a view type:
///
/// - [`Self::SIZE`]: how many bytes to reserve for the value in every slot,
/// - [`Self::ALIGN`]: which alignment the value region must honor,
/// - [`Self::TYPE_ID`]: which encoding the stored bytes use,
/// - access to the view's [`ViewBinding`] so it can bind it.
///
/// Freshly created entries are zero-filled, so a view's "zero value" is
/// whatever all-zero bytes decode to.
///
/// Operations a view exposes must be expressible as single hardware atomics
/// (load, store, add, compare-and-swap). Views are mutated without holding
/// the segment lock, so multi-step mutations would race.
pub trait ValueView {
    /// Serialized size of the value in bytes.
    const SIZE: usize;

    /// Required alignment of the value region (a power of two, at most
    /// [`MAX_VALUE_ALIGN`]).
    const ALIGN: usize;

    /// Identifier stored in the map header. Views with the same size and
    /// alignment but different encodings (an `i64` and an `f64`) must use
    /// different identifiers so a file is never opened as the wrong type.
    const TYPE_ID: u32;

    fn binding(&self) -> &ViewBinding;

    fn binding_mut(&mut self) -> &mut ViewBinding;

    #[inline]
    fn is_bound(&self) -> bool {
        self.binding().is_bound()
    }

    /// Detaches the view from whatever entry it was bound to.
    #[inline]
    fn unbind(&mut self) {
        self.binding_mut().unbind();
    }

    /// Binds the view to the value stored at `region[offset..]`.
    ///
    /// # Safety
    /// Same contract as [`ViewBinding::bind`]: the range must be in bounds,
    /// aligned to [`Self::ALIGN`], and reserved for a value of this type.
    #[inline]
    unsafe fn bind_to(&mut self, region: &Arc<MappedRegion>, offset: usize) {
        debug_assert!(Self::ALIGN <= MAX_VALUE_ALIGN);
        debug_assert!(region.contains(offset, Self::SIZE));
        debug_assert_aligned(region.as_ptr().wrapping_add(offset), Self::ALIGN);

        // SAFETY: forwarded to the caller.
        unsafe { self.binding_mut().bind(region, offset) }
    }

    /// Returns `true` if both views are bound to the same stored value.
    #[inline]
    fn is_same_entry(&self, other: &Self) -> bool
    where
        Self: Sized,
    {
        self.binding().same_target(other.binding())
    }
}
