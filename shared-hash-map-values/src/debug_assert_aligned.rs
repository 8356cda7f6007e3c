/// Debug-only alignment check for a pointer a view is about to bind to.
///
/// Hardware atomics on a misaligned address either fault or silently lose
/// atomicity, so every bind path calls this before handing the address to a
/// view. The symbol always exists so callers in other crates need no cfg
/// fences of their own; only the body is gated.
///
/// - Debug/test: asserts `align` is a power of two and `ptr` honors it.
/// - Release/bench: compiles to nothing.
#[inline]
pub fn debug_assert_aligned(ptr: *const u8, align: usize) {
    #[cfg(any(test, debug_assertions))]
    {
        debug_assert!(align.is_power_of_two());
        debug_assert!(
            (ptr as usize & (align - 1)) == 0,
            "value address is not {}-byte aligned",
            align
        );
    }

    #[cfg(not(any(test, debug_assertions)))]
    {
        let _ = ptr;
        let _ = align;
    }
}

/// Debug-only check that a region-relative offset is a multiple of `align`.
///
/// Mapped regions start on a page boundary, so an aligned offset implies an
/// aligned address. Use [`debug_assert_aligned`] when the base is not known
/// to be page aligned.
#[inline]
pub fn debug_assert_aligned_offset(off: usize, align: usize) {
    #[cfg(any(test, debug_assertions))]
    {
        debug_assert!(align.is_power_of_two());
        debug_assert!(
            off.is_multiple_of(align),
            "value offset not {}-byte aligned (got {})",
            align,
            off
        );
    }

    #[cfg(not(any(test, debug_assertions)))]
    {
        let _ = off;
        let _ = align;
    }
}
