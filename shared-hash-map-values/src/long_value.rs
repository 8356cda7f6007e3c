use crate::constants::{LONG_VALUE_TYPE_ID, WORD_ALIGN};
use crate::{ValueView, ViewBinding};
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};

/// Flyweight view over a signed 64-bit counter stored in a map entry.
///
/// Every operation is a single hardware atomic on the mapped bytes, so two
/// processes incrementing the same entry never lose an update.
///
/// ## Ordering
/// - Loads use `Acquire`, stores use `Release`.
/// - Read-modify-write operations use `AcqRel`.
///
/// Values are stored in native byte order.
#[derive(Default)]
pub struct LongValue {
    binding: ViewBinding,
}

impl LongValue {
    pub const fn new() -> Self {
        Self {
            binding: ViewBinding::unbound(),
        }
    }

    #[inline]
    fn cell(&self) -> &AtomicI64 {
        let ptr = self.binding.expect_bound("LongValue");
        // SAFETY: the binding points at 8 in-bounds, 8-byte aligned bytes
        // that stay mapped while `self.binding` holds the region.
        unsafe { AtomicI64::from_ptr(ptr.as_ptr().cast::<i64>()) }
    }

    #[inline]
    pub fn get_value(&self) -> i64 {
        self.cell().load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_value(&self, value: i64) {
        self.cell().store(value, Ordering::Release);
    }

    /// Atomically adds `delta` and returns the **new** value.
    #[inline]
    pub fn add_atomic_value(&self, delta: i64) -> i64 {
        self.cell()
            .fetch_add(delta, Ordering::AcqRel)
            .wrapping_add(delta)
    }

    /// Stores `value` only if the current value equals `expected`.
    ///
    /// Returns `true` if the swap happened.
    #[inline]
    pub fn compare_and_swap_value(&self, expected: i64, value: i64) -> bool {
        self.cell()
            .compare_exchange(expected, value, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Stores `value` and returns the previous value.
    #[inline]
    pub fn get_and_set_value(&self, value: i64) -> i64 {
        self.cell().swap(value, Ordering::AcqRel)
    }
}

impl ValueView for LongValue {
    const SIZE: usize = 8;
    const ALIGN: usize = WORD_ALIGN;
    const TYPE_ID: u32 = LONG_VALUE_TYPE_ID;

    #[inline]
    fn binding(&self) -> &ViewBinding {
        &self.binding
    }

    #[inline]
    fn binding_mut(&mut self) -> &mut ViewBinding {
        &mut self.binding
    }
}

impl fmt::Debug for LongValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bound() {
            f.debug_tuple("LongValue").field(&self.get_value()).finish()
        } else {
            f.write_str("LongValue(unbound)")
        }
    }
}
