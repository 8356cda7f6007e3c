use crate::constants::{DOUBLE_VALUE_TYPE_ID, WORD_ALIGN};
use crate::{ValueView, ViewBinding};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Flyweight view over an `f64` stored in a map entry.
///
/// The value is kept as its IEEE-754 bit pattern in a 64-bit word. There is
/// no hardware float add, so [`DoubleValue::add_atomic_value`] retries a
/// compare-and-swap until it wins; it never blocks.
#[derive(Default)]
pub struct DoubleValue {
    binding: ViewBinding,
}

impl DoubleValue {
    pub const fn new() -> Self {
        Self {
            binding: ViewBinding::unbound(),
        }
    }

    #[inline]
    fn cell(&self) -> &AtomicU64 {
        let ptr = self.binding.expect_bound("DoubleValue");
        // SAFETY: the binding points at 8 in-bounds, 8-byte aligned bytes
        // kept mapped by the binding's region share.
        unsafe { AtomicU64::from_ptr(ptr.as_ptr().cast::<u64>()) }
    }

    #[inline]
    pub fn get_value(&self) -> f64 {
        f64::from_bits(self.cell().load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_value(&self, value: f64) {
        self.cell().store(value.to_bits(), Ordering::Release);
    }

    /// Atomically adds `delta` and returns the **new** value.
    pub fn add_atomic_value(&self, delta: f64) -> f64 {
        let cell = self.cell();
        let mut current = cell.load(Ordering::Acquire);
        loop {
            let next = (f64::from_bits(current) + delta).to_bits();
            match cell.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Acquire) {
                Ok(_) => return f64::from_bits(next),
                Err(observed) => current = observed,
            }
        }
    }

    /// Bitwise compare-and-swap: `expected` must match the stored bits
    /// exactly (so `-0.0` does not match `0.0`, and a stored NaN matches
    /// only the same NaN payload).
    #[inline]
    pub fn compare_and_swap_value(&self, expected: f64, value: f64) -> bool {
        self.cell()
            .compare_exchange(
                expected.to_bits(),
                value.to_bits(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

impl ValueView for DoubleValue {
    const SIZE: usize = 8;
    const ALIGN: usize = WORD_ALIGN;
    const TYPE_ID: u32 = DOUBLE_VALUE_TYPE_ID;

    #[inline]
    fn binding(&self) -> &ViewBinding {
        &self.binding
    }

    #[inline]
    fn binding_mut(&mut self) -> &mut ViewBinding {
        &mut self.binding
    }
}

impl fmt::Debug for DoubleValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bound() {
            f.debug_tuple("DoubleValue").field(&self.get_value()).finish()
        } else {
            f.write_str("DoubleValue(unbound)")
        }
    }
}
