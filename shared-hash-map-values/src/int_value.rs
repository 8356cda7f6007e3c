use crate::constants::INT_VALUE_TYPE_ID;
use crate::{ValueView, ViewBinding};
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};

/// Flyweight view over a signed 32-bit value stored in a map entry.
///
/// Same semantics as [`crate::LongValue`], for entries that only need four
/// bytes of value budget.
#[derive(Default)]
pub struct IntValue {
    binding: ViewBinding,
}

impl IntValue {
    pub const fn new() -> Self {
        Self {
            binding: ViewBinding::unbound(),
        }
    }

    #[inline]
    fn cell(&self) -> &AtomicI32 {
        let ptr = self.binding.expect_bound("IntValue");
        // SAFETY: the binding points at 4 in-bounds, 4-byte aligned bytes
        // kept mapped by the binding's region share.
        unsafe { AtomicI32::from_ptr(ptr.as_ptr().cast::<i32>()) }
    }

    #[inline]
    pub fn get_value(&self) -> i32 {
        self.cell().load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_value(&self, value: i32) {
        self.cell().store(value, Ordering::Release);
    }

    /// Atomically adds `delta` and returns the **new** value.
    #[inline]
    pub fn add_atomic_value(&self, delta: i32) -> i32 {
        self.cell()
            .fetch_add(delta, Ordering::AcqRel)
            .wrapping_add(delta)
    }

    #[inline]
    pub fn compare_and_swap_value(&self, expected: i32, value: i32) -> bool {
        self.cell()
            .compare_exchange(expected, value, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    #[inline]
    pub fn get_and_set_value(&self, value: i32) -> i32 {
        self.cell().swap(value, Ordering::AcqRel)
    }
}

impl ValueView for IntValue {
    const SIZE: usize = 4;
    const ALIGN: usize = 4;
    const TYPE_ID: u32 = INT_VALUE_TYPE_ID;

    #[inline]
    fn binding(&self) -> &ViewBinding {
        &self.binding
    }

    #[inline]
    fn binding_mut(&mut self) -> &mut ViewBinding {
        &mut self.binding
    }
}

impl fmt::Debug for IntValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_bound() {
            f.debug_tuple("IntValue").field(&self.get_value()).finish()
        } else {
            f.write_str("IntValue(unbound)")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MappedRegion;
    use std::sync::Arc;

    #[test]
    fn test_int_value_wraps_on_overflow() {
        let region = Arc::new(MappedRegion::anonymous(16).expect("Failed to map region"));
        let mut value = IntValue::new();
        unsafe { value.bind_to(&region, 4) };

        value.set_value(i32::MAX);
        assert_eq!(value.add_atomic_value(1), i32::MIN);
    }

    #[test]
    fn test_int_values_at_adjacent_offsets_are_independent() {
        let region = Arc::new(MappedRegion::anonymous(16).expect("Failed to map region"));
        let mut a = IntValue::new();
        let mut b = IntValue::new();
        unsafe {
            a.bind_to(&region, 0);
            b.bind_to(&region, 4);
        }

        a.set_value(-1);
        assert_eq!(b.get_value(), 0);
        assert!(b.compare_and_swap_value(0, 9));
        assert_eq!(a.get_value(), -1);
        assert_eq!(b.get_and_set_value(3), 9);
    }
}
