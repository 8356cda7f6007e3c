/// Per-segment slot allocator over a bitset stored in the mapped file.
///
/// Bit `i` of the bitset is set while slot `i` is occupied. `hint` is the
/// index of the lowest word that may still contain a clear bit; every word
/// below it is known to be full, so allocation resumes there instead of
/// rescanning the bitset (O(1) amortized).
///
/// The bitset and hint live inside the segment region. A `FreeSlotIndex` may
/// only be built while the owning segment's lock is held exclusively.
pub struct FreeSlotIndex<'a> {
    words: &'a mut [u64],
    hint: &'a mut u64,
    capacity: u64,
}

/// Number of `u64` words needed to track `capacity` slots.
#[inline]
pub fn bitset_words(capacity: u64) -> usize {
    capacity.div_ceil(64) as usize
}

impl<'a> FreeSlotIndex<'a> {
    pub fn new(words: &'a mut [u64], hint: &'a mut u64, capacity: u64) -> Self {
        debug_assert_eq!(words.len(), bitset_words(capacity));
        Self {
            words,
            hint,
            capacity,
        }
    }

    /// Claims the lowest free slot, or `None` if every slot is in use.
    ///
    /// A slot returned here is not returned again until it is released.
    pub fn allocate(&mut self) -> Option<u64> {
        let start = (*self.hint as usize).min(self.words.len());

        for index in start..self.words.len() {
            let word = u64::from_le(self.words[index]);
            if word == u64::MAX {
                continue;
            }

            let bit = (!word).trailing_zeros() as u64;
            let slot = index as u64 * 64 + bit;
            if slot >= self.capacity {
                // Only the padding bits of the last word are clear.
                break;
            }

            self.words[index] = (word | (1u64 << bit)).to_le();
            *self.hint = index as u64;
            return Some(slot);
        }

        *self.hint = self.words.len() as u64;
        None
    }

    /// Returns `slot` to the pool.
    ///
    /// Returns `false` if the slot was not allocated.
    pub fn release(&mut self, slot: u64) -> bool {
        if slot >= self.capacity {
            return false;
        }

        let index = (slot / 64) as usize;
        let mask = 1u64 << (slot % 64);
        let word = u64::from_le(self.words[index]);
        if word & mask == 0 {
            return false;
        }

        self.words[index] = (word & !mask).to_le();
        *self.hint = (*self.hint).min(index as u64);
        true
    }

    /// Frees every slot.
    pub fn clear(&mut self) {
        self.words.fill(0);
        *self.hint = 0;
    }
}

/// Iterator over the occupied slots recorded in a bitset, lowest first.
pub struct OccupiedSlots<'a> {
    words: &'a [u64],
    index: usize,
    current: u64,
}

impl<'a> OccupiedSlots<'a> {
    pub fn new(words: &'a [u64]) -> Self {
        Self {
            words,
            index: 0,
            current: words.first().map_or(0, |word| u64::from_le(*word)),
        }
    }
}

impl Iterator for OccupiedSlots<'_> {
    type Item = u64;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as u64;
                self.current &= self.current - 1;
                return Some(self.index as u64 * 64 + bit);
            }

            self.index += 1;
            self.current = u64::from_le(*self.words.get(self.index)?);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_parts(capacity: u64) -> (Vec<u64>, u64) {
        (vec![0u64; bitset_words(capacity)], 0)
    }

    #[test]
    fn test_allocates_every_slot_once() {
        let (mut words, mut hint) = index_parts(130);
        let mut index = FreeSlotIndex::new(&mut words, &mut hint, 130);

        let mut seen = std::collections::HashSet::new();
        for _ in 0..130 {
            let slot = index.allocate().expect("Slot should be available");
            assert!(slot < 130);
            assert!(seen.insert(slot), "Slot {} handed out twice", slot);
        }
        assert_eq!(index.allocate(), None, "Index must report exhaustion");
    }

    #[test]
    fn test_released_slot_is_reused() {
        let (mut words, mut hint) = index_parts(70);
        let mut index = FreeSlotIndex::new(&mut words, &mut hint, 70);
        for _ in 0..70 {
            index.allocate();
        }

        assert!(index.release(3));
        assert!(!index.release(3), "Double release must be rejected");
        assert_eq!(index.allocate(), Some(3));
        assert_eq!(index.allocate(), None);
    }

    #[test]
    fn test_release_out_of_range_is_ignored() {
        let (mut words, mut hint) = index_parts(10);
        let mut index = FreeSlotIndex::new(&mut words, &mut hint, 10);
        assert!(!index.release(10));
        assert!(!index.release(u64::MAX));
    }

    #[test]
    fn test_occupied_slots_iterates_set_bits() {
        let (mut words, mut hint) = index_parts(200);
        {
            let mut index = FreeSlotIndex::new(&mut words, &mut hint, 200);
            for _ in 0..200 {
                index.allocate();
            }
            for slot in (0..200).filter(|slot| slot % 3 != 0) {
                index.release(slot);
            }
        }

        let occupied: Vec<u64> = OccupiedSlots::new(&words).collect();
        let expected: Vec<u64> = (0..200).filter(|slot| slot % 3 == 0).collect();
        assert_eq!(occupied, expected);
    }

    #[test]
    fn test_clear_frees_everything() {
        let (mut words, mut hint) = index_parts(64);
        let mut index = FreeSlotIndex::new(&mut words, &mut hint, 64);
        for _ in 0..64 {
            index.allocate();
        }
        index.clear();
        assert_eq!(index.allocate(), Some(0));
    }
}
