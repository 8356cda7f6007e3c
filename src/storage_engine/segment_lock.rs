use crate::storage_engine::constants::LOCK_SPINS_BEFORE_YIELD;
use std::hint::spin_loop;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;

/// Writer bit of the lock word; the low 31 bits count shared holders.
const WRITER: u32 = 1 << 31;

/// Reader/writer spin lock whose state is one `u32` inside the mapped file.
///
/// Because the word lives in the shared mapping, the lock is race-free
/// across unrelated processes, not just between threads of one process.
///
/// - No fairness: a steady stream of readers can delay a writer.
/// - No re-entrancy: acquiring twice from one thread deadlocks.
/// - No timeout: callers needing bounded waits loop on the `try_` variants.
///
/// A map never holds two segment locks at once (a key maps to exactly one
/// segment), which is what keeps this deadlock-free.
#[derive(Clone, Copy)]
pub struct SegmentLock<'a> {
    state: &'a AtomicU32,
}

impl<'a> SegmentLock<'a> {
    pub fn new(state: &'a AtomicU32) -> Self {
        Self { state }
    }

    /// # Safety
    /// `ptr` must be 4-byte aligned and valid for reads and writes for `'a`,
    /// and every other access to it must be atomic.
    #[inline]
    pub unsafe fn from_ptr(ptr: *mut u32) -> Self {
        // SAFETY: forwarded to the caller.
        Self::new(unsafe { AtomicU32::from_ptr(ptr) })
    }

    /// Spins until the lock is held exclusively.
    pub fn acquire_exclusive(&self) -> ExclusiveGuard<'a> {
        let mut spins = 0;
        loop {
            if let Some(guard) = self.try_acquire_exclusive() {
                return guard;
            }
            backoff(&mut spins);
        }
    }

    #[inline]
    pub fn try_acquire_exclusive(&self) -> Option<ExclusiveGuard<'a>> {
        self.state
            .compare_exchange(0, WRITER, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| ExclusiveGuard { state: self.state })
    }

    /// Spins until the lock is held in shared mode.
    pub fn acquire_shared(&self) -> SharedGuard<'a> {
        let mut spins = 0;
        loop {
            if let Some(guard) = self.try_acquire_shared() {
                return guard;
            }
            backoff(&mut spins);
        }
    }

    #[inline]
    pub fn try_acquire_shared(&self) -> Option<SharedGuard<'a>> {
        let current = self.state.load(Ordering::Relaxed);
        if current & WRITER != 0 || current == WRITER - 1 {
            return None;
        }

        self.state
            .compare_exchange(current, current + 1, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| SharedGuard { state: self.state })
    }

    #[inline]
    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Relaxed) != 0
    }
}

#[inline]
fn backoff(spins: &mut u32) {
    if *spins < LOCK_SPINS_BEFORE_YIELD {
        *spins += 1;
        spin_loop();
    } else {
        // The holder may be another process that got descheduled.
        thread::yield_now();
    }
}

/// Releases exclusive ownership on drop.
#[must_use = "the segment is unlocked as soon as the guard is dropped"]
pub struct ExclusiveGuard<'a> {
    state: &'a AtomicU32,
}

impl Drop for ExclusiveGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.state.store(0, Ordering::Release);
    }
}

/// Releases one shared hold on drop.
#[must_use = "the segment is unlocked as soon as the guard is dropped"]
pub struct SharedGuard<'a> {
    state: &'a AtomicU32,
}

impl Drop for SharedGuard<'_> {
    #[inline]
    fn drop(&mut self) {
        self.state.fetch_sub(1, Ordering::Release);
    }
}
