//! Slot - one of the two storage cells behind a loader.
//!
//! A slot holds an optional payload and a signed reader count:
//! - `refcount >= 0`: open, the value is the number of pinned readers
//! - `refcount == RETIRED`: closed, new readers are refused
//!
//! Readers only ever touch the count and take shared references to the
//! payload. The payload itself is replaced and taken exclusively by the
//! publisher, and only while the slot is closed and not the active slot.

use std::cell::UnsafeCell;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};

use crossbeam_utils::{Backoff, CachePadded};

/// Refcount sentinel for a slot that refuses new readers.
pub(crate) const RETIRED: i32 = -1;

/// Outcome of a single attempt to pin a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PinAttempt {
    Pinned,
    /// Slot is retiring or idle.
    Closed,
    /// Lost a compare-and-swap race against another reader or the publisher.
    Contended,
}

pub(crate) struct Slot<T> {
    refcount: CachePadded<AtomicI32>,
    generation: AtomicU64,
    payload: UnsafeCell<Option<T>>,
}

// SAFETY: the payload is only mutated by the publisher while no reader can
// hold a reference to it (closed and drained), and readers only take `&T`.
// Sharing `&T` across threads needs `T: Sync`; building and dropping `T` on
// the publisher thread needs `T: Send`.
unsafe impl<T: Send + Sync> Sync for Slot<T> {}

impl<T> Slot<T> {
    /// An idle, closed slot with no payload.
    pub(crate) fn new() -> Self {
        Self {
            refcount: CachePadded::new(AtomicI32::new(RETIRED)),
            generation: AtomicU64::new(0),
            payload: UnsafeCell::new(None),
        }
    }

    pub(crate) fn try_pin(&self) -> PinAttempt {
        let current = self.refcount.load(Ordering::Acquire);
        if current == RETIRED {
            return PinAttempt::Closed;
        }

        // Acquire pairs with the publisher's release in `open`, so a pinned
        // reader sees the fully loaded payload.
        match self.refcount.compare_exchange_weak(
            current,
            current + 1,
            Ordering::Acquire,
            Ordering::Relaxed,
        ) {
            Ok(_) => PinAttempt::Pinned,
            Err(_) => PinAttempt::Contended,
        }
    }

    pub(crate) fn unpin(&self) {
        let prev = self.refcount.fetch_sub(1, Ordering::Release);
        debug_assert!(prev > 0, "slot unpinned without a matching pin (count was {prev})");
    }

    /// Number of pinned readers, or `None` while closed.
    pub(crate) fn readers(&self) -> Option<usize> {
        match self.refcount.load(Ordering::Acquire) {
            RETIRED => None,
            n => Some(n as usize),
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Shared access to the payload.
    ///
    /// # Safety
    /// The caller must hold a pin on this slot, or be the publisher.
    pub(crate) unsafe fn payload(&self) -> Option<&T> {
        unsafe { (*self.payload.get()).as_ref() }
    }

    /// Install a fresh payload for `generation` and return exclusive access to
    /// it. Any previous payload is dropped.
    ///
    /// # Safety
    /// Publisher only. The slot must be closed, drained, and not active.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn install(&self, value: T, generation: u64) -> &mut T {
        debug_assert_eq!(self.refcount.load(Ordering::Relaxed), RETIRED);
        self.generation.store(generation, Ordering::Relaxed);
        let payload = unsafe { &mut *self.payload.get() };
        payload.insert(value)
    }

    /// Remove the payload, leaving the slot idle.
    ///
    /// # Safety
    /// Publisher only. The slot must be closed and drained.
    pub(crate) unsafe fn take(&self) -> Option<T> {
        debug_assert_eq!(self.refcount.load(Ordering::Relaxed), RETIRED);
        unsafe { (*self.payload.get()).take() }
    }

    /// Open the slot to readers with a count of zero.
    ///
    /// Release ordering publishes the payload written by `install`.
    pub(crate) fn open(&self) {
        self.refcount.store(0, Ordering::Release);
    }

    /// Wait until no reader holds the slot, then close it.
    ///
    /// The transition is only ever attempted from exactly zero; an observed
    /// nonzero count is never carried forward as the expected value. Returns
    /// the number of failed attempts.
    pub(crate) fn drain(&self) -> u64 {
        let backoff = Backoff::new();
        let mut attempts = 0u64;
        // Acquire pairs with every reader's release in `unpin`, so all reads
        // of the payload happen before the caller drops it.
        while self
            .refcount
            .compare_exchange_weak(0, RETIRED, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            attempts += 1;
            backoff.snooze();
        }
        attempts
    }
}
