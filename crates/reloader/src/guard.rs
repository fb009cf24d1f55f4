//! ReadGuard - RAII pin on the active slot of a loader.

use std::fmt;
use std::ops::Deref;

use crate::slot::Slot;

/// Read access to one loaded version.
///
/// Holding a guard keeps its slot from being reclaimed; the publisher waits
/// for every guard on a retiring slot to drop before destroying its payload.
/// Keep guards short-lived: no I/O or long computation while holding one.
///
/// There is no owned snapshot that outlives the pin. To keep data past the
/// guard, copy it out, or store it in `T` behind an `Arc` and clone that.
/// A guard borrows its loader and cannot outlive it:
///
/// ```compile_fail
/// use reloader::{DataLoader, Reload, ReloadError};
///
/// #[derive(Default)]
/// struct Table;
///
/// impl Reload for Table {
///     fn reload(&mut self) -> Result<(), ReloadError> {
///         Ok(())
///     }
/// }
///
/// let guard = {
///     let loader = DataLoader::<Table>::new();
///     loader.start(60).unwrap();
///     loader.acquire()
/// };
/// ```
///
/// On drop: the slot's reader count is decremented.
pub struct ReadGuard<'a, T> {
    slot: &'a Slot<T>,
    value: &'a T,
    index: usize,
}

impl<'a, T> ReadGuard<'a, T> {
    /// Wrap a pin that the caller has already taken on `slot`.
    ///
    /// Returns `None` (and releases the pin) if the slot has no payload.
    pub(crate) fn from_pinned(slot: &'a Slot<T>, index: usize) -> Option<Self> {
        // SAFETY: the pin keeps the publisher away from this payload until
        // the guard drops.
        match unsafe { slot.payload() } {
            Some(value) => Some(Self { slot, value, index }),
            None => {
                slot.unpin();
                None
            }
        }
    }

    /// Generation of the pinned version (1 for the initial load).
    pub fn generation(&self) -> u64 {
        self.slot.generation()
    }

    /// Index (0 or 1) of the pinned slot.
    pub fn slot_index(&self) -> usize {
        self.index
    }
}

impl<T> Deref for ReadGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        self.value
    }
}

impl<T> Drop for ReadGuard<'_, T> {
    fn drop(&mut self) {
        self.slot.unpin();
    }
}

impl<T: fmt::Debug> fmt::Debug for ReadGuard<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadGuard")
            .field("slot", &self.index)
            .field("generation", &self.generation())
            .field("value", self.value)
            .finish()
    }
}
