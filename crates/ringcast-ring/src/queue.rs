//! Preallocated slot storage.

use crate::error::CapacityError;
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Fixed-capacity circular array of reusable slots.
///
/// Slots are created once and mutated in place; the queue never resizes.
/// Each slot sits behind its own lock, but the claim protocol in
/// [`crate::Sequencer`] guarantees the lock is uncontended in the steady
/// state: one producer writes between claim and release, consumers read
/// only after release.
pub struct RingQueue<T> {
    slots: Box<[RwLock<T>]>,
    mask: usize,
}

impl<T> RingQueue<T> {
    /// Allocate `capacity` slots, each built by `init`.
    pub fn new(capacity: usize, mut init: impl FnMut() -> T) -> Result<Self, CapacityError> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(CapacityError::NotPowerOfTwo(capacity));
        }
        let slots = (0..capacity)
            .map(|_| RwLock::new(init()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ok(Self {
            slots,
            mask: capacity - 1,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Slot index for `cursor`.
    #[inline]
    pub fn index(&self, cursor: i64) -> usize {
        (cursor as usize) & self.mask
    }

    /// Exclusive access to the slot backing `cursor`.
    ///
    /// Callers must hold the claim for `cursor`.
    #[inline]
    pub fn get(&self, cursor: i64) -> RwLockWriteGuard<'_, T> {
        self.slots[self.index(cursor)].write()
    }

    /// Shared access to the slot backing `cursor`.
    #[inline]
    pub fn read(&self, cursor: i64) -> RwLockReadGuard<'_, T> {
        self.slots[self.index(cursor)].read()
    }
}

impl<T: Default> RingQueue<T> {
    /// Allocate `capacity` default-initialised slots.
    pub fn with_capacity(capacity: usize) -> Result<Self, CapacityError> {
        Self::new(capacity, T::default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_power_of_two() {
        assert!(matches!(
            RingQueue::<u8>::with_capacity(6),
            Err(CapacityError::NotPowerOfTwo(6))
        ));
        assert!(RingQueue::<u8>::with_capacity(0).is_err());
    }

    #[test]
    fn cursor_wraps_onto_slots() {
        let queue = RingQueue::<u32>::with_capacity(4).unwrap();
        assert_eq!(queue.index(0), 0);
        assert_eq!(queue.index(3), 3);
        assert_eq!(queue.index(4), 0);
        assert_eq!(queue.index(9), 1);
    }

    #[test]
    fn slots_are_mutated_in_place() {
        let queue = RingQueue::new(2, || String::with_capacity(16)).unwrap();
        queue.get(1).push_str("hello");
        assert_eq!(&*queue.read(3), "hello");
        assert!(queue.read(0).is_empty());
    }
}
