//! Padded atomic cursor.

use std::sync::atomic::{AtomicI64, Ordering};

/// Cursor value of a sequence that has not observed any slot yet.
pub const INITIAL_CURSOR: i64 = -1;

/// A monotonically increasing cursor shared between threads.
///
/// Producers use one to hand out claims, consumers use one each to record
/// the last cursor they fully processed. The value is padded to its own
/// cache line pair so neighbouring sequences never false-share.
#[repr(align(128))]
#[derive(Debug)]
pub struct Sequence {
    value: AtomicI64,
}

impl Sequence {
    /// Create a sequence positioned at `initial`.
    pub const fn new(initial: i64) -> Self {
        Self {
            value: AtomicI64::new(initial),
        }
    }

    /// Current cursor (acquire).
    #[inline]
    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }

    /// Publish a new cursor (release).
    #[inline]
    pub fn set(&self, value: i64) {
        self.value.store(value, Ordering::Release);
    }

    /// Atomically move from `current` to `next`. Returns `false` if another
    /// thread got there first.
    #[inline]
    pub fn compare_and_set(&self, current: i64, next: i64) -> bool {
        self.value
            .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

impl Default for Sequence {
    fn default() -> Self {
        Self::new(INITIAL_CURSOR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_empty() {
        assert_eq!(Sequence::default().get(), INITIAL_CURSOR);
    }

    #[test]
    fn compare_and_set_only_moves_from_expected() {
        let seq = Sequence::new(4);
        assert!(!seq.compare_and_set(3, 5));
        assert_eq!(seq.get(), 4);
        assert!(seq.compare_and_set(4, 5));
        assert_eq!(seq.get(), 5);
    }

    #[test]
    fn padded_to_avoid_false_sharing() {
        assert_eq!(std::mem::align_of::<Sequence>(), 128);
    }
}
