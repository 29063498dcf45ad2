//! Slots plus sequencer: the publish/consume surface most callers use.

use crate::error::{CapacityError, ReadError, Unavailable};
use crate::queue::RingQueue;
use crate::sequence::Sequence;
use crate::sequencer::{ClaimPolicy, Sequencer, SlotState};
use parking_lot::RwLockWriteGuard;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

/// A ring of preallocated `T` slots with claim/release publishing.
pub struct Ring<T> {
    queue: RingQueue<T>,
    sequencer: Sequencer,
}

impl<T> Ring<T> {
    pub fn new(capacity: usize, init: impl FnMut() -> T) -> Result<Self, CapacityError> {
        Ok(Self {
            queue: RingQueue::new(capacity, init)?,
            sequencer: Sequencer::new(capacity)?,
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Highest claimed cursor.
    #[inline]
    pub fn cursor(&self) -> i64 {
        self.sequencer.cursor()
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.sequencer
    }

    pub fn close(&self) {
        self.sequencer.close();
    }

    pub fn is_closed(&self) -> bool {
        self.sequencer.is_closed()
    }

    /// Claim the next slot under `policy`.
    ///
    /// The returned guard derefs to the slot. It is released by
    /// [`Claim::release`] or, failing that, when it is dropped.
    pub fn claim(&self, policy: ClaimPolicy) -> Result<Claim<'_, T>, Unavailable> {
        let cursor = self.sequencer.next(policy)?;
        Ok(Claim {
            cursor,
            slot: Some(self.queue.get(cursor)),
            sequencer: &self.sequencer,
        })
    }

    /// Attach a consumer positioned at the current cursor. It sees only
    /// slots claimed after this call.
    pub fn subscribe(self: &Arc<Self>) -> Subscriber<T> {
        let sequence = Arc::new(Sequence::new(self.cursor()));
        self.sequencer.add_gating(Arc::clone(&sequence));
        // Claims handed out before the gate was registered never saw it;
        // start past them so the subscriber is never behind an ungated slot.
        sequence.set(sequence.get().max(self.cursor()));
        Subscriber {
            ring: Arc::clone(self),
            sequence,
            attached: true,
        }
    }

    /// Attach a consumer that starts from cursor 0.
    ///
    /// Only meaningful before anything was published.
    pub fn subscribe_from_start(self: &Arc<Self>) -> Subscriber<T> {
        let sequence = Arc::new(Sequence::default());
        self.sequencer.add_gating(Arc::clone(&sequence));
        Subscriber {
            ring: Arc::clone(self),
            sequence,
            attached: true,
        }
    }
}

impl<T: Default> Ring<T> {
    pub fn with_capacity(capacity: usize) -> Result<Self, CapacityError> {
        Self::new(capacity, T::default)
    }
}

/// A claimed, not yet released slot.
pub struct Claim<'a, T> {
    cursor: i64,
    slot: Option<RwLockWriteGuard<'a, T>>,
    sequencer: &'a Sequencer,
}

impl<T> Claim<'_, T> {
    #[inline]
    pub fn cursor(&self) -> i64 {
        self.cursor
    }

    /// Publish the slot to consumers.
    pub fn release(mut self) {
        self.finish();
    }

    fn finish(&mut self) {
        if let Some(guard) = self.slot.take() {
            drop(guard);
            self.sequencer.done(self.cursor);
        }
    }
}

impl<T> Deref for Claim<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        match self.slot.as_deref() {
            Some(slot) => slot,
            None => unreachable!("claim used after release"),
        }
    }
}

impl<T> DerefMut for Claim<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        match self.slot.as_deref_mut() {
            Some(slot) => slot,
            None => unreachable!("claim used after release"),
        }
    }
}

impl<T> Drop for Claim<'_, T> {
    fn drop(&mut self) {
        self.finish();
    }
}

/// One consumer's view of a ring.
///
/// Producers will not lap a subscriber while it stays attached. Dropping
/// the subscriber detaches it.
pub struct Subscriber<T> {
    ring: Arc<Ring<T>>,
    sequence: Arc<Sequence>,
    attached: bool,
}

impl<T> Subscriber<T> {
    /// Last cursor this subscriber processed.
    #[inline]
    pub fn position(&self) -> i64 {
        self.sequence.get()
    }

    /// Number of claimed cursors this subscriber has not processed.
    pub fn lag(&self) -> i64 {
        self.ring.cursor() - self.sequence.get()
    }

    pub fn ring(&self) -> &Arc<Ring<T>> {
        &self.ring
    }

    /// The gating sequence backing this subscriber.
    pub fn sequence(&self) -> &Arc<Sequence> {
        &self.sequence
    }

    /// Read the next slot through `f` if it has been released.
    ///
    /// `Ok(None)` means nothing new yet. `Err(Lagged)` means the slot was
    /// overwritten before this subscriber got to it.
    pub fn try_next_with<R>(&self, f: impl FnOnce(i64, &T) -> R) -> Result<Option<R>, ReadError> {
        let expected = self.sequence.get() + 1;
        match self.ring.sequencer.slot_state(expected) {
            SlotState::Pending => return Ok(None),
            SlotState::Overwritten(found) => return Err(ReadError::Lagged { expected, found }),
            SlotState::Ready => {}
        }
        let slot = self.ring.queue.read(expected);
        // A lapping producer marks the slot before taking the write lock,
        // so a second look under the read lock settles any race.
        match self.ring.sequencer.slot_state(expected) {
            SlotState::Ready => {
                let value = f(expected, &slot);
                drop(slot);
                self.sequence.set(expected);
                Ok(Some(value))
            }
            SlotState::Pending => Ok(None),
            SlotState::Overwritten(found) => Err(ReadError::Lagged { expected, found }),
        }
    }

    /// Stop gating producers. Later reads still work but may lag.
    pub fn detach(&mut self) {
        if self.attached {
            self.ring.sequencer.remove_gating(&self.sequence);
            self.attached = false;
        }
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }
}

impl<T: Clone> Subscriber<T> {
    /// Clone out the next released slot.
    pub fn try_next(&self) -> Result<Option<T>, ReadError> {
        self.try_next_with(|_, slot| slot.clone())
    }
}

impl<T> Drop for Subscriber<T> {
    fn drop(&mut self) {
        self.detach();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_mutates_slot_in_place() {
        let ring = Arc::new(Ring::<u64>::with_capacity(4).unwrap());
        let sub = ring.subscribe();

        let mut claim = ring.claim(ClaimPolicy::NonBlocking).unwrap();
        *claim = 42;
        assert_eq!(sub.try_next().unwrap(), None);
        claim.release();

        assert_eq!(sub.try_next().unwrap(), Some(42));
        assert_eq!(sub.try_next().unwrap(), None);
        assert_eq!(sub.position(), 0);
    }

    #[test]
    fn dropped_claim_is_still_released() {
        let ring = Arc::new(Ring::<u64>::with_capacity(4).unwrap());
        let sub = ring.subscribe();
        {
            let mut claim = ring.claim(ClaimPolicy::Blocking).unwrap();
            *claim = 7;
        }
        assert_eq!(sub.try_next().unwrap(), Some(7));
    }

    #[test]
    fn subscriber_skips_history() {
        let ring = Arc::new(Ring::<u64>::with_capacity(8).unwrap());
        for v in 0..3 {
            *ring.claim(ClaimPolicy::NonBlocking).unwrap() = v;
        }
        let sub = ring.subscribe();
        assert_eq!(sub.try_next().unwrap(), None);
        *ring.claim(ClaimPolicy::NonBlocking).unwrap() = 99;
        assert_eq!(sub.try_next().unwrap(), Some(99));
    }

    #[test]
    fn detached_subscriber_detects_overwrite() {
        let ring = Arc::new(Ring::<u64>::with_capacity(2).unwrap());
        let mut sub = ring.subscribe();
        sub.detach();
        for v in 0..3 {
            *ring.claim(ClaimPolicy::NonBlocking).unwrap() = v;
        }
        assert_eq!(
            sub.try_next(),
            Err(ReadError::Lagged {
                expected: 0,
                found: 2
            })
        );
    }

    #[test]
    fn dropping_subscriber_ungates_producers() {
        let ring = Arc::new(Ring::<u8>::with_capacity(1).unwrap());
        let sub = ring.subscribe();
        drop(ring.claim(ClaimPolicy::NonBlocking).unwrap());
        assert!(ring.claim(ClaimPolicy::NonBlocking).is_err());

        drop(sub);
        assert_eq!(ring.sequencer().gating_count(), 0);
        assert!(ring.claim(ClaimPolicy::NonBlocking).is_ok());
    }
}
