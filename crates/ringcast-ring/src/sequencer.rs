//! Claim/release protocol over a fixed number of slots.
//!
//! ```text
//!   claimed ──► next free cursor handed to a producer (CAS)
//!   available[i] ──► last cursor released into slot i
//!   gating ──► consumer sequences the producers may not lap
//! ```
//!
//! A producer may claim cursor `c` only when every gating sequence has
//! reached `c - capacity`. Producers can release out of order; consumers
//! check the slot's availability marker rather than a shared high-water
//! mark, so a slot is visible exactly when its own release happened.

use crate::error::{CapacityError, Unavailable};
use crate::sequence::{INITIAL_CURSOR, Sequence};
use parking_lot::RwLock;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::{Duration, Instant};

const SPIN_TRIES: u32 = 128;

/// How a producer reacts to a full ring. Chosen per call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimPolicy {
    /// Fail with [`Unavailable::Saturated`] straight away.
    NonBlocking,
    /// Spin, then yield, until a slot frees up or the ring closes.
    Blocking,
    /// Like `Blocking`, but give up with `Saturated` once the stall
    /// budget is spent.
    BlockingFor(Duration),
}

/// State of a slot as seen by a consumer waiting for `expected`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotState {
    /// `expected` has been released into the slot.
    Ready,
    /// `expected` has not been released yet.
    Pending,
    /// A later cursor has claimed or filled the slot.
    Overwritten(i64),
}

/// Multi-producer cursor allocator with consumer gating.
pub struct Sequencer {
    capacity: i64,
    mask: usize,
    claimed: Sequence,
    available: Box<[AtomicI64]>,
    gating: RwLock<Vec<Arc<Sequence>>>,
    gating_cache: Sequence,
    closed: AtomicBool,
}

/// Marker stored while cursor `c` is being written.
#[inline]
fn writing(cursor: i64) -> i64 {
    -cursor - 2
}

impl Sequencer {
    pub fn new(capacity: usize) -> Result<Self, CapacityError> {
        if capacity == 0 || !capacity.is_power_of_two() {
            return Err(CapacityError::NotPowerOfTwo(capacity));
        }
        let available = (0..capacity)
            .map(|_| AtomicI64::new(INITIAL_CURSOR))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Ok(Self {
            capacity: capacity as i64,
            mask: capacity - 1,
            claimed: Sequence::default(),
            available,
            gating: RwLock::new(Vec::new()),
            gating_cache: Sequence::default(),
            closed: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity as usize
    }

    /// Highest cursor handed out so far (`-1` when nothing was claimed).
    #[inline]
    pub fn cursor(&self) -> i64 {
        self.claimed.get()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Refuse all further claims. Claims already handed out may still be
    /// released.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Reserve the next cursor.
    pub fn next(&self, policy: ClaimPolicy) -> Result<i64, Unavailable> {
        let deadline = match policy {
            ClaimPolicy::BlockingFor(budget) => Some(Instant::now() + budget),
            _ => None,
        };
        let mut idle = 0u32;
        loop {
            if self.is_closed() {
                return Err(Unavailable::Closed);
            }
            let current = self.claimed.get();
            let next = current + 1;
            let wrap_point = next - self.capacity;

            if wrap_point > self.gating_cache.get() {
                let min = self.minimum_gating(current);
                self.gating_cache.set(min);
                if wrap_point > min {
                    match policy {
                        ClaimPolicy::NonBlocking => return Err(Unavailable::Saturated),
                        ClaimPolicy::BlockingFor(_)
                            if deadline.is_some_and(|d| Instant::now() >= d) =>
                        {
                            return Err(Unavailable::Saturated);
                        }
                        _ => {
                            backoff(&mut idle);
                            continue;
                        }
                    }
                }
            }

            if self.claimed.compare_and_set(current, next) {
                self.available[self.slot(next)].store(writing(next), Ordering::Release);
                return Ok(next);
            }
            std::hint::spin_loop();
        }
    }

    /// Publish `cursor`. Must be called exactly once per successful claim.
    #[inline]
    pub fn done(&self, cursor: i64) {
        self.available[self.slot(cursor)].store(cursor, Ordering::Release);
    }

    /// Where the slot for `expected` stands.
    pub fn slot_state(&self, expected: i64) -> SlotState {
        let marker = self.available[self.slot(expected)].load(Ordering::Acquire);
        if marker == expected {
            return SlotState::Ready;
        }
        let holder = if marker <= -2 { -marker - 2 } else { marker };
        if holder > expected {
            SlotState::Overwritten(holder)
        } else {
            SlotState::Pending
        }
    }

    /// Start holding producers back on `sequence`.
    pub fn add_gating(&self, sequence: Arc<Sequence>) {
        let mut gating = self.gating.write();
        let value = sequence.get();
        if value < self.gating_cache.get() {
            self.gating_cache.set(value);
        }
        gating.push(sequence);
    }

    /// Stop gating on `sequence`. Returns `false` if it was not tracked.
    pub fn remove_gating(&self, sequence: &Arc<Sequence>) -> bool {
        let mut gating = self.gating.write();
        let before = gating.len();
        gating.retain(|s| !Arc::ptr_eq(s, sequence));
        before != gating.len()
    }

    pub fn gating_count(&self) -> usize {
        self.gating.read().len()
    }

    /// Gating sequences currently at the minimum cursor.
    pub fn slowest(&self) -> Vec<Arc<Sequence>> {
        let gating = self.gating.read();
        let Some(min) = gating.iter().map(|s| s.get()).min() else {
            return Vec::new();
        };
        gating.iter().filter(|s| s.get() == min).cloned().collect()
    }

    fn minimum_gating(&self, default: i64) -> i64 {
        self.gating
            .read()
            .iter()
            .map(|s| s.get())
            .fold(default, i64::min)
    }

    #[inline]
    fn slot(&self, cursor: i64) -> usize {
        (cursor as usize) & self.mask
    }
}

fn backoff(idle: &mut u32) {
    if *idle < SPIN_TRIES {
        *idle += 1;
        std::hint::spin_loop();
    } else {
        std::thread::yield_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_claim_is_zero() {
        let seq = Sequencer::new(4).unwrap();
        assert_eq!(seq.cursor(), INITIAL_CURSOR);
        assert_eq!(seq.next(ClaimPolicy::NonBlocking), Ok(0));
        assert_eq!(seq.next(ClaimPolicy::NonBlocking), Ok(1));
        assert_eq!(seq.cursor(), 1);
    }

    #[test]
    fn slot_lifecycle_markers() {
        let seq = Sequencer::new(2).unwrap();
        assert_eq!(seq.slot_state(0), SlotState::Pending);
        let c = seq.next(ClaimPolicy::NonBlocking).unwrap();
        assert_eq!(seq.slot_state(c), SlotState::Pending);
        seq.done(c);
        assert_eq!(seq.slot_state(c), SlotState::Ready);

        // Cursor 2 reuses slot 0; a reader still expecting 0 sees it overwritten.
        let _ = seq.next(ClaimPolicy::NonBlocking).unwrap();
        let c2 = seq.next(ClaimPolicy::NonBlocking).unwrap();
        assert_eq!(c2, 2);
        assert_eq!(seq.slot_state(0), SlotState::Overwritten(2));
        seq.done(c2);
        assert_eq!(seq.slot_state(0), SlotState::Overwritten(2));
        assert_eq!(seq.slot_state(2), SlotState::Ready);
    }

    #[test]
    fn ungated_ring_never_saturates() {
        let seq = Sequencer::new(2).unwrap();
        for expected in 0..10 {
            let c = seq.next(ClaimPolicy::NonBlocking).unwrap();
            assert_eq!(c, expected);
            seq.done(c);
        }
    }

    #[test]
    fn gated_ring_saturates_at_capacity() {
        let seq = Sequencer::new(4).unwrap();
        let consumer = Arc::new(Sequence::default());
        seq.add_gating(Arc::clone(&consumer));

        for _ in 0..4 {
            let c = seq.next(ClaimPolicy::NonBlocking).unwrap();
            seq.done(c);
        }
        assert_eq!(
            seq.next(ClaimPolicy::NonBlocking),
            Err(Unavailable::Saturated)
        );

        consumer.set(0);
        assert_eq!(seq.next(ClaimPolicy::NonBlocking), Ok(4));
    }

    #[test]
    fn bounded_blocking_gives_up() {
        let seq = Sequencer::new(1).unwrap();
        seq.add_gating(Arc::new(Sequence::default()));
        seq.done(seq.next(ClaimPolicy::NonBlocking).unwrap());

        let started = Instant::now();
        let result = seq.next(ClaimPolicy::BlockingFor(Duration::from_millis(20)));
        assert_eq!(result, Err(Unavailable::Saturated));
        assert!(started.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn closed_rejects_every_policy() {
        let seq = Sequencer::new(4).unwrap();
        seq.close();
        assert_eq!(seq.next(ClaimPolicy::NonBlocking), Err(Unavailable::Closed));
        assert_eq!(seq.next(ClaimPolicy::Blocking), Err(Unavailable::Closed));
    }

    #[test]
    fn remove_gating_releases_producers() {
        let seq = Sequencer::new(1).unwrap();
        let consumer = Arc::new(Sequence::default());
        seq.add_gating(Arc::clone(&consumer));
        seq.done(seq.next(ClaimPolicy::NonBlocking).unwrap());
        assert!(seq.next(ClaimPolicy::NonBlocking).is_err());

        assert!(seq.remove_gating(&consumer));
        assert!(!seq.remove_gating(&consumer));
        assert_eq!(seq.next(ClaimPolicy::NonBlocking), Ok(1));
    }

    #[test]
    fn slowest_reports_minimum_holders() {
        let seq = Sequencer::new(8).unwrap();
        let a = Arc::new(Sequence::new(3));
        let b = Arc::new(Sequence::new(1));
        let c = Arc::new(Sequence::new(1));
        seq.add_gating(Arc::clone(&a));
        seq.add_gating(Arc::clone(&b));
        seq.add_gating(Arc::clone(&c));

        let slow = seq.slowest();
        assert_eq!(slow.len(), 2);
        assert!(slow.iter().all(|s| s.get() == 1));
    }
}
