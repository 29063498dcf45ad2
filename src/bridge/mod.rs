//! Event bridge: fans writer commits out to replication agents.
//!
//! Writers publish into a preallocated ring of [`CommitEvent`] slots. Each
//! agent owns a [`Subscription`] whose sequence gates the ring, so a
//! publisher never overwrites an event a live subscriber has not seen.
//!
//! Publishing blocks while the ring is full, but only for `lag_timeout`.
//! After that the subscribers holding the ring back are evicted: they are
//! removed from the gate and their next poll fails with
//! [`BridgeError::Lagged`]. Commits are never dropped to protect a slow
//! replica.

mod event;

pub use event::{CommitEvent, CommitInfo};

use crate::config::BridgeConfig;
use crate::error::BridgeError;
use dashmap::DashMap;
use ringcast_ring::{CapacityError, ClaimPolicy, ReadError, Ring, Sequence, Subscriber, Unavailable};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU8, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, warn};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const HALTED: u8 = 2;

/// Per-subscriber state the bridge can reach without the subscription.
struct Gate {
    sequence: Arc<Sequence>,
    evicted: AtomicBool,
}

/// Broadcast channel of commit events.
pub struct EventBridge {
    ring: Arc<Ring<CommitEvent>>,
    heartbeat: Duration,
    lag_timeout: Duration,
    state: AtomicU8,
    notify: Notify,
    gates: DashMap<u64, Arc<Gate>>,
    next_id: AtomicU64,
}

impl EventBridge {
    pub fn new(
        capacity: usize,
        heartbeat: Duration,
        lag_timeout: Duration,
    ) -> Result<Arc<Self>, CapacityError> {
        Ok(Arc::new(Self {
            ring: Arc::new(Ring::with_capacity(capacity)?),
            heartbeat,
            lag_timeout,
            state: AtomicU8::new(IDLE),
            notify: Notify::new(),
            gates: DashMap::new(),
            next_id: AtomicU64::new(0),
        }))
    }

    pub fn from_config(config: &BridgeConfig) -> Result<Arc<Self>, CapacityError> {
        Self::new(config.capacity, config.heartbeat(), config.lag_timeout())
    }

    /// Mark the bridge running. Returns `false` if it was not idle.
    pub fn start(&self) -> bool {
        self.state
            .compare_exchange(IDLE, RUNNING, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Halt the bridge: close the ring and wake every waiting subscriber.
    ///
    /// Returns `true` only for the call that performed the transition.
    pub fn halt(&self) -> bool {
        if self.state.swap(HALTED, Ordering::AcqRel) == HALTED {
            return false;
        }
        self.ring.close();
        self.notify.notify_waiters();
        debug!(cursor = self.cursor(), "event bridge halted");
        true
    }

    pub fn is_halted(&self) -> bool {
        self.state.load(Ordering::Acquire) == HALTED
    }

    pub fn heartbeat(&self) -> Duration {
        self.heartbeat
    }

    /// Highest cursor handed to a publisher.
    pub fn cursor(&self) -> i64 {
        self.ring.cursor()
    }

    pub fn subscriber_count(&self) -> usize {
        self.gates.len()
    }

    /// Publish one commit. Returns the event's cursor.
    pub fn publish(&self, writer_id: u32, commit: CommitInfo) -> Result<i64, BridgeError> {
        loop {
            match self.ring.claim(ClaimPolicy::BlockingFor(self.lag_timeout)) {
                Ok(mut slot) => {
                    let cursor = slot.cursor();
                    *slot = CommitEvent {
                        cursor,
                        writer_id,
                        txn: commit.txn,
                        timestamp: commit.timestamp,
                    };
                    slot.release();
                    self.notify.notify_waiters();
                    return Ok(cursor);
                }
                Err(Unavailable::Closed) => return Err(BridgeError::Halted),
                Err(Unavailable::Saturated) => {
                    self.evict_slowest();
                }
            }
        }
    }

    /// Attach a new subscriber at the current cursor.
    pub fn subscribe(self: &Arc<Self>) -> Subscription {
        let reader = self.ring.subscribe();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let gate = Arc::new(Gate {
            sequence: Arc::clone(reader.sequence()),
            evicted: AtomicBool::new(false),
        });
        self.gates.insert(id, Arc::clone(&gate));
        debug!(subscriber = id, cursor = reader.position(), "subscriber attached");
        Subscription {
            id,
            reader,
            gate,
            bridge: Arc::clone(self),
        }
    }

    /// Detach a subscriber. Equivalent to dropping it.
    pub fn unsubscribe(&self, subscription: Subscription) {
        drop(subscription);
    }

    /// Wait up to one heartbeat interval for the subscriber's next event.
    ///
    /// `Ok(None)` means the interval passed quietly and the caller should
    /// send a heartbeat.
    pub async fn poll(
        &self,
        subscription: &mut Subscription,
    ) -> Result<Option<CommitEvent>, BridgeError> {
        let deadline = Instant::now() + self.heartbeat;
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(event) = self.try_next(subscription)? {
                return Ok(Some(event));
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(None);
            }
        }
    }

    /// Non-waiting variant of [`poll`](Self::poll).
    pub fn try_next(&self, subscription: &Subscription) -> Result<Option<CommitEvent>, BridgeError> {
        if self.is_halted() {
            return Err(BridgeError::Halted);
        }
        if subscription.gate.evicted.load(Ordering::Acquire) {
            return Err(BridgeError::Lagged {
                cursor: subscription.position() + 1,
            });
        }
        subscription
            .reader
            .try_next()
            .map_err(|ReadError::Lagged { expected, .. }| BridgeError::Lagged { cursor: expected })
    }

    /// Drop every subscriber sitting at the gating minimum.
    fn evict_slowest(&self) -> usize {
        let sequencer = self.ring.sequencer();
        let slowest = sequencer.slowest();
        let mut evicted = 0;
        for entry in self.gates.iter() {
            let gate = entry.value();
            if slowest.iter().any(|s| Arc::ptr_eq(s, &gate.sequence)) {
                gate.evicted.store(true, Ordering::Release);
                sequencer.remove_gating(&gate.sequence);
                warn!(
                    subscriber = *entry.key(),
                    position = gate.sequence.get(),
                    cursor = self.ring.cursor(),
                    "evicting lagging subscriber"
                );
                evicted += 1;
            }
        }
        if evicted == 0 {
            // A gate with no subscription behind it; nobody to tell.
            for sequence in &slowest {
                sequencer.remove_gating(sequence);
            }
        }
        self.notify.notify_waiters();
        evicted
    }
}

/// One subscriber's handle on the bridge. Owned by exactly one agent.
///
/// Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    reader: Subscriber<CommitEvent>,
    gate: Arc<Gate>,
    bridge: Arc<EventBridge>,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Last cursor this subscriber consumed.
    pub fn position(&self) -> i64 {
        self.reader.position()
    }

    pub fn is_evicted(&self) -> bool {
        self.gate.evicted.load(Ordering::Acquire)
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.bridge.gates.remove(&self.id);
        debug!(subscriber = self.id, "subscriber detached");
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("id", &self.id)
            .field("position", &self.position())
            .field("evicted", &self.is_evicted())
            .finish()
    }
}
