//! Asynchronous record emitter.
//!
//! Three severity lanes (debug, info, error), each a ring of reusable
//! [`LogRecord`] slots. A caller claims a slot with [`begin`], appends to
//! it in place through the returned [`RecordHandle`] and publishes it with
//! [`RecordHandle::commit`]. Nothing is formatted on a background thread
//! and a full lane never blocks the caller: the record is dropped and
//! counted instead.
//!
//! A single drainer empties the lanes into a [`RecordSink`]; the server
//! runs one on an interval that forwards to `tracing`.
//!
//! [`begin`]: AsyncRecordEmitter::begin

mod record;
mod sink;

pub use record::{Level, LogRecord};
pub use sink::{RecordSink, TracingSink};

use crate::config::LogConfig;
use chrono::Utc;
use parking_lot::Mutex;
use ringcast_ring::{CapacityError, Claim, ClaimPolicy, Ring, Subscriber};
use std::fmt::{Display, Write as _};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

struct Lane {
    level: Level,
    ring: Arc<Ring<LogRecord>>,
    drain: Mutex<Subscriber<LogRecord>>,
    dropped: AtomicU64,
}

impl Lane {
    fn new(level: Level, capacity: usize) -> Result<Self, CapacityError> {
        let ring = Arc::new(Ring::with_capacity(capacity)?);
        let drain = Mutex::new(ring.subscribe_from_start());
        Ok(Self {
            level,
            ring,
            drain,
            dropped: AtomicU64::new(0),
        })
    }
}

/// Allocation-free, non-blocking record publisher.
pub struct AsyncRecordEmitter {
    lanes: [Lane; 3],
}

impl AsyncRecordEmitter {
    /// Create an emitter with `capacity` slots per lane.
    pub fn new(capacity: usize) -> Result<Self, CapacityError> {
        Ok(Self {
            lanes: [
                Lane::new(Level::Debug, capacity)?,
                Lane::new(Level::Info, capacity)?,
                Lane::new(Level::Error, capacity)?,
            ],
        })
    }

    pub fn from_config(config: &LogConfig) -> Result<Self, CapacityError> {
        Self::new(config.lane_capacity)
    }

    /// Claim a record on `level`'s lane.
    ///
    /// The timestamp and level tag are written immediately. When the lane
    /// is full or closed the handle discards everything appended to it.
    pub fn begin(&self, level: Level) -> RecordHandle<'_> {
        let lane = &self.lanes[level.lane()];
        match lane.ring.claim(ClaimPolicy::NonBlocking) {
            Ok(mut claim) => {
                claim.text.clear();
                claim.complete = false;
                let _ = write!(
                    claim.text,
                    "{} {} ",
                    Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"),
                    level.tag()
                );
                RecordHandle {
                    level,
                    claim: Some(claim),
                }
            }
            Err(_) => {
                lane.dropped.fetch_add(1, Ordering::Relaxed);
                RecordHandle { level, claim: None }
            }
        }
    }

    pub fn debug(&self) -> RecordHandle<'_> {
        self.begin(Level::Debug)
    }

    pub fn info(&self) -> RecordHandle<'_> {
        self.begin(Level::Info)
    }

    pub fn error(&self) -> RecordHandle<'_> {
        self.begin(Level::Error)
    }

    /// Records discarded on `level`'s lane because it was full.
    pub fn dropped(&self, level: Level) -> u64 {
        self.lanes[level.lane()].dropped.load(Ordering::Relaxed)
    }

    /// Hand every published record to `sink`, lane by lane.
    ///
    /// Abandoned records are consumed but not forwarded. Returns the number
    /// of records forwarded.
    pub fn drain(&self, sink: &mut dyn RecordSink) -> usize {
        let mut forwarded = 0;
        for lane in &self.lanes {
            let reader = lane.drain.lock();
            loop {
                let next = reader.try_next_with(|_, record| {
                    if record.complete {
                        sink.record(lane.level, record.text());
                        true
                    } else {
                        false
                    }
                });
                match next {
                    Ok(Some(true)) => forwarded += 1,
                    Ok(Some(false)) => {}
                    // The drain reader gates its lane, so it cannot be lapped.
                    Ok(None) | Err(_) => break,
                }
            }
        }
        forwarded
    }

    /// Refuse further records. Already claimed handles can still commit.
    pub fn close(&self) {
        for lane in &self.lanes {
            lane.ring.close();
        }
    }

    /// Drain into `tracing` every `interval` until `stop` is cancelled,
    /// then flush once more.
    pub fn spawn_drain(self: &Arc<Self>, interval: Duration, stop: CancellationToken) -> JoinHandle<()> {
        let emitter = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut sink = TracingSink;
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = ticker.tick() => {
                        emitter.drain(&mut sink);
                    }
                }
            }
            emitter.drain(&mut sink);
        })
    }
}

/// A claimed record, filled in place and published by [`commit`].
///
/// Dropping the handle without committing still releases the slot; the
/// record is marked incomplete and the drainer skips it.
///
/// [`commit`]: RecordHandle::commit
#[must_use = "a record is only published by commit()"]
pub struct RecordHandle<'a> {
    level: Level,
    claim: Option<Claim<'a, LogRecord>>,
}

impl RecordHandle<'_> {
    pub fn level(&self) -> Level {
        self.level
    }

    /// Lane cursor of the claimed slot, `None` if the record is being
    /// discarded.
    pub fn cursor(&self) -> Option<i64> {
        self.claim.as_ref().map(|c| c.cursor())
    }

    pub fn is_discarding(&self) -> bool {
        self.claim.is_none()
    }

    pub fn put_str(mut self, s: &str) -> Self {
        if let Some(claim) = self.claim.as_mut() {
            claim.text.push_str(s);
        }
        self
    }

    pub fn put_char(mut self, c: char) -> Self {
        if let Some(claim) = self.claim.as_mut() {
            claim.text.push(c);
        }
        self
    }

    pub fn put_int(mut self, value: i64) -> Self {
        if let Some(claim) = self.claim.as_mut() {
            let _ = write!(claim.text, "{value}");
        }
        self
    }

    pub fn put_display(mut self, value: impl Display) -> Self {
        if let Some(claim) = self.claim.as_mut() {
            let _ = write!(claim.text, "{value}");
        }
        self
    }

    /// Terminate and publish the record.
    pub fn commit(mut self) {
        if let Some(mut claim) = self.claim.take() {
            claim.text.push('\n');
            claim.complete = true;
            claim.release();
        }
    }
}
