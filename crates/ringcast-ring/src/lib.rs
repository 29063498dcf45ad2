//! # ringcast-ring
//!
//! A preallocated, sequenced ring buffer with a claim → write → release
//! publishing protocol and independently progressing consumers.
//!
//! ```text
//!   producer A --+  claim(c)    +----------------------------+
//!   producer B --+------------> | slot[c & (N-1)] (in place) |
//!                |  release(c)  +-------------+--------------+
//!                v                            | marker = c
//!           Sequencer <--- gating --- Subscriber 1, Subscriber 2, ...
//! ```
//!
//! - [`Sequence`]: padded atomic cursor, starts at `-1`.
//! - [`RingQueue`]: the slot storage, `N` a power of two.
//! - [`Sequencer`]: hands out cursors, tracks releases, holds producers
//!   back on gating consumers.
//! - [`Ring`]: queue + sequencer, with RAII [`Claim`] guards and
//!   [`Subscriber`] consumers.
//!
//! What happens when the ring is full is decided by each caller through
//! [`ClaimPolicy`]: drop ([`ClaimPolicy::NonBlocking`]), wait
//! ([`ClaimPolicy::Blocking`]) or wait for a bounded time
//! ([`ClaimPolicy::BlockingFor`]).
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use ringcast_ring::{ClaimPolicy, Ring};
//!
//! let ring = Arc::new(Ring::<u64>::with_capacity(8).unwrap());
//! let reader = ring.subscribe();
//!
//! let mut slot = ring.claim(ClaimPolicy::Blocking).unwrap();
//! *slot = 17;
//! slot.release();
//!
//! assert_eq!(reader.try_next().unwrap(), Some(17));
//! ```

mod error;
mod queue;
mod ring;
mod sequence;
mod sequencer;

pub use error::{CapacityError, ReadError, Unavailable};
pub use queue::RingQueue;
pub use ring::{Claim, Ring, Subscriber};
pub use sequence::{INITIAL_CURSOR, Sequence};
pub use sequencer::{ClaimPolicy, Sequencer, SlotState};
