//! Ring error types.

use thiserror::Error;

/// Why a claim did not produce a cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Unavailable {
    /// The ring was closed; no further claims are accepted.
    #[error("ring is closed")]
    Closed,
    /// Every slot is still held by a gating consumer.
    #[error("ring is saturated")]
    Saturated,
}

/// Errors raised by a consumer reading its next slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ReadError {
    /// The slot the consumer expected was already overwritten by a later
    /// cursor. The consumer can never catch up and must be dropped.
    #[error("consumer lagged: expected cursor {expected}, slot holds {found}")]
    Lagged { expected: i64, found: i64 },
}

/// Rejected ring geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CapacityError {
    #[error("capacity must be a non-zero power of two, got {0}")]
    NotPowerOfTwo(usize),
}
