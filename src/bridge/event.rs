//! Commit events carried by the bridge.

use serde::{Deserialize, Serialize};

/// A writer committed a transaction.
///
/// Slots of this type are preallocated in the bridge ring and overwritten
/// in place, so the type stays `Copy` and heap-free.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitEvent {
    /// Bridge cursor the event was published at.
    pub cursor: i64,
    /// Dense id of the committing writer.
    pub writer_id: u32,
    /// Writer-local transaction number.
    pub txn: u64,
    /// Commit time, milliseconds since the Unix epoch.
    pub timestamp: i64,
}

/// What a writer reports when it commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitInfo {
    pub txn: u64,
    pub timestamp: i64,
}
