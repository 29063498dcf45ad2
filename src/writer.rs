//! Journal writer hook.
//!
//! The replication server never touches journal storage. It only needs a
//! writer's key and a way to hear about its commits.

use crate::bridge::CommitInfo;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Receives a writer's commit notifications.
pub trait CommitListener: Send + Sync {
    fn on_commit(&self, commit: CommitInfo);
}

/// A journal writer whose commits are replicated.
pub trait JournalWriter: Send + Sync {
    /// Unique key of the journal this writer appends to.
    fn key(&self) -> &str;

    /// Install the listener called after every commit. Replaces any
    /// previous listener.
    fn set_commit_listener(&self, listener: Arc<dyn CommitListener>);
}

/// Dense id assigned to a published writer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriterIndex {
    pub id: u32,
    pub key: String,
}

/// In-memory writer: counts transactions and reports each commit.
///
/// Commits are serialized, so the listener sees transaction numbers in
/// order even with several committing threads.
pub struct MemoryWriter {
    key: String,
    txn: Mutex<u64>,
    listener: RwLock<Option<Arc<dyn CommitListener>>>,
}

impl MemoryWriter {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            txn: Mutex::new(0),
            listener: RwLock::new(None),
        }
    }

    /// Commit the next transaction and notify the listener, if any.
    pub fn commit(&self) -> CommitInfo {
        let mut txn = self.txn.lock();
        *txn += 1;
        let commit = CommitInfo {
            txn: *txn,
            timestamp: chrono::Utc::now().timestamp_millis(),
        };
        let listener = self.listener.read().clone();
        if let Some(listener) = listener {
            listener.on_commit(commit);
        }
        commit
    }

    /// Last committed transaction number (0 before the first commit).
    pub fn last_txn(&self) -> u64 {
        *self.txn.lock()
    }
}

impl JournalWriter for MemoryWriter {
    fn key(&self) -> &str {
        &self.key
    }

    fn set_commit_listener(&self, listener: Arc<dyn CommitListener>) {
        *self.listener.write() = Some(listener);
    }
}

impl std::fmt::Debug for MemoryWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryWriter")
            .field("key", &self.key)
            .field("txn", &self.last_txn())
            .finish()
    }
}
