//! Writer registry: journal key → dense writer id.

use crate::bridge::{CommitInfo, EventBridge};
use crate::error::ServerError;
use crate::writer::{CommitListener, JournalWriter, WriterIndex};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;

struct Registered {
    id: u32,
    // Held so the writer outlives its registration.
    _writer: Arc<dyn JournalWriter>,
}

/// Published writers. Ids are assigned from a monotonic counter and never
/// reused. Frozen when the server starts; a registration in progress
/// finishes before the freeze does.
pub struct WriterRegistry {
    writers: DashMap<String, Registered>,
    next_id: AtomicU32,
    frozen: RwLock<bool>,
}

impl WriterRegistry {
    pub fn new() -> Self {
        Self {
            writers: DashMap::new(),
            next_id: AtomicU32::new(0),
            frozen: RwLock::new(false),
        }
    }

    /// Assign `writer` the next id and route its commits into `bridge`.
    pub fn register(
        &self,
        writer: Arc<dyn JournalWriter>,
        bridge: &Arc<EventBridge>,
    ) -> Result<WriterIndex, ServerError> {
        let frozen = self.frozen.read();
        if *frozen {
            return Err(ServerError::RegistryFrozen);
        }
        let key = writer.key().to_string();
        match self.writers.entry(key.clone()) {
            Entry::Occupied(_) => Err(ServerError::DuplicateWriter(key)),
            Entry::Vacant(slot) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                writer.set_commit_listener(Arc::new(BridgeListener {
                    bridge: Arc::clone(bridge),
                    writer_id: id,
                }));
                slot.insert(Registered {
                    id,
                    _writer: writer,
                });
                debug!(writer = %key, id, "writer published");
                Ok(WriterIndex { id, key })
            }
        }
    }

    pub fn resolve(&self, key: &str) -> Option<WriterIndex> {
        self.writers.get(key).map(|entry| WriterIndex {
            id: entry.id,
            key: key.to_string(),
        })
    }

    pub fn len(&self) -> usize {
        self.writers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writers.is_empty()
    }

    /// Refuse further registrations. Waits for one already underway.
    pub fn freeze(&self) {
        *self.frozen.write() = true;
    }

    pub fn is_frozen(&self) -> bool {
        *self.frozen.read()
    }
}

impl Default for WriterRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Forwards one writer's commits to the bridge.
struct BridgeListener {
    bridge: Arc<EventBridge>,
    writer_id: u32,
}

impl CommitListener for BridgeListener {
    fn on_commit(&self, commit: CommitInfo) {
        if let Err(e) = self.bridge.publish(self.writer_id, commit) {
            debug!(writer = self.writer_id, txn = commit.txn, error = %e, "commit not replicated");
        }
    }
}
