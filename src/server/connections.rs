//! Open replication connections.
//!
//! Every accepted connection gets a [`ChannelHolder`] that stays in the
//! [`ConnectionSet`] from accept until close. The agent owns a
//! [`Registration`] guard; dropping it removes the holder and closes the
//! channel.

use dashmap::DashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tokio_util::sync::{CancellationToken, WaitForCancellationFuture};

/// One accepted connection as seen by the server.
#[derive(Debug)]
pub struct ChannelHolder {
    id: u64,
    peer: SocketAddr,
    opened: Instant,
    close: CancellationToken,
}

impl ChannelHolder {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    pub fn opened(&self) -> Instant {
        self.opened
    }

    /// Force the connection closed. Agents waiting on the channel wake up.
    pub fn close(&self) {
        self.close.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.close.is_cancelled()
    }

    /// Resolves once the connection has been closed.
    pub fn closed(&self) -> WaitForCancellationFuture<'_> {
        self.close.cancelled()
    }
}

/// Connection id → holder.
#[derive(Debug, Default)]
pub struct ConnectionSet {
    holders: DashMap<u64, Arc<ChannelHolder>>,
    next_id: AtomicU64,
}

impl ConnectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a newly accepted connection.
    pub fn register(self: &Arc<Self>, peer: SocketAddr) -> Registration {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let holder = Arc::new(ChannelHolder {
            id,
            peer,
            opened: Instant::now(),
            close: CancellationToken::new(),
        });
        self.holders.insert(id, Arc::clone(&holder));
        Registration {
            set: Arc::clone(self),
            holder,
        }
    }

    /// Close and forget a connection.
    pub fn remove(&self, id: u64) -> Option<Arc<ChannelHolder>> {
        let (_, holder) = self.holders.remove(&id)?;
        holder.close();
        Some(holder)
    }

    pub fn len(&self) -> usize {
        self.holders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.holders.is_empty()
    }

    /// Clone out every holder without keeping shard locks.
    pub fn snapshot(&self) -> Vec<Arc<ChannelHolder>> {
        self.holders
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    /// Force-close every open connection. Returns how many were closed.
    pub fn close_all(&self) -> usize {
        let mut closed = 0;
        for holder in self.snapshot() {
            if self.remove(holder.id()).is_some() {
                tracing::debug!(conn = holder.id(), peer = %holder.peer(), "connection force-closed");
                closed += 1;
            }
        }
        closed
    }
}

/// Keeps a connection registered. Dropping it deregisters and closes.
#[derive(Debug)]
pub struct Registration {
    set: Arc<ConnectionSet>,
    holder: Arc<ChannelHolder>,
}

impl Registration {
    pub fn holder(&self) -> &Arc<ChannelHolder> {
        &self.holder
    }

    pub fn id(&self) -> u64 {
        self.holder.id
    }
}

impl Drop for Registration {
    fn drop(&mut self) {
        self.set.remove(self.holder.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peer(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_registration_drop_deregisters_and_closes() {
        let set = Arc::new(ConnectionSet::new());
        let registration = set.register(peer(1));
        let holder = Arc::clone(registration.holder());
        assert_eq!(set.len(), 1);
        assert!(!holder.is_closed());

        drop(registration);
        assert!(set.is_empty());
        assert!(holder.is_closed());
    }

    #[test]
    fn test_close_all_counts_only_open_connections() {
        let set = Arc::new(ConnectionSet::new());
        let a = set.register(peer(1));
        let b = set.register(peer(2));
        assert_ne!(a.id(), b.id());

        assert_eq!(set.close_all(), 2);
        assert!(a.holder().is_closed());
        assert!(b.holder().is_closed());
        assert_eq!(set.close_all(), 0);

        // Guards outliving a force-close are harmless.
        drop(a);
        drop(b);
        assert!(set.is_empty());
    }

    #[tokio::test]
    async fn test_closed_future_resolves_on_close() {
        let set = Arc::new(ConnectionSet::new());
        let registration = set.register(peer(9));
        let holder = Arc::clone(registration.holder());

        let waiter = tokio::spawn(async move { holder.closed().await });
        set.close_all();
        waiter.await.unwrap();
    }
}
