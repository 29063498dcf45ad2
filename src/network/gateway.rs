//! Gateway - accepts replication connections and hands them to agents.
//!
//! The Gateway owns the listener for the server's whole running phase. It
//! registers a [`ChannelHolder`](crate::server::ChannelHolder) for every
//! accepted channel and submits one agent task per connection to the pool.

use super::listener::Listener;
use super::stream::{BoxedChannel, ChannelWrapper};
use crate::agent;
use crate::server::ReplicationServer;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Pause after a failed accept so a persistent error does not spin.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

pub struct Gateway {
    listener: Box<dyn Listener>,
    wrapper: Arc<dyn ChannelWrapper>,
    server: ReplicationServer,
}

impl Gateway {
    pub fn new(
        listener: Box<dyn Listener>,
        wrapper: Arc<dyn ChannelWrapper>,
        server: ReplicationServer,
    ) -> Self {
        Self {
            listener,
            wrapper,
            server,
        }
    }

    /// Accept until the shutdown signal fires. The listener is dropped on
    /// return.
    pub async fn run(self, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!("acceptor stopping");
                    break;
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((channel, peer)) => self.dispatch(channel, peer),
                    Err(e) => {
                        error!(error = %e, "failed to accept replication connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                    }
                },
            }
        }
    }

    fn dispatch(&self, channel: BoxedChannel, peer: SocketAddr) {
        if !self.server.is_running() {
            info!(%peer, "ignoring connection, server is shutting down");
            return;
        }

        let registration = self.server.connections().register(peer);
        let conn = registration.id();
        let task = agent::run_connection(
            self.server.clone(),
            registration,
            channel,
            Arc::clone(&self.wrapper),
            self.server.shutdown_signal(),
        );

        match self.server.pool().submit(task) {
            Ok(()) => {
                self.server
                    .emitter()
                    .info()
                    .put_str("accepted conn=")
                    .put_display(conn)
                    .put_str(" peer=")
                    .put_display(peer)
                    .commit();
            }
            // The rejected task is dropped unstarted, taking its registration
            // (and the channel) with it.
            Err(e) => info!(conn, %peer, reason = e.reason(), "connection rejected"),
        }
    }
}
