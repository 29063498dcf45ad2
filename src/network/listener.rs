//! Listener abstraction over TCP and in-memory transports.

use super::stream::BoxedChannel;
use async_trait::async_trait;
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpListener;

/// Source of accepted connections.
#[async_trait]
pub trait Listener: Send + Sync {
    /// Wait for the next connection.
    async fn accept(&self) -> io::Result<(BoxedChannel, SocketAddr)>;

    /// Address replicas connect to.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

#[async_trait]
impl Listener for TcpListener {
    async fn accept(&self) -> io::Result<(BoxedChannel, SocketAddr)> {
        let (stream, peer) = TcpListener::accept(self).await?;
        if let Err(e) = stream.set_nodelay(true) {
            tracing::debug!(%peer, error = %e, "failed to set TCP_NODELAY");
        }
        Ok((Box::new(stream), peer))
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}
