//! In-memory listener for driving a server without sockets.
//!
//! Each [`LoopbackConnector::connect`] creates a duplex pipe, hands one end
//! to the listener and returns the other to the caller.

use super::listener::Listener;
use super::stream::BoxedChannel;
use async_trait::async_trait;
use std::io;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use tokio::io::DuplexStream;
use tokio::sync::{Mutex, mpsc};

const PIPE_BUFFER: usize = 64 * 1024;

/// Create a connected listener/connector pair.
pub fn loopback(addr: SocketAddr) -> (LoopbackListener, LoopbackConnector) {
    let (tx, rx) = mpsc::channel(64);
    (
        LoopbackListener {
            addr,
            incoming: Mutex::new(rx),
        },
        LoopbackConnector {
            tx,
            next_port: AtomicU16::new(40_000),
        },
    )
}

/// Server side of the loopback transport.
pub struct LoopbackListener {
    addr: SocketAddr,
    incoming: Mutex<mpsc::Receiver<(DuplexStream, SocketAddr)>>,
}

#[async_trait]
impl Listener for LoopbackListener {
    async fn accept(&self) -> io::Result<(BoxedChannel, SocketAddr)> {
        let mut incoming = self.incoming.lock().await;
        match incoming.recv().await {
            Some((stream, peer)) => Ok((Box::new(stream), peer)),
            // Every connector is gone; nothing will ever arrive.
            None => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(self.addr)
    }
}

/// Client side of the loopback transport.
#[derive(Debug)]
pub struct LoopbackConnector {
    tx: mpsc::Sender<(DuplexStream, SocketAddr)>,
    next_port: AtomicU16,
}

impl LoopbackConnector {
    /// Open a connection. Each one gets a distinct fake peer port.
    pub async fn connect(&self) -> io::Result<DuplexStream> {
        let port = self.next_port.fetch_add(1, Ordering::Relaxed);
        self.connect_as(SocketAddr::from((Ipv4Addr::LOCALHOST, port)))
            .await
    }

    /// Open a connection that the server sees as coming from `peer`.
    pub async fn connect_as(&self, peer: SocketAddr) -> io::Result<DuplexStream> {
        let (client, server) = tokio::io::duplex(PIPE_BUFFER);
        self.tx
            .send((server, peer))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::ConnectionRefused, "listener closed"))?;
        Ok(client)
    }
}
