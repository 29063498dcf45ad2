//! Presence responder.
//!
//! Replicas that do not know where the replication listener lives send any
//! datagram to the presence address. Each one is answered with a JSON
//! [`PresenceAnnouncement`].

use crate::config::PresenceConfig;
use serde::{Deserialize, Serialize};
use std::io;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Reply sent to every presence query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceAnnouncement {
    pub instance: u32,
    pub address: SocketAddr,
}

pub struct PresenceResponder {
    local_addr: SocketAddr,
    stop: CancellationToken,
    task: JoinHandle<()>,
}

impl PresenceResponder {
    /// Bind the configured address and start answering queries with
    /// `advertised`.
    pub async fn start(
        config: &PresenceConfig,
        instance: u32,
        advertised: SocketAddr,
    ) -> io::Result<Self> {
        let group = config.address.ip();
        let bind_addr = if group.is_multicast() {
            let any = match group {
                IpAddr::V4(_) => IpAddr::V4(Ipv4Addr::UNSPECIFIED),
                IpAddr::V6(_) => IpAddr::V6(Ipv6Addr::UNSPECIFIED),
            };
            SocketAddr::new(any, config.address.port())
        } else {
            config.address
        };

        let socket = UdpSocket::bind(bind_addr).await?;
        match group {
            IpAddr::V4(v4) if v4.is_multicast() => {
                socket.join_multicast_v4(v4, Ipv4Addr::UNSPECIFIED)?;
            }
            IpAddr::V6(v6) if v6.is_multicast() => socket.join_multicast_v6(&v6, 0)?,
            _ => {}
        }

        let payload = serde_json::to_vec(&PresenceAnnouncement {
            instance,
            address: advertised,
        })?;
        let local_addr = socket.local_addr()?;
        let stop = CancellationToken::new();
        let task = tokio::spawn(respond(socket, payload, stop.clone()));

        info!(address = %local_addr, %advertised, "presence responder started");
        Ok(Self {
            local_addr,
            stop,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop answering and wait for the responder task to exit.
    pub async fn halt(self) {
        self.stop.cancel();
        if let Err(e) = self.task.await {
            debug!(error = %e, "presence responder task failed");
        }
    }
}

async fn respond(socket: UdpSocket, payload: Vec<u8>, stop: CancellationToken) {
    let mut buf = [0u8; 512];
    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            received = socket.recv_from(&mut buf) => match received {
                Ok((_, from)) => {
                    if let Err(e) = socket.send_to(&payload, from).await {
                        debug!(%from, error = %e, "presence reply failed");
                    }
                }
                Err(e) => debug!(error = %e, "presence receive failed"),
            },
        }
    }
    debug!("presence responder stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_answers_any_datagram() {
        let config = PresenceConfig {
            address: "127.0.0.1:0".parse().unwrap(),
        };
        let advertised: SocketAddr = "10.1.2.3:7075".parse().unwrap();
        let responder = PresenceResponder::start(&config, 4, advertised).await.unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        client.send_to(b"?", responder.local_addr()).await.unwrap();

        let mut buf = [0u8; 512];
        let (len, _) = tokio::time::timeout(Duration::from_secs(2), client.recv_from(&mut buf))
            .await
            .expect("presence reply")
            .unwrap();
        let announcement: PresenceAnnouncement = serde_json::from_slice(&buf[..len]).unwrap();
        assert_eq!(
            announcement,
            PresenceAnnouncement {
                instance: 4,
                address: advertised
            }
        );

        responder.halt().await;
    }
}
