//! Network listener configuration.

use serde::Deserialize;
use std::net::SocketAddr;

/// Replication listener configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ListenConfig {
    /// Address to bind to (e.g., "0.0.0.0:7075"). Port 0 picks a free port.
    pub address: SocketAddr,
}

/// TLS configuration. When present, every accepted channel is wrapped
/// in a TLS session before the agent sees it.
#[derive(Debug, Clone, Deserialize)]
pub struct TlsConfig {
    /// Path to certificate file (PEM format).
    pub cert_path: String,
    /// Path to private key file (PEM format).
    pub key_path: String,
}

/// On-demand presence responder.
///
/// Replicas that do not know the leader's address send any datagram to
/// `address`; the responder answers with the replication listener address.
#[derive(Debug, Clone, Deserialize)]
pub struct PresenceConfig {
    /// UDP address to listen on. A multicast address joins that group.
    pub address: SocketAddr,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presence_parses_multicast_group() {
        let cfg: PresenceConfig = toml::from_str(r#"address = "239.1.1.1:4445""#).unwrap();
        assert!(cfg.address.ip().is_multicast());
        assert_eq!(cfg.address.port(), 4445);
    }

    #[test]
    fn listen_accepts_ephemeral_port() {
        let cfg: ListenConfig = toml::from_str(r#"address = "127.0.0.1:0""#).unwrap();
        assert_eq!(cfg.address.port(), 0);
    }
}
