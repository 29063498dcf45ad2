//! Test server management.
//!
//! Runs a [`ReplicationServer`] on the in-memory loopback transport with a
//! set of published [`MemoryWriter`]s.

use super::TestClient;
use ringcast::network::loopback::{LoopbackConnector, loopback};
use ringcast::{Config, MemoryWriter, ReplicationServer};
use std::collections::HashMap;
use std::ops::Deref;
use std::sync::Arc;

/// A running test server.
pub struct TestServer {
    server: ReplicationServer,
    connector: LoopbackConnector,
    writers: HashMap<String, Arc<MemoryWriter>>,
}

#[allow(dead_code)]
impl TestServer {
    /// Config with short timings suited to tests.
    pub fn config() -> Config {
        let mut config = Config::default();
        config.listen.address = "127.0.0.1:0".parse().unwrap();
        config.bridge.capacity = 64;
        config.bridge.heartbeat_ms = 100;
        config.bridge.lag_timeout_ms = 50;
        config.shutdown.grace_secs = 2;
        config.log.drain_interval_ms = 10;
        config
    }

    /// Start with the default test config.
    pub async fn spawn(writers: &[&str]) -> anyhow::Result<Self> {
        Self::spawn_with(Self::config(), writers).await
    }

    /// Publish `writers` and start serving on a loopback listener.
    pub async fn spawn_with(config: Config, writers: &[&str]) -> anyhow::Result<Self> {
        let server = ReplicationServer::new(config)?;
        let mut published = HashMap::new();
        for key in writers {
            let writer = Arc::new(MemoryWriter::new(*key));
            server.publish(writer.clone())?;
            published.insert(key.to_string(), writer);
        }

        let (listener, connector) = loopback("127.0.0.1:7075".parse()?);
        server.start_on(Box::new(listener)).await?;
        Ok(Self {
            server,
            connector,
            writers: published,
        })
    }

    /// Connect a new replica.
    pub async fn connect(&self) -> anyhow::Result<TestClient> {
        Ok(TestClient::new(self.connector.connect().await?))
    }

    pub fn writer(&self, key: &str) -> Arc<MemoryWriter> {
        Arc::clone(&self.writers[key])
    }

    pub fn handle(&self) -> ReplicationServer {
        self.server.clone()
    }
}

impl Deref for TestServer {
    type Target = ReplicationServer;

    fn deref(&self) -> &ReplicationServer {
        &self.server
    }
}
