//! Integration test common infrastructure.
//!
//! Provides a replication server running on the in-memory loopback
//! transport, protocol-speaking test clients and polling helpers.

pub mod client;
pub mod server;
pub mod tls;

#[allow(unused_imports)]
pub use client::TestClient;
#[allow(unused_imports)]
pub use server::TestServer;

use std::time::Duration;

/// Poll `condition` until it holds or `limit` passes.
#[allow(dead_code)]
pub async fn wait_until(limit: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + limit;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}
