//! Test replica client.
//!
//! Speaks the line-delimited JSON protocol over any byte stream and offers
//! helpers that assert on the server's responses.

use futures_util::{SinkExt, StreamExt};
use ringcast::CommitEvent;
use ringcast::protocol::{Request, Response};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, DuplexStream};
use tokio::time::timeout;
use tokio_util::codec::{Framed, LinesCodec};

/// A test replica.
pub struct TestClient<S = DuplexStream> {
    framed: Framed<S, LinesCodec>,
}

#[allow(dead_code)]
impl<S: AsyncRead + AsyncWrite + Unpin> TestClient<S> {
    pub fn new(stream: S) -> Self {
        Self {
            framed: Framed::new(stream, LinesCodec::new()),
        }
    }

    /// Send a raw line.
    pub async fn send_raw(&mut self, line: &str) -> anyhow::Result<()> {
        self.framed.send(line.to_string()).await?;
        Ok(())
    }

    pub async fn send(&mut self, request: &Request) -> anyhow::Result<()> {
        self.send_raw(&serde_json::to_string(request)?).await
    }

    /// Receive a single response from the server.
    pub async fn recv(&mut self) -> anyhow::Result<Response> {
        self.recv_timeout(Duration::from_secs(5)).await
    }

    /// Receive a response with a timeout.
    pub async fn recv_timeout(&mut self, dur: Duration) -> anyhow::Result<Response> {
        match timeout(dur, self.framed.next()).await? {
            Some(line) => Ok(serde_json::from_str(&line?)?),
            None => anyhow::bail!("connection closed"),
        }
    }

    /// Send a request and wait for its response.
    pub async fn request(&mut self, request: Request) -> anyhow::Result<Response> {
        self.send(&request).await?;
        self.recv().await
    }

    /// Subscribe and return the cursor the subscription was anchored at.
    pub async fn subscribe(&mut self) -> anyhow::Result<i64> {
        match self.request(Request::Subscribe).await? {
            Response::Subscribed { cursor } => Ok(cursor),
            other => anyhow::bail!("expected subscribed, got {other:?}"),
        }
    }

    /// Poll until a commit arrives, skipping heartbeats.
    pub async fn next_commit(&mut self) -> anyhow::Result<CommitEvent> {
        for _ in 0..50 {
            match self.request(Request::Poll).await? {
                Response::Commit(event) => return Ok(event),
                Response::Heartbeat => continue,
                other => anyhow::bail!("expected commit, got {other:?}"),
            }
        }
        anyhow::bail!("no commit after 50 polls")
    }

    /// Assert the server closes the connection within a few seconds,
    /// discarding anything still in flight.
    pub async fn expect_closed(&mut self) -> anyhow::Result<()> {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            match tokio::time::timeout_at(deadline, self.framed.next()).await {
                Err(_) => anyhow::bail!("connection still open"),
                Ok(None) | Ok(Some(Err(_))) => return Ok(()),
                Ok(Some(Ok(_))) => continue,
            }
        }
    }
}
