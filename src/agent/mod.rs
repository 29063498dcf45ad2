//! Connection agent: drives the replication protocol for one replica.
//!
//! ```text
//!   Connected ──► Authorizing ──► Serving ──► Closed
//!                 (only with an authorizer)
//! ```
//!
//! While serving, each [`ConnectionAgent::process`] call reads one
//! request, serves it and writes one response. The loop ends with a
//! [`ProcessOutcome`]; cleanup always unsubscribes from the bridge before
//! the channel is closed and the connection deregistered.

mod outcome;

pub use outcome::{ProcessOutcome, classify_codec_error};

use crate::auth::AuthorizationHandler;
use crate::bridge::Subscription;
use crate::error::BridgeError;
use crate::network::{BoxedChannel, ChannelWrapper, ReplicationStream};
use crate::protocol::{self, Request, Response};
use crate::server::{ChannelHolder, Registration, ReplicationServer};
use crate::telemetry::{RequestTimer, spans};
use futures_util::{FutureExt, SinkExt, StreamExt};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::codec::{Framed, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, debug, error, info, warn};

/// Upper bound on flushing and shutting down a channel at close.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentState {
    Connected,
    Authorizing,
    Serving,
    Closed,
}

/// Serve one accepted connection to completion.
///
/// Runs on the agent pool. The secure wrapper's handshake happens here, not
/// in the acceptor. A panic anywhere in the agent is fatal to the process.
pub async fn run_connection(
    server: ReplicationServer,
    registration: Registration,
    channel: BoxedChannel,
    wrapper: Arc<dyn ChannelWrapper>,
    shutdown: CancellationToken,
) {
    let holder = Arc::clone(registration.holder());
    let span = spans::agent(holder.id(), holder.peer());
    async move {
        debug!("replica connected");
        let served = AssertUnwindSafe(serve(&server, &holder, channel, wrapper, shutdown))
            .catch_unwind()
            .await;
        let outcome = match served {
            Ok(outcome) => outcome,
            Err(panic) => ProcessOutcome::fatal(panic_message(panic.as_ref())),
        };

        // The agent (and its subscription) is gone by now; only then is the
        // connection deregistered.
        drop(registration);
        report(&server, &holder, &outcome);

        if let ProcessOutcome::ClusterLoss { .. } = outcome {
            server.halt_with(Duration::ZERO).await;
        }
    }
    .instrument(span)
    .await
}

async fn serve(
    server: &ReplicationServer,
    holder: &Arc<ChannelHolder>,
    channel: BoxedChannel,
    wrapper: Arc<dyn ChannelWrapper>,
    shutdown: CancellationToken,
) -> ProcessOutcome {
    let stream = tokio::select! {
        wrapped = wrapper.wrap(channel) => match wrapped {
            Ok(stream) => stream,
            Err(e) => return ProcessOutcome::Network(e),
        },
        _ = holder.closed() => return ProcessOutcome::aborted(),
    };

    let mut agent = ConnectionAgent::new(server.clone(), Arc::clone(holder), stream, shutdown);
    let outcome = agent.run().await;
    agent.close().await;
    outcome
}

fn report(server: &ReplicationServer, holder: &ChannelHolder, outcome: &ProcessOutcome) {
    match outcome {
        ProcessOutcome::Disconnected => debug!("replica disconnected"),
        ProcessOutcome::ClusterLoss { winner } => {
            warn!(winner, "cluster election lost, halting server");
        }
        ProcessOutcome::Network(e) if server.is_running() => {
            info!(error = %e, "replication connection failed");
        }
        ProcessOutcome::Network(e) => debug!(error = %e, "connection closed during shutdown"),
        ProcessOutcome::Unhandled {
            message,
            fatal: false,
        } => error!(%message, "replication connection dropped"),
        ProcessOutcome::Unhandled {
            message,
            fatal: true,
        } => {
            error!(%message, "unrecoverable agent failure, aborting");
            std::process::abort();
        }
    }

    server
        .emitter()
        .info()
        .put_str("closed conn=")
        .put_display(holder.id())
        .put_str(" outcome=")
        .put_str(outcome.label())
        .commit();
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("agent panicked: {s}")
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("agent panicked: {s}")
    } else {
        "agent panicked".to_string()
    }
}

/// Per-connection protocol driver.
pub struct ConnectionAgent {
    server: ReplicationServer,
    holder: Arc<ChannelHolder>,
    framed: Framed<ReplicationStream, LinesCodec>,
    subscription: Option<Subscription>,
    shutdown: CancellationToken,
    state: AgentState,
}

impl ConnectionAgent {
    pub fn new(
        server: ReplicationServer,
        holder: Arc<ChannelHolder>,
        stream: ReplicationStream,
        shutdown: CancellationToken,
    ) -> Self {
        let codec = protocol::codec(server.config().limits.max_request_bytes);
        Self {
            server,
            holder,
            framed: Framed::new(stream, codec),
            subscription: None,
            shutdown,
            state: AgentState::Connected,
        }
    }

    pub fn state(&self) -> AgentState {
        self.state
    }

    /// Authorize if required, then serve requests while the server runs.
    pub async fn run(&mut self) -> ProcessOutcome {
        if let Some(handler) = self.server.authorizer().cloned() {
            self.state = AgentState::Authorizing;
            if let Err(outcome) = self.authorize(handler.as_ref()).await {
                return outcome;
            }
        }

        self.state = AgentState::Serving;
        while self.server.is_running() {
            if let Err(outcome) = self.process().await {
                return outcome;
            }
        }
        ProcessOutcome::Disconnected
    }

    /// Read one request, serve it and write the response.
    pub async fn process(&mut self) -> Result<(), ProcessOutcome> {
        let request = self.read_request().await?;
        let name = request.name();
        let _timer = RequestTimer::new(name);

        let response = match request {
            Request::Auth { .. } => Response::Authorized,
            Request::Subscribe => self.subscribe(),
            Request::Poll => self.poll().await?,
            Request::Resolve { key } => match self.server.writer_index(&key) {
                Some(index) => Response::Writer(index),
                None => Response::error(format!("unknown writer '{key}'")),
            },
            Request::Status => Response::Status(self.server.status()),
            Request::ClusterLoss { winner } => {
                self.server.set_alpha(false);
                return Err(ProcessOutcome::ClusterLoss { winner });
            }
            Request::Bye => return Err(ProcessOutcome::Disconnected),
        };
        self.send(response).await?;

        self.server
            .emitter()
            .debug()
            .put_str("conn=")
            .put_display(self.holder.id())
            .put_str(" served ")
            .put_str(name)
            .commit();
        Ok(())
    }

    /// Unsubscribe, then flush and shut the channel down.
    pub async fn close(&mut self) {
        if self.state == AgentState::Closed {
            return;
        }
        self.state = AgentState::Closed;
        if let Some(subscription) = self.subscription.take() {
            self.server.bridge().unsubscribe(subscription);
        }
        let closing = SinkExt::<String>::close(&mut self.framed);
        match tokio::time::timeout(CLOSE_TIMEOUT, closing).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(error = %e, "channel close failed"),
            Err(_) => debug!("channel close timed out"),
        }
    }

    async fn authorize(&mut self, handler: &dyn AuthorizationHandler) -> Result<(), ProcessOutcome> {
        let request = self.read_request().await?;
        let granted = match &request {
            Request::Auth { credentials } => handler.authorize(self.holder.peer(), credentials).await,
            _ => false,
        };

        if granted {
            self.send(Response::Authorized).await?;
            debug!("replica authorized");
            Ok(())
        } else {
            self.send(Response::Denied).await?;
            info!(request = request.name(), "replica denied");
            Err(ProcessOutcome::Disconnected)
        }
    }

    fn subscribe(&mut self) -> Response {
        let subscription = self
            .subscription
            .get_or_insert_with(|| self.server.bridge().subscribe());
        Response::Subscribed {
            cursor: subscription.position(),
        }
    }

    async fn poll(&mut self) -> Result<Response, ProcessOutcome> {
        let Some(subscription) = self.subscription.as_mut() else {
            return Ok(Response::error("not subscribed"));
        };
        let bridge = Arc::clone(self.server.bridge());
        let polled = tokio::select! {
            polled = bridge.poll(subscription) => polled,
            _ = self.holder.closed() => return Err(ProcessOutcome::aborted()),
        };

        match polled {
            Ok(Some(event)) => Ok(Response::Commit(event)),
            Ok(None) => Ok(Response::Heartbeat),
            Err(BridgeError::Halted) => Err(ProcessOutcome::Disconnected),
            Err(e @ BridgeError::Lagged { .. }) => {
                self.send(Response::error(e.to_string())).await?;
                Err(ProcessOutcome::unhandled(e.to_string()))
            }
        }
    }

    async fn read_request(&mut self) -> Result<Request, ProcessOutcome> {
        loop {
            let line = tokio::select! {
                line = self.framed.next() => line,
                _ = self.holder.closed() => return Err(ProcessOutcome::aborted()),
                _ = self.shutdown.cancelled() => return Err(ProcessOutcome::Disconnected),
            };
            let line = match line {
                None => return Err(ProcessOutcome::Disconnected),
                Some(Err(e)) => return Err(classify_codec_error(e)),
                Some(Ok(line)) => line,
            };
            if line.trim().is_empty() {
                continue;
            }

            return match serde_json::from_str(&line) {
                Ok(request) => Ok(request),
                Err(e) => {
                    let message = format!("malformed request: {e}");
                    self.send(Response::error(message.clone())).await?;
                    Err(ProcessOutcome::unhandled(message))
                }
            };
        }
    }

    async fn send(&mut self, response: Response) -> Result<(), ProcessOutcome> {
        let line = serde_json::to_string(&response)
            .map_err(|e| ProcessOutcome::fatal(format!("response encoding failed: {e}")))?;
        tokio::select! {
            sent = self.framed.send(line) => sent.map_err(classify_codec_error),
            _ = self.holder.closed() => Err(ProcessOutcome::aborted()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::network::loopback::loopback;

    async fn running_server() -> ReplicationServer {
        let mut config = Config::default();
        config.bridge.capacity = 16;
        let server = ReplicationServer::new(config).unwrap();
        let (listener, _connector) = loopback("127.0.0.1:7075".parse().unwrap());
        server.start_on(Box::new(listener)).await.unwrap();
        server
    }

    #[tokio::test]
    async fn test_idle_agent_ends_on_signal_fired_before_it_waited() {
        let server = running_server().await;
        let registration = server
            .connections()
            .register("127.0.0.1:40000".parse().unwrap());
        // The replica stays connected and silent.
        let (_replica, channel) = tokio::io::duplex(1024);
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let mut agent = ConnectionAgent::new(
            server.clone(),
            Arc::clone(registration.holder()),
            ReplicationStream::Plain(Box::new(channel)),
            shutdown,
        );
        let outcome = tokio::time::timeout(Duration::from_secs(1), agent.run())
            .await
            .unwrap();
        assert!(matches!(outcome, ProcessOutcome::Disconnected));
        assert_eq!(agent.state(), AgentState::Serving);

        agent.close().await;
        assert_eq!(agent.state(), AgentState::Closed);
        drop(registration);
        server.halt_with(Duration::ZERO).await.unwrap();
    }

    #[tokio::test]
    async fn test_idle_agent_serves_until_signal() {
        let server = running_server().await;
        let registration = server
            .connections()
            .register("127.0.0.1:40001".parse().unwrap());
        let (_replica, channel) = tokio::io::duplex(1024);
        let shutdown = CancellationToken::new();

        let mut agent = ConnectionAgent::new(
            server.clone(),
            Arc::clone(registration.holder()),
            ReplicationStream::Plain(Box::new(channel)),
            shutdown.clone(),
        );
        let running = tokio::spawn(async move { agent.run().await });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!running.is_finished());

        shutdown.cancel();
        let outcome = tokio::time::timeout(Duration::from_secs(1), running)
            .await
            .unwrap()
            .unwrap();
        assert!(matches!(outcome, ProcessOutcome::Disconnected));

        drop(registration);
        server.halt_with(Duration::ZERO).await.unwrap();
    }
}
