//! Replication server.
//!
//! Owns the writer registry, the event bridge, the record emitter, the
//! agent pool and the set of open connections, and drives them through
//! the lifecycle in [`lifecycle`].

pub mod connections;
pub mod lifecycle;
pub mod presence;
pub mod registry;

pub use connections::{ChannelHolder, ConnectionSet, Registration};
pub use lifecycle::{Leadership, LifecycleState};
pub use presence::{PresenceAnnouncement, PresenceResponder};

use crate::auth::{AuthorizationHandler, StaticTokenAuthorizer};
use crate::bridge::EventBridge;
use crate::config::Config;
use crate::emitter::AsyncRecordEmitter;
use crate::error::ServerError;
use crate::network::{AgentPool, ChannelWrapper, Gateway, Listener, PlainWrapper, TlsWrapper};
use crate::protocol::StatusReport;
use crate::telemetry::spans;
use crate::writer::{JournalWriter, WriterIndex};
use lifecycle::{LeadershipFlag, Lifecycle};
use parking_lot::Mutex;
use registry::WriterRegistry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{Instrument, error, info, warn};

/// What a halt observed at each step.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HaltReport {
    /// In-flight agents finished within the grace period.
    pub agents_drained: bool,
    /// This halt stopped the event bridge.
    pub bridge_halted: bool,
    /// A presence responder was running and was stopped.
    pub presence_halted: bool,
    /// Connections still open after the grace period, closed by force.
    pub forced_connections: usize,
    /// The agent pool had terminated when the halt finished.
    pub terminated: bool,
}

/// Tasks and resources that only exist while running.
#[derive(Default)]
struct Runtime {
    local_addr: Option<SocketAddr>,
    acceptor: Option<JoinHandle<()>>,
    presence: Option<PresenceResponder>,
    drain: Option<(CancellationToken, JoinHandle<()>)>,
}

struct Shared {
    config: Config,
    lifecycle: Lifecycle,
    leadership: LeadershipFlag,
    bridge: Arc<EventBridge>,
    registry: WriterRegistry,
    connections: Arc<ConnectionSet>,
    pool: AgentPool,
    emitter: Arc<AsyncRecordEmitter>,
    authorizer: Option<Arc<dyn AuthorizationHandler>>,
    /// Stop-accepting signal. Level-triggered: tasks that look after a
    /// halt fired still see it.
    shutdown: CancellationToken,
    runtime: Mutex<Runtime>,
}

/// Handle to a replication server. Cheap to clone.
#[derive(Clone)]
pub struct ReplicationServer {
    shared: Arc<Shared>,
}

impl ReplicationServer {
    /// Build a server. Authorization follows `config.auth`: a token list
    /// installs a [`StaticTokenAuthorizer`], no section authorizes everyone.
    pub fn new(config: Config) -> Result<Self, ServerError> {
        let authorizer = config.auth.as_ref().map(|auth| {
            Arc::new(StaticTokenAuthorizer::new(auth.tokens.iter().cloned()))
                as Arc<dyn AuthorizationHandler>
        });
        Self::with_authorizer(config, authorizer)
    }

    /// Build a server with an explicit authorization handler.
    pub fn with_authorizer(
        config: Config,
        authorizer: Option<Arc<dyn AuthorizationHandler>>,
    ) -> Result<Self, ServerError> {
        let bridge = EventBridge::from_config(&config.bridge)?;
        let emitter = Arc::new(AsyncRecordEmitter::from_config(&config.log)?);
        let pool = AgentPool::new(config.limits.max_connections);

        Ok(Self {
            shared: Arc::new(Shared {
                config,
                lifecycle: Lifecycle::new(),
                leadership: LeadershipFlag::default(),
                bridge,
                registry: WriterRegistry::new(),
                connections: Arc::new(ConnectionSet::new()),
                pool,
                emitter,
                authorizer,
                shutdown: CancellationToken::new(),
                runtime: Mutex::new(Runtime::default()),
            }),
        })
    }

    // ========================================================================
    // Registration
    // ========================================================================

    /// Register a writer whose commits are replicated. Only valid before
    /// [`start`](Self::start).
    pub fn publish(&self, writer: Arc<dyn JournalWriter>) -> Result<WriterIndex, ServerError> {
        if self.shared.lifecycle.load() != LifecycleState::Idle {
            return Err(ServerError::RegistryFrozen);
        }
        self.shared.registry.register(writer, &self.shared.bridge)
    }

    pub fn writer_index(&self, key: &str) -> Option<WriterIndex> {
        self.shared.registry.resolve(key)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Bind the configured listen address and start serving.
    pub async fn start(&self) -> Result<SocketAddr, ServerError> {
        if self.shared.lifecycle.load() != LifecycleState::Idle {
            return Err(ServerError::NotIdle);
        }
        let addr = self.shared.config.listen.address;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        info!(%addr, "replication listener bound");
        self.start_on(Box::new(listener)).await
    }

    /// Start serving connections accepted by `listener`.
    pub async fn start_on(&self, listener: Box<dyn Listener>) -> Result<SocketAddr, ServerError> {
        let shared = &self.shared;
        if shared.lifecycle.load() != LifecycleState::Idle {
            return Err(ServerError::NotIdle);
        }
        let wrapper: Arc<dyn ChannelWrapper> = match &shared.config.tls {
            Some(tls) => Arc::new(TlsWrapper::from_config(tls)?),
            None => Arc::new(PlainWrapper),
        };
        let local_addr = listener.local_addr()?;
        let presence = match &shared.config.presence {
            Some(presence) => {
                Some(PresenceResponder::start(presence, self.instance(), local_addr).await?)
            }
            None => None,
        };

        let mut runtime = shared.runtime.lock();
        // Frozen before the transition so no publish lands after Running.
        shared.registry.freeze();
        if !shared
            .lifecycle
            .transition(LifecycleState::Idle, LifecycleState::Running)
        {
            drop(runtime);
            if let Some(presence) = presence {
                presence.halt().await;
            }
            return Err(ServerError::NotIdle);
        }

        shared.bridge.start();

        let stop_drain = CancellationToken::new();
        let drain = shared
            .emitter
            .spawn_drain(shared.config.log.drain_interval(), stop_drain.clone());

        let span = spans::server(self.instance(), &shared.config.server.name);
        let gateway = Gateway::new(listener, wrapper, self.clone());
        let acceptor = tokio::spawn(
            gateway
                .run(shared.shutdown.clone())
                .instrument(span),
        );

        runtime.local_addr = Some(local_addr);
        runtime.acceptor = Some(acceptor);
        runtime.presence = presence;
        runtime.drain = Some((stop_drain, drain));
        drop(runtime);

        info!(
            instance = self.instance(),
            address = %local_addr,
            writers = shared.registry.len(),
            "replication server started"
        );
        Ok(local_addr)
    }

    /// Halt with the configured grace period.
    pub async fn halt(&self) -> Option<HaltReport> {
        self.halt_with(self.shared.config.shutdown.grace()).await
    }

    /// Stop the server, giving in-flight agents up to `timeout` to finish.
    ///
    /// Only the first call on a running server does anything; every other
    /// call returns `None`. A zero `timeout` skips both waits.
    pub async fn halt_with(&self, timeout: Duration) -> Option<HaltReport> {
        let shared = &self.shared;
        if !shared
            .lifecycle
            .transition(LifecycleState::Running, LifecycleState::Halting)
        {
            return None;
        }
        let instance = self.instance();
        info!(instance, grace = ?timeout, "halting replication server");
        let mut report = HaltReport::default();

        // Stop accepting. The acceptor drops the listener on its way out.
        shared.shutdown.cancel();
        let acceptor = shared.runtime.lock().acceptor.take();
        if let Some(acceptor) = acceptor
            && let Err(e) = acceptor.await
        {
            error!(instance, error = %e, "acceptor task failed");
        }

        shared.pool.shutdown();
        if !timeout.is_zero() {
            report.agents_drained = shared.pool.await_termination(timeout).await;
            if !report.agents_drained {
                warn!(
                    instance,
                    active = shared.pool.active(),
                    "agents still running after grace period"
                );
            }
        }

        report.bridge_halted = shared.bridge.halt();

        let presence = shared.runtime.lock().presence.take();
        if let Some(presence) = presence {
            presence.halt().await;
            report.presence_halted = true;
        }

        report.forced_connections = shared.connections.close_all();

        shared.emitter.close();
        let drain = shared.runtime.lock().drain.take();
        if let Some((stop, handle)) = drain {
            stop.cancel();
            if let Err(e) = handle.await {
                error!(instance, error = %e, "record drain task failed");
            }
        }

        report.terminated = if timeout.is_zero() {
            shared.pool.active() == 0
        } else {
            shared.pool.await_termination(timeout).await
        };

        shared.lifecycle.store(LifecycleState::Halted);
        info!(
            instance,
            drained = report.agents_drained,
            forced = report.forced_connections,
            terminated = report.terminated,
            "replication server halted"
        );
        Some(report)
    }

    // ========================================================================
    // State
    // ========================================================================

    pub fn state(&self) -> LifecycleState {
        self.shared.lifecycle.load()
    }

    pub fn is_running(&self) -> bool {
        self.state() == LifecycleState::Running
    }

    pub fn connected_client_count(&self) -> usize {
        self.shared.connections.len()
    }

    pub fn is_alpha(&self) -> bool {
        self.shared.leadership.load() == Leadership::Alpha
    }

    pub fn set_alpha(&self, alpha: bool) {
        let leadership = if alpha {
            Leadership::Alpha
        } else {
            Leadership::Follower
        };
        self.shared.leadership.store(leadership);
    }

    pub fn instance(&self) -> u32 {
        self.shared.config.server.instance
    }

    /// Address the listener accepted on, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.shared.runtime.lock().local_addr
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            instance: self.instance(),
            alpha: self.is_alpha(),
            cursor: self.shared.bridge.cursor(),
            subscribers: self.shared.bridge.subscriber_count(),
            clients: self.connected_client_count(),
        }
    }

    pub fn config(&self) -> &Config {
        &self.shared.config
    }

    pub fn bridge(&self) -> &Arc<EventBridge> {
        &self.shared.bridge
    }

    pub fn emitter(&self) -> &Arc<AsyncRecordEmitter> {
        &self.shared.emitter
    }

    pub(crate) fn authorizer(&self) -> Option<&Arc<dyn AuthorizationHandler>> {
        self.shared.authorizer.as_ref()
    }

    pub(crate) fn connections(&self) -> &Arc<ConnectionSet> {
        &self.shared.connections
    }

    pub(crate) fn pool(&self) -> &AgentPool {
        &self.shared.pool
    }

    /// The stop-accepting signal.
    pub(crate) fn shutdown_signal(&self) -> CancellationToken {
        self.shared.shutdown.clone()
    }
}

impl std::fmt::Debug for ReplicationServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationServer")
            .field("instance", &self.instance())
            .field("state", &self.state())
            .field("clients", &self.connected_client_count())
            .finish()
    }
}
