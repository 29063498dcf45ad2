//! Network module.
//!
//! Contains the Gateway (acceptor), the listener and channel abstractions,
//! the in-memory loopback transport and the agent pool.

mod gateway;
mod listener;
pub mod loopback;
mod pool;
mod stream;

pub use gateway::Gateway;
pub use listener::Listener;
pub use loopback::{LoopbackConnector, LoopbackListener};
pub use pool::AgentPool;
pub use stream::{BoxedChannel, ByteChannel, ChannelWrapper, PlainWrapper, ReplicationStream, TlsWrapper};
