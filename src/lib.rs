//! ringcast - replication and event-distribution core of an embedded
//! time-series store.
//!
//! Writers publish commit notifications into an [`EventBridge`]; each
//! connected replica is served by a [`ConnectionAgent`] that follows the
//! bridge at its own pace. The [`ReplicationServer`] owns the listener,
//! the writer registry and the agent pool, and tears everything down in a
//! fixed order on halt.
//!
//! The ring primitive underneath lives in the `ringcast-ring` crate.
//!
//! [`ConnectionAgent`]: agent::ConnectionAgent

pub mod agent;
pub mod auth;
pub mod bridge;
pub mod config;
pub mod emitter;
pub mod error;
pub mod network;
pub mod protocol;
pub mod server;
pub mod telemetry;
pub mod writer;

pub use bridge::{CommitEvent, CommitInfo, EventBridge, Subscription};
pub use config::Config;
pub use emitter::{AsyncRecordEmitter, Level, RecordHandle};
pub use error::{BridgeError, ServerError, SubmitError};
pub use server::{HaltReport, LifecycleState, ReplicationServer};
pub use writer::{CommitListener, JournalWriter, MemoryWriter, WriterIndex};
