//! Replication wire protocol.
//!
//! One JSON object per line in each direction. The replica sends a
//! [`Request`], the server answers with exactly one [`Response`].
//!
//! ```text
//! > {"type":"auth","credentials":"secret"}
//! < {"type":"authorized"}
//! > {"type":"subscribe"}
//! < {"type":"subscribed","cursor":41}
//! > {"type":"poll"}
//! < {"type":"commit","cursor":42,"writer_id":0,"txn":7,"timestamp":1700000000000}
//! > {"type":"poll"}
//! < {"type":"heartbeat"}
//! ```

use crate::bridge::CommitEvent;
use crate::writer::WriterIndex;
use serde::{Deserialize, Serialize};
use tokio_util::codec::LinesCodec;

/// Replica → server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Present credentials. Must be first when the server requires it.
    Auth { credentials: String },
    /// Attach to the commit stream at the current cursor.
    Subscribe,
    /// Wait up to one heartbeat interval for the next commit.
    Poll,
    /// Look up a writer's dense id.
    Resolve { key: String },
    Status,
    /// This node lost the leadership vote to `winner`.
    ClusterLoss { winner: u32 },
    Bye,
}

impl Request {
    /// Short name for logs and timers.
    pub fn name(&self) -> &'static str {
        match self {
            Request::Auth { .. } => "auth",
            Request::Subscribe => "subscribe",
            Request::Poll => "poll",
            Request::Resolve { .. } => "resolve",
            Request::Status => "status",
            Request::ClusterLoss { .. } => "cluster_loss",
            Request::Bye => "bye",
        }
    }
}

/// Server → replica.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    Authorized,
    Denied,
    Subscribed { cursor: i64 },
    Commit(CommitEvent),
    Heartbeat,
    Writer(WriterIndex),
    Status(StatusReport),
    Error { message: String },
}

impl Response {
    pub fn error(message: impl Into<String>) -> Self {
        Response::Error {
            message: message.into(),
        }
    }
}

/// Snapshot returned for a `Status` request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusReport {
    pub instance: u32,
    pub alpha: bool,
    pub cursor: i64,
    pub subscribers: usize,
    pub clients: usize,
}

/// Line codec used on both ends, bounded by `max_request_bytes`.
pub fn codec(max_line: usize) -> LinesCodec {
    LinesCodec::new_with_max_length(max_line)
}
