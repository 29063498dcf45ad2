//! Why an agent stops serving, and how transport errors map onto that.

use std::io;
use tokio_util::codec::LinesCodecError;

/// Terminal result of serving a connection. The set is closed: every
/// failure inside the agent is mapped onto one of these.
#[derive(Debug)]
pub enum ProcessOutcome {
    /// The peer closed the channel or said goodbye, or the server stopped
    /// accepting work.
    Disconnected,
    /// The peer reported that this node lost the leadership vote.
    ClusterLoss { winner: u32 },
    /// The channel failed.
    Network(io::Error),
    /// Anything else. `fatal` means the process cannot safely continue.
    Unhandled { message: String, fatal: bool },
}

impl ProcessOutcome {
    pub fn unhandled(message: impl Into<String>) -> Self {
        ProcessOutcome::Unhandled {
            message: message.into(),
            fatal: false,
        }
    }

    pub fn fatal(message: impl Into<String>) -> Self {
        ProcessOutcome::Unhandled {
            message: message.into(),
            fatal: true,
        }
    }

    /// Connection was closed from the server side.
    pub fn aborted() -> Self {
        ProcessOutcome::Network(io::Error::new(
            io::ErrorKind::ConnectionAborted,
            "connection closed by server",
        ))
    }

    /// Static label for log fields.
    pub fn label(&self) -> &'static str {
        match self {
            ProcessOutcome::Disconnected => "disconnected",
            ProcessOutcome::ClusterLoss { .. } => "cluster_loss",
            ProcessOutcome::Network(_) => "network",
            ProcessOutcome::Unhandled { fatal: false, .. } => "unhandled",
            ProcessOutcome::Unhandled { fatal: true, .. } => "fatal",
        }
    }
}

/// Classify a codec error raised while reading or writing a line.
pub fn classify_codec_error(e: LinesCodecError) -> ProcessOutcome {
    match e {
        LinesCodecError::MaxLineLengthExceeded => {
            ProcessOutcome::unhandled("request exceeds max_request_bytes")
        }
        LinesCodecError::Io(e) => match e.kind() {
            io::ErrorKind::UnexpectedEof
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::BrokenPipe => ProcessOutcome::Disconnected,
            _ => ProcessOutcome::Network(e),
        },
    }
}
