//! Error types for the replication server.
//!
//! Each layer has its own enum; the daemon binary folds them into
//! `anyhow::Error` at the top level.

use std::net::SocketAddr;
use thiserror::Error;

// ============================================================================
// Bridge Errors
// ============================================================================

/// Errors returned to a subscriber polling the event bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum BridgeError {
    /// The subscriber fell more than a ring's worth behind, or was evicted
    /// because it held publishers back. It cannot recover.
    #[error("subscriber lagged at cursor {cursor}")]
    Lagged { cursor: i64 },
    /// The bridge has been halted.
    #[error("event bridge halted")]
    Halted,
}

// ============================================================================
// Server Errors
// ============================================================================

/// Errors raised by server lifecycle and registration calls.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("server is not idle")]
    NotIdle,

    #[error("writer registry is frozen once the server has started")]
    RegistryFrozen,

    #[error("writer '{0}' is already published")]
    DuplicateWriter(String),

    #[error("tls setup failed: {0}")]
    Tls(String),

    #[error("invalid ring geometry: {0}")]
    Capacity(#[from] ringcast_ring::CapacityError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

// ============================================================================
// Pool Errors
// ============================================================================

/// Why the agent pool refused a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum SubmitError {
    #[error("agent pool is shutting down")]
    ShuttingDown,
    #[error("agent pool is at capacity")]
    Saturated,
}

impl SubmitError {
    /// Get a static label for log fields.
    #[inline]
    pub fn reason(&self) -> &'static str {
        match self {
            Self::ShuttingDown => "shutting_down",
            Self::Saturated => "saturated",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_error_display() {
        assert_eq!(
            BridgeError::Lagged { cursor: 12 }.to_string(),
            "subscriber lagged at cursor 12"
        );
        assert_eq!(BridgeError::Halted.to_string(), "event bridge halted");
    }

    #[test]
    fn test_bind_error_keeps_source() {
        use std::error::Error as _;
        let err = ServerError::Bind {
            addr: "127.0.0.1:1".parse().unwrap(),
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        };
        assert!(err.to_string().starts_with("failed to bind 127.0.0.1:1"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_submit_error_reason() {
        assert_eq!(SubmitError::ShuttingDown.reason(), "shutting_down");
        assert_eq!(SubmitError::Saturated.reason(), "saturated");
    }
}
