//! Telemetry utilities: span constructors and request timing.

use std::time::Instant;

/// Guard that traces how long one agent request took.
///
/// Emits a `trace` event when dropped.
pub struct RequestTimer {
    request: &'static str,
    start: Instant,
}

impl RequestTimer {
    /// Start timing a request.
    pub fn new(request: &'static str) -> Self {
        Self {
            request,
            start: Instant::now(),
        }
    }
}

impl Drop for RequestTimer {
    fn drop(&mut self) {
        let micros = self.start.elapsed().as_micros() as u64;
        tracing::trace!(request = self.request, micros, "request served");
    }
}

/// Standardized span constructors for replication observability.
pub mod spans {
    use std::net::SocketAddr;
    use tracing::{Span, info_span};

    /// Create a span covering one server instance.
    pub fn server(instance: u32, name: &str) -> Span {
        info_span!("server", instance, name = %name)
    }

    /// Create a span for one replication connection.
    pub fn agent(conn: u64, peer: SocketAddr) -> Span {
        info_span!("agent", conn, peer = %peer)
    }
}
