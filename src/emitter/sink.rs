//! Destinations for drained records.

use super::Level;

/// Receives records drained from the emitter lanes.
pub trait RecordSink {
    fn record(&mut self, level: Level, text: &str);
}

/// Forwards drained records to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl RecordSink for TracingSink {
    fn record(&mut self, level: Level, text: &str) {
        match level {
            Level::Debug => tracing::debug!(target: "ringcast::records", "{text}"),
            Level::Info => tracing::info!(target: "ringcast::records", "{text}"),
            Level::Error => tracing::error!(target: "ringcast::records", "{text}"),
        }
    }
}

/// Collects drained records in memory.
impl RecordSink for Vec<(Level, String)> {
    fn record(&mut self, level: Level, text: &str) {
        self.push((level, text.to_string()));
    }
}
