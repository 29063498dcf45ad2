//! Record slots and severity levels.

use serde::{Deserialize, Serialize};

/// Severity lane a record is published on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Debug,
    Info,
    Error,
}

impl Level {
    pub const ALL: [Level; 3] = [Level::Debug, Level::Info, Level::Error];

    /// Tag written after the timestamp.
    pub fn tag(self) -> &'static str {
        match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Error => "ERROR",
        }
    }

    pub(crate) fn lane(self) -> usize {
        match self {
            Level::Debug => 0,
            Level::Info => 1,
            Level::Error => 2,
        }
    }
}

impl std::fmt::Display for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.tag())
    }
}

/// One reusable record slot.
///
/// The text buffer keeps its allocation across laps of the ring.
#[derive(Debug, Default, Clone)]
pub struct LogRecord {
    pub(crate) text: String,
    pub(crate) complete: bool,
}

impl LogRecord {
    /// Record text without the terminator.
    pub fn text(&self) -> &str {
        self.text.strip_suffix('\n').unwrap_or(&self.text)
    }

    /// Whether the record was committed rather than abandoned.
    pub fn is_complete(&self) -> bool {
        self.complete
    }
}
