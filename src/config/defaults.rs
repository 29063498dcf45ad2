//! Default value functions for configuration.
//!
//! Separated into its own module for clarity and reuse.

// =============================================================================
// Server Defaults
// =============================================================================

pub fn default_server_name() -> String {
    "ringcast".to_string()
}

// =============================================================================
// Bridge Defaults
// =============================================================================

pub fn default_bridge_capacity() -> usize {
    1024
}

pub fn default_heartbeat_ms() -> u64 {
    2000
}

pub fn default_lag_timeout_ms() -> u64 {
    500
}

// =============================================================================
// Limits Defaults
// =============================================================================

pub fn default_max_connections() -> usize {
    256
}

pub fn default_max_request_bytes() -> usize {
    64 * 1024
}

// =============================================================================
// Shutdown / Log Defaults
// =============================================================================

pub fn default_grace_secs() -> u64 {
    30
}

pub fn default_lane_capacity() -> usize {
    1024
}

pub fn default_drain_interval_ms() -> u64 {
    50
}
