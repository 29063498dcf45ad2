//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use std::path::Path;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("bridge.capacity must be a power of two, got {0}")]
    BridgeCapacity(usize),
    #[error("log.lane_capacity must be a power of two, got {0}")]
    LaneCapacity(usize),
    #[error("bridge.heartbeat_ms must be greater than zero")]
    ZeroHeartbeat,
    #[error("limits.max_connections must be greater than zero")]
    ZeroConnections,
    #[error("tls.cert_path does not exist: {0}")]
    TlsCertNotFound(String),
    #[error("tls.key_path does not exist: {0}")]
    TlsKeyNotFound(String),
    #[error("writer '{0}' is listed more than once")]
    DuplicateWriter(String),
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if !config.bridge.capacity.is_power_of_two() {
        errors.push(ValidationError::BridgeCapacity(config.bridge.capacity));
    }
    if !config.log.lane_capacity.is_power_of_two() {
        errors.push(ValidationError::LaneCapacity(config.log.lane_capacity));
    }
    if config.bridge.heartbeat_ms == 0 {
        errors.push(ValidationError::ZeroHeartbeat);
    }
    if config.limits.max_connections == 0 {
        errors.push(ValidationError::ZeroConnections);
    }

    if let Some(ref tls) = config.tls {
        if !Path::new(&tls.cert_path).exists() {
            errors.push(ValidationError::TlsCertNotFound(tls.cert_path.clone()));
        }
        if !Path::new(&tls.key_path).exists() {
            errors.push(ValidationError::TlsKeyNotFound(tls.key_path.clone()));
        }
    }

    let mut seen = std::collections::HashSet::new();
    for writer in &config.writers {
        if !seen.insert(writer.as_str()) {
            errors.push(ValidationError::DuplicateWriter(writer.clone()));
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
