//! Configuration loading and management.
//!
//! This module is split into logical submodules:
//! - [`types`]: Core config struct definitions (Config, BridgeConfig, LimitsConfig, ...)
//! - [`listen`]: Listener, TLS and presence configuration
//! - [`defaults`]: serde default functions
//! - [`validation`]: startup validation

mod defaults;
mod listen;
mod types;
mod validation;

pub use listen::{ListenConfig, PresenceConfig, TlsConfig};
pub use types::{
    AuthConfig, BridgeConfig, Config, ConfigError, LimitsConfig, LogConfig, ServerConfig,
    ShutdownConfig,
};
pub use validation::{ValidationError, validate};
