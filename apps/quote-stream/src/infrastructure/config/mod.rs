//! Configuration Module
//!
//! Environment-driven settings for the gateway client.

mod settings;

pub use settings::{ClientConfig, ConfigError, DEFAULT_GATEWAY_URL};
