//! Client Configuration Settings
//!
//! Configuration for the gateway client, loaded from environment variables
//! prefixed with `QUOTE_STREAM_`. Unset or unparsable numeric values fall
//! back to their defaults; a malformed gateway URL or symbol list is an error.

use std::time::Duration;

use crate::domain::history::DEFAULT_WINDOW;
use crate::domain::streaming::{Symbol, SymbolError};

/// Default gateway endpoint.
pub const DEFAULT_GATEWAY_URL: &str = "ws://localhost:8000/ws";

/// Complete client configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Gateway WebSocket endpoint (`ws://` or `wss://`).
    pub gateway_url: String,
    /// Reconnects allowed after a failure (0 = unlimited).
    pub max_reconnect_attempts: u32,
    /// Delay before the first reconnect.
    pub reconnect_delay: Duration,
    /// Upper bound on the reconnect delay.
    pub reconnect_delay_max: Duration,
    /// Reconnect delay growth factor.
    pub reconnect_multiplier: f64,
    /// Handshake timeout.
    pub connect_timeout: Duration,
    /// Keepalive ping interval (zero disables keepalive).
    pub ping_interval: Duration,
    /// Rolling price history window.
    pub history_window: Duration,
    /// Symbols the binary subscribes to at startup.
    pub symbols: Vec<Symbol>,
    /// Prometheus scrape port (0 = in-process recorder only).
    pub metrics_port: u16,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            gateway_url: DEFAULT_GATEWAY_URL.to_string(),
            max_reconnect_attempts: 5,
            reconnect_delay: Duration::from_millis(3000),
            reconnect_delay_max: Duration::from_secs(60),
            reconnect_multiplier: 2.0,
            connect_timeout: Duration::from_secs(10),
            ping_interval: Duration::from_secs(30),
            history_window: DEFAULT_WINDOW,
            symbols: Vec::new(),
            metrics_port: 0,
        }
    }
}

impl ClientConfig {
    /// Default configuration pointed at `gateway_url`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidUrl`] if the URL is not `ws://` or
    /// `wss://`.
    pub fn new(gateway_url: impl Into<String>) -> Result<Self, ConfigError> {
        let gateway_url = gateway_url.into();
        validate_url("gateway_url", &gateway_url)?;
        Ok(Self {
            gateway_url,
            ..Self::default()
        })
    }

    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the gateway URL is empty or not a WebSocket URL,
    /// or if the symbol list contains an empty entry.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// # Errors
    ///
    /// Same as [`ClientConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        let gateway_url = match lookup("QUOTE_STREAM_GATEWAY_URL") {
            Some(url) if url.trim().is_empty() => {
                return Err(ConfigError::EmptyValue(
                    "QUOTE_STREAM_GATEWAY_URL".to_string(),
                ));
            }
            Some(url) => url.trim().to_string(),
            None => defaults.gateway_url,
        };
        validate_url("QUOTE_STREAM_GATEWAY_URL", &gateway_url)?;

        let symbols = match lookup("QUOTE_STREAM_SYMBOLS") {
            Some(raw) => parse_symbols(&raw)?,
            None => defaults.symbols,
        };

        Ok(Self {
            gateway_url,
            max_reconnect_attempts: parse_env_u32(
                &lookup,
                "QUOTE_STREAM_MAX_RECONNECT_ATTEMPTS",
                defaults.max_reconnect_attempts,
            ),
            reconnect_delay: parse_env_duration_millis(
                &lookup,
                "QUOTE_STREAM_RECONNECT_DELAY_MS",
                defaults.reconnect_delay,
            ),
            reconnect_delay_max: parse_env_duration_secs(
                &lookup,
                "QUOTE_STREAM_RECONNECT_DELAY_MAX_SECS",
                defaults.reconnect_delay_max,
            ),
            reconnect_multiplier: parse_env_f64(
                &lookup,
                "QUOTE_STREAM_RECONNECT_MULTIPLIER",
                defaults.reconnect_multiplier,
            ),
            connect_timeout: parse_env_duration_secs(
                &lookup,
                "QUOTE_STREAM_CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout,
            ),
            ping_interval: parse_env_duration_secs(
                &lookup,
                "QUOTE_STREAM_PING_INTERVAL_SECS",
                defaults.ping_interval,
            ),
            history_window: parse_env_duration_secs(
                &lookup,
                "QUOTE_STREAM_HISTORY_WINDOW_SECS",
                defaults.history_window,
            ),
            symbols,
            metrics_port: parse_env_u16(&lookup, "QUOTE_STREAM_METRICS_PORT", defaults.metrics_port),
        })
    }

    /// Keepalive interval, or `None` when disabled.
    #[must_use]
    pub fn keepalive(&self) -> Option<Duration> {
        (!self.ping_interval.is_zero()).then_some(self.ping_interval)
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),

    /// Gateway URL is not a WebSocket URL.
    #[error("{key} must be a ws:// or wss:// URL, got {value:?}")]
    InvalidUrl {
        /// Setting name.
        key: String,
        /// Rejected value.
        value: String,
    },

    /// Symbol list contains an unusable entry.
    #[error("invalid symbol in QUOTE_STREAM_SYMBOLS: {0}")]
    InvalidSymbol(#[from] SymbolError),
}

fn validate_url(key: &str, url: &str) -> Result<(), ConfigError> {
    let lower = url.to_ascii_lowercase();
    let host = lower
        .strip_prefix("ws://")
        .or_else(|| lower.strip_prefix("wss://"));
    match host {
        Some(rest) if !rest.is_empty() => Ok(()),
        _ => Err(ConfigError::InvalidUrl {
            key: key.to_string(),
            value: url.to_string(),
        }),
    }
}

/// Comma-separated symbols; blank entries between commas are skipped.
fn parse_symbols(raw: &str) -> Result<Vec<Symbol>, ConfigError> {
    let mut symbols = Vec::new();
    for part in raw.split(',').filter(|p| !p.trim().is_empty()) {
        let symbol = Symbol::new(part)?;
        if !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    Ok(symbols)
}

fn parse_env_u16<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: u16) -> u16 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_u32<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: u32) -> u32 {
    lookup(key)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn parse_env_f64<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str, default: f64) -> f64 {
    lookup(key)
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|v| v.is_finite() && *v >= 1.0)
        .unwrap_or(default)
}

fn parse_env_duration_secs<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_secs)
}

fn parse_env_duration_millis<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    key: &str,
    default: Duration,
) -> Duration {
    lookup(key)
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map_or(default, Duration::from_millis)
}
