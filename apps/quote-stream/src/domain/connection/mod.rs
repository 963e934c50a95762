//! Connection State
//!
//! The gateway connection state machine shared by the connection manager
//! and everything that observes it.

use serde::{Deserialize, Serialize};

/// State of the single gateway connection.
///
/// Exactly one value is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionState {
    /// No connection and no reconnect pending.
    #[default]
    Disconnected,
    /// Initial handshake in flight.
    Connecting,
    /// Handshake complete; frames are flowing.
    Connected,
    /// Connection lost; a reconnect is scheduled or in flight.
    Reconnecting,
    /// Last attempt failed, or the retry budget is exhausted.
    Error,
}

impl ConnectionState {
    /// Lower-case label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Error => "error",
        }
    }

    /// Whether frames can currently be sent.
    #[must_use]
    pub const fn is_connected(self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Whether the UI should offer a reconnect affordance.
    #[must_use]
    pub const fn needs_attention(self) -> bool {
        matches!(self, Self::Reconnecting | Self::Error)
    }

    /// Numeric code for the connection-state gauge.
    #[must_use]
    pub const fn as_gauge(self) -> f64 {
        match self {
            Self::Disconnected => 0.0,
            Self::Connecting => 1.0,
            Self::Connected => 2.0,
            Self::Reconnecting => 3.0,
            Self::Error => 4.0,
        }
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
