//! Port Interfaces
//!
//! Defines the interfaces (ports) for external systems following
//! the Hexagonal Architecture pattern. These are the contracts that
//! infrastructure adapters must implement.
//!
//! ## Driven Ports (Outbound)
//!
//! - `Transport`: opens the persistent connection to the market-data gateway
//!
//! A successful `open` yields a [`TransportLink`]: an outbound text queue and
//! an inbound stream of [`TransportFrame`]s carrying the transport's
//! message, error and close lifecycle events in arrival order.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

/// Inbound transport lifecycle event after a successful handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportFrame {
    /// A text frame from the gateway.
    Message(String),
    /// A transport-level error. The link usually closes right after.
    Error(String),
    /// The connection closed.
    Closed {
        /// Close reason, if the peer sent one.
        reason: Option<String>,
    },
}

/// An established gateway session.
///
/// Dropping `outbound` asks the transport to close the connection.
#[derive(Debug)]
pub struct TransportLink {
    /// Text frames to send to the gateway.
    pub outbound: mpsc::UnboundedSender<String>,
    /// Frames received from the gateway, in arrival order.
    pub inbound: mpsc::UnboundedReceiver<TransportFrame>,
}

/// Errors raised while establishing a transport session.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// Handshake was refused or the endpoint was unreachable.
    #[error("handshake failed: {0}")]
    Handshake(String),

    /// Handshake did not complete in time.
    #[error("handshake timed out after {0:?}")]
    Timeout(Duration),
}

/// Opens sessions to the market-data gateway.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    /// Perform the handshake with `url` and return the live session.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the handshake fails.
    async fn open(&self, url: &str) -> Result<TransportLink, TransportError>;
}
