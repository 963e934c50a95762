//! Market Data Client
//!
//! The process-wide entry point consumers hold. Wires one [`EventBus`], one
//! [`SubscriptionRegistry`] and one [`ConnectionManager`] together and exposes
//! the three surfaces outside code needs: connection status, per-symbol
//! subscribe/unsubscribe, and listener registration.
//!
//! Cloning is cheap and every clone shares the same session.

use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;

use crate::application::events::{EventFilter, StreamEvent};
use crate::application::ports::Transport;
use crate::application::services::{
    ConnectionManager, ConnectionSettings, EventBus, ListenerGuard, ListenerId,
    SubscriptionRegistry,
};
use crate::domain::connection::ConnectionState;
use crate::domain::streaming::{Symbol, SymbolError};
use crate::infrastructure::config::ClientConfig;
use crate::infrastructure::gateway::ClientMessage;

/// Errors returned by client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    /// `connect()` was called outside a tokio runtime.
    #[error("no tokio runtime available to drive the connection")]
    NoRuntime,

    /// A symbol could not be normalized.
    #[error(transparent)]
    InvalidSymbol(#[from] SymbolError),
}

/// Shared handle to the market data distribution layer.
#[derive(Debug, Clone)]
pub struct MarketDataClient {
    bus: Arc<EventBus>,
    registry: Arc<SubscriptionRegistry>,
    connection: Arc<ConnectionManager>,
}

impl MarketDataClient {
    /// Create a disconnected client on top of `transport`.
    #[must_use]
    pub fn new(transport: Arc<dyn Transport>, settings: ConnectionSettings) -> Self {
        let bus = Arc::new(EventBus::new());
        let registry = Arc::new(SubscriptionRegistry::new());
        let connection = Arc::new(ConnectionManager::new(
            transport,
            settings,
            Arc::clone(&bus),
            Arc::clone(&registry),
        ));
        Self {
            bus,
            registry,
            connection,
        }
    }

    /// Create a client from environment-derived settings.
    #[must_use]
    pub fn from_config(transport: Arc<dyn Transport>, config: &ClientConfig) -> Self {
        Self::new(transport, ConnectionSettings::from_config(config))
    }

    // -------------------------------------------------------------------------
    // Connection
    // -------------------------------------------------------------------------

    /// Start connecting. No-op while already running.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NoRuntime`] outside a tokio runtime.
    pub fn connect(&self) -> Result<(), ClientError> {
        self.connection.connect()
    }

    /// Close the session and cancel any pending reconnect.
    pub fn disconnect(&self) {
        self.connection.disconnect();
    }

    /// Current connection state.
    #[must_use]
    pub fn connection_status(&self) -> ConnectionState {
        self.connection.status()
    }

    /// Whether the session is live.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connection_status().is_connected()
    }

    /// Receiver that always holds the latest state.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionState> {
        self.connection.watch_status()
    }

    /// State changes as a stream.
    #[must_use]
    pub fn status_stream(&self) -> WatchStream<ConnectionState> {
        self.connection.status_stream()
    }

    // -------------------------------------------------------------------------
    // Subscriptions
    // -------------------------------------------------------------------------

    /// Add one consumer for `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidSymbol`] for an empty identifier.
    pub fn subscribe_to_symbol(&self, symbol: impl AsRef<str>) -> Result<Symbol, ClientError> {
        let symbol = Symbol::new(symbol)?;
        self.registry.subscribe(&symbol);
        Ok(symbol)
    }

    /// Drop one consumer for `symbol`. Untracked symbols are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidSymbol`] for an empty identifier.
    pub fn unsubscribe_from_symbol(&self, symbol: impl AsRef<str>) -> Result<Symbol, ClientError> {
        let symbol = Symbol::new(symbol)?;
        self.registry.unsubscribe(&symbol);
        Ok(symbol)
    }

    /// Add one consumer for `symbol`, released when the lease drops.
    pub fn acquire(&self, symbol: Symbol) -> SymbolLease {
        self.registry.subscribe(&symbol);
        SymbolLease {
            registry: Arc::clone(&self.registry),
            symbol: Some(symbol),
        }
    }

    /// Ask the gateway which symbols this session is subscribed to.
    ///
    /// The answer arrives as a `CurrentSubscriptions` event. Returns `false`
    /// when not connected.
    pub fn request_subscriptions(&self) -> bool {
        self.registry.send(&ClientMessage::GetSubscriptions)
    }

    // -------------------------------------------------------------------------
    // Listeners
    // -------------------------------------------------------------------------

    /// Register a listener. See [`EventBus::on`].
    pub fn on<F>(&self, filter: impl Into<EventFilter>, listener: F) -> ListenerId
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.bus.on(filter, listener)
    }

    /// Unregister a listener.
    pub fn off(&self, id: ListenerId) -> bool {
        self.bus.off(id)
    }

    /// Register a listener removed when the guard drops.
    pub fn listen<F>(&self, filter: impl Into<EventFilter>, listener: F) -> ListenerGuard
    where
        F: Fn(&StreamEvent) + Send + Sync + 'static,
    {
        self.bus.subscribe(filter, listener)
    }

    /// The shared event bus.
    #[must_use]
    pub const fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// The shared subscription registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<SubscriptionRegistry> {
        &self.registry
    }
}

/// One reference on a symbol, released on drop.
#[derive(Debug)]
#[must_use = "the subscription is released when the lease is dropped"]
pub struct SymbolLease {
    registry: Arc<SubscriptionRegistry>,
    symbol: Option<Symbol>,
}

impl SymbolLease {
    /// The leased symbol.
    #[must_use]
    pub fn symbol(&self) -> Option<&Symbol> {
        self.symbol.as_ref()
    }

    /// Release now. Returns the remaining reference count.
    pub fn release(mut self) -> usize {
        self.release_inner()
    }

    fn release_inner(&mut self) -> usize {
        self.symbol
            .take()
            .map_or(0, |symbol| self.registry.unsubscribe(&symbol))
    }
}

impl Drop for SymbolLease {
    fn drop(&mut self) {
        self.release_inner();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::EventKind;
    use crate::application::ports::MockTransport;

    fn client() -> MarketDataClient {
        MarketDataClient::new(
            Arc::new(MockTransport::new()),
            ConnectionSettings::new("ws://gateway.test/ws"),
        )
    }

    #[test]
    fn subscribe_normalizes_and_counts() {
        let client = client();
        let symbol = client.subscribe_to_symbol(" aapl ").unwrap();
        client.subscribe_to_symbol("AAPL").unwrap();

        assert_eq!(symbol.as_str(), "AAPL");
        assert_eq!(client.registry().reference_count(&symbol), 2);

        client.unsubscribe_from_symbol("aapl").unwrap();
        assert_eq!(client.registry().reference_count(&symbol), 1);
    }

    #[test]
    fn empty_symbol_is_rejected() {
        let client = client();
        assert!(matches!(
            client.subscribe_to_symbol("  "),
            Err(ClientError::InvalidSymbol(_))
        ));
        assert_eq!(client.registry().stats().symbol_count, 0);
    }

    #[test]
    fn lease_releases_on_drop() {
        let client = client();
        let symbol = Symbol::new("MSFT").unwrap();

        let first = client.acquire(symbol.clone());
        let second = client.acquire(symbol.clone());
        assert_eq!(client.registry().reference_count(&symbol), 2);

        drop(first);
        assert_eq!(client.registry().reference_count(&symbol), 1);
        assert_eq!(second.release(), 0);
        assert!(client.registry().active_symbols().is_empty());
    }

    #[test]
    fn listen_guard_unregisters() {
        let client = client();
        let guard = client.listen(EventKind::Quote, |_| {});
        assert_eq!(client.bus().listener_count(), 1);
        drop(guard);
        assert_eq!(client.bus().listener_count(), 0);
    }

    #[test]
    fn request_subscriptions_needs_session() {
        let client = client();
        assert!(!client.request_subscriptions());
        assert_eq!(client.connection_status(), ConnectionState::Disconnected);
        assert!(!client.is_connected());
    }
}
