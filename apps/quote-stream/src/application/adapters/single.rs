//! Single-symbol adapter.
//!
//! Holds the latest quote for one symbol together with its receipt time and
//! the last error the gateway scoped to that symbol.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::application::events::{EventFilter, EventKind, StreamError, StreamEvent};
use crate::application::services::{ClientError, ListenerGuard, MarketDataClient, SymbolLease};
use crate::domain::streaming::{Quote, Symbol};

/// Point-in-time view of a [`SymbolQuoteAdapter`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SymbolQuoteSnapshot {
    /// Latest quote.
    pub quote: Option<Quote>,
    /// When the latest quote was received.
    pub last_update: Option<DateTime<Utc>>,
    /// Latest error scoped to the symbol. Cleared by the next quote.
    pub error: Option<StreamError>,
}

struct Attachment {
    _quotes: ListenerGuard,
    _errors: ListenerGuard,
    _lease: SymbolLease,
}

/// Live quote state for one symbol.
///
/// Active from construction until [`deactivate`](Self::deactivate) or drop;
/// both release the listeners and the subscription.
pub struct SymbolQuoteAdapter {
    client: MarketDataClient,
    symbol: Symbol,
    state: Arc<Mutex<SymbolQuoteSnapshot>>,
    attachment: Option<Attachment>,
}

impl std::fmt::Debug for SymbolQuoteAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SymbolQuoteAdapter")
            .field("symbol", &self.symbol)
            .field("active", &self.is_active())
            .finish_non_exhaustive()
    }
}

impl SymbolQuoteAdapter {
    /// Start tracking `symbol`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidSymbol`] for an empty identifier.
    pub fn activate(client: &MarketDataClient, symbol: impl AsRef<str>) -> Result<Self, ClientError> {
        let symbol = Symbol::new(symbol)?;
        let mut adapter = Self {
            client: client.clone(),
            symbol,
            state: Arc::default(),
            attachment: None,
        };
        adapter.attachment = Some(adapter.attach());
        Ok(adapter)
    }

    fn attach(&self) -> Attachment {
        let quotes = {
            let state = Arc::clone(&self.state);
            self.client.listen(
                EventFilter::for_symbol(EventKind::Quote, self.symbol.clone()),
                move |event| {
                    if let StreamEvent::Quote(quote) = event {
                        let mut state = state.lock();
                        state.quote = Some(quote.clone());
                        state.last_update = Some(Utc::now());
                        state.error = None;
                    }
                },
            )
        };
        let errors = {
            let state = Arc::clone(&self.state);
            self.client.listen(
                EventFilter::for_symbol(EventKind::Error, self.symbol.clone()),
                move |event| {
                    if let StreamEvent::Error(error) = event {
                        state.lock().error = Some(error.clone());
                    }
                },
            )
        };

        Attachment {
            _quotes: quotes,
            _errors: errors,
            _lease: self.client.acquire(self.symbol.clone()),
        }
    }

    /// Tracked symbol.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Latest quote.
    #[must_use]
    pub fn quote(&self) -> Option<Quote> {
        self.state.lock().quote.clone()
    }

    /// Receipt time of the latest quote.
    #[must_use]
    pub fn last_update(&self) -> Option<DateTime<Utc>> {
        self.state.lock().last_update
    }

    /// Latest error scoped to the symbol.
    #[must_use]
    pub fn error(&self) -> Option<StreamError> {
        self.state.lock().error.clone()
    }

    /// Everything at once.
    #[must_use]
    pub fn snapshot(&self) -> SymbolQuoteSnapshot {
        self.state.lock().clone()
    }

    /// Whether listeners and the subscription are held.
    #[must_use]
    pub const fn is_active(&self) -> bool {
        self.attachment.is_some()
    }

    /// Unsubscribe then subscribe again, clearing the error.
    ///
    /// Reactivates a deactivated adapter. The last quote is kept.
    pub fn resubscribe(&mut self) {
        tracing::debug!(symbol = %self.symbol, "Resubscribing");
        self.attachment = None;
        self.state.lock().error = None;
        self.attachment = Some(self.attach());
    }

    /// Remove the listeners and release the subscription.
    pub fn deactivate(&mut self) {
        self.attachment = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::ports::MockTransport;
    use crate::application::services::ConnectionSettings;
    use rust_decimal_macros::dec;
    use tokio::sync::mpsc;

    fn client() -> MarketDataClient {
        MarketDataClient::new(
            Arc::new(MockTransport::new()),
            ConnectionSettings::new("ws://gateway.test/ws"),
        )
    }

    fn quote(symbol: &str, price: rust_decimal::Decimal) -> StreamEvent {
        StreamEvent::Quote(Quote {
            symbol: Symbol::new(symbol).unwrap(),
            price,
            change: dec!(1.02),
            change_percent: dec!(0.54),
            open: price,
            high: price,
            low: price,
            volume: 100,
            timestamp: Utc::now(),
        })
    }

    #[test]
    fn tracks_own_symbol_only() {
        let client = client();
        let adapter = SymbolQuoteAdapter::activate(&client, "aapl").unwrap();

        client.bus().emit(&quote("MSFT", dec!(410)));
        assert!(adapter.quote().is_none());

        client.bus().emit(&quote("AAPL", dec!(190.12)));
        assert_eq!(adapter.quote().unwrap().price, dec!(190.12));
        assert!(adapter.last_update().is_some());
    }

    #[test]
    fn quote_clears_scoped_error() {
        let client = client();
        let adapter = SymbolQuoteAdapter::activate(&client, "AAPL").unwrap();
        let aapl = Symbol::new("AAPL").unwrap();

        client.bus().emit(&StreamEvent::Error(StreamError::transport("socket reset")));
        assert!(adapter.error().is_none());

        client
            .bus()
            .emit(&StreamEvent::Error(StreamError::subscription(aapl, "halted")));
        assert_eq!(adapter.error().unwrap().message, "halted");

        client.bus().emit(&quote("AAPL", dec!(1)));
        assert!(adapter.error().is_none());
    }

    #[test]
    fn deactivate_releases_everything() {
        let client = client();
        let aapl = Symbol::new("AAPL").unwrap();
        let mut adapter = SymbolQuoteAdapter::activate(&client, "AAPL").unwrap();
        assert_eq!(client.registry().reference_count(&aapl), 1);
        assert_eq!(client.bus().listener_count(), 2);

        adapter.deactivate();
        assert!(!adapter.is_active());
        assert_eq!(client.registry().reference_count(&aapl), 0);
        assert_eq!(client.bus().listener_count(), 0);

        client.bus().emit(&quote("AAPL", dec!(5)));
        assert!(adapter.quote().is_none());
    }

    #[test]
    fn drop_releases_everything() {
        let client = client();
        let aapl = Symbol::new("AAPL").unwrap();
        let adapter = SymbolQuoteAdapter::activate(&client, "AAPL").unwrap();
        drop(adapter);
        assert_eq!(client.registry().reference_count(&aapl), 0);
        assert_eq!(client.bus().listener_count(), 0);
    }

    #[test]
    fn resubscribe_cycles_wire_subscription() {
        let client = client();
        let (tx, mut rx) = mpsc::unbounded_channel();
        client.registry().attach(tx);

        let mut adapter = SymbolQuoteAdapter::activate(&client, "AAPL").unwrap();
        client.bus().emit(&StreamEvent::Error(StreamError::subscription(
            Symbol::new("AAPL").unwrap(),
            "not found",
        )));
        adapter.resubscribe();

        let sent: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(
            sent,
            vec![
                r#"{"op":"subscribe","symbol":"AAPL"}"#,
                r#"{"op":"unsubscribe","symbol":"AAPL"}"#,
                r#"{"op":"subscribe","symbol":"AAPL"}"#,
            ]
        );
        assert!(adapter.error().is_none());
        assert_eq!(client.bus().listener_count(), 2);
    }

    #[test]
    fn shared_symbol_keeps_single_wire_subscription() {
        let client = client();
        let (tx, mut rx) = mpsc::unbounded_channel();
        client.registry().attach(tx);

        let first = SymbolQuoteAdapter::activate(&client, "AAPL").unwrap();
        let second = SymbolQuoteAdapter::activate(&client, "aapl").unwrap();
        drop(first);

        client.bus().emit(&quote("AAPL", dec!(2)));
        assert!(second.quote().is_some());

        let sent: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        assert_eq!(sent, vec![r#"{"op":"subscribe","symbol":"AAPL"}"#]);
    }
}
