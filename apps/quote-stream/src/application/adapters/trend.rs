//! Rolling-change adapter.
//!
//! Folds one symbol's quote stream into a trailing price history and the
//! values derived from it: direction, tick-to-tick change and windowed delta.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rust_decimal::Decimal;

use crate::application::events::{EventFilter, EventKind, StreamEvent};
use crate::application::services::{ClientError, ListenerGuard, MarketDataClient, SymbolLease};
use crate::domain::history::{PriceChange, PriceHistory, PriceHistoryPoint};
use crate::domain::streaming::{PriceDirection, Quote, Symbol};

/// Derived trend state for one symbol.
#[derive(Debug, Clone, Default)]
pub struct TrendState {
    history: PriceHistory,
    current_price: Option<Decimal>,
    previous_price: Option<Decimal>,
    change: PriceChange,
}

impl TrendState {
    /// Empty state retaining `window` of history.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            history: PriceHistory::new(window),
            ..Self::default()
        }
    }

    /// Fold in the next quote.
    pub fn apply(&mut self, quote: &Quote) {
        self.change = self
            .current_price
            .map(|previous| PriceChange::between(previous, quote.price))
            .unwrap_or_default();
        self.previous_price = self.current_price.replace(quote.price);
        self.history.push(PriceHistoryPoint::from(quote));
    }

    /// Direction from the sign of the latest reported change.
    #[must_use]
    pub fn direction(&self) -> PriceDirection {
        self.history.direction()
    }

    /// Latest price.
    #[must_use]
    pub const fn current_price(&self) -> Option<Decimal> {
        self.current_price
    }

    /// Price before the latest.
    #[must_use]
    pub const fn previous_price(&self) -> Option<Decimal> {
        self.previous_price
    }

    /// Change between the previous and the latest price.
    #[must_use]
    pub const fn price_change(&self) -> PriceChange {
        self.change
    }

    /// Price movement over the trailing `sub_window`.
    #[must_use]
    pub fn windowed_delta(&self, sub_window: Duration) -> Decimal {
        self.history.windowed_delta(sub_window)
    }

    /// Retained history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<PriceHistoryPoint> {
        self.history.points().copied().collect()
    }

    /// Forget everything.
    pub fn reset(&mut self) {
        self.history.clear();
        self.current_price = None;
        self.previous_price = None;
        self.change = PriceChange::default();
    }
}

/// Live trend state for one symbol.
pub struct PriceTrendAdapter {
    symbol: Symbol,
    state: Arc<Mutex<TrendState>>,
    attachment: Option<(ListenerGuard, SymbolLease)>,
}

impl std::fmt::Debug for PriceTrendAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PriceTrendAdapter")
            .field("symbol", &self.symbol)
            .field("active", &self.attachment.is_some())
            .finish_non_exhaustive()
    }
}

impl PriceTrendAdapter {
    /// Start tracking `symbol`, keeping `window` of history.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidSymbol`] for an empty identifier.
    pub fn activate(
        client: &MarketDataClient,
        symbol: impl AsRef<str>,
        window: Duration,
    ) -> Result<Self, ClientError> {
        let symbol = Symbol::new(symbol)?;
        let state = Arc::new(Mutex::new(TrendState::new(window)));

        let listener = {
            let state = Arc::clone(&state);
            client.listen(
                EventFilter::for_symbol(EventKind::Quote, symbol.clone()),
                move |event| {
                    if let StreamEvent::Quote(quote) = event {
                        state.lock().apply(quote);
                    }
                },
            )
        };
        let lease = client.acquire(symbol.clone());

        Ok(Self {
            symbol,
            state,
            attachment: Some((listener, lease)),
        })
    }

    /// Tracked symbol.
    #[must_use]
    pub const fn symbol(&self) -> &Symbol {
        &self.symbol
    }

    /// Direction of the latest change.
    #[must_use]
    pub fn direction(&self) -> PriceDirection {
        self.state.lock().direction()
    }

    /// Latest price.
    #[must_use]
    pub fn current_price(&self) -> Option<Decimal> {
        self.state.lock().current_price()
    }

    /// Price before the latest.
    #[must_use]
    pub fn previous_price(&self) -> Option<Decimal> {
        self.state.lock().previous_price()
    }

    /// Tick-to-tick change.
    #[must_use]
    pub fn price_change(&self) -> PriceChange {
        self.state.lock().price_change()
    }

    /// Price movement over the trailing `sub_window`.
    #[must_use]
    pub fn windowed_delta(&self, sub_window: Duration) -> Decimal {
        self.state.lock().windowed_delta(sub_window)
    }

    /// Retained history, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<PriceHistoryPoint> {
        self.state.lock().history()
    }

    /// Copy of the full derived state.
    #[must_use]
    pub fn snapshot(&self) -> TrendState {
        self.state.lock().clone()
    }

    /// Release the listener and the subscription.
    pub fn deactivate(&mut self) {
        self.attachment = None;
    }
}
