//! Multi-symbol adapter.
//!
//! Tracks a symbol set that changes over time. Each change is diffed against
//! the previous set so only added and removed symbols cause registry traffic.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::Mutex;

use crate::application::events::{EventKind, StreamError, StreamEvent};
use crate::application::services::{ClientError, ListenerGuard, MarketDataClient, SymbolLease};
use crate::domain::streaming::{Quote, Symbol};
use crate::domain::subscription::SubscriptionChanges;

#[derive(Debug, Default)]
struct MultiQuoteState {
    symbols: BTreeSet<Symbol>,
    quotes: BTreeMap<Symbol, Quote>,
    errors: Vec<StreamError>,
}

/// Live quote state for a changing set of symbols.
pub struct MultiQuoteAdapter {
    client: MarketDataClient,
    state: Arc<Mutex<MultiQuoteState>>,
    leases: BTreeMap<Symbol, SymbolLease>,
    listeners: Vec<ListenerGuard>,
}

impl std::fmt::Debug for MultiQuoteAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiQuoteAdapter")
            .field("symbols", &self.leases.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl MultiQuoteAdapter {
    /// Start tracking `symbols`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidSymbol`] if any symbol is empty; nothing
    /// is subscribed in that case.
    pub fn activate<I, S>(client: &MarketDataClient, symbols: I) -> Result<Self, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut adapter = Self {
            client: client.clone(),
            state: Arc::default(),
            leases: BTreeMap::new(),
            listeners: Vec::new(),
        };
        adapter.listeners = adapter.listen();
        adapter.set_symbols(symbols)?;
        Ok(adapter)
    }

    fn listen(&self) -> Vec<ListenerGuard> {
        let quotes = {
            let state = Arc::clone(&self.state);
            self.client.listen(EventKind::Quote, move |event| {
                if let StreamEvent::Quote(quote) = event {
                    let mut state = state.lock();
                    if state.symbols.contains(&quote.symbol) {
                        state.quotes.insert(quote.symbol.clone(), quote.clone());
                    }
                }
            })
        };
        let errors = {
            let state = Arc::clone(&self.state);
            self.client.listen(EventKind::Error, move |event| {
                if let StreamEvent::Error(error) = event {
                    let mut state = state.lock();
                    let relevant = error
                        .symbol
                        .as_ref()
                        .is_none_or(|symbol| state.symbols.contains(symbol));
                    if relevant {
                        state.errors.push(error.clone());
                    }
                }
            })
        };
        vec![quotes, errors]
    }

    /// Replace the tracked set.
    ///
    /// Symbols in both the old and new set are left untouched. Quotes for
    /// removed symbols are discarded. Returns the applied difference.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::InvalidSymbol`] if any symbol is empty; the
    /// tracked set is unchanged in that case.
    pub fn set_symbols<I, S>(&mut self, symbols: I) -> Result<SubscriptionChanges, ClientError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let desired = symbols
            .into_iter()
            .map(Symbol::new)
            .collect::<Result<BTreeSet<_>, _>>()?;
        let previous: BTreeSet<Symbol> = self.leases.keys().cloned().collect();
        let changes = SubscriptionChanges::between(&previous, &desired);
        if changes.is_empty() {
            return Ok(changes);
        }

        {
            let mut state = self.state.lock();
            for symbol in &changes.unsubscribe {
                state.quotes.remove(symbol);
            }
            state.symbols.clone_from(&desired);
        }
        for symbol in &changes.unsubscribe {
            self.leases.remove(symbol);
        }
        for symbol in &changes.subscribe {
            self.leases
                .insert(symbol.clone(), self.client.acquire(symbol.clone()));
        }

        tracing::debug!(
            added = changes.subscribe.len(),
            removed = changes.unsubscribe.len(),
            "Symbol set changed"
        );
        Ok(changes)
    }

    /// Tracked symbols, sorted.
    #[must_use]
    pub fn symbols(&self) -> Vec<Symbol> {
        self.leases.keys().cloned().collect()
    }

    /// Latest quote for `symbol`.
    #[must_use]
    pub fn quote(&self, symbol: &Symbol) -> Option<Quote> {
        self.state.lock().quotes.get(symbol).cloned()
    }

    /// Latest quote for every symbol that has one.
    #[must_use]
    pub fn quotes(&self) -> BTreeMap<Symbol, Quote> {
        self.state.lock().quotes.clone()
    }

    /// Errors collected since the last [`clear_errors`](Self::clear_errors).
    #[must_use]
    pub fn errors(&self) -> Vec<StreamError> {
        self.state.lock().errors.clone()
    }

    /// Forget collected errors.
    pub fn clear_errors(&self) {
        self.state.lock().errors.clear();
    }

    /// Unsubscribe every tracked symbol, then subscribe them again.
    pub fn resubscribe_all(&mut self) {
        let symbols = self.symbols();
        self.leases.clear();
        self.clear_errors();
        for symbol in symbols {
            self.leases
                .insert(symbol.clone(), self.client.acquire(symbol));
        }
    }

    /// Release every subscription and listener.
    pub fn deactivate(&mut self) {
        self.listeners.clear();
        self.leases.clear();
        self.state.lock().symbols.clear();
    }
}
