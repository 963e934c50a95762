//! Subscription Registry
//!
//! Reference-counts the symbols local consumers want and turns count
//! transitions into gateway traffic:
//! - `subscribe` goes out only on 0→1, `unsubscribe` only on 1→0
//! - while no session is attached nothing is sent; intent is kept
//! - attaching a new session re-sends `subscribe` for every active symbol
//!
//! The table and the outbound session share one lock, so a subscribe racing
//! a reconnect is sent exactly once: either by `subscribe` itself or by the
//! re-issue in `attach`, never both.

use parking_lot::Mutex;
use tokio::sync::mpsc;

use crate::domain::streaming::Symbol;
use crate::domain::subscription::{SubscriptionEntry, SubscriptionTable};
use crate::infrastructure::gateway::{ClientMessage, JsonCodec};
use crate::infrastructure::metrics;

/// Registry totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RegistryStats {
    /// Distinct symbols with at least one consumer.
    pub symbol_count: usize,
    /// Sum of all reference counts.
    pub total_references: usize,
    /// Wire `subscribe` messages sent.
    pub subscribes_sent: u64,
    /// Wire `unsubscribe` messages sent.
    pub unsubscribes_sent: u64,
    /// Whether a live session is attached.
    pub attached: bool,
}

#[derive(Default)]
struct RegistryState {
    table: SubscriptionTable,
    outbound: Option<mpsc::UnboundedSender<String>>,
    subscribes_sent: u64,
    unsubscribes_sent: u64,
}

impl RegistryState {
    /// Encode and queue `message` on the attached session.
    ///
    /// Returns `false` when detached or the session has gone away.
    fn send(&mut self, codec: &JsonCodec, message: &ClientMessage) -> bool {
        let Some(outbound) = &self.outbound else {
            return false;
        };

        let text = match codec.encode(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(op = message.op(), error = %e, "Failed to encode gateway message");
                return false;
            }
        };

        if outbound.send(text).is_err() {
            tracing::debug!(op = message.op(), "Session closed before send, detaching");
            self.outbound = None;
            return false;
        }

        metrics::record_message_sent(message.op());
        match message {
            ClientMessage::Subscribe { .. } => self.subscribes_sent += 1,
            ClientMessage::Unsubscribe { .. } => self.unsubscribes_sent += 1,
            ClientMessage::Ping | ClientMessage::GetSubscriptions => {}
        }
        true
    }
}

/// Process-wide symbol multiplexer.
#[derive(Default)]
pub struct SubscriptionRegistry {
    state: Mutex<RegistryState>,
    codec: JsonCodec,
}

impl std::fmt::Debug for SubscriptionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRegistry")
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl SubscriptionRegistry {
    /// Create an empty, detached registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one consumer for `symbol`. Returns the new reference count.
    pub fn subscribe(&self, symbol: &Symbol) -> usize {
        let mut state = self.state.lock();
        if state.table.acquire(symbol) {
            let sent = state.send(
                &self.codec,
                &ClientMessage::Subscribe {
                    symbol: symbol.clone(),
                },
            );
            tracing::debug!(symbol = %symbol, sent, "Subscribed");
            metrics::set_active_symbols(state.table.symbol_count());
        }
        state.table.reference_count(symbol)
    }

    /// Drop one consumer for `symbol`. Returns the remaining reference count.
    ///
    /// Untracked symbols are ignored.
    pub fn unsubscribe(&self, symbol: &Symbol) -> usize {
        let mut state = self.state.lock();
        if state.table.release(symbol) {
            let sent = state.send(
                &self.codec,
                &ClientMessage::Unsubscribe {
                    symbol: symbol.clone(),
                },
            );
            tracing::debug!(symbol = %symbol, sent, "Unsubscribed");
            metrics::set_active_symbols(state.table.symbol_count());
        }
        state.table.reference_count(symbol)
    }

    /// Attach a live session and re-send every active subscription.
    ///
    /// Returns the number of symbols re-issued.
    pub fn attach(&self, outbound: mpsc::UnboundedSender<String>) -> usize {
        let mut state = self.state.lock();
        state.outbound = Some(outbound);

        let mut reissued = 0;
        for symbol in state.table.active_symbols() {
            if state.send(&self.codec, &ClientMessage::Subscribe { symbol }) {
                reissued += 1;
            }
        }
        if reissued > 0 {
            tracing::info!(count = reissued, "Re-issued subscriptions");
        }
        reissued
    }

    /// Forget the current session. Subscription intent is kept.
    pub fn detach(&self) {
        self.state.lock().outbound = None;
    }

    /// Whether a live session is attached.
    #[must_use]
    pub fn is_attached(&self) -> bool {
        self.state.lock().outbound.is_some()
    }

    /// Send a control message on the attached session.
    ///
    /// Returns `false` if no session is attached.
    pub fn send(&self, message: &ClientMessage) -> bool {
        self.state.lock().send(&self.codec, message)
    }

    /// Current reference count for `symbol` (0 if untracked).
    #[must_use]
    pub fn reference_count(&self, symbol: &Symbol) -> usize {
        self.state.lock().table.reference_count(symbol)
    }

    /// Symbols with at least one consumer, sorted.
    #[must_use]
    pub fn active_symbols(&self) -> Vec<Symbol> {
        self.state.lock().table.active_symbols()
    }

    /// Every tracked entry with its reference count.
    #[must_use]
    pub fn entries(&self) -> Vec<SubscriptionEntry> {
        self.state.lock().table.entries()
    }

    /// Registry totals.
    #[must_use]
    pub fn stats(&self) -> RegistryStats {
        let state = self.state.lock();
        RegistryStats {
            symbol_count: state.table.symbol_count(),
            total_references: state.table.total_references(),
            subscribes_sent: state.subscribes_sent,
            unsubscribes_sent: state.unsubscribes_sent,
            attached: state.outbound.is_some(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sym(s: &str) -> Symbol {
        Symbol::new(s).unwrap()
    }

    fn drain(rx: &mut mpsc::UnboundedReceiver<String>) -> Vec<String> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    #[test]
    fn first_subscribe_sends_once() {
        let registry = SubscriptionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.attach(tx);

        assert_eq!(registry.subscribe(&sym("aapl")), 1);
        assert_eq!(registry.subscribe(&sym("AAPL")), 2);

        assert_eq!(drain(&mut rx), vec![r#"{"op":"subscribe","symbol":"AAPL"}"#]);
    }

    #[test]
    fn last_unsubscribe_sends_once() {
        let registry = SubscriptionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.attach(tx);

        registry.subscribe(&sym("AAPL"));
        registry.subscribe(&sym("AAPL"));
        drain(&mut rx);

        assert_eq!(registry.unsubscribe(&sym("AAPL")), 1);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(registry.unsubscribe(&sym("AAPL")), 0);
        assert_eq!(drain(&mut rx), vec![r#"{"op":"unsubscribe","symbol":"AAPL"}"#]);
    }

    #[test]
    fn unsubscribe_untracked_is_noop() {
        let registry = SubscriptionRegistry::new();
        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.attach(tx);

        assert_eq!(registry.unsubscribe(&sym("NOPE")), 0);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(registry.stats().unsubscribes_sent, 0);
    }

    #[test]
    fn detached_subscribe_is_deferred_until_attach() {
        let registry = SubscriptionRegistry::new();
        registry.subscribe(&sym("MSFT"));
        registry.subscribe(&sym("AAPL"));
        assert_eq!(registry.stats().subscribes_sent, 0);

        let (tx, mut rx) = mpsc::unbounded_channel();
        assert_eq!(registry.attach(tx), 2);
        assert_eq!(
            drain(&mut rx),
            vec![
                r#"{"op":"subscribe","symbol":"AAPL"}"#,
                r#"{"op":"subscribe","symbol":"MSFT"}"#,
            ]
        );
    }

    #[test]
    fn detach_keeps_intent() {
        let registry = SubscriptionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.attach(tx);
        registry.subscribe(&sym("AAPL"));

        registry.detach();
        assert!(!registry.is_attached());
        assert_eq!(registry.active_symbols(), vec![sym("AAPL")]);
        assert_eq!(registry.reference_count(&sym("AAPL")), 1);
    }

    #[test]
    fn closed_session_detaches_on_send() {
        let registry = SubscriptionRegistry::new();
        let (tx, rx) = mpsc::unbounded_channel();
        registry.attach(tx);
        drop(rx);

        registry.subscribe(&sym("AAPL"));
        assert!(!registry.is_attached());
        assert_eq!(registry.stats().subscribes_sent, 0);
    }

    #[test]
    fn control_messages_need_a_session() {
        let registry = SubscriptionRegistry::new();
        assert!(!registry.send(&ClientMessage::Ping));

        let (tx, mut rx) = mpsc::unbounded_channel();
        registry.attach(tx);
        assert!(registry.send(&ClientMessage::GetSubscriptions));
        assert_eq!(drain(&mut rx), vec![r#"{"op":"get_subscriptions"}"#]);
    }

    #[test]
    fn stats_track_traffic() {
        let registry = SubscriptionRegistry::new();
        let (tx, _rx) = mpsc::unbounded_channel();
        registry.attach(tx);

        registry.subscribe(&sym("AAPL"));
        registry.subscribe(&sym("AAPL"));
        registry.subscribe(&sym("TSLA"));
        registry.unsubscribe(&sym("TSLA"));

        let stats = registry.stats();
        assert_eq!(stats.symbol_count, 1);
        assert_eq!(stats.total_references, 2);
        assert_eq!(stats.subscribes_sent, 2);
        assert_eq!(stats.unsubscribes_sent, 1);
        assert!(stats.attached);
        assert_eq!(registry.entries()[0].reference_count, 2);
    }
}
