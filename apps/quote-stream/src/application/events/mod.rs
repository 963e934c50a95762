//! Stream Events
//!
//! The tagged union dispatched on the [`EventBus`](crate::application::services::EventBus).
//!
//! Every event has an [`EventKind`] used as the dispatch key. Listeners
//! register with an [`EventFilter`]: a kind, optionally narrowed to a single
//! symbol for targeted listening.

use std::time::Duration;

use crate::domain::connection::ConnectionState;
use crate::domain::streaming::{Quote, Symbol};

// =============================================================================
// Event Kind
// =============================================================================

/// Dispatch key for [`StreamEvent`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// New quote for a symbol.
    Quote,
    /// Gateway confirmed a subscribe.
    SubscriptionConfirmed,
    /// Gateway confirmed an unsubscribe.
    UnsubscriptionConfirmed,
    /// Gateway's view of this connection's subscriptions.
    CurrentSubscriptions,
    /// Market open/close status.
    MarketStatus,
    /// Snapshot of every simulated stock.
    AllStocks,
    /// Keepalive reply.
    Pong,
    /// Transport, protocol or subscription error.
    Error,
    /// Connection state transition.
    StatusChanged,
    /// Handshake completed.
    Connected,
    /// Session ended.
    Disconnected,
    /// Reconnect scheduled.
    Reconnecting,
}

impl EventKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Quote => "quote",
            Self::SubscriptionConfirmed => "subscription_confirmed",
            Self::UnsubscriptionConfirmed => "unsubscription_confirmed",
            Self::CurrentSubscriptions => "current_subscriptions",
            Self::MarketStatus => "market_status",
            Self::AllStocks => "all_stocks",
            Self::Pong => "pong",
            Self::Error => "error",
            Self::StatusChanged => "status_changed",
            Self::Connected => "connected",
            Self::Disconnected => "disconnected",
            Self::Reconnecting => "reconnecting",
        }
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Where a [`StreamError`] originated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamErrorKind {
    /// Handshake failure, abrupt close, retry budget exhausted.
    Transport,
    /// Malformed or unexpected inbound frame.
    Protocol,
    /// Gateway rejected a symbol.
    Subscription,
}

/// Error surfaced to consumers as an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamError {
    /// Error category.
    pub kind: StreamErrorKind,
    /// Symbol the error is scoped to, if any.
    pub symbol: Option<Symbol>,
    /// Human-readable cause.
    pub message: String,
}

impl StreamError {
    /// Transport error with no symbol scope.
    #[must_use]
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: StreamErrorKind::Transport,
            symbol: None,
            message: message.into(),
        }
    }

    /// Protocol error with no symbol scope.
    #[must_use]
    pub fn protocol(message: impl Into<String>) -> Self {
        Self {
            kind: StreamErrorKind::Protocol,
            symbol: None,
            message: message.into(),
        }
    }

    /// Subscription error scoped to `symbol`.
    #[must_use]
    pub fn subscription(symbol: Symbol, message: impl Into<String>) -> Self {
        Self {
            kind: StreamErrorKind::Subscription,
            symbol: Some(symbol),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for StreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.symbol {
            Some(symbol) => write!(f, "{symbol}: {}", self.message),
            None => f.write_str(&self.message),
        }
    }
}

// =============================================================================
// Stream Event
// =============================================================================

/// Everything the distribution layer publishes.
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// New quote.
    Quote(Quote),
    /// Gateway confirmed a subscribe.
    SubscriptionConfirmed {
        /// Confirmed symbol.
        symbol: Symbol,
    },
    /// Gateway confirmed an unsubscribe.
    UnsubscriptionConfirmed {
        /// Released symbol.
        symbol: Symbol,
    },
    /// Gateway's view of this connection's subscriptions.
    CurrentSubscriptions {
        /// Subscribed symbols as reported by the gateway.
        symbols: Vec<Symbol>,
    },
    /// Market status payload, passed through untouched.
    MarketStatus(serde_json::Value),
    /// Full-market snapshot, passed through untouched.
    AllStocks(serde_json::Value),
    /// Keepalive reply.
    Pong,
    /// Transport, protocol or subscription error.
    Error(StreamError),
    /// Connection state transition.
    StatusChanged(ConnectionState),
    /// Handshake completed.
    Connected,
    /// Session ended.
    Disconnected {
        /// Why the session ended, if known.
        reason: Option<String>,
    },
    /// Reconnect scheduled.
    Reconnecting {
        /// Attempt number, starting at 1.
        attempt: u32,
        /// Delay before the attempt.
        delay: Duration,
    },
}

impl StreamEvent {
    /// Dispatch key.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Quote(_) => EventKind::Quote,
            Self::SubscriptionConfirmed { .. } => EventKind::SubscriptionConfirmed,
            Self::UnsubscriptionConfirmed { .. } => EventKind::UnsubscriptionConfirmed,
            Self::CurrentSubscriptions { .. } => EventKind::CurrentSubscriptions,
            Self::MarketStatus(_) => EventKind::MarketStatus,
            Self::AllStocks(_) => EventKind::AllStocks,
            Self::Pong => EventKind::Pong,
            Self::Error(_) => EventKind::Error,
            Self::StatusChanged(_) => EventKind::StatusChanged,
            Self::Connected => EventKind::Connected,
            Self::Disconnected { .. } => EventKind::Disconnected,
            Self::Reconnecting { .. } => EventKind::Reconnecting,
        }
    }

    /// Symbol the event is about, if any.
    #[must_use]
    pub const fn symbol(&self) -> Option<&Symbol> {
        match self {
            Self::Quote(quote) => Some(&quote.symbol),
            Self::SubscriptionConfirmed { symbol } | Self::UnsubscriptionConfirmed { symbol } => {
                Some(symbol)
            }
            Self::Error(error) => error.symbol.as_ref(),
            _ => None,
        }
    }
}

// =============================================================================
// Event Filter
// =============================================================================

/// Which events a listener receives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventFilter {
    kind: EventKind,
    symbol: Option<Symbol>,
}

impl EventFilter {
    /// Every event of `kind`.
    #[must_use]
    pub const fn kind(kind: EventKind) -> Self {
        Self { kind, symbol: None }
    }

    /// Events of `kind` about `symbol` only.
    #[must_use]
    pub const fn for_symbol(kind: EventKind, symbol: Symbol) -> Self {
        Self {
            kind,
            symbol: Some(symbol),
        }
    }

    /// The kind this filter selects.
    #[must_use]
    pub const fn event_kind(&self) -> EventKind {
        self.kind
    }

    /// Whether `event` passes the filter.
    #[must_use]
    pub fn matches(&self, event: &StreamEvent) -> bool {
        if event.kind() != self.kind {
            return false;
        }
        match &self.symbol {
            Some(wanted) => event.symbol() == Some(wanted),
            None => true,
        }
    }
}

impl From<EventKind> for EventFilter {
    fn from(kind: EventKind) -> Self {
        Self::kind(kind)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;

    fn quote(symbol: &str) -> StreamEvent {
        StreamEvent::Quote(Quote {
            symbol: Symbol::new(symbol).unwrap(),
            price: Decimal::ONE,
            change: Decimal::ZERO,
            change_percent: Decimal::ZERO,
            open: Decimal::ONE,
            high: Decimal::ONE,
            low: Decimal::ONE,
            volume: 0,
            timestamp: Utc::now(),
        })
    }

    #[test]
    fn kind_filter_matches_every_symbol() {
        let filter = EventFilter::kind(EventKind::Quote);
        assert!(filter.matches(&quote("AAPL")));
        assert!(filter.matches(&quote("MSFT")));
        assert!(!filter.matches(&StreamEvent::Pong));
    }

    #[test]
    fn symbol_filter_matches_only_that_symbol() {
        let filter = EventFilter::for_symbol(EventKind::Quote, Symbol::new("AAPL").unwrap());
        assert!(filter.matches(&quote("aapl")));
        assert!(!filter.matches(&quote("MSFT")));
    }

    #[test]
    fn symbol_filter_skips_unscoped_errors() {
        let filter = EventFilter::for_symbol(EventKind::Error, Symbol::new("AAPL").unwrap());
        assert!(!filter.matches(&StreamEvent::Error(StreamError::transport("closed"))));
        assert!(filter.matches(&StreamEvent::Error(StreamError::subscription(
            Symbol::new("AAPL").unwrap(),
            "unknown symbol"
        ))));
    }

    #[test]
    fn stream_error_display() {
        let scoped = StreamError::subscription(Symbol::new("XYZ").unwrap(), "not found");
        assert_eq!(scoped.to_string(), "XYZ: not found");
        assert_eq!(StreamError::protocol("bad frame").to_string(), "bad frame");
    }

    #[test]
    fn event_kind_labels() {
        assert_eq!(EventKind::Quote.as_str(), "quote");
        assert_eq!(StreamEvent::Connected.kind(), EventKind::Connected);
        assert_eq!(
            StreamEvent::StatusChanged(ConnectionState::Error).kind().as_str(),
            "status_changed"
        );
    }
}
