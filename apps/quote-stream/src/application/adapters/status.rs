//! Connection-status adapter.
//!
//! Exposes the connection state with connect/disconnect passthroughs and
//! keeps a running account of lifecycle events: a reconnect-attempt counter
//! that only ever grows, a bounded timestamped history and event totals.

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::sync::watch;

use crate::application::events::{EventKind, StreamEvent};
use crate::application::services::{ClientError, ListenerGuard, MarketDataClient};
use crate::domain::connection::ConnectionState;

/// Default number of history records kept.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Lifecycle event kept in the history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusEvent {
    /// Session established.
    Connected,
    /// Session ended.
    Disconnected {
        /// Reason, if known.
        reason: Option<String>,
    },
    /// Error reported on the bus.
    Error {
        /// Error text.
        message: String,
    },
}

/// Timestamped history entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusRecord {
    /// What happened.
    pub event: StatusEvent,
    /// When it was observed.
    pub at: DateTime<Utc>,
}

/// Totals of observed lifecycle events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Sessions established.
    pub connections: u64,
    /// Sessions ended.
    pub disconnections: u64,
    /// Errors reported.
    pub errors: u64,
    /// Reconnects scheduled.
    pub reconnect_attempts: u64,
}

#[derive(Debug)]
struct MonitorState {
    stats: ConnectionStats,
    history: VecDeque<StatusRecord>,
    capacity: usize,
}

impl MonitorState {
    fn record(&mut self, event: StatusEvent) {
        if self.capacity == 0 {
            return;
        }
        if self.history.len() == self.capacity {
            self.history.pop_front();
        }
        self.history.push_back(StatusRecord {
            event,
            at: Utc::now(),
        });
    }

    fn observe(&mut self, event: &StreamEvent) {
        match event {
            StreamEvent::Connected => {
                self.stats.connections += 1;
                self.record(StatusEvent::Connected);
            }
            StreamEvent::Disconnected { reason } => {
                self.stats.disconnections += 1;
                self.record(StatusEvent::Disconnected {
                    reason: reason.clone(),
                });
            }
            StreamEvent::Error(error) => {
                self.stats.errors += 1;
                self.record(StatusEvent::Error {
                    message: error.to_string(),
                });
            }
            StreamEvent::Reconnecting { .. } => self.stats.reconnect_attempts += 1,
            _ => {}
        }
    }
}

/// Connection state and lifecycle bookkeeping for one consumer.
pub struct ConnectionStatusAdapter {
    client: MarketDataClient,
    state: Arc<Mutex<MonitorState>>,
    _listeners: Vec<ListenerGuard>,
}

impl std::fmt::Debug for ConnectionStatusAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionStatusAdapter")
            .field("status", &self.status())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

impl ConnectionStatusAdapter {
    /// Start observing with the default history capacity.
    #[must_use]
    pub fn activate(client: &MarketDataClient) -> Self {
        Self::with_capacity(client, DEFAULT_HISTORY_CAPACITY)
    }

    /// Start observing, keeping at most `capacity` history records.
    #[must_use]
    pub fn with_capacity(client: &MarketDataClient, capacity: usize) -> Self {
        let state = Arc::new(Mutex::new(MonitorState {
            stats: ConnectionStats::default(),
            history: VecDeque::with_capacity(capacity.min(DEFAULT_HISTORY_CAPACITY)),
            capacity,
        }));

        let listeners = [
            EventKind::Connected,
            EventKind::Disconnected,
            EventKind::Error,
            EventKind::Reconnecting,
        ]
        .into_iter()
        .map(|kind| {
            let state = Arc::clone(&state);
            client.listen(kind, move |event| state.lock().observe(event))
        })
        .collect();

        Self {
            client: client.clone(),
            state,
            _listeners: listeners,
        }
    }

    /// Current connection state.
    #[must_use]
    pub fn status(&self) -> ConnectionState {
        self.client.connection_status()
    }

    /// Whether the session is live.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.status().is_connected()
    }

    /// Receiver that always holds the latest state.
    #[must_use]
    pub fn watch(&self) -> watch::Receiver<ConnectionState> {
        self.client.watch_status()
    }

    /// Reconnects observed since activation. Never decreases.
    #[must_use]
    pub fn reconnect_attempts(&self) -> u64 {
        self.state.lock().stats.reconnect_attempts
    }

    /// Event totals.
    #[must_use]
    pub fn stats(&self) -> ConnectionStats {
        self.state.lock().stats
    }

    /// History records, oldest first.
    #[must_use]
    pub fn history(&self) -> Vec<StatusRecord> {
        self.state.lock().history.iter().cloned().collect()
    }

    /// Drop the history. Totals are kept.
    pub fn clear_history(&self) {
        self.state.lock().history.clear();
    }

    /// See [`MarketDataClient::connect`].
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NoRuntime`] outside a tokio runtime.
    pub fn connect(&self) -> Result<(), ClientError> {
        self.client.connect()
    }

    /// See [`MarketDataClient::disconnect`].
    pub fn disconnect(&self) {
        self.client.disconnect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::events::StreamError;
    use crate::application::ports::MockTransport;
    use crate::application::services::ConnectionSettings;
    use std::time::Duration;

    fn client() -> MarketDataClient {
        MarketDataClient::new(
            Arc::new(MockTransport::new()),
            ConnectionSettings::new("ws://gateway.test/ws"),
        )
    }

    #[test]
    fn counts_lifecycle_events() {
        let client = client();
        let adapter = ConnectionStatusAdapter::activate(&client);
        let bus = client.bus();

        bus.emit(&StreamEvent::Connected);
        bus.emit(&StreamEvent::Disconnected {
            reason: Some("going away".to_string()),
        });
        bus.emit(&StreamEvent::Error(StreamError::transport("connection closed unexpectedly")));
        for attempt in 1..=3 {
            bus.emit(&StreamEvent::Reconnecting {
                attempt,
                delay: Duration::from_secs(3),
            });
        }
        bus.emit(&StreamEvent::Connected);

        assert_eq!(
            adapter.stats(),
            ConnectionStats {
                connections: 2,
                disconnections: 1,
                errors: 1,
                reconnect_attempts: 3,
            }
        );
        let events: Vec<_> = adapter.history().into_iter().map(|r| r.event).collect();
        assert_eq!(
            events,
            vec![
                StatusEvent::Connected,
                StatusEvent::Disconnected {
                    reason: Some("going away".to_string())
                },
                StatusEvent::Error {
                    message: "connection closed unexpectedly".to_string()
                },
                StatusEvent::Connected,
            ]
        );
    }

    #[test]
    fn reconnect_counter_survives_success() {
        let client = client();
        let adapter = ConnectionStatusAdapter::activate(&client);

        client.bus().emit(&StreamEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_secs(3),
        });
        client.bus().emit(&StreamEvent::Connected);
        client.bus().emit(&StreamEvent::Reconnecting {
            attempt: 1,
            delay: Duration::from_secs(3),
        });

        assert_eq!(adapter.reconnect_attempts(), 2);
    }

    #[test]
    fn history_is_bounded() {
        let client = client();
        let adapter = ConnectionStatusAdapter::with_capacity(&client, 2);
        for _ in 0..5 {
            client.bus().emit(&StreamEvent::Connected);
        }
        assert_eq!(adapter.history().len(), 2);
        assert_eq!(adapter.stats().connections, 5);

        adapter.clear_history();
        assert!(adapter.history().is_empty());
        assert_eq!(adapter.stats().connections, 5);
    }

    #[test]
    fn status_reads_through_to_client() {
        let client = client();
        let adapter = ConnectionStatusAdapter::activate(&client);
        assert_eq!(adapter.status(), ConnectionState::Disconnected);
        assert_eq!(*adapter.watch().borrow(), ConnectionState::Disconnected);

        adapter.disconnect();
        assert!(!adapter.is_connected());
    }

    #[test]
    fn drop_removes_listeners() {
        let client = client();
        let adapter = ConnectionStatusAdapter::activate(&client);
        assert_eq!(client.bus().listener_count(), 4);
        drop(adapter);
        assert_eq!(client.bus().listener_count(), 0);
    }
}
