//! Connection Manager
//!
//! Owns the single gateway session and its state machine.
//!
//! `connect()` spawns one driver task that performs the handshake, pumps
//! inbound frames through the [`QuoteRouter`], sends keepalive pings and
//! reconnects with capped exponential backoff after any close the client did
//! not ask for. `disconnect()` cancels the driver, pending reconnect timer
//! included.
//!
//! # State publication
//!
//! Every transition is stored, pushed to a `watch` channel and emitted on the
//! bus as `StatusChanged`. Transitions and their events are serialized by a
//! re-entrant lock, so listeners observe them in the order they were stored
//! and may call back into the manager. A cancelled driver never changes
//! state or emits.
//!
//! # Lock order
//!
//! `publish` → `session` → registry. Listener callbacks never run under
//! `session` or the registry lock.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, ReentrantMutex};
use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_stream::wrappers::WatchStream;
use tokio_util::sync::CancellationToken;

use crate::application::events::{StreamError, StreamEvent};
use crate::application::ports::{Transport, TransportError, TransportFrame, TransportLink};
use crate::application::services::{ClientError, EventBus, QuoteRouter, SubscriptionRegistry};
use crate::domain::connection::ConnectionState;
use crate::infrastructure::config::ClientConfig;
use crate::infrastructure::gateway::ClientMessage;
use crate::infrastructure::gateway::reconnect::{ReconnectConfig, ReconnectPolicy};
use crate::infrastructure::metrics::{self, TransportErrorType};

// =============================================================================
// Settings
// =============================================================================

/// Connection lifecycle settings.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectionSettings {
    /// Gateway endpoint.
    pub url: String,
    /// Reconnect backoff and budget.
    pub reconnect: ReconnectConfig,
    /// Handshake timeout.
    pub connect_timeout: Duration,
    /// Keepalive interval, `None` to disable.
    pub ping_interval: Option<Duration>,
}

impl ConnectionSettings {
    /// Default settings for `url`.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            reconnect: ReconnectConfig::default(),
            connect_timeout: Duration::from_secs(10),
            ping_interval: Some(Duration::from_secs(30)),
        }
    }

    /// Build from client settings.
    #[must_use]
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            url: config.gateway_url.clone(),
            reconnect: ReconnectConfig::from_settings(config),
            connect_timeout: config.connect_timeout,
            ping_interval: config.keepalive(),
        }
    }
}

// =============================================================================
// Connection Manager
// =============================================================================

#[derive(Debug, Default)]
struct Session {
    state: ConnectionState,
    /// Present while a driver task is alive.
    driver: Option<CancellationToken>,
}

enum SessionEnd {
    Cancelled,
    Closed(Option<String>),
}

/// Gateway connection lifecycle.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    settings: ConnectionSettings,
    bus: Arc<EventBus>,
    registry: Arc<SubscriptionRegistry>,
    router: QuoteRouter,
    session: Mutex<Session>,
    publish: ReentrantMutex<()>,
    status_tx: watch::Sender<ConnectionState>,
}

impl std::fmt::Debug for ConnectionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionManager")
            .field("url", &self.settings.url)
            .field("state", &self.status())
            .finish_non_exhaustive()
    }
}

impl ConnectionManager {
    /// Create a disconnected manager.
    #[must_use]
    pub fn new(
        transport: Arc<dyn Transport>,
        settings: ConnectionSettings,
        bus: Arc<EventBus>,
        registry: Arc<SubscriptionRegistry>,
    ) -> Self {
        let (status_tx, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            settings,
            router: QuoteRouter::new(Arc::clone(&bus)),
            bus,
            registry,
            session: Mutex::new(Session::default()),
            publish: ReentrantMutex::new(()),
            status_tx,
        }
    }

    /// Start connecting. No-op while a driver is already running.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError::NoRuntime`] when called outside a tokio runtime.
    pub fn connect(self: &Arc<Self>) -> Result<(), ClientError> {
        let runtime = Handle::try_current().map_err(|_| ClientError::NoRuntime)?;

        let _ordered = self.publish.lock();
        let (token, changed) = {
            let mut session = self.session.lock();
            if session.driver.is_some() {
                tracing::debug!(state = %session.state, "Connect ignored, already running");
                return Ok(());
            }
            let token = CancellationToken::new();
            session.driver = Some(token.clone());
            let changed = session.state != ConnectionState::Connecting;
            session.state = ConnectionState::Connecting;
            (token, changed)
        };

        self.announce(ConnectionState::Connecting, changed);
        runtime.spawn(Arc::clone(self).drive(token));
        Ok(())
    }

    /// Stop the driver, cancel any pending reconnect and close the session.
    ///
    /// Subscription intent is kept for the next `connect()`.
    pub fn disconnect(&self) {
        let _ordered = self.publish.lock();
        let changed = {
            let mut session = self.session.lock();
            if let Some(token) = session.driver.take() {
                token.cancel();
            }
            self.registry.detach();
            let changed = session.state != ConnectionState::Disconnected;
            session.state = ConnectionState::Disconnected;
            changed
        };

        if changed {
            tracing::info!(url = %self.settings.url, "Disconnected from gateway");
            self.announce(ConnectionState::Disconnected, true);
            self.bus.emit(&StreamEvent::Disconnected {
                reason: Some("client requested disconnect".to_string()),
            });
        }
    }

    /// Current state.
    #[must_use]
    pub fn status(&self) -> ConnectionState {
        self.session.lock().state
    }

    /// Whether a driver task is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.session.lock().driver.is_some()
    }

    /// Receiver that always holds the latest state.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionState> {
        self.status_tx.subscribe()
    }

    /// State changes as a stream, starting with the current state.
    #[must_use]
    pub fn status_stream(&self) -> WatchStream<ConnectionState> {
        WatchStream::new(self.watch_status())
    }

    /// Lifecycle settings.
    #[must_use]
    pub const fn settings(&self) -> &ConnectionSettings {
        &self.settings
    }

    // -------------------------------------------------------------------------
    // Driver
    // -------------------------------------------------------------------------

    async fn drive(self: Arc<Self>, token: CancellationToken) {
        let mut policy = ReconnectPolicy::new(self.settings.reconnect.clone());

        loop {
            tracing::info!(url = %self.settings.url, "Connecting to gateway");
            let opened = tokio::select! {
                biased;
                () = token.cancelled() => return,
                opened = self.open() => opened,
            };

            match opened {
                Ok(link) => {
                    policy.reset();
                    match self.run_session(&token, link).await {
                        SessionEnd::Cancelled => return,
                        SessionEnd::Closed(reason) => {
                            if !self.session_closed(&token, reason) {
                                return;
                            }
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(url = %self.settings.url, error = %e, "Gateway handshake failed");
                    metrics::record_transport_error(match e {
                        TransportError::Handshake(_) => TransportErrorType::Handshake,
                        TransportError::Timeout(_) => TransportErrorType::Timeout,
                    });
                    if !self.transition(&token, ConnectionState::Error) {
                        return;
                    }
                    self.emit_live(&token, &StreamEvent::Error(StreamError::transport(e.to_string())));
                }
            }

            let Some(delay) = policy.next_delay() else {
                self.give_up(&token, policy.max_attempts());
                return;
            };
            let attempt = policy.attempt_count();
            tracing::info!(
                attempt,
                max_attempts = policy.max_attempts(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "Reconnecting to gateway"
            );
            metrics::record_reconnect();
            if !self.transition(&token, ConnectionState::Reconnecting) {
                return;
            }
            self.emit_live(&token, &StreamEvent::Reconnecting { attempt, delay });

            tokio::select! {
                biased;
                () = token.cancelled() => {
                    tracing::debug!("Reconnect timer cancelled");
                    return;
                }
                () = tokio::time::sleep(delay) => {}
            }
        }
    }

    async fn open(&self) -> Result<TransportLink, TransportError> {
        let timeout = self.settings.connect_timeout;
        tokio::time::timeout(timeout, self.transport.open(&self.settings.url))
            .await
            .unwrap_or(Err(TransportError::Timeout(timeout)))
    }

    async fn run_session(&self, token: &CancellationToken, link: TransportLink) -> SessionEnd {
        let TransportLink {
            outbound,
            mut inbound,
        } = link;

        let Some(reissued) = self.enter_connected(token, outbound) else {
            return SessionEnd::Cancelled;
        };
        tracing::info!(url = %self.settings.url, reissued, "Connected to gateway");

        let mut keepalive = self.settings.ping_interval.map(|period| {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            interval
        });

        loop {
            tokio::select! {
                biased;
                () = token.cancelled() => return SessionEnd::Cancelled,
                frame = inbound.recv() => match frame {
                    Some(TransportFrame::Message(text)) => {
                        self.router.route(&text);
                    }
                    Some(TransportFrame::Error(message)) => {
                        tracing::warn!(error = %message, "Gateway transport error");
                        metrics::record_transport_error(TransportErrorType::Session);
                        self.emit_live(token, &StreamEvent::Error(StreamError::transport(message)));
                    }
                    Some(TransportFrame::Closed { reason }) => return SessionEnd::Closed(reason),
                    None => return SessionEnd::Closed(None),
                },
                () = next_tick(keepalive.as_mut()) => {
                    if !self.registry.send(&ClientMessage::Ping) {
                        tracing::debug!("Keepalive skipped, no session attached");
                    }
                }
            }
        }
    }

    // -------------------------------------------------------------------------
    // Transitions
    // -------------------------------------------------------------------------

    /// Push `state` to watchers and, if it changed, to the bus.
    ///
    /// Callers hold `publish`.
    fn announce(&self, state: ConnectionState, changed: bool) {
        self.status_tx.send_replace(state);
        metrics::set_connection_state(state);
        if changed {
            self.bus.emit(&StreamEvent::StatusChanged(state));
        }
    }

    fn transition(&self, token: &CancellationToken, next: ConnectionState) -> bool {
        let _ordered = self.publish.lock();
        let changed = {
            let mut session = self.session.lock();
            if token.is_cancelled() {
                return false;
            }
            let changed = session.state != next;
            session.state = next;
            changed
        };
        self.announce(next, changed);
        true
    }

    fn emit_live(&self, token: &CancellationToken, event: &StreamEvent) -> bool {
        let _ordered = self.publish.lock();
        if token.is_cancelled() {
            return false;
        }
        self.bus.emit(event);
        true
    }

    /// Store `Connected`, announce it, then hand the session to the registry
    /// so active subscriptions are re-issued after the transition.
    fn enter_connected(
        &self,
        token: &CancellationToken,
        outbound: mpsc::UnboundedSender<String>,
    ) -> Option<usize> {
        if !self.transition(token, ConnectionState::Connected) {
            return None;
        }
        self.emit_live(token, &StreamEvent::Connected);

        let session = self.session.lock();
        if token.is_cancelled() {
            return None;
        }
        let reissued = self.registry.attach(outbound);
        drop(session);
        Some(reissued)
    }

    fn session_closed(&self, token: &CancellationToken, reason: Option<String>) -> bool {
        let _ordered = self.publish.lock();
        {
            let session = self.session.lock();
            if token.is_cancelled() {
                return false;
            }
            self.registry.detach();
            drop(session);
        }

        tracing::warn!(
            reason = reason.as_deref().unwrap_or("none"),
            "Gateway connection closed unexpectedly"
        );
        metrics::record_transport_error(TransportErrorType::UnexpectedClose);

        let message = reason.as_deref().map_or_else(
            || "connection closed unexpectedly".to_string(),
            |r| format!("connection closed unexpectedly: {r}"),
        );
        self.bus.emit(&StreamEvent::Disconnected { reason });
        self.bus.emit(&StreamEvent::Error(StreamError::transport(message)));
        true
    }

    fn give_up(&self, token: &CancellationToken, max_attempts: u32) {
        let _ordered = self.publish.lock();
        let changed = {
            let mut session = self.session.lock();
            if token.is_cancelled() {
                return;
            }
            session.driver = None;
            let changed = session.state != ConnectionState::Error;
            session.state = ConnectionState::Error;
            changed
        };

        tracing::error!(max_attempts, "Reconnect attempts exhausted, giving up");
        self.announce(ConnectionState::Error, changed);
        self.bus.emit(&StreamEvent::Error(StreamError::transport(format!(
            "gave up after {max_attempts} reconnect attempts"
        ))));
    }
}

async fn next_tick(interval: Option<&mut Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
