//! Shared fixtures for integration tests.

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc;

use quote_stream::{
    ConnectionSettings, EventKind, MarketDataClient, ReconnectConfig, StreamEvent, Transport,
    TransportError, TransportFrame, TransportLink,
};

pub const GATEWAY_URL: &str = "ws://gateway.test/ws";

/// How the fake answers the next handshakes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handshake {
    Accept,
    Refuse,
    Stall,
}

struct Session {
    sent: Vec<String>,
    outbound: mpsc::UnboundedReceiver<String>,
    inbound: mpsc::UnboundedSender<TransportFrame>,
}

#[derive(Default)]
struct GatewayState {
    script: Vec<Handshake>,
    fallback: Option<Handshake>,
    attempts: usize,
    sessions: Vec<Session>,
}

/// In-memory gateway. Accepts every handshake unless scripted otherwise.
#[derive(Clone, Default)]
pub struct FakeGateway {
    state: Arc<Mutex<GatewayState>>,
}

impl FakeGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer the next handshakes in order, then fall back to the default.
    pub fn script(&self, answers: impl IntoIterator<Item = Handshake>) {
        let mut state = self.state.lock();
        state.script = answers.into_iter().collect();
        state.script.reverse();
    }

    /// Answer every unscripted handshake this way.
    pub fn always(&self, answer: Handshake) {
        self.state.lock().fallback = Some(answer);
    }

    /// Handshakes attempted so far.
    pub fn attempts(&self) -> usize {
        self.state.lock().attempts
    }

    /// Sessions accepted so far.
    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    /// Everything the client sent on session `index`.
    pub fn sent(&self, index: usize) -> Vec<String> {
        let mut state = self.state.lock();
        let session = &mut state.sessions[index];
        while let Ok(text) = session.outbound.try_recv() {
            session.sent.push(text);
        }
        session.sent.clone()
    }

    /// Forget what was sent on session `index` so far.
    pub fn clear_sent(&self, index: usize) {
        self.sent(index);
        self.state.lock().sessions[index].sent.clear();
    }

    /// Deliver a text frame on session `index`.
    pub fn push(&self, index: usize, text: &str) {
        self.frame(index, TransportFrame::Message(text.to_string()));
    }

    /// Deliver any frame on session `index`.
    pub fn frame(&self, index: usize, frame: TransportFrame) {
        let _ = self.state.lock().sessions[index].inbound.send(frame);
    }

    /// Close session `index` from the gateway side.
    pub fn close(&self, index: usize, reason: Option<&str>) {
        self.frame(
            index,
            TransportFrame::Closed {
                reason: reason.map(str::to_string),
            },
        );
    }

    /// Whether the client let go of session `index`.
    pub fn released(&self, index: usize) -> bool {
        self.state.lock().sessions[index].inbound.is_closed()
    }
}

#[async_trait]
impl Transport for FakeGateway {
    async fn open(&self, _url: &str) -> Result<TransportLink, TransportError> {
        let answer = {
            let mut state = self.state.lock();
            state.attempts += 1;
            state
                .script
                .pop()
                .or(state.fallback)
                .unwrap_or(Handshake::Accept)
        };

        match answer {
            Handshake::Accept => {
                let (outbound, outbound_rx) = mpsc::unbounded_channel();
                let (inbound_tx, inbound) = mpsc::unbounded_channel();
                self.state.lock().sessions.push(Session {
                    sent: Vec::new(),
                    outbound: outbound_rx,
                    inbound: inbound_tx,
                });
                Ok(TransportLink { outbound, inbound })
            }
            Handshake::Refuse => Err(TransportError::Handshake("connection refused".to_string())),
            Handshake::Stall => std::future::pending().await,
        }
    }
}

/// Settings with deterministic backoff and no keepalive.
pub fn settings() -> ConnectionSettings {
    ConnectionSettings {
        reconnect: ReconnectConfig {
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            ..ReconnectConfig::default()
        }
        .without_jitter(),
        ping_interval: None,
        ..ConnectionSettings::new(GATEWAY_URL)
    }
}

pub fn client(gateway: &FakeGateway) -> MarketDataClient {
    client_with(gateway, settings())
}

pub fn client_with(gateway: &FakeGateway, settings: ConnectionSettings) -> MarketDataClient {
    MarketDataClient::new(Arc::new(gateway.clone()), settings)
}

/// Collect every event of the given kinds, in emission order.
pub fn record(client: &MarketDataClient, kinds: &[EventKind]) -> Arc<Mutex<Vec<StreamEvent>>> {
    let events = Arc::new(Mutex::new(Vec::new()));
    for kind in kinds {
        let events = Arc::clone(&events);
        client.on(*kind, move |event| events.lock().push(event.clone()));
    }
    events
}

/// Poll `condition` until it holds. Panics after ten minutes of (virtual) time.
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    for _ in 0..60_000 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not met in time");
}

pub fn subscribe_frame(symbol: &str) -> String {
    format!(r#"{{"op":"subscribe","symbol":"{symbol}"}}"#)
}

pub fn unsubscribe_frame(symbol: &str) -> String {
    format!(r#"{{"op":"unsubscribe","symbol":"{symbol}"}}"#)
}

pub fn quote_frame(symbol: &str, price: &str, change: &str) -> String {
    format!(
        r#"{{"type":"quote_update","symbol":"{symbol}","price":{price},"change":{change},"change_percent":0.54,"open":189.1,"high":190.5,"low":188.7,"volume":1200,"timestamp":"2024-03-15T14:30:00Z"}}"#
    )
}
