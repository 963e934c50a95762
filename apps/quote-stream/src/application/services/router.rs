//! Quote Router
//!
//! Decodes inbound gateway frames and republishes them on the event bus.
//! A frame that cannot be decoded becomes a protocol `Error` event; the
//! router never fails the transport loop.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::application::events::{StreamError, StreamEvent};
use crate::application::services::EventBus;
use crate::infrastructure::gateway::{GatewayMessage, JsonCodec};
use crate::infrastructure::metrics;

/// Inbound frame decoder and dispatcher.
#[derive(Debug, Clone)]
pub struct QuoteRouter {
    bus: Arc<EventBus>,
    codec: JsonCodec,
}

impl QuoteRouter {
    /// Create a router publishing to `bus`.
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            bus,
            codec: JsonCodec::new(),
        }
    }

    /// Decode `frame` and emit the resulting event.
    pub fn route(&self, frame: &str) -> StreamEvent {
        let started = Instant::now();
        let event = self.decode(frame, Utc::now());
        self.bus.emit(&event);
        metrics::record_processing_duration(started.elapsed());
        event
    }

    /// Decode `frame` into the event it represents without emitting it.
    ///
    /// Quotes without a timestamp are stamped with `received_at`.
    #[must_use]
    pub fn decode(&self, frame: &str, received_at: DateTime<Utc>) -> StreamEvent {
        let message = match self.codec.decode(frame) {
            Ok(message) => message,
            Err(e) => {
                tracing::warn!(error = %e, frame_len = frame.len(), "Dropping malformed gateway frame");
                metrics::record_protocol_error();
                return StreamEvent::Error(StreamError::protocol(format!(
                    "malformed gateway frame: {e}"
                )));
            }
        };

        let event = match message {
            GatewayMessage::QuoteUpdate(update) => StreamEvent::Quote(update.into_quote(received_at)),
            GatewayMessage::SubscriptionConfirmed(m) => {
                StreamEvent::SubscriptionConfirmed { symbol: m.symbol }
            }
            GatewayMessage::UnsubscriptionConfirmed(m) => {
                StreamEvent::UnsubscriptionConfirmed { symbol: m.symbol }
            }
            GatewayMessage::CurrentSubscriptions(m) => {
                StreamEvent::CurrentSubscriptions { symbols: m.symbols }
            }
            GatewayMessage::MarketStatus(m) => StreamEvent::MarketStatus(m.data),
            GatewayMessage::AllStocks(m) => StreamEvent::AllStocks(m.data),
            GatewayMessage::Pong => StreamEvent::Pong,
            GatewayMessage::Error(m) => match m.symbol {
                Some(symbol) => {
                    tracing::warn!(symbol = %symbol, message = %m.message, "Gateway rejected symbol");
                    StreamEvent::Error(StreamError::subscription(symbol, m.message))
                }
                None => {
                    tracing::warn!(message = %m.message, "Gateway reported error");
                    StreamEvent::Error(StreamError::protocol(m.message))
                }
            },
        };

        metrics::record_frame_received(event.kind());
        event
    }
}
