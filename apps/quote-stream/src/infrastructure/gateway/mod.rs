//! Market Data Gateway Integration
//!
//! Wire protocol and transport for the quote gateway.
//!
//! # Protocol
//!
//! Outbound frames are JSON objects tagged by `op`:
//! `subscribe`, `unsubscribe`, `ping`, `get_subscriptions`.
//!
//! Inbound frames are JSON objects tagged by `type`:
//! `quote_update`, `subscription_confirmed`, `unsubscription_confirmed`,
//! `current_subscriptions`, `market_status`, `all_stocks`, `pong`, `error`.

pub mod codec;
pub mod messages;
pub mod reconnect;
pub mod websocket;

pub use codec::{CodecError, JsonCodec};
pub use messages::{ClientMessage, GatewayMessage, QuoteUpdateMessage};
pub use reconnect::{ReconnectConfig, ReconnectPolicy};
pub use websocket::WebSocketTransport;
