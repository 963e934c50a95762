//! Gateway Wire Message Types
//!
//! JSON schemas for the market-data gateway protocol.
//!
//! # Outbound (`op` discriminator)
//! - `subscribe` / `unsubscribe`: `{"op": "...", "symbol": "AAPL"}`
//! - `ping`: keepalive
//! - `get_subscriptions`: ask for the gateway's view of this session
//!
//! # Inbound (`type` discriminator)
//! - `quote_update` (alias `stock_update`): one quote, fields either flat or
//!   nested under `data`
//! - `subscription_confirmed`, `unsubscription_confirmed`
//!   (alias `subscription_cancelled`)
//! - `current_subscriptions` (list under `symbols` or `subscriptions`),
//!   `market_status`, `all_stocks`, `pong`, `error`
//!
//! Numeric quote fields are decoded leniently: numbers, numeric strings and
//! percentage strings (`"0.54%"`) are all accepted.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::domain::streaming::{Quote, Symbol};

// =============================================================================
// Outbound
// =============================================================================

/// Messages sent to the gateway.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start receiving quotes for a symbol.
    Subscribe {
        /// Upper-case symbol.
        symbol: Symbol,
    },
    /// Stop receiving quotes for a symbol.
    Unsubscribe {
        /// Upper-case symbol.
        symbol: Symbol,
    },
    /// Keepalive.
    Ping,
    /// Request the gateway's subscription list for this session.
    GetSubscriptions,
}

impl ClientMessage {
    /// Wire `op` value, also used as a metrics label.
    #[must_use]
    pub const fn op(&self) -> &'static str {
        match self {
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::Ping => "ping",
            Self::GetSubscriptions => "get_subscriptions",
        }
    }
}

// =============================================================================
// Inbound
// =============================================================================

/// A decoded gateway frame.
#[derive(Debug, Clone, PartialEq)]
pub enum GatewayMessage {
    /// New quote.
    QuoteUpdate(QuoteUpdateMessage),
    /// Subscribe acknowledged.
    SubscriptionConfirmed(SymbolMessage),
    /// Unsubscribe acknowledged.
    UnsubscriptionConfirmed(SymbolMessage),
    /// Gateway's subscription list for this session.
    CurrentSubscriptions(CurrentSubscriptionsMessage),
    /// Market open/close status.
    MarketStatus(MarketStatusMessage),
    /// Snapshot of every simulated stock.
    AllStocks(AllStocksMessage),
    /// Keepalive reply.
    Pong,
    /// Gateway-reported error.
    Error(ErrorMessage),
}

/// Quote payload.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct QuoteUpdateMessage {
    /// Ticker symbol, normalized on decode.
    pub symbol: Symbol,
    /// Last price.
    #[serde(deserialize_with = "lenient_decimal")]
    pub price: Decimal,
    /// Absolute change.
    #[serde(deserialize_with = "lenient_decimal")]
    pub change: Decimal,
    /// Percentage change.
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub change_percent: Decimal,
    /// Session open.
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub open: Decimal,
    /// Session high.
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub high: Decimal,
    /// Session low.
    #[serde(default, deserialize_with = "lenient_decimal")]
    pub low: Decimal,
    /// Session volume.
    #[serde(default, deserialize_with = "lenient_volume")]
    pub volume: u64,
    /// Quote time, if the gateway sent one.
    #[serde(default, deserialize_with = "lenient_timestamp")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl QuoteUpdateMessage {
    /// Build the domain quote, stamping `received_at` when the frame had no
    /// usable timestamp.
    #[must_use]
    pub fn into_quote(self, received_at: DateTime<Utc>) -> Quote {
        Quote {
            symbol: self.symbol,
            price: self.price,
            change: self.change,
            change_percent: self.change_percent,
            open: self.open,
            high: self.high,
            low: self.low,
            volume: self.volume,
            timestamp: self.timestamp.unwrap_or(received_at),
        }
    }
}

/// Frame carrying just a symbol.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SymbolMessage {
    /// Symbol the frame refers to.
    pub symbol: Symbol,
    /// Optional gateway status string.
    #[serde(default)]
    pub status: Option<String>,
}

/// Gateway subscription list.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CurrentSubscriptionsMessage {
    /// Subscribed symbols.
    #[serde(default, alias = "subscriptions", alias = "data")]
    pub symbols: Vec<Symbol>,
}

/// Market status payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MarketStatusMessage {
    /// Opaque status document.
    #[serde(default)]
    pub data: Value,
}

/// Full-market snapshot payload.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AllStocksMessage {
    /// Opaque snapshot document keyed by symbol.
    #[serde(default)]
    pub data: Value,
}

/// Gateway-reported error.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ErrorMessage {
    /// Human-readable cause.
    #[serde(default = "default_error_message")]
    pub message: String,
    /// Symbol the error refers to, if any.
    #[serde(default)]
    pub symbol: Option<Symbol>,
}

fn default_error_message() -> String {
    "gateway reported an error".to_string()
}

// =============================================================================
// Lenient Field Decoding
// =============================================================================

fn decimal_from_str(raw: &str) -> Result<Decimal, rust_decimal::Error> {
    Decimal::from_str(raw).or_else(|_| Decimal::from_scientific(raw))
}

fn lenient_decimal<'de, D>(deserializer: D) -> Result<Decimal, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(Decimal::ZERO),
        Value::Number(n) => decimal_from_str(&n.to_string()).map_err(D::Error::custom),
        Value::String(s) => {
            let trimmed = s.trim().trim_end_matches('%').trim();
            if trimmed.is_empty() {
                return Ok(Decimal::ZERO);
            }
            decimal_from_str(trimmed).map_err(D::Error::custom)
        }
        other => Err(D::Error::custom(format!("expected a number, got {other}"))),
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn lenient_volume<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(0),
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0).map(|f| f as u64))
            .ok_or_else(|| D::Error::custom(format!("invalid volume: {n}"))),
        Value::String(s) => s
            .trim()
            .parse::<u64>()
            .map_err(|e| D::Error::custom(format!("invalid volume {s:?}: {e}"))),
        other => Err(D::Error::custom(format!("expected a volume, got {other}"))),
    }
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .and_then(DateTime::from_timestamp_millis)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid epoch millis: {n}"))),
        Value::String(s) => parse_timestamp(&s)
            .map(Some)
            .ok_or_else(|| D::Error::custom(format!("invalid timestamp: {s:?}"))),
        other => Err(D::Error::custom(format!("expected a timestamp, got {other}"))),
    }
}

/// RFC 3339, or a naive ISO timestamp taken as UTC.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()
        .map(|naive| naive.and_utc())
}

// =============================================================================
// Tests
// =============================================================================
