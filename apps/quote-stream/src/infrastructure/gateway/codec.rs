//! Gateway Codec
//!
//! JSON encoding of [`ClientMessage`]s and decoding of inbound frames into
//! [`GatewayMessage`]s.
//!
//! Inbound frames are single JSON objects with a `type` discriminator. Quote
//! frames may carry their fields either at the top level or nested under a
//! `data` object; a top-level `symbol` fills in when `data` omits it. The
//! same lifting applies to `current_subscriptions`.

use serde_json::Value;

use crate::infrastructure::gateway::messages::{
    AllStocksMessage, ClientMessage, CurrentSubscriptionsMessage, ErrorMessage, GatewayMessage,
    MarketStatusMessage, QuoteUpdateMessage, SymbolMessage,
};

/// Codec errors.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// JSON encoding/decoding failed.
    #[error("JSON codec error: {0}")]
    Json(#[from] serde_json::Error),

    /// Unknown message type.
    #[error("unknown message type: {0}")]
    UnknownMessageType(String),

    /// Invalid message format.
    #[error("invalid message format: {0}")]
    InvalidFormat(String),
}

/// JSON codec for the gateway protocol.
#[derive(Debug, Default, Clone)]
pub struct JsonCodec;

impl JsonCodec {
    /// Create a new JSON codec.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Encode an outbound message.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn encode(&self, message: &ClientMessage) -> Result<String, CodecError> {
        Ok(serde_json::to_string(message)?)
    }

    /// Decode one inbound text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is not a JSON object, has no `type`,
    /// names an unknown type, or is missing required fields.
    pub fn decode(&self, text: &str) -> Result<GatewayMessage, CodecError> {
        let trimmed = text.trim();
        if !trimmed.starts_with('{') {
            return Err(CodecError::InvalidFormat(format!(
                "expected JSON object, got: {}...",
                trimmed.chars().take(50).collect::<String>()
            )));
        }

        let value: Value = serde_json::from_str(trimmed)?;
        let msg_type = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| CodecError::InvalidFormat("missing \"type\" field".to_string()))?
            .to_string();

        let message = match msg_type.as_str() {
            "quote_update" | "stock_update" => {
                let m: QuoteUpdateMessage = serde_json::from_value(flatten_data(value))?;
                GatewayMessage::QuoteUpdate(m)
            }
            "subscription_confirmed" => {
                let m: SymbolMessage = serde_json::from_value(flatten_data(value))?;
                GatewayMessage::SubscriptionConfirmed(m)
            }
            "unsubscription_confirmed" | "subscription_cancelled" => {
                let m: SymbolMessage = serde_json::from_value(flatten_data(value))?;
                GatewayMessage::UnsubscriptionConfirmed(m)
            }
            "current_subscriptions" => {
                let m: CurrentSubscriptionsMessage = serde_json::from_value(flatten_data(value))?;
                GatewayMessage::CurrentSubscriptions(m)
            }
            "market_status" => {
                let m: MarketStatusMessage = serde_json::from_value(value)?;
                GatewayMessage::MarketStatus(m)
            }
            "all_stocks" => {
                let m: AllStocksMessage = serde_json::from_value(value)?;
                GatewayMessage::AllStocks(m)
            }
            "pong" => GatewayMessage::Pong,
            "error" => {
                let m: ErrorMessage = serde_json::from_value(value)?;
                GatewayMessage::Error(m)
            }
            _ => return Err(CodecError::UnknownMessageType(msg_type)),
        };

        Ok(message)
    }
}

/// Lift a nested `data` object to the top level, keeping top-level fields the
/// nested object does not set.
fn flatten_data(mut value: Value) -> Value {
    if let Value::Object(outer) = &mut value {
        match outer.remove("data") {
            Some(Value::Object(nested)) => outer.extend(nested),
            Some(other) => {
                outer.insert("data".to_string(), other);
            }
            None => {}
        }
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::streaming::Symbol;
    use rust_decimal_macros::dec;

    #[test]
    fn decode_flat_quote_update() {
        let codec = JsonCodec::new();
        let msg = codec
            .decode(r#"{"type":"quote_update","symbol":"AAPL","price":190.12,"change":1.02}"#)
            .unwrap();

        let GatewayMessage::QuoteUpdate(quote) = msg else {
            panic!("expected quote update, got {msg:?}");
        };
        assert_eq!(quote.symbol.as_str(), "AAPL");
        assert_eq!(quote.price, dec!(190.12));
    }

    #[test]
    fn decode_nested_stock_update() {
        let codec = JsonCodec::new();
        let msg = codec
            .decode(
                r#"{"type":"stock_update","symbol":"msft",
                    "data":{"price":"410.50","change":-1.25,"change_percent":"-0.30%"}}"#,
            )
            .unwrap();

        let GatewayMessage::QuoteUpdate(quote) = msg else {
            panic!("expected quote update, got {msg:?}");
        };
        assert_eq!(quote.symbol.as_str(), "MSFT");
        assert_eq!(quote.change_percent, dec!(-0.30));
    }

    #[test]
    fn decode_confirmations() {
        let codec = JsonCodec::new();
        assert_eq!(
            codec
                .decode(r#"{"type":"subscription_confirmed","symbol":"aapl","status":"ok"}"#)
                .unwrap(),
            GatewayMessage::SubscriptionConfirmed(SymbolMessage {
                symbol: Symbol::new("AAPL").unwrap(),
                status: Some("ok".to_string()),
            })
        );
        assert!(matches!(
            codec
                .decode(r#"{"type":"subscription_cancelled","symbol":"AAPL"}"#)
                .unwrap(),
            GatewayMessage::UnsubscriptionConfirmed(_)
        ));
    }

    #[test]
    fn decode_control_frames() {
        let codec = JsonCodec::new();
        assert_eq!(codec.decode(r#"{"type":"pong"}"#).unwrap(), GatewayMessage::Pong);
        assert!(matches!(
            codec
                .decode(r#"{"type":"market_status","data":{"is_open":true}}"#)
                .unwrap(),
            GatewayMessage::MarketStatus(_)
        ));
        assert!(matches!(
            codec
                .decode(r#"{"type":"current_subscriptions","symbols":["AAPL"]}"#)
                .unwrap(),
            GatewayMessage::CurrentSubscriptions(_)
        ));
    }

    #[test]
    fn decode_current_subscriptions_shapes() {
        let codec = JsonCodec::new();
        let expected = GatewayMessage::CurrentSubscriptions(CurrentSubscriptionsMessage {
            symbols: vec![Symbol::new("AAPL").unwrap(), Symbol::new("MSFT").unwrap()],
        });

        for frame in [
            r#"{"type":"current_subscriptions","symbols":["AAPL","MSFT"]}"#,
            r#"{"type":"current_subscriptions","subscriptions":["AAPL","MSFT"]}"#,
            r#"{"type":"current_subscriptions","data":{"subscriptions":["aapl","msft"]}}"#,
            r#"{"type":"current_subscriptions","data":["AAPL","MSFT"]}"#,
        ] {
            assert_eq!(codec.decode(frame).unwrap(), expected, "frame: {frame}");
        }
    }

    #[test]
    fn decode_all_stocks_snapshot() {
        let msg = JsonCodec::new()
            .decode(r#"{"type":"all_stocks","data":{"AAPL":{"price":190.12}}}"#)
            .unwrap();
        let GatewayMessage::AllStocks(snapshot) = msg else {
            panic!("expected all_stocks snapshot, got {msg:?}");
        };
        assert_eq!(snapshot.data["AAPL"]["price"], serde_json::json!(190.12));

        assert_eq!(
            JsonCodec::new().decode(r#"{"type":"all_stocks"}"#).unwrap(),
            GatewayMessage::AllStocks(AllStocksMessage { data: Value::Null })
        );
    }

    #[test]
    fn decode_unknown_type() {
        let err = JsonCodec::new().decode(r#"{"type":"bogus"}"#).unwrap_err();
        assert!(matches!(err, CodecError::UnknownMessageType(t) if t == "bogus"));
    }

    #[test]
    fn decode_missing_type() {
        let err = JsonCodec::new().decode(r#"{"symbol":"AAPL"}"#).unwrap_err();
        assert!(matches!(err, CodecError::InvalidFormat(_)));
    }

    #[test]
    fn decode_non_object() {
        assert!(matches!(
            JsonCodec::new().decode("not json").unwrap_err(),
            CodecError::InvalidFormat(_)
        ));
        assert!(matches!(
            JsonCodec::new().decode("{broken").unwrap_err(),
            CodecError::Json(_)
        ));
    }

    #[test]
    fn encode_unsubscribe() {
        let encoded = JsonCodec::new()
            .encode(&ClientMessage::Unsubscribe {
                symbol: Symbol::new("tsla").unwrap(),
            })
            .unwrap();
        assert_eq!(encoded, r#"{"op":"unsubscribe","symbol":"TSLA"}"#);
    }
}
