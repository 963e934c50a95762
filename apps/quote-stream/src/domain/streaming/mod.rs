//! Market Data Streaming Types
//!
//! Core domain types for market data: symbols and quotes.
//! These types are codec-agnostic and represent the canonical
//! internal representation of a price snapshot.

use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Symbol
// =============================================================================

/// A ticker identifier, normalized to upper case.
///
/// Symbols are compared case-insensitively everywhere in the system, so the
/// normalization happens once here and every downstream map can key on the
/// raw string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Symbol(String);

/// Error returned when a string cannot be used as a symbol.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SymbolError {
    /// The identifier was empty or whitespace only.
    #[error("symbol cannot be empty")]
    Empty,
}

impl Symbol {
    /// Parse and normalize a symbol.
    ///
    /// Leading and trailing whitespace is stripped and the remainder is
    /// upper-cased.
    ///
    /// # Errors
    ///
    /// Returns [`SymbolError::Empty`] if nothing is left after trimming.
    pub fn new(raw: impl AsRef<str>) -> Result<Self, SymbolError> {
        let trimmed = raw.as_ref().trim();
        if trimmed.is_empty() {
            return Err(SymbolError::Empty);
        }
        Ok(Self(trimmed.to_uppercase()))
    }

    /// Borrow the normalized identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::str::FromStr for Symbol {
    type Err = SymbolError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl<'de> Deserialize<'de> for Symbol {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::new(raw).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Price Direction
// =============================================================================

/// Direction of the most recent price change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceDirection {
    /// Price moved up.
    Up,
    /// Price moved down.
    Down,
    /// No change, or not enough data to tell.
    #[default]
    Neutral,
}

impl PriceDirection {
    /// Derive a direction from the sign of a change.
    #[must_use]
    pub fn from_change(change: Decimal) -> Self {
        if change.is_sign_positive() && !change.is_zero() {
            Self::Up
        } else if change.is_sign_negative() && !change.is_zero() {
            Self::Down
        } else {
            Self::Neutral
        }
    }

    /// Lower-case label.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Up => "up",
            Self::Down => "down",
            Self::Neutral => "neutral",
        }
    }
}

// =============================================================================
// Quote
// =============================================================================

/// One point-in-time price snapshot for a symbol.
///
/// Quotes are immutable once built by the router; consumers replace their
/// copy on every update rather than mutating it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    /// Normalized ticker symbol.
    pub symbol: Symbol,
    /// Last traded price.
    pub price: Decimal,
    /// Absolute change against the reference price.
    pub change: Decimal,
    /// Change as a percentage of the reference price.
    pub change_percent: Decimal,
    /// Session open.
    pub open: Decimal,
    /// Session high.
    pub high: Decimal,
    /// Session low.
    pub low: Decimal,
    /// Session volume (shares).
    pub volume: u64,
    /// Time of the snapshot.
    pub timestamp: DateTime<Utc>,
}

impl Quote {
    /// Direction implied by the sign of `change`.
    #[must_use]
    pub fn direction(&self) -> PriceDirection {
        PriceDirection::from_change(self.change)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use test_case::test_case;

    #[test]
    fn symbol_is_normalized() {
        let symbol = Symbol::new("  aapl ").unwrap();
        assert_eq!(symbol.as_str(), "AAPL");
        assert_eq!(symbol, Symbol::new("AAPL").unwrap());
    }

    #[test]
    fn symbol_rejects_blank() {
        assert_eq!(Symbol::new(""), Err(SymbolError::Empty));
        assert_eq!(Symbol::new("   "), Err(SymbolError::Empty));
    }

    #[test]
    fn symbol_deserializes_normalized() {
        let symbol: Symbol = serde_json::from_str(r#""msft""#).unwrap();
        assert_eq!(symbol.as_str(), "MSFT");
        assert!(serde_json::from_str::<Symbol>(r#""""#).is_err());
    }

    #[test_case(dec!(1.5), PriceDirection::Up ; "positive change is up")]
    #[test_case(dec!(-0.2), PriceDirection::Down ; "negative change is down")]
    #[test_case(dec!(0), PriceDirection::Neutral ; "zero change is neutral")]
    #[test_case(dec!(-0.00), PriceDirection::Neutral ; "negative zero is neutral")]
    fn direction_from_change(change: Decimal, expected: PriceDirection) {
        assert_eq!(PriceDirection::from_change(change), expected);
    }

    #[test]
    fn direction_labels() {
        assert_eq!(PriceDirection::Up.as_str(), "up");
        assert_eq!(PriceDirection::Down.as_str(), "down");
        assert_eq!(PriceDirection::Neutral.as_str(), "neutral");
    }
}
