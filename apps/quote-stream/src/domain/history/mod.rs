//! Rolling Price History
//!
//! A per-symbol sequence of price points bounded to a trailing time window.
//! Points older than the window (relative to the newest point) are dropped
//! on every append.

use std::collections::VecDeque;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;

use crate::domain::streaming::{PriceDirection, Quote};

/// Default trailing window.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// One retained observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PriceHistoryPoint {
    /// Observed price.
    pub price: Decimal,
    /// Change reported with the observation.
    pub change: Decimal,
    /// Observation time.
    pub timestamp: DateTime<Utc>,
}

impl From<&Quote> for PriceHistoryPoint {
    fn from(quote: &Quote) -> Self {
        Self {
            price: quote.price,
            change: quote.change,
            timestamp: quote.timestamp,
        }
    }
}

/// Tick-to-tick price change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PriceChange {
    /// Absolute difference.
    pub amount: Decimal,
    /// Difference as a percentage of the earlier price.
    pub percentage: Decimal,
}

impl PriceChange {
    /// Change from `previous` to `current`.
    ///
    /// The percentage is zero when `previous` is zero. Either field is zero
    /// when its value falls outside the `Decimal` range.
    #[must_use]
    pub fn between(previous: Decimal, current: Decimal) -> Self {
        let Some(amount) = current.checked_sub(previous) else {
            return Self::default();
        };
        let percentage = amount
            .checked_div(previous)
            .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
            .unwrap_or(Decimal::ZERO);
        Self { amount, percentage }
    }
}

/// Time-bounded trailing sequence of price points.
#[derive(Debug, Clone)]
pub struct PriceHistory {
    window: TimeDelta,
    points: VecDeque<PriceHistoryPoint>,
}

impl Default for PriceHistory {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl PriceHistory {
    /// Create an empty history with the given trailing window.
    #[must_use]
    pub fn new(window: Duration) -> Self {
        Self {
            window: TimeDelta::from_std(window).unwrap_or(TimeDelta::MAX),
            points: VecDeque::new(),
        }
    }

    /// Append a point and evict everything older than the window.
    ///
    /// Points are kept when `timestamp >= newest - window`. A point that
    /// arrives out of order is inserted in timestamp order so pruning stays
    /// correct.
    pub fn push(&mut self, point: PriceHistoryPoint) {
        let position = self
            .points
            .iter()
            .rposition(|p| p.timestamp <= point.timestamp)
            .map_or(0, |i| i + 1);
        self.points.insert(position, point);
        self.prune();
    }

    fn prune(&mut self) {
        let Some(newest) = self.points.back().map(|p| p.timestamp) else {
            return;
        };
        let cutoff = window_start(newest, self.window);
        while self.points.front().is_some_and(|p| p.timestamp < cutoff) {
            self.points.pop_front();
        }
    }

    /// Retained points, oldest first.
    pub fn points(&self) -> impl Iterator<Item = &PriceHistoryPoint> {
        self.points.iter()
    }

    /// Number of retained points.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether no points are retained.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Most recent point.
    #[must_use]
    pub fn latest(&self) -> Option<&PriceHistoryPoint> {
        self.points.back()
    }

    /// Direction from the sign of the latest point's change.
    #[must_use]
    pub fn direction(&self) -> PriceDirection {
        self.latest()
            .map_or(PriceDirection::Neutral, |p| PriceDirection::from_change(p.change))
    }

    /// Price movement across the trailing `sub_window`.
    ///
    /// Compares the oldest and newest retained points whose timestamps fall
    /// within `sub_window` of the newest point. Returns zero when fewer than
    /// two points qualify or the difference overflows.
    #[must_use]
    pub fn windowed_delta(&self, sub_window: Duration) -> Decimal {
        let Some(newest) = self.latest() else {
            return Decimal::ZERO;
        };
        let span = TimeDelta::from_std(sub_window).unwrap_or(TimeDelta::MAX);
        let cutoff = window_start(newest.timestamp, span);

        let mut in_window = self.points.iter().filter(|p| p.timestamp >= cutoff);
        let Some(oldest) = in_window.next() else {
            return Decimal::ZERO;
        };
        if in_window.next().is_none() {
            return Decimal::ZERO;
        }
        newest
            .price
            .checked_sub(oldest.price)
            .unwrap_or(Decimal::ZERO)
    }

    /// Drop every retained point.
    pub fn clear(&mut self) {
        self.points.clear();
    }
}

fn window_start(newest: DateTime<Utc>, window: TimeDelta) -> DateTime<Utc> {
    newest
        .checked_sub_signed(window)
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}
