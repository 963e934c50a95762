//! Adapter Units
//!
//! Per-consumer stateful wrappers over the client. Each adapter registers its
//! listeners and subscriptions on activation and releases both on
//! deactivation or drop.
//!
//! - `SymbolQuoteAdapter`: Latest quote for one symbol
//! - `MultiQuoteAdapter`: Latest quotes for a changing symbol set
//! - `PriceTrendAdapter`: Direction and rolling deltas for one symbol
//! - `ConnectionStatusAdapter`: Connection state and lifecycle history

mod multi;
mod single;
mod status;
mod trend;

pub use multi::MultiQuoteAdapter;
pub use single::{SymbolQuoteAdapter, SymbolQuoteSnapshot};
pub use status::{
    ConnectionStats, ConnectionStatusAdapter, DEFAULT_HISTORY_CAPACITY, StatusEvent, StatusRecord,
};
pub use trend::{PriceTrendAdapter, TrendState};
