#![cfg_attr(
    test,
    allow(
        clippy::unwrap_used,
        clippy::expect_used,
        clippy::float_cmp,
        clippy::significant_drop_tightening,
        clippy::too_many_lines,
        clippy::match_same_arms,
        clippy::needless_pass_by_value,
        clippy::needless_collect,
        clippy::option_if_let_else,
        clippy::default_trait_access,
        clippy::items_after_statements,
        clippy::or_fun_call
    )
)]

//! Quote Stream - Market Data Distribution Layer
//!
//! Maintains one persistent connection to the market-data gateway and fans
//! live quotes out to any number of in-process consumers, each interested in
//! its own, changing set of symbols.
//!
//! # Layers (inside → outside)
//!
//! - **Domain**: Pure types with no I/O
//!   - `streaming`: Symbols, quotes, price direction
//!   - `connection`: Connection state machine values
//!   - `subscription`: Reference-count table and set differences
//!   - `history`: Rolling price window
//!
//! - **Application**: Use cases and port definitions
//!   - `ports`: Gateway transport interface
//!   - `events`: Typed events and listener filters
//!   - `services`: Event bus, subscription registry, quote router,
//!     connection manager, client facade
//!   - `adapters`: Per-consumer stateful wrappers
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `gateway`: Wire messages, JSON codec, reconnect policy, WebSocket
//!   - `config`: Environment settings
//!   - `metrics`: Prometheus instrumentation
//!   - `telemetry`: Tracing and OpenTelemetry
//!
//! # Data Flow
//!
//! ```text
//!  adapters ──subscribe──► registry ──op frames──► gateway
//!     ▲                                               │
//!     │                                          type frames
//!     │                                               ▼
//!  event bus ◄──────── quote router ◄──── connection manager
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Core streaming types with no external dependencies.
pub mod domain;

/// Application layer - Use cases and port definitions.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::connection::ConnectionState;
pub use domain::history::{PriceChange, PriceHistory, PriceHistoryPoint};
pub use domain::streaming::{PriceDirection, Quote, Symbol, SymbolError};
pub use domain::subscription::{SubscriptionChanges, SubscriptionEntry};

// Events and ports
pub use application::events::{EventFilter, EventKind, StreamError, StreamErrorKind, StreamEvent};
pub use application::ports::{Transport, TransportError, TransportFrame, TransportLink};

// Services
pub use application::services::{
    ClientError, ConnectionSettings, EventBus, ListenerGuard, ListenerId, MarketDataClient,
    RegistryStats, SymbolLease,
};

// Adapters
pub use application::adapters::{
    ConnectionStatusAdapter, MultiQuoteAdapter, PriceTrendAdapter, SymbolQuoteAdapter,
};

// Infrastructure config
pub use infrastructure::config::{ClientConfig, ConfigError};

// Gateway
pub use infrastructure::gateway::{ReconnectConfig, WebSocketTransport};

// Metrics
pub use infrastructure::metrics::init_metrics;

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
