//! Application Services
//!
//! Services that orchestrate domain logic and coordinate between ports.
//!
//! - `EventBus`: Typed publish/subscribe dispatch
//! - `SubscriptionRegistry`: Ref-counted symbol multiplexing
//! - `QuoteRouter`: Decodes gateway frames onto the bus
//! - `ConnectionManager`: Session lifecycle and reconnects
//! - `MarketDataClient`: Facade tying the above together

mod client;
mod connection;
mod event_bus;
mod registry;
mod router;

pub use client::{ClientError, MarketDataClient, SymbolLease};
pub use connection::{ConnectionManager, ConnectionSettings};
pub use event_bus::{EventBus, Listener, ListenerGuard, ListenerId};
pub use registry::{RegistryStats, SubscriptionRegistry};
pub use router::QuoteRouter;
