//! Application Layer - Use cases and port definitions.
//!
//! This layer contains the application services and port interfaces
//! that define how the domain interacts with external systems.

/// Per-consumer adapter units.
pub mod adapters;

/// Typed events published on the bus.
pub mod events;

/// Port interfaces for external systems (gateway transport).
pub mod ports;

/// Application services: bus, registry, router, connection lifecycle.
pub mod services;
