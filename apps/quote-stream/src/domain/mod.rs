//! Domain Layer - Core market data types and business logic.
//!
//! This layer contains the core domain types for quote distribution
//! with no I/O. All types here are pure Rust with serialization support.

/// Gateway connection state machine.
pub mod connection;

/// Rolling price history and derived changes.
pub mod history;

/// Market data streaming types (symbols, quotes).
pub mod streaming;

/// Reference-counted subscription tracking.
pub mod subscription;
