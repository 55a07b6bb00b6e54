//! Domain Layer - Core streaming types and subscription bookkeeping.
//!
//! This layer contains the market data payload types and the subscription
//! registry. Nothing here performs I/O; all types are pure Rust with
//! serialization support.

/// Market data payload types (candles, trades, order books, prices).
pub mod streaming;

/// Topics, subscription lifecycle, and the subscription registry.
pub mod subscription;
