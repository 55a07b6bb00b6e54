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

//! Invest Stream - Market Data Streaming Client
//!
//! A client for the brokerage's market data stream that keeps a single
//! bidirectional gRPC channel open and multiplexes many subscriptions
//! (candles, trades, order books, last prices, trading status) over it.
//! When the channel fails the session reconnects with backoff and resends
//! every live subscription before resuming delivery.
//!
//! # Layers (inside to outside)
//!
//! - **Domain**: Market data payloads and the subscription registry
//!   - `streaming`: Candles, trades, order books, prices, statuses
//!   - `subscription`: Topics, handlers, subscription lifecycle
//!
//! - **Application**: Transport ports and the streaming session
//!   - `ports`: Channel factory, frame sink and source
//!   - `services`: Session loop, reconnect policy, idle watchdog
//!
//! - **Infrastructure**: Adapters and external integrations
//!   - `grpc`: Wire messages, codec, TLS channel factory
//!   - `memory`: In-process transport
//!   - `config`, `metrics`, `telemetry`
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use invest_stream::{ClientConfig, GrpcChannelFactory, SessionConfig, StreamingSession};
//!
//! let config = ClientConfig::from_env()?;
//! let factory = Arc::new(GrpcChannelFactory::new(&config)?);
//! let session =
//!     StreamingSession::open(factory, SessionConfig::from_stream_settings(&config.stream))
//!         .await?;
//!
//! session
//!     .subscribe_last_prices(["BBG004730N88"], |price| println!("{}", price.price))
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]

// =============================================================================
// Module Declarations
// =============================================================================

/// Domain layer - Market data types and subscription bookkeeping.
pub mod domain;

/// Application layer - Ports and the streaming session.
pub mod application;

/// Infrastructure layer - Adapters and external integrations.
pub mod infrastructure;

// =============================================================================
// Re-exports
// =============================================================================

// Domain types
pub use domain::streaming::{
    Candle, CandleInterval, DataKind, InstrumentRef, LastPrice, MarketPayload, OrderBook, Ping,
    PriceLevel, Quotation, SecurityTradingStatus, Trade, TradeDirection, TradingStatus,
};
pub use domain::subscription::{
    RegistryStats, SubscriptionRegistry, SubscriptionState, Topic, TopicError, TopicHandler,
    TopicKind,
};

// Ports
pub use application::ports::{
    AckStatus, Channel, ChannelError, ChannelFactory, ConnectionError, ControlFrame,
    InboundFrame, SubscriptionAction,
};

// Session
pub use application::services::{
    ClosedReason, ReconnectConfig, SessionConfig, SessionError, SessionState, SessionStats,
    StreamingSession,
};

// Infrastructure config
pub use infrastructure::config::{
    ClientConfig, ConfigError, Credentials, Environment, StreamSettings,
};

// Transports
pub use infrastructure::grpc::GrpcChannelFactory;
pub use infrastructure::memory::{MemoryConnection, MemoryTransport};

// Telemetry
pub use infrastructure::telemetry::{TelemetryConfig, TelemetryGuard, init as init_telemetry};
