//! Subscription Types
//!
//! Domain types for tracking which market data streams the caller is
//! interested in and who receives each stream's payloads.
//!
//! # Design
//!
//! A [`Topic`] is an immutable value key: instrument id, data kind, and
//! kind-specific parameters (candle interval, order book depth). The
//! [`SubscriptionRegistry`] keeps at most one subscription per topic and
//! tracks its lifecycle:
//!
//! ```text
//! Pending ──ack──► Active
//!    │               │
//!    └──unsubscribe──┴──► Cancelling ──frame written──► Cancelled (removed)
//! ```

mod registry;

pub use registry::{DispatchOutcome, RegistryStats, SubscriptionHandle, SubscriptionRegistry};

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::domain::streaming::{
    Candle, CandleInterval, DataKind, LastPrice, MarketPayload, OrderBook, Trade, TradingStatus,
};

/// Smallest order book depth the server accepts.
pub const MIN_ORDER_BOOK_DEPTH: u32 = 1;

/// Largest order book depth the server accepts.
pub const MAX_ORDER_BOOK_DEPTH: u32 = 50;

// =============================================================================
// Errors
// =============================================================================

/// Reasons a topic cannot be subscribed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TopicError {
    /// Instrument id is empty or whitespace.
    #[error("instrument id must not be empty")]
    EmptyInstrumentId,

    /// Order book depth outside the accepted range.
    #[error("order book depth {0} out of range {MIN_ORDER_BOOK_DEPTH}..={MAX_ORDER_BOOK_DEPTH}")]
    InvalidDepth(u32),

    /// Handler accepts a different payload kind than the topic delivers.
    #[error("handler for {handler} payloads cannot serve a {topic} topic")]
    HandlerMismatch {
        /// Kind the topic delivers.
        topic: DataKind,
        /// Kind the handler accepts.
        handler: DataKind,
    },
}

// =============================================================================
// Topic
// =============================================================================

/// Data kind of a topic together with its parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TopicKind {
    /// Candles of one interval.
    Candles {
        /// Aggregation interval.
        interval: CandleInterval,
    },
    /// Executed trades.
    Trades,
    /// Order book snapshots of one depth.
    OrderBook {
        /// Number of levels per side.
        depth: u32,
    },
    /// Last prices.
    LastPrice,
    /// Trading status changes.
    TradingStatus,
}

impl TopicKind {
    /// The payload kind delivered for this topic kind.
    #[must_use]
    pub const fn data_kind(&self) -> DataKind {
        match self {
            Self::Candles { .. } => DataKind::Candle,
            Self::Trades => DataKind::Trade,
            Self::OrderBook { .. } => DataKind::OrderBook,
            Self::LastPrice => DataKind::LastPrice,
            Self::TradingStatus => DataKind::TradingStatus,
        }
    }

    /// The topic kind a payload was published under.
    #[must_use]
    pub const fn of_payload(payload: &MarketPayload) -> Self {
        match payload {
            MarketPayload::Candle(c) => Self::Candles {
                interval: c.interval,
            },
            MarketPayload::Trade(_) => Self::Trades,
            MarketPayload::OrderBook(b) => Self::OrderBook { depth: b.depth },
            MarketPayload::LastPrice(_) => Self::LastPrice,
            MarketPayload::TradingStatus(_) => Self::TradingStatus,
        }
    }
}

impl std::fmt::Display for TopicKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Candles { interval } => write!(f, "candles:{interval}"),
            Self::Trades => f.write_str("trades"),
            Self::OrderBook { depth } => write!(f, "orderbook:{depth}"),
            Self::LastPrice => f.write_str("last_price"),
            Self::TradingStatus => f.write_str("trading_status"),
        }
    }
}

/// One subscribable stream: an instrument and a parameterized data kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic {
    /// FIGI or instrument UID.
    pub instrument_id: String,
    /// Data kind and parameters.
    pub kind: TopicKind,
}

impl Topic {
    /// Create a topic from parts.
    #[must_use]
    pub fn new(instrument_id: impl Into<String>, kind: TopicKind) -> Self {
        Self {
            instrument_id: instrument_id.into(),
            kind,
        }
    }

    /// Candle topic.
    #[must_use]
    pub fn candles(instrument_id: impl Into<String>, interval: CandleInterval) -> Self {
        Self::new(instrument_id, TopicKind::Candles { interval })
    }

    /// Trade topic.
    #[must_use]
    pub fn trades(instrument_id: impl Into<String>) -> Self {
        Self::new(instrument_id, TopicKind::Trades)
    }

    /// Order book topic.
    #[must_use]
    pub fn order_book(instrument_id: impl Into<String>, depth: u32) -> Self {
        Self::new(instrument_id, TopicKind::OrderBook { depth })
    }

    /// Last price topic.
    #[must_use]
    pub fn last_price(instrument_id: impl Into<String>) -> Self {
        Self::new(instrument_id, TopicKind::LastPrice)
    }

    /// Trading status topic.
    #[must_use]
    pub fn trading_status(instrument_id: impl Into<String>) -> Self {
        Self::new(instrument_id, TopicKind::TradingStatus)
    }

    /// Check that the topic is fully specified.
    ///
    /// # Errors
    ///
    /// Returns an error if the instrument id is blank or an order book depth
    /// lies outside `1..=50`.
    pub fn validate(&self) -> Result<(), TopicError> {
        if self.instrument_id.trim().is_empty() {
            return Err(TopicError::EmptyInstrumentId);
        }
        if let TopicKind::OrderBook { depth } = self.kind
            && !(MIN_ORDER_BOOK_DEPTH..=MAX_ORDER_BOOK_DEPTH).contains(&depth)
        {
            return Err(TopicError::InvalidDepth(depth));
        }
        Ok(())
    }

    /// Topics a payload may belong to, one per instrument id it carries.
    ///
    /// The server reports both FIGI and UID; the caller may have subscribed
    /// with either, so both are candidates (UID first).
    #[must_use]
    pub fn candidates(payload: &MarketPayload) -> Vec<Self> {
        let kind = TopicKind::of_payload(payload);
        payload
            .instrument()
            .ids()
            .map(|id| Self::new(id, kind))
            .collect()
    }
}

impl std::fmt::Display for Topic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.kind, self.instrument_id)
    }
}

// =============================================================================
// Subscription State
// =============================================================================

/// Lifecycle state of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionState {
    /// Control frame sent (or queued), no ack yet.
    Pending,
    /// Acknowledged by the server.
    Active,
    /// Unsubscribe frame being written.
    Cancelling,
    /// Removed. Topics never subscribed also report this state.
    Cancelled,
}

impl SubscriptionState {
    /// Get the state as a label string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Cancelling => "cancelling",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the subscription must be restored after a reconnect.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self, Self::Pending | Self::Active)
    }
}

impl std::fmt::Display for SubscriptionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// A caller-supplied callback for one payload type.
///
/// Handlers run on the session's receive task. They must not block and must
/// not call back into `subscribe`/`unsubscribe`; long-running work belongs on
/// the caller's own task or queue.
pub type Handler<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// A handler tagged with the payload kind it accepts.
#[derive(Clone)]
pub enum TopicHandler {
    /// Receives candles.
    Candle(Handler<Candle>),
    /// Receives trades.
    Trade(Handler<Trade>),
    /// Receives order books.
    OrderBook(Handler<OrderBook>),
    /// Receives last prices.
    LastPrice(Handler<LastPrice>),
    /// Receives trading status changes.
    TradingStatus(Handler<TradingStatus>),
}

impl TopicHandler {
    /// Wrap a candle callback.
    pub fn candle(f: impl Fn(&Candle) + Send + Sync + 'static) -> Self {
        Self::Candle(Arc::new(f))
    }

    /// Wrap a trade callback.
    pub fn trade(f: impl Fn(&Trade) + Send + Sync + 'static) -> Self {
        Self::Trade(Arc::new(f))
    }

    /// Wrap an order book callback.
    pub fn order_book(f: impl Fn(&OrderBook) + Send + Sync + 'static) -> Self {
        Self::OrderBook(Arc::new(f))
    }

    /// Wrap a last price callback.
    pub fn last_price(f: impl Fn(&LastPrice) + Send + Sync + 'static) -> Self {
        Self::LastPrice(Arc::new(f))
    }

    /// Wrap a trading status callback.
    pub fn trading_status(f: impl Fn(&TradingStatus) + Send + Sync + 'static) -> Self {
        Self::TradingStatus(Arc::new(f))
    }

    /// The payload kind this handler accepts.
    #[must_use]
    pub const fn kind(&self) -> DataKind {
        match self {
            Self::Candle(_) => DataKind::Candle,
            Self::Trade(_) => DataKind::Trade,
            Self::OrderBook(_) => DataKind::OrderBook,
            Self::LastPrice(_) => DataKind::LastPrice,
            Self::TradingStatus(_) => DataKind::TradingStatus,
        }
    }

    /// Invoke the handler. Returns `false` if the payload is of another kind.
    pub fn invoke(&self, payload: &MarketPayload) -> bool {
        match (self, payload) {
            (Self::Candle(h), MarketPayload::Candle(p)) => h(p),
            (Self::Trade(h), MarketPayload::Trade(p)) => h(p),
            (Self::OrderBook(h), MarketPayload::OrderBook(p)) => h(p),
            (Self::LastPrice(h), MarketPayload::LastPrice(p)) => h(p),
            (Self::TradingStatus(h), MarketPayload::TradingStatus(p)) => h(p),
            _ => return false,
        }
        true
    }
}

impl std::fmt::Debug for TopicHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TopicHandler").field(&self.kind()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::streaming::InstrumentRef;
    use chrono::Utc;
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use test_case::test_case;

    fn last_price(figi: &str, uid: &str) -> MarketPayload {
        MarketPayload::LastPrice(LastPrice {
            instrument: InstrumentRef::new(figi, uid),
            price: Decimal::ONE,
            time: Utc::now(),
        })
    }

    #[test_case(Topic::candles("X", CandleInterval::OneMinute) ; "candles")]
    #[test_case(Topic::trades("X") ; "trades")]
    #[test_case(Topic::order_book("X", 1) ; "min depth")]
    #[test_case(Topic::order_book("X", 50) ; "max depth")]
    #[test_case(Topic::last_price("X") ; "last price")]
    #[test_case(Topic::trading_status("X") ; "trading status")]
    fn valid_topics(topic: Topic) {
        assert_eq!(topic.validate(), Ok(()));
    }

    #[test_case(Topic::trades(""), TopicError::EmptyInstrumentId ; "empty id")]
    #[test_case(Topic::last_price("  "), TopicError::EmptyInstrumentId ; "blank id")]
    #[test_case(Topic::order_book("X", 0), TopicError::InvalidDepth(0) ; "zero depth")]
    #[test_case(Topic::order_book("X", 51), TopicError::InvalidDepth(51) ; "deep book")]
    fn invalid_topics(topic: Topic, expected: TopicError) {
        assert_eq!(topic.validate(), Err(expected));
    }

    proptest! {
        #[test]
        fn depth_validation_matches_range(depth in 0u32..200) {
            let ok = Topic::order_book("X", depth).validate().is_ok();
            prop_assert_eq!(ok, (1..=50).contains(&depth));
        }
    }

    #[test]
    fn topics_are_structural_keys() {
        assert_eq!(Topic::order_book("Y", 10), Topic::order_book("Y", 10));
        assert_ne!(Topic::order_book("Y", 10), Topic::order_book("Y", 20));
        assert_ne!(
            Topic::candles("X", CandleInterval::OneMinute),
            Topic::candles("X", CandleInterval::FiveMinutes)
        );
    }

    #[test]
    fn candidates_cover_both_ids() {
        let got = Topic::candidates(&last_price("FIGI", "UID"));
        assert_eq!(got, vec![Topic::last_price("UID"), Topic::last_price("FIGI")]);
    }

    #[test]
    fn display_is_readable() {
        assert_eq!(Topic::order_book("Y", 10).to_string(), "orderbook:10@Y");
        assert_eq!(
            Topic::candles("X", CandleInterval::OneMinute).to_string(),
            "candles:1m@X"
        );
    }

    #[test]
    fn handler_rejects_other_kinds() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let handler = TopicHandler::trade(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert_eq!(handler.kind(), DataKind::Trade);
        assert!(!handler.invoke(&last_price("X", "")));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn handler_invokes_matching_kind() {
        let calls = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&calls);
        let handler = TopicHandler::last_price(move |p| {
            assert_eq!(p.price, Decimal::ONE);
            c.fetch_add(1, Ordering::SeqCst);
        });

        assert!(handler.invoke(&last_price("X", "")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn only_pending_and_active_are_live() {
        assert!(SubscriptionState::Pending.is_live());
        assert!(SubscriptionState::Active.is_live());
        assert!(!SubscriptionState::Cancelling.is_live());
        assert!(!SubscriptionState::Cancelled.is_live());
    }
}
