//! Market Data Streaming Types
//!
//! Typed payloads delivered by the market data stream: candles, trades,
//! order books, last prices, and trading status changes. These types are
//! codec-agnostic and represent the canonical internal representation of
//! market data handed to subscription handlers.

mod quotation;

pub use quotation::Quotation;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Instrument Identity
// =============================================================================

/// Identifiers of the instrument a payload refers to.
///
/// The server echoes both the FIGI and the instrument UID. Either may be
/// empty depending on which id the subscription used.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentRef {
    /// Financial Instrument Global Identifier.
    pub figi: String,
    /// Broker-assigned instrument UID.
    pub uid: String,
}

impl InstrumentRef {
    /// Create a reference from both ids.
    #[must_use]
    pub fn new(figi: impl Into<String>, uid: impl Into<String>) -> Self {
        Self {
            figi: figi.into(),
            uid: uid.into(),
        }
    }

    /// Reference known only by FIGI.
    #[must_use]
    pub fn figi(figi: impl Into<String>) -> Self {
        Self::new(figi, String::new())
    }

    /// Non-empty ids, UID first, without duplicates.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        let uid = Some(self.uid.as_str()).filter(|s| !s.is_empty());
        let figi = Some(self.figi.as_str()).filter(|s| !s.is_empty() && *s != self.uid);
        uid.into_iter().chain(figi)
    }
}

// =============================================================================
// Candles
// =============================================================================

/// Candle aggregation interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CandleInterval {
    /// One minute.
    OneMinute,
    /// Two minutes.
    TwoMinutes,
    /// Three minutes.
    ThreeMinutes,
    /// Five minutes.
    FiveMinutes,
    /// Ten minutes.
    TenMinutes,
    /// Fifteen minutes.
    FifteenMinutes,
    /// Thirty minutes.
    ThirtyMinutes,
    /// One hour.
    OneHour,
    /// Two hours.
    TwoHours,
    /// Four hours.
    FourHours,
    /// One day.
    OneDay,
    /// One week.
    Week,
    /// One month.
    Month,
}

impl CandleInterval {
    /// Get the interval as a short label.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::OneMinute => "1m",
            Self::TwoMinutes => "2m",
            Self::ThreeMinutes => "3m",
            Self::FiveMinutes => "5m",
            Self::TenMinutes => "10m",
            Self::FifteenMinutes => "15m",
            Self::ThirtyMinutes => "30m",
            Self::OneHour => "1h",
            Self::TwoHours => "2h",
            Self::FourHours => "4h",
            Self::OneDay => "1d",
            Self::Week => "1w",
            Self::Month => "1mo",
        }
    }
}

impl std::fmt::Display for CandleInterval {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An OHLCV candle update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// Instrument the candle belongs to.
    pub instrument: InstrumentRef,
    /// Aggregation interval.
    pub interval: CandleInterval,
    /// Open price.
    pub open: Decimal,
    /// High price.
    pub high: Decimal,
    /// Low price.
    pub low: Decimal,
    /// Close price.
    pub close: Decimal,
    /// Volume in lots.
    pub volume: i64,
    /// Candle start time.
    pub time: DateTime<Utc>,
    /// Time of the last trade included in the candle.
    pub last_trade_at: Option<DateTime<Utc>>,
}

// =============================================================================
// Trades
// =============================================================================

/// Side of the aggressor in a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    /// Direction not reported.
    Unspecified,
    /// Buy.
    Buy,
    /// Sell.
    Sell,
}

/// A single executed trade.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trade {
    /// Instrument traded.
    pub instrument: InstrumentRef,
    /// Aggressor side.
    pub direction: TradeDirection,
    /// Price per instrument unit.
    pub price: Decimal,
    /// Quantity in lots.
    pub quantity: i64,
    /// Execution time.
    pub time: DateTime<Utc>,
}

// =============================================================================
// Order Books
// =============================================================================

/// One price level of an order book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceLevel {
    /// Price.
    pub price: Decimal,
    /// Quantity in lots.
    pub quantity: i64,
}

/// An order book snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBook {
    /// Instrument the book belongs to.
    pub instrument: InstrumentRef,
    /// Depth the book was requested with.
    pub depth: u32,
    /// Whether the snapshot is internally consistent.
    pub is_consistent: bool,
    /// Bids, best first.
    pub bids: Vec<PriceLevel>,
    /// Asks, best first.
    pub asks: Vec<PriceLevel>,
    /// Snapshot time.
    pub time: DateTime<Utc>,
    /// Upper price limit.
    pub limit_up: Option<Decimal>,
    /// Lower price limit.
    pub limit_down: Option<Decimal>,
}

impl OrderBook {
    /// Best bid, if any.
    #[must_use]
    pub fn best_bid(&self) -> Option<&PriceLevel> {
        self.bids.first()
    }

    /// Best ask, if any.
    #[must_use]
    pub fn best_ask(&self) -> Option<&PriceLevel> {
        self.asks.first()
    }

    /// Difference between best ask and best bid.
    #[must_use]
    pub fn spread(&self) -> Option<Decimal> {
        Some(self.best_ask()?.price - self.best_bid()?.price)
    }
}

// =============================================================================
// Last Price and Trading Status
// =============================================================================

/// Last traded price of an instrument.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LastPrice {
    /// Instrument.
    pub instrument: InstrumentRef,
    /// Last price.
    pub price: Decimal,
    /// Time the price was set.
    pub time: DateTime<Utc>,
}

/// Trading mode of an instrument on the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[allow(missing_docs)]
pub enum SecurityTradingStatus {
    Unspecified,
    NotAvailableForTrading,
    OpeningPeriod,
    ClosingPeriod,
    BreakInTrading,
    NormalTrading,
    ClosingAuction,
    DarkPoolAuction,
    DiscreteAuction,
    OpeningAuctionPeriod,
    TradingAtClosingAuctionPrice,
    SessionAssigned,
    SessionClose,
    SessionOpen,
    DealerNormalTrading,
    DealerBreakInTrading,
    DealerNotAvailableForTrading,
}

/// A change of an instrument's trading status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingStatus {
    /// Instrument.
    pub instrument: InstrumentRef,
    /// New status.
    pub status: SecurityTradingStatus,
    /// Whether limit orders are accepted.
    pub limit_order_available: bool,
    /// Whether market orders are accepted.
    pub market_order_available: bool,
    /// Time of the change.
    pub time: DateTime<Utc>,
}

/// Keep-alive sent by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    /// Server time, when reported.
    pub time: Option<DateTime<Utc>>,
}

// =============================================================================
// Payload Union
// =============================================================================

/// Kind of a market data payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataKind {
    /// Candle updates.
    Candle,
    /// Trades.
    Trade,
    /// Order book snapshots.
    OrderBook,
    /// Last prices.
    LastPrice,
    /// Trading status changes.
    TradingStatus,
}

impl DataKind {
    /// Get the kind as a label string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Candle => "candle",
            Self::Trade => "trade",
            Self::OrderBook => "orderbook",
            Self::LastPrice => "last_price",
            Self::TradingStatus => "trading_status",
        }
    }
}

impl std::fmt::Display for DataKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded data payload routed to subscription handlers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MarketPayload {
    /// Candle update.
    Candle(Candle),
    /// Trade.
    Trade(Trade),
    /// Order book snapshot.
    OrderBook(OrderBook),
    /// Last price.
    LastPrice(LastPrice),
    /// Trading status change.
    TradingStatus(TradingStatus),
}

impl MarketPayload {
    /// The kind of this payload.
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

    /// The instrument this payload refers to.
    #[must_use]
    pub const fn instrument(&self) -> &InstrumentRef {
        match self {
            Self::Candle(c) => &c.instrument,
            Self::Trade(t) => &t.instrument,
            Self::OrderBook(b) => &b.instrument,
            Self::LastPrice(p) => &p.instrument,
            Self::TradingStatus(s) => &s.instrument,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(price: i64, quantity: i64) -> PriceLevel {
        PriceLevel {
            price: Decimal::from(price),
            quantity,
        }
    }

    fn book(bids: Vec<PriceLevel>, asks: Vec<PriceLevel>) -> OrderBook {
        OrderBook {
            instrument: InstrumentRef::figi("BBG004730N88"),
            depth: 10,
            is_consistent: true,
            bids,
            asks,
            time: Utc::now(),
            limit_up: None,
            limit_down: None,
        }
    }

    #[test]
    fn ids_prefers_uid_then_figi() {
        let r = InstrumentRef::new("FIGI", "UID");
        assert_eq!(r.ids().collect::<Vec<_>>(), vec!["UID", "FIGI"]);
    }

    #[test]
    fn ids_skips_empty_and_duplicates() {
        assert_eq!(
            InstrumentRef::figi("FIGI").ids().collect::<Vec<_>>(),
            vec!["FIGI"]
        );
        assert_eq!(
            InstrumentRef::new("SAME", "SAME").ids().collect::<Vec<_>>(),
            vec!["SAME"]
        );
        assert_eq!(InstrumentRef::default().ids().count(), 0);
    }

    #[test]
    fn spread_uses_best_levels() {
        let b = book(vec![level(100, 5), level(99, 1)], vec![level(102, 3)]);
        assert_eq!(b.best_bid().map(|l| l.quantity), Some(5));
        assert_eq!(b.spread(), Some(Decimal::from(2)));
    }

    #[test]
    fn spread_missing_side() {
        let b = book(vec![level(100, 5)], vec![]);
        assert!(b.best_ask().is_none());
        assert!(b.spread().is_none());
    }

    #[test]
    fn payload_kind_and_instrument() {
        let p = MarketPayload::LastPrice(LastPrice {
            instrument: InstrumentRef::figi("X"),
            price: Decimal::ONE,
            time: Utc::now(),
        });
        assert_eq!(p.kind(), DataKind::LastPrice);
        assert_eq!(p.instrument().figi, "X");
    }

    #[test]
    fn payload_serializes_with_type_tag() {
        let p = MarketPayload::Trade(Trade {
            instrument: InstrumentRef::figi("X"),
            direction: TradeDirection::Buy,
            price: Decimal::new(1005, 1),
            quantity: 3,
            time: Utc::now(),
        });
        let json = serde_json::to_value(&p).unwrap();
        assert_eq!(json["type"], "trade");
        assert_eq!(json["direction"], "buy");
        assert_eq!(json["price"], "100.5");
    }
}
